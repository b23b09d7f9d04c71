//! In-process stand-ins for the fetcher, binder and mailer.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use novelforge::{
    Artifact, ArtifactRequest, BindError, Binder, BoundFile, CancelToken, Chapter, ChapterImage,
    FetchError, Fetcher, Job, MailError, Mailer, Novel, NovelLibrary, OutputFormat, User, Volume,
};

/// Shape of every novel the fake fetcher serves.
#[derive(Debug, Clone, Copy)]
pub struct FakeSite {
    pub volumes: usize,
    pub chapters_per_volume: usize,
    pub images_per_chapter: usize,
}

impl Default for FakeSite {
    fn default() -> Self {
        Self {
            volumes: 2,
            chapters_per_volume: 3,
            images_per_chapter: 0,
        }
    }
}

/// Serves a synthetic novel for any URL containing "example". Everything
/// it fetches is written through the library, like a real crawler.
pub struct FakeFetcher {
    library: NovelLibrary,
    site: FakeSite,
    failing_chapters: Mutex<HashSet<i64>>,
    block_chapters: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(library: NovelLibrary, site: FakeSite) -> Self {
        Self {
            library,
            site,
            failing_chapters: Mutex::new(HashSet::new()),
            block_chapters: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Makes `fetch_chapter` fail for the chapter with this serial.
    pub fn fail_chapter(&self, serial: i64) {
        self.failing_chapters.lock().unwrap().insert(serial);
    }

    /// Makes `fetch_chapter` wait for cancellation before returning.
    pub fn block_chapters(&self, block: bool) {
        self.block_chapters.store(block, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose label starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn wait_for_blocked(&self) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while self.count("blocked:") == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn failed(e: impl std::fmt::Display) -> FetchError {
    FetchError::Failed(e.to_string())
}

impl Fetcher for FakeFetcher {
    fn check_url(&self, url: &str) -> Result<(), FetchError> {
        if url.contains("example") {
            Ok(())
        } else {
            Err(FetchError::NoCrawler(url.to_string()))
        }
    }

    fn fetch_novel(&self, _: &str, url: &str, cancel: &CancelToken) -> Result<Novel, FetchError> {
        self.record(format!("novel:{}", url));
        cancel.check()?;

        let novel = self
            .library
            .save_novel(&Novel::new(url, &format!("Novel at {}", url)))
            .map_err(failed)?;
        let mut serial = 0;
        for v in 0..self.site.volumes {
            let volume = self
                .library
                .save_volume(&Volume::new(&novel.id, v as i64 + 1, &format!("Volume {}", v + 1)))
                .map_err(failed)?;
            for _ in 0..self.site.chapters_per_volume {
                serial += 1;
                let chapter = Chapter::new(
                    &volume,
                    serial,
                    &format!("{}/chapter/{}", url, serial),
                    &format!("Chapter {}", serial),
                );
                self.library.save_chapter(&chapter).map_err(failed)?;
            }
        }
        Ok(novel)
    }

    fn fetch_chapter(
        &self,
        _: &str,
        chapter_id: &str,
        cancel: &CancelToken,
    ) -> Result<Chapter, FetchError> {
        self.record(format!("chapter:{}", chapter_id));
        let chapter = self
            .library
            .chapter(chapter_id)
            .map_err(failed)?
            .ok_or_else(|| FetchError::NotFound(chapter_id.to_string()))?;
        let blocking = self.block_chapters.load(Ordering::SeqCst);

        if self.failing_chapters.lock().unwrap().contains(&chapter.serial) {
            if blocking {
                // Fail only once another fetch is parked, so the failure
                // seals work that is in flight.
                self.wait_for_blocked();
            }
            return Err(FetchError::Failed(format!("HTTP 500 for {}", chapter.url)));
        }
        if blocking {
            self.record(format!("blocked:{}", chapter_id));
            if cancel.wait(Duration::from_secs(10)) {
                self.record(format!("aborted:{}", chapter_id));
                return Err(FetchError::Aborted);
            }
        }
        cancel.check()?;

        self.library
            .write_chapter_body(&chapter, &format!("<p>{} body</p>", chapter.title))
            .map_err(failed)?;
        for i in 0..self.site.images_per_chapter {
            let image = ChapterImage::new(&chapter, &format!("{}/img/{}.jpg", chapter.url, i));
            self.library.save_image(&image).map_err(failed)?;
        }
        Ok(Chapter {
            is_available: true,
            ..chapter
        })
    }

    fn fetch_image(
        &self,
        _: &str,
        image_id: &str,
        cancel: &CancelToken,
    ) -> Result<ChapterImage, FetchError> {
        self.record(format!("image:{}", image_id));
        cancel.check()?;

        let image = self
            .library
            .image(image_id)
            .map_err(failed)?
            .ok_or_else(|| FetchError::NotFound(image_id.to_string()))?;
        self.library
            .write_image(&image, b"\xFF\xD8\xFF fake jpeg")
            .map_err(failed)?;
        Ok(ChapterImage {
            is_available: true,
            ..image
        })
    }
}

/// Produces a small text file per format.
pub struct FakeBinder {
    formats: Vec<OutputFormat>,
    failing: Mutex<HashSet<OutputFormat>>,
    calls: Mutex<Vec<ArtifactRequest>>,
}

impl FakeBinder {
    pub fn new(formats: Vec<OutputFormat>) -> Self {
        Self {
            formats,
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_format(&self, format: OutputFormat) {
        self.failing.lock().unwrap().insert(format);
    }

    pub fn requests(&self) -> Vec<ArtifactRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for FakeBinder {
    fn default() -> Self {
        Self::new(OutputFormat::ALL.to_vec())
    }
}

impl Binder for FakeBinder {
    fn available_formats(&self) -> Vec<OutputFormat> {
        self.formats.clone()
    }

    fn make_artifact(
        &self,
        request: &ArtifactRequest,
        cancel: &CancelToken,
    ) -> Result<BoundFile, BindError> {
        self.calls.lock().unwrap().push(request.clone());
        cancel.check()?;

        if !self.formats.contains(&request.format) {
            return Err(BindError::Unsupported(request.format));
        }
        if self.failing.lock().unwrap().contains(&request.format) {
            return Err(BindError::Failed(format!("converter crashed on {}", request.format)));
        }
        if request.format.depends_on_epub() && request.epub_path.is_none() {
            return Err(BindError::MissingEpub(request.format));
        }

        Ok(BoundFile {
            file_name: format!("novel.{}", request.format),
            content: format!("{} of {}", request.format, request.novel_id).into_bytes(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub kind: &'static str,
    pub user_id: String,
    pub job_id: String,
}

/// Keeps every mail instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_of(&self, kind: &str) -> Vec<SentMail> {
        self.sent().into_iter().filter(|m| m.kind == kind).collect()
    }

    fn push(&self, kind: &'static str, user: &User, job: &Job) {
        self.sent.lock().unwrap().push(SentMail {
            kind,
            user_id: user.id.clone(),
            job_id: job.id.clone(),
        });
    }
}

impl Mailer for RecordingMailer {
    fn send_job_running(&self, user: &User, job: &Job) -> Result<(), MailError> {
        self.push("running", user, job);
        Ok(())
    }

    fn send_job_report(&self, user: &User, job: &Job) -> Result<(), MailError> {
        self.push("report", user, job);
        Ok(())
    }

    fn send_artifact_ready(
        &self,
        user: &User,
        job: &Job,
        _artifact: &Artifact,
    ) -> Result<(), MailError> {
        self.push("artifact", user, job);
        Ok(())
    }
}
