//! Dispatch on [`JobType`] and the per-type work.

use std::collections::HashSet;

use crate::artifact::{Artifact, OutputFormat};
use crate::capability::{ArtifactRequest, BindError};
use crate::jobs::{Job, JobExtra, JobType, NewJob};
use crate::signal::CancelToken;
use crate::user::tier_formats;

use super::{JobRunner, RunnerError};

fn missing(job: &Job, field: &str) -> RunnerError {
    RunnerError::Invalid(format!("job {} has no {}", job.id, field))
}

/// Children to seed for each id in `ids` that no existing child covers.
fn new_children<'a, F>(
    ids: impl IntoIterator<Item = &'a String>,
    existing: &HashSet<String>,
    make: F,
) -> Vec<NewJob>
where
    F: Fn(&str) -> NewJob,
{
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| !existing.contains(*id) && seen.insert((*id).clone()))
        .map(|id| make(id.as_str()))
        .collect()
}

impl JobRunner {
    pub(super) fn dispatch(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        match job.job_type {
            JobType::NovelBatch => self.run_url_batch(job, JobType::Novel, cancel),
            JobType::FullNovelBatch => self.run_url_batch(job, JobType::FullNovel, cancel),
            JobType::Novel => self.run_novel(job, cancel),
            JobType::FullNovel => self.run_full_novel(job, cancel),
            JobType::VolumeBatch => self.run_volume_batch(job, cancel),
            JobType::Volume => self.run_volume(job, cancel),
            JobType::ChapterBatch => self.run_chapter_batch(job, cancel),
            JobType::Chapter => self.run_chapter(job, cancel),
            JobType::ImageBatch => self.run_image_batch(job, cancel),
            JobType::Image => self.run_image(job, cancel),
            JobType::ArtifactBatch => self.run_artifact_batch(job, cancel),
            JobType::Artifact => self.run_artifact(job, cancel),
        }
    }

    /// Values of one `extra` field across the existing children.
    fn existing<F>(&self, job: &Job, field: F) -> Result<HashSet<String>, RunnerError>
    where
        F: Fn(&JobExtra) -> Option<String>,
    {
        Ok(self
            .jobs
            .children(&job.id)?
            .iter()
            .filter_map(|c| field(&c.extra))
            .collect())
    }

    fn seed(&self, job: &Job, children: Vec<NewJob>, cancel: &CancelToken) -> Result<(), RunnerError> {
        if children.is_empty() {
            return Ok(());
        }
        cancel.check()?;
        match self.jobs.create_children(&job.id, children) {
            Ok(_) => Ok(()),
            // The job was sealed while we worked on it.
            Err(crate::jobs::JobError::ParentFinished(_)) => Err(RunnerError::Aborted),
            Err(e) => Err(e.into()),
        }
    }

    fn run_url_batch(
        &self,
        job: &Job,
        child_type: JobType,
        cancel: &CancelToken,
    ) -> Result<(), RunnerError> {
        let existing = self.existing(job, |e| e.url.clone())?;
        let urls = job.extra.unique_urls();
        let children = new_children(&urls, &existing, |url| {
            NewJob::new(child_type, JobExtra::with_url(url))
        });
        self.seed(job, children, cancel)?;
        self.complete(job)?;
        Ok(())
    }

    /// Fetches the novel and records its id and title on the job.
    fn fetch_novel(&self, job: &Job, cancel: &CancelToken) -> Result<JobExtra, RunnerError> {
        let url = job.extra.url.as_deref().ok_or_else(|| missing(job, "url"))?;
        cancel.check()?;
        let novel = self
            .fetcher
            .fetch_novel(&job.user_id, url, cancel)
            .map_err(|e| RunnerError::fetch(&format!("Novel {}", url), e))?;

        let mut extra = job.extra.clone();
        extra.novel_id = Some(novel.id.clone());
        extra.novel_title = Some(novel.title.clone());
        self.jobs.record_extra(&job.id, &extra)?;
        log::info!("Fetched novel '{}' ({})", novel.title, novel.id);
        Ok(extra)
    }

    fn run_novel(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        self.fetch_novel(job, cancel)?;
        self.complete(job)?;
        Ok(())
    }

    fn run_full_novel(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        let extra = match job.extra.novel_id {
            Some(_) => job.extra.clone(),
            None => self.fetch_novel(job, cancel)?,
        };
        let novel_id = extra.novel_id.clone().ok_or_else(|| missing(job, "novel_id"))?;

        let children = self.jobs.children(&job.id)?;
        let mut seeds = Vec::new();

        let volume_batch_id = match children.iter().find(|c| c.job_type == JobType::VolumeBatch) {
            Some(existing) => existing.id.clone(),
            None => {
                let volume_ids = self
                    .library
                    .volumes(&novel_id)?
                    .into_iter()
                    .map(|v| v.id)
                    .collect();
                let batch = NewJob::new(
                    JobType::VolumeBatch,
                    JobExtra {
                        novel_id: Some(novel_id.clone()),
                        volume_ids,
                        ..Default::default()
                    },
                );
                let id = batch.id.clone();
                seeds.push(batch);
                id
            }
        };

        if !children.iter().any(|c| c.job_type == JobType::ArtifactBatch) {
            let user = self
                .users
                .get(&job.user_id)?
                .ok_or_else(|| RunnerError::Invalid(format!("owner {} not found", job.user_id)))?;
            let available = self.binder.available_formats();
            let formats: Vec<OutputFormat> = tier_formats(user.tier)
                .into_iter()
                .filter(|f| available.contains(f))
                .collect();
            if formats.is_empty() {
                log::warn!("No artifact formats available for job {}", job.id);
            } else {
                seeds.push(
                    NewJob::new(
                        JobType::ArtifactBatch,
                        JobExtra {
                            novel_id: Some(novel_id.clone()),
                            novel_title: extra.novel_title.clone(),
                            formats,
                            ..Default::default()
                        },
                    )
                    .depending_on(&volume_batch_id),
                );
            }
        }

        self.seed(job, seeds, cancel)?;
        self.complete(job)?;
        Ok(())
    }

    fn run_volume_batch(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        let existing = self.existing(job, |e| e.volume_id.clone())?;
        let novel_id = job.extra.novel_id.clone();
        let children = new_children(&job.extra.volume_ids, &existing, |id| {
            NewJob::new(
                JobType::Volume,
                JobExtra {
                    novel_id: novel_id.clone(),
                    volume_id: Some(id.to_string()),
                    ..Default::default()
                },
            )
        });
        self.seed(job, children, cancel)?;
        self.complete(job)?;
        Ok(())
    }

    fn run_volume(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        let volume_id = job
            .extra
            .volume_id
            .as_deref()
            .ok_or_else(|| missing(job, "volume_id"))?;
        let chapter_ids: Vec<String> = self
            .library
            .chapters_of_volume(volume_id)?
            .into_iter()
            .map(|c| c.id)
            .collect();
        let existing = self.existing(job, |e| e.chapter_id.clone())?;
        let children = new_children(&chapter_ids, &existing, |id| chapter_job(id));
        self.seed(job, children, cancel)?;
        self.complete(job)?;
        Ok(())
    }

    fn run_chapter_batch(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        let existing = self.existing(job, |e| e.chapter_id.clone())?;
        let children = new_children(&job.extra.chapter_ids, &existing, |id| chapter_job(id));
        self.seed(job, children, cancel)?;
        self.complete(job)?;
        Ok(())
    }

    fn run_chapter(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        let chapter_id = job
            .extra
            .chapter_id
            .as_deref()
            .ok_or_else(|| missing(job, "chapter_id"))?;
        let chapter = self
            .library
            .chapter(chapter_id)?
            .ok_or_else(|| RunnerError::Invalid(format!("chapter {} not found", chapter_id)))?;

        if !chapter.is_available {
            cancel.check()?;
            self.fetcher
                .fetch_chapter(&job.user_id, chapter_id, cancel)
                .map_err(|e| RunnerError::fetch(&format!("Chapter {}", chapter.serial), e))?;
        }

        let has_batch = self
            .jobs
            .children(&job.id)?
            .iter()
            .any(|c| c.job_type == JobType::ImageBatch);
        if !has_batch {
            let image_ids: Vec<String> = self
                .library
                .pending_images(chapter_id)?
                .into_iter()
                .map(|i| i.id)
                .collect();
            if !image_ids.is_empty() {
                let batch = NewJob::new(
                    JobType::ImageBatch,
                    JobExtra {
                        novel_id: Some(chapter.novel_id.clone()),
                        chapter_id: Some(chapter.id.clone()),
                        image_ids,
                        ..Default::default()
                    },
                );
                self.seed(job, vec![batch], cancel)?;
            }
        }

        self.complete(job)?;
        Ok(())
    }

    fn run_image_batch(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        let existing = self.existing(job, |e| e.image_id.clone())?;
        let novel_id = job.extra.novel_id.clone();
        let children = new_children(&job.extra.image_ids, &existing, |id| {
            NewJob::new(
                JobType::Image,
                JobExtra {
                    novel_id: novel_id.clone(),
                    image_id: Some(id.to_string()),
                    ..Default::default()
                },
            )
        });
        self.seed(job, children, cancel)?;
        self.complete(job)?;
        Ok(())
    }

    fn run_image(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        let image_id = job
            .extra
            .image_id
            .as_deref()
            .ok_or_else(|| missing(job, "image_id"))?;
        let image = self
            .library
            .image(image_id)?
            .ok_or_else(|| RunnerError::Invalid(format!("image {} not found", image_id)))?;

        if !image.is_available {
            cancel.check()?;
            self.fetcher
                .fetch_image(&job.user_id, image_id, cancel)
                .map_err(|e| RunnerError::fetch(&format!("Image {}", image.url), e))?;
        }
        self.complete(job)?;
        Ok(())
    }

    fn run_artifact_batch(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        let novel_id = job
            .extra
            .novel_id
            .clone()
            .ok_or_else(|| missing(job, "novel_id"))?;

        let mut formats: Vec<OutputFormat> = Vec::new();
        for format in &job.extra.formats {
            if !formats.contains(format) {
                formats.push(*format);
            }
        }
        let needs_epub = formats.iter().any(|f| self.binder.depends_on_epub(*f));
        if needs_epub && !formats.contains(&OutputFormat::Epub) {
            formats.insert(0, OutputFormat::Epub);
        }

        let children = self.jobs.children(&job.id)?;
        let existing: HashSet<OutputFormat> =
            children.iter().filter_map(|c| c.extra.format).collect();

        let artifact_job = |format: OutputFormat| {
            NewJob::new(
                JobType::Artifact,
                JobExtra {
                    novel_id: Some(novel_id.clone()),
                    novel_title: job.extra.novel_title.clone(),
                    format: Some(format),
                    ..Default::default()
                },
            )
        };

        let mut seeds = Vec::new();
        let mut epub_job_id = children
            .iter()
            .find(|c| c.extra.format == Some(OutputFormat::Epub))
            .map(|c| c.id.clone());
        if formats.contains(&OutputFormat::Epub) && epub_job_id.is_none() {
            let epub = artifact_job(OutputFormat::Epub);
            epub_job_id = Some(epub.id.clone());
            seeds.push(epub);
        }

        for format in formats {
            if format == OutputFormat::Epub || existing.contains(&format) {
                continue;
            }
            let mut child = artifact_job(format);
            if self.binder.depends_on_epub(format) {
                if let Some(ref epub_id) = epub_job_id {
                    child = child.depending_on(epub_id);
                }
            }
            seeds.push(child);
        }

        self.seed(job, seeds, cancel)?;
        self.complete(job)?;
        Ok(())
    }

    fn run_artifact(&self, job: &Job, cancel: &CancelToken) -> Result<(), RunnerError> {
        let novel_id = job
            .extra
            .novel_id
            .clone()
            .ok_or_else(|| missing(job, "novel_id"))?;
        let format = job.extra.format.ok_or_else(|| missing(job, "format"))?;
        let context = format!("Artifact {}", format);

        let epub_path = if self.binder.depends_on_epub(format) {
            let path = self.resolve_epub(job, &novel_id)?;
            if path.is_none() {
                return Err(RunnerError::bind(&context, BindError::MissingEpub(format)));
            }
            path
        } else {
            None
        };

        let request = ArtifactRequest {
            novel_id: novel_id.clone(),
            format,
            job_id: job.id.clone(),
            user_id: job.user_id.clone(),
            epub_path,
        };
        cancel.check()?;
        let bound = self
            .binder
            .make_artifact(&request, cancel)
            .map_err(|e| RunnerError::bind(&context, e))?;
        cancel.check()?;

        let artifact = Artifact::new(
            &novel_id,
            Some(job.id.as_str()),
            &job.user_id,
            format,
            &bound.file_name,
        );
        let stored = self.artifacts.save(&artifact, &bound.content)?;

        let mut extra = job.extra.clone();
        extra.artifact_id = Some(stored.id.clone());
        self.jobs.record_extra(&job.id, &extra)?;

        let transitions = self.complete(job)?;
        if transitions.iter().any(|t| t.job_id == job.id) {
            self.notifier.artifact_ready(job, &stored);
        }
        Ok(())
    }

    /// Path of the EPUB a converted format is built from: the artifact
    /// recorded by the `depends_on` sibling, else the novel's current EPUB.
    fn resolve_epub(
        &self,
        job: &Job,
        novel_id: &str,
    ) -> Result<Option<std::path::PathBuf>, RunnerError> {
        let from_dependency = match job.depends_on {
            Some(ref dep_id) => match self.jobs.find(dep_id)?.and_then(|d| d.extra.artifact_id) {
                Some(artifact_id) => self.artifacts.get(&artifact_id)?,
                None => None,
            },
            None => None,
        };
        let artifact = match from_dependency {
            Some(artifact) => Some(artifact),
            None => self.artifacts.current(novel_id, OutputFormat::Epub)?,
        };

        Ok(artifact
            .filter(|a| self.artifacts.is_available(a))
            .and_then(|a| self.artifacts.path(&a).ok()))
    }
}

fn chapter_job(chapter_id: &str) -> NewJob {
    NewJob::new(
        JobType::Chapter,
        JobExtra {
            chapter_id: Some(chapter_id.to_string()),
            ..Default::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_children_skips_existing_and_duplicates() {
        let ids = vec!["a".to_string(), "b".to_string(), "a".to_string(), "c".to_string()];
        let existing: HashSet<String> = ["b".to_string()].into_iter().collect();
        let seeded: Vec<_> = new_children(&ids, &existing, chapter_job)
            .into_iter()
            .map(|j| j.extra.chapter_id.unwrap())
            .collect();
        assert_eq!(seeded, vec!["a", "c"]);
    }
}
