//! Whole-tree runs of the job engine driven step by step on the test thread.

mod common;

use common::{FakeSite, TestHarness};

use novelforge::jobs::{JobError, NewJob, DEFAULT_CANCEL_REASON};
use novelforge::{JobExtra, JobStatus, JobType, OutputFormat, UserTier};

const NOVEL_URL: &str = "https://example/novel/1";

#[test]
fn test_full_novel_happy_path() {
    let h = TestHarness::new();
    let user = h.user(UserTier::Vip);

    let root = h
        .engine
        .submit(&user, JobType::FullNovel, JobExtra::with_url(NOVEL_URL))
        .unwrap();
    h.run_until_idle();

    let root = h.job(&root.id);
    let formats = OutputFormat::ALL.len() as i64;
    assert_eq!(root.status, JobStatus::Success);
    assert_eq!(root.total, 11 + formats);
    assert_eq!(root.done, root.total);
    assert!(root.started_at.is_some());
    assert!(root.finished_at.is_some());
    h.assert_consistent(&root.id);

    assert_eq!(h.subtree_of_type(&root.id, JobType::VolumeBatch).len(), 1);
    assert_eq!(h.subtree_of_type(&root.id, JobType::Volume).len(), 2);
    assert_eq!(h.subtree_of_type(&root.id, JobType::Chapter).len(), 6);
    assert_eq!(h.subtree_of_type(&root.id, JobType::ArtifactBatch).len(), 1);
    assert!(h
        .subtree(&root.id)
        .iter()
        .all(|j| j.status == JobStatus::Success));

    let novel_id = root.extra.novel_id.clone().unwrap();
    let artifacts = h.engine.artifacts().for_novel(&novel_id).unwrap();
    assert_eq!(artifacts.len(), OutputFormat::ALL.len());
    assert!(artifacts.iter().all(|a| h.engine.artifacts().is_available(a)));

    assert_eq!(h.fetcher.count("novel:"), 1);
    assert_eq!(h.fetcher.count("chapter:"), 6);
    assert!(h
        .binder
        .requests()
        .iter()
        .filter(|r| r.format.depends_on_epub())
        .all(|r| r.epub_path.is_some()));

    assert_eq!(h.mailer.sent_of("running").len(), 1);
    assert_eq!(h.mailer.sent_of("report").len(), 1);
    assert_eq!(h.mailer.sent_of("artifact").len(), OutputFormat::ALL.len());
}

#[test]
fn test_chapter_images_are_fetched() {
    let h = TestHarness::with_site(FakeSite {
        images_per_chapter: 2,
        ..Default::default()
    });
    let user = h.user(UserTier::Premium);

    let root = h
        .engine
        .submit(&user, JobType::FullNovel, JobExtra::with_url(NOVEL_URL))
        .unwrap();
    h.run_until_idle();

    let root = h.job(&root.id);
    assert_eq!(root.status, JobStatus::Success);
    // 11 structural jobs, 8 premium formats, 6 image batches of 2 images
    assert_eq!(root.total, 11 + 8 + 6 * 3);
    h.assert_consistent(&root.id);

    assert_eq!(h.subtree_of_type(&root.id, JobType::ImageBatch).len(), 6);
    assert_eq!(h.subtree_of_type(&root.id, JobType::Image).len(), 12);
    assert_eq!(h.fetcher.count("image:"), 12);

    let novel_id = root.extra.novel_id.unwrap();
    for chapter in h.engine.library().chapters_of_novel(&novel_id).unwrap() {
        assert!(chapter.is_available);
        assert!(h.engine.library().pending_images(&chapter.id).unwrap().is_empty());
    }
}

#[test]
fn test_cancel_mid_flight() {
    let h = TestHarness::new();
    let user = h.user(UserTier::Vip);
    let root = h
        .engine
        .submit(&user, JobType::FullNovel, JobExtra::with_url(NOVEL_URL))
        .unwrap();

    h.run_until(|h| !h.subtree_of_type(&root.id, JobType::Chapter).is_empty());
    assert!(h
        .subtree_of_type(&root.id, JobType::Chapter)
        .iter()
        .all(|c| !c.is_done));
    let chapter_calls = h.fetcher.count("chapter:");

    let transitions = h.engine.cancel(&user, &root.id, None).unwrap();
    assert!(transitions.iter().any(|t| t.job_id == root.id));

    assert_eq!(h.run_until_idle(), 0);
    assert_eq!(h.fetcher.count("chapter:"), chapter_calls);

    let root = h.job(&root.id);
    assert_eq!(root.status, JobStatus::Canceled);
    assert_eq!(root.done, root.total);
    assert!(root.finished_at.is_some());
    h.assert_consistent(&root.id);

    for job in h.subtree(&root.id) {
        assert!(job.is_done);
        if job.status == JobStatus::Canceled {
            assert_eq!(job.error.as_deref(), Some(DEFAULT_CANCEL_REASON));
        } else {
            // Only steps that finished before the cancel keep their status.
            assert_eq!(job.status, JobStatus::Success);
            assert_ne!(job.job_type, JobType::Chapter);
        }
    }

    // Cancelled roots get no report.
    assert!(h.mailer.sent_of("report").is_empty());
}

#[test]
fn test_cancel_is_idempotent_and_checked() {
    let h = TestHarness::new();
    let owner = h.user(UserTier::Basic);
    let stranger = h.user(UserTier::Vip);
    let root = h
        .engine
        .submit(&owner, JobType::Novel, JobExtra::with_url(NOVEL_URL))
        .unwrap();

    let err = h.engine.cancel(&stranger, &root.id, None).unwrap_err();
    assert!(matches!(err, JobError::Forbidden { .. }));

    let first = h.engine.cancel(&owner, &root.id, Some("changed my mind")).unwrap();
    assert_eq!(first.len(), 1);
    let second = h.engine.cancel(&owner, &root.id, None).unwrap();
    assert!(second.is_empty());
    assert!(h.engine.cancel(&owner, "no-such-job", None).unwrap().is_empty());

    let root = h.job(&root.id);
    assert_eq!(root.status, JobStatus::Canceled);
    assert_eq!(root.error.as_deref(), Some("changed my mind"));
}

#[test]
fn test_chapter_failure_fails_the_tree() {
    let h = TestHarness::new();
    h.fetcher.fail_chapter(2);
    let user = h.user(UserTier::Basic);

    let root = h
        .engine
        .submit(&user, JobType::FullNovel, JobExtra::with_url(NOVEL_URL))
        .unwrap();
    h.run_until_idle();

    let root = h.job(&root.id);
    assert_eq!(root.status, JobStatus::Failed);
    assert_eq!(root.done, root.total);
    assert!(root.failed >= 1);
    h.assert_consistent(&root.id);

    // Siblings still ran.
    assert_eq!(h.fetcher.count("chapter:"), 6);
    let chapters = h.subtree_of_type(&root.id, JobType::Chapter);
    let failed: Vec<_> = chapters
        .iter()
        .filter(|c| c.status == JobStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().unwrap().contains("HTTP 500"));

    // The artifact batch waited on the volumes and never ran.
    let batch = &h.subtree_of_type(&root.id, JobType::ArtifactBatch)[0];
    assert_eq!(batch.status, JobStatus::Failed);
    assert!(batch.error.as_deref().unwrap().contains("did not succeed"));
    assert!(h.binder.requests().is_empty());

    let reports = h.mailer.sent_of("report");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].job_id, root.id);
}

#[test]
fn test_reentry_does_not_duplicate_children() {
    let h = TestHarness::new();
    let user = h.user(UserTier::Basic);
    let urls = ["https://example/novel/a", "https://example/novel/b", "https://example/novel/a"];
    let root = h
        .engine
        .submit(&user, JobType::NovelBatch, JobExtra::with_urls(&urls))
        .unwrap();

    // First step only marks the batch running.
    h.engine.run_next().unwrap();
    assert_eq!(h.job(&root.id).status, JobStatus::Running);

    // A previous attempt got as far as seeding one child.
    h.engine
        .jobs()
        .create_children(
            &root.id,
            vec![NewJob::new(JobType::Novel, JobExtra::with_url(urls[0]))],
        )
        .unwrap();

    h.run_until_idle();

    let novels = h.subtree_of_type(&root.id, JobType::Novel);
    let mut seeded: Vec<_> = novels.iter().map(|n| n.extra.url.clone().unwrap()).collect();
    seeded.sort();
    assert_eq!(seeded, vec![urls[0].to_string(), urls[1].to_string()]);

    let root = h.job(&root.id);
    assert_eq!(root.status, JobStatus::Success);
    assert_eq!(root.total, 3);
    h.assert_consistent(&root.id);
}

#[test]
fn test_replay_reuses_stored_chapters() {
    let h = TestHarness::new();
    let user = h.user(UserTier::Basic);
    let first = h
        .engine
        .submit(&user, JobType::FullNovel, JobExtra::with_url(NOVEL_URL))
        .unwrap();
    h.run_until_idle();
    let first = h.job(&first.id);

    let second = h.engine.replay(&user, &first.id).unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.status, JobStatus::Pending);
    assert_eq!(second.extra.url.as_deref(), Some(NOVEL_URL));
    assert!(second.extra.novel_id.is_none());

    h.run_until_idle();
    let second = h.job(&second.id);
    assert_eq!(second.status, JobStatus::Success);
    assert_eq!(second.extra.novel_id, first.extra.novel_id);

    // Chapter bodies were already on disk.
    assert_eq!(h.fetcher.count("chapter:"), 6);
    let novel_id = second.extra.novel_id.unwrap();
    assert_eq!(h.engine.artifacts().for_novel(&novel_id).unwrap().len(), 2);
}

#[test]
fn test_submit_rejects_unknown_sites() {
    let h = TestHarness::new();
    let user = h.user(UserTier::Basic);

    let err = h
        .engine
        .submit(&user, JobType::Novel, JobExtra::with_url("https://unknown.org/n/1"))
        .unwrap_err();
    assert!(matches!(err, JobError::NoCrawler(_)));

    let err = h
        .engine
        .submit(&user, JobType::Novel, JobExtra::with_url("not a url"))
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidUrl { .. }));

    assert!(h.roots().is_empty());
}
