//! Deleting jobs shrinks every ancestor's counters.

mod common;

use common::TestHarness;

use novelforge::jobs::{JobError, NewJob};
use novelforge::{JobExtra, JobStatus, JobType, UserTier};

fn chapter(id: &str) -> NewJob {
    NewJob::new(
        JobType::Chapter,
        JobExtra {
            chapter_id: Some(id.to_string()),
            ..Default::default()
        },
    )
}

#[test]
fn test_delete_child_completes_parent() {
    let h = TestHarness::new();
    let user = h.user(UserTier::Basic);
    let jobs = h.engine.jobs();

    let root = h
        .engine
        .submit(&user, JobType::ChapterBatch, JobExtra::default())
        .unwrap();
    let kids = jobs
        .create_children(&root.id, vec![
            NewJob::new(JobType::ImageBatch, JobExtra::default()),
            chapter("d"),
            chapter("e"),
        ])
        .unwrap();
    let c = &kids[0];
    jobs.create_children(
        &c.id,
        vec![NewJob::new(
            JobType::Image,
            JobExtra {
                image_id: Some("g".to_string()),
                ..Default::default()
            },
        )],
    )
    .unwrap();

    for id in [&root.id, &c.id, &kids[1].id, &kids[2].id] {
        jobs.set_running(id).unwrap();
        jobs.increment(id).unwrap();
    }

    let r = h.job(&root.id);
    assert_eq!((r.done, r.total), (4, 5));
    let c_before = h.job(&c.id);
    assert_eq!((c_before.done, c_before.total), (1, 2));

    let transitions = h.engine.delete(&user, &c.id).unwrap();
    assert!(transitions
        .iter()
        .any(|t| t.job_id == root.id && t.status == JobStatus::Success));

    let r = h.job(&root.id);
    assert_eq!((r.done, r.total), (3, 3));
    assert_eq!(r.status, JobStatus::Success);
    assert!(r.is_done);
    assert!(jobs.find(&c.id).unwrap().is_none());
    assert!(h.subtree_of_type(&root.id, JobType::Image).is_empty());

    assert_eq!(h.mailer.sent_of("report").len(), 1);
}

#[test]
fn test_delete_checks_ownership() {
    let h = TestHarness::new();
    let owner = h.user(UserTier::Basic);
    let stranger = h.user(UserTier::Basic);
    let admin = h.user_with_role(UserTier::Basic, novelforge::UserRole::Admin);

    let root = h
        .engine
        .submit(&owner, JobType::ChapterBatch, JobExtra::default())
        .unwrap();
    h.engine
        .jobs()
        .create_children(&root.id, vec![chapter("a")])
        .unwrap();

    let err = h.engine.delete(&stranger, &root.id).unwrap_err();
    assert!(matches!(err, JobError::Forbidden { .. }));

    h.engine.delete(&admin, &root.id).unwrap();
    assert!(h.roots().is_empty());
    assert!(h.engine.delete(&owner, &root.id).unwrap().is_empty());
}

#[test]
fn test_delete_sibling_clears_dependency_edge() {
    let h = TestHarness::new();
    let user = h.user(UserTier::Basic);
    let jobs = h.engine.jobs();
    let root = h
        .engine
        .submit(&user, JobType::ChapterBatch, JobExtra::default())
        .unwrap();

    let first = chapter("a");
    let second = chapter("b").depending_on(&first.id);
    let kids = jobs.create_children(&root.id, vec![first, second]).unwrap();

    h.engine.delete(&user, &kids[0].id).unwrap();

    let second = h.job(&kids[1].id);
    assert!(second.depends_on.is_none());
    assert_eq!(h.job(&root.id).total, 2);
    h.assert_consistent(&root.id);
}
