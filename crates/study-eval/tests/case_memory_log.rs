use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Barrier};

use study_eval::workflows::study_plan::memory::{
    normalize, CaseFingerprint, CaseLog, CaseMemoryEntry, JsonlCaseLog, RecordedDecision,
};
use study_eval::workflows::study_plan::{CaseMemory, HumanDecision, ScoreCard};

const PLAN: &str = "Major: Computer Science\nFall: CS101, CS102, MA201, PHY110";

fn entry(text: &str, action: HumanDecision) -> CaseMemoryEntry {
    CaseMemoryEntry::new(
        CaseFingerprint::of(text),
        RecordedDecision {
            action,
            override_scores: None,
        },
    )
}

#[test]
fn missing_log_reads_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = JsonlCaseLog::new(dir.path().join("absent.jsonl"));
    assert!(log.recent(10).expect("read").is_empty());
}

#[test]
fn entries_round_trip_in_append_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("memory.jsonl");
    let log = JsonlCaseLog::new(&path);

    let first = entry("first plan CS101", HumanDecision::Approve);
    let second = entry("second plan CS102", HumanDecision::Reject);
    log.append(&first).expect("append first");
    log.append(&second).expect("append second");

    let reopened = JsonlCaseLog::new(&path);
    assert_eq!(reopened.recent(10).expect("read"), vec![first, second.clone()]);
    assert_eq!(reopened.recent(1).expect("read"), vec![second]);
    assert!(reopened.recent(0).expect("read").is_empty());
}

#[test]
fn unreadable_lines_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("memory.jsonl");
    let log = JsonlCaseLog::new(&path);
    log.append(&entry(PLAN, HumanDecision::Edit)).expect("append");

    let mut file = OpenOptions::new()
        .append(true)
        .open(&path)
        .expect("open log");
    writeln!(file, "{{\"id\": \"truncated").expect("write garbage");
    writeln!(file).expect("write blank line");
    drop(file);

    let entries = log.recent(10).expect("read");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].decision.action, HumanDecision::Edit);
}

#[test]
fn memory_persists_decisions_across_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("memory.jsonl");

    let writer = CaseMemory::new(Arc::new(JsonlCaseLog::new(&path)));
    let id = writer
        .append(PLAN, HumanDecision::Edit, Some(ScoreCard::new(80, 85, 60)))
        .expect("entry recorded");

    let reader = CaseMemory::new(Arc::new(JsonlCaseLog::new(&path)));
    let found = reader.recall(PLAN).expect("decision recalled");
    assert_eq!(found.entry.id, id);
    assert_eq!(found.similarity, 1.0);
    assert_eq!(
        found.entry.decision.override_scores,
        Some(ScoreCard::new(80, 85, 60))
    );
    assert_eq!(found.entry.case.normalized_text, normalize(PLAN));
}

#[test]
fn concurrent_appends_are_all_readable() {
    const WRITERS: usize = 8;
    const PER_WRITER: usize = 25;

    let dir = tempfile::tempdir().expect("tempdir");
    let log = JsonlCaseLog::new(dir.path().join("memory.jsonl"));
    let barrier = Barrier::new(WRITERS + 1);

    std::thread::scope(|scope| {
        for writer in 0..WRITERS {
            let log = &log;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                for index in 0..PER_WRITER {
                    log.append(&entry(
                        &format!("writer {writer} plan {index} CS{writer}{index:02}"),
                        HumanDecision::Approve,
                    ))
                    .expect("append");
                }
            });
        }

        barrier.wait();
        for _ in 0..20 {
            let seen = log.recent(usize::MAX).expect("read while writing");
            assert!(seen.len() <= WRITERS * PER_WRITER);
        }
    });

    let entries = log.recent(usize::MAX).expect("read");
    assert_eq!(entries.len(), WRITERS * PER_WRITER);
    let ids: HashSet<_> = entries.iter().map(|entry| entry.id.clone()).collect();
    assert_eq!(ids.len(), WRITERS * PER_WRITER);
}
