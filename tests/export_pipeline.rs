//! End-to-end runs of the export pipeline over label files on disk.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use tiergrid::config::{Config, IncompletePolicy};
use tiergrid::corpus::{Corpus, Recording, Utterance};
use tiergrid::ctm::mapping::Lexicon;
use tiergrid::export::{CollectorSink, FileExportSink};
use tiergrid::job::{JobSpec, Partition};
use tiergrid::pipeline::{ErrorKey, ExportPipeline, Stage};
use tiergrid::TiergridError;

fn config() -> Config {
    let mut config = Config::default();
    config.pipeline.poll_timeout_ms = 5;
    config.pipeline.file_wait_timeout_ms = 50;
    config
}

fn utterance(id: &str, recording: &str, speaker: &str, begin: f64) -> Utterance {
    Utterance {
        id: id.to_string(),
        recording: recording.to_string(),
        speaker: speaker.to_string(),
        begin,
        text: None,
    }
}

/// "interview" has two speakers, "memo" one.
fn corpus() -> Arc<Corpus> {
    Arc::new(
        Corpus::from_parts(
            vec![
                Recording::new("interview", vec!["alice".into(), "bob".into()]),
                Recording::new("memo", vec!["carol".into()]),
            ],
            vec![
                utterance("alice-1", "interview", "alice", 0.0),
                utterance("bob-1", "interview", "bob", 2.0),
                utterance("carol-1", "memo", "carol", 0.0),
            ],
        )
        .unwrap(),
    )
}

fn lexicon() -> Arc<Lexicon> {
    let words: HashMap<String, u32> = [("hello", 1), ("there", 2), ("bye", 3)]
        .into_iter()
        .map(|(w, id)| (w.to_string(), id))
        .collect();
    let phones: HashMap<String, u32> = [("HH_B", 1), ("AH_I", 2), ("L_E", 3), ("B_S", 4)]
        .into_iter()
        .map(|(p, id)| (p.to_string(), id))
        .collect();
    Arc::new(Lexicon::new(words, phones))
}

fn job(dir: &TempDir, id: usize, words: &str, phones: &str) -> JobSpec {
    let word_path = dir.path().join(format!("word.{id}.ctm"));
    let phone_path = dir.path().join(format!("phone.{id}.ctm"));
    fs::write(&word_path, words).unwrap();
    fs::write(&phone_path, phones).unwrap();
    JobSpec::new(id, vec![Partition::new("main", word_path, phone_path, lexicon())])
}

const ALICE_WORDS: &str = "alice-1 1 0.0 0.5 1\nalice-1 1 0.5 0.5 2\n";
const ALICE_PHONES: &str = "alice-1 1 0.0 0.2 1\nalice-1 1 0.2 0.2 2\nalice-1 1 0.4 0.6 3\n";
const BOB_WORDS: &str = "bob-1 1 0.0 0.3 3\n";
const BOB_PHONES: &str = "bob-1 1 0.0 0.3 4\n";
const CAROL_WORDS: &str = "carol-1 1 0.1 0.4 1\n";
const CAROL_PHONES: &str = "carol-1 1 0.1 0.4 1\n";

#[test]
fn every_recording_written_exactly_once() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CollectorSink::new());
    let pipeline = ExportPipeline::new(config(), corpus(), sink.clone());

    let summary = pipeline
        .run(vec![job(
            &dir,
            0,
            &format!("{ALICE_WORDS}{BOB_WORDS}{CAROL_WORDS}"),
            &format!("{ALICE_PHONES}{BOB_PHONES}{CAROL_PHONES}"),
        )])
        .unwrap();

    let counts = sink.write_counts();
    assert_eq!(counts.len(), 2);
    assert_eq!(counts["interview"], 1);
    assert_eq!(counts["memo"], 1);
    assert_eq!(summary.recordings_written, 2);
    assert_eq!(summary.incomplete_recordings, 0);
    assert!(sink.exports().iter().all(|export| export.complete));
}

#[test]
fn single_speaker_recording_is_forwarded_complete() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CollectorSink::new());
    let pipeline = ExportPipeline::new(config(), corpus(), sink.clone());

    pipeline
        .run(vec![job(&dir, 0, CAROL_WORDS, CAROL_PHONES)])
        .unwrap();

    let exports = sink.exports();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].recording(), "memo");
    assert!(exports[0].complete);
    let carol = &exports[0].tiers.speakers["carol"];
    assert_eq!(carol.words[0].label, "hello");
    assert_eq!(carol.phones[0].label, "HH");
}

#[test]
fn intervals_keep_count_and_order() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CollectorSink::new());
    let pipeline = ExportPipeline::new(config(), corpus(), sink.clone());

    let summary = pipeline
        .run(vec![job(
            &dir,
            0,
            &format!("{ALICE_WORDS}{BOB_WORDS}"),
            &format!("{ALICE_PHONES}{BOB_PHONES}"),
        )])
        .unwrap();

    let exports = sink.exports();
    let tiers = &exports[0].tiers;
    let alice = &tiers.speakers["alice"];
    let labels: Vec<&str> = alice.words.iter().map(|i| i.label.as_str()).collect();
    assert_eq!(labels, ["hello", "there"]);
    let phones: Vec<&str> = alice.phones.iter().map(|i| i.label.as_str()).collect();
    assert_eq!(phones, ["HH", "AH", "L"]);

    // Bob's utterance starts two seconds into the recording
    let bob = &tiers.speakers["bob"];
    assert_eq!(bob.words[0].begin, 2.0);
    assert_eq!(bob.words[0].end, 2.3);

    assert_eq!(tiers.interval_count(), 7);
    assert_eq!(summary.intervals_written, 7);
}

#[test]
fn speakers_split_across_jobs_produce_one_write() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CollectorSink::new());
    let pipeline = ExportPipeline::new(config(), corpus(), sink.clone());

    let summary = pipeline
        .run(vec![
            job(&dir, 0, ALICE_WORDS, ALICE_PHONES),
            job(&dir, 1, BOB_WORDS, BOB_PHONES),
        ])
        .unwrap();

    assert_eq!(sink.write_counts()["interview"], 1);
    let exports = sink.exports();
    assert_eq!(exports[0].tiers.speaker_count(), 2);
    assert!(exports[0].complete);
    assert_eq!(summary.jobs, 2);
    assert_eq!(summary.fragments, 2);
}

#[test]
fn missing_phone_stream_is_a_single_gap_without_export() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CollectorSink::new());
    let pipeline = ExportPipeline::new(config(), corpus(), sink.clone());

    let err = pipeline
        .run(vec![job(&dir, 0, CAROL_WORDS, "")])
        .unwrap_err();

    let TiergridError::ExportFailed(report) = err else {
        panic!("expected an aggregate failure, got {err}");
    };
    assert_eq!(report.len(), 1);
    let details = report.get(&ErrorKey::recording("memo")).unwrap();
    assert_eq!(details.len(), 1);
    assert!(details[0].starts_with("join integrity gap"));
    assert!(sink.is_empty());
}

#[test]
fn missing_speaker_follows_incomplete_policy() {
    let dir = TempDir::new().unwrap();

    let flag_sink = Arc::new(CollectorSink::new());
    let err = ExportPipeline::new(config(), corpus(), flag_sink.clone())
        .run(vec![job(&dir, 0, ALICE_WORDS, ALICE_PHONES)])
        .unwrap_err();
    assert!(matches!(err, TiergridError::ExportFailed(_)));
    assert_eq!(flag_sink.len(), 1);
    assert!(!flag_sink.exports()[0].complete);

    let mut drop_config = config();
    drop_config.export.incomplete = IncompletePolicy::Drop;
    let drop_sink = Arc::new(CollectorSink::new());
    let err = ExportPipeline::new(drop_config, corpus(), drop_sink.clone())
        .run(vec![job(&dir, 0, ALICE_WORDS, ALICE_PHONES)])
        .unwrap_err();
    assert!(matches!(err, TiergridError::ExportFailed(_)));
    assert!(drop_sink.is_empty());

    let mut export_config = config();
    export_config.export.incomplete = IncompletePolicy::Export;
    let export_sink = Arc::new(CollectorSink::new());
    let summary = ExportPipeline::new(export_config, corpus(), export_sink.clone())
        .run(vec![job(&dir, 0, ALICE_WORDS, ALICE_PHONES)])
        .unwrap();
    assert_eq!(summary.incomplete_recordings, 1);
    assert_eq!(export_sink.len(), 1);
}

#[test]
fn failed_write_does_not_stop_other_recordings() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CollectorSink::new().failing_on("memo"));
    let pipeline =
        ExportPipeline::new(config(), corpus(), sink.clone()).with_report_dir(dir.path());

    let err = pipeline
        .run(vec![job(
            &dir,
            0,
            &format!("{ALICE_WORDS}{BOB_WORDS}{CAROL_WORDS}"),
            &format!("{ALICE_PHONES}{BOB_PHONES}{CAROL_PHONES}"),
        )])
        .unwrap_err();

    let TiergridError::ExportFailed(report) = err else {
        panic!("expected an aggregate failure, got {err}");
    };
    let details = report.get(&ErrorKey::recording("memo")).unwrap();
    assert!(details[0].starts_with("export write error"));
    assert_eq!(sink.write_counts().get("interview"), Some(&1));

    let written = fs::read_to_string(dir.path().join("output_errors.txt")).unwrap();
    assert!(written.contains("memo:"));
}

#[test]
fn missing_label_file_is_a_backend_error() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(CollectorSink::new());
    let pipeline = ExportPipeline::new(config(), corpus(), sink.clone());
    let spec = JobSpec::new(
        3,
        vec![Partition::new(
            "main",
            dir.path().join("absent.word.ctm"),
            dir.path().join("absent.phone.ctm"),
            lexicon(),
        )],
    );

    let err = pipeline.run(vec![spec]).unwrap_err();

    let TiergridError::ExportFailed(report) = err else {
        panic!("expected an aggregate failure, got {err}");
    };
    let details = report.get(&ErrorKey::stage(Stage::Backend, 3)).unwrap();
    assert_eq!(details.len(), 2);
    assert!(sink.is_empty());
}

#[test]
fn rerun_with_overwrite_off_backs_up_previous_output() {
    let work = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let mut config = config();
    config.export.overwrite = false;

    let run = |words: &str| {
        let sink = FileExportSink::new(corpus(), output.path(), &config.export);
        ExportPipeline::new(config.clone(), corpus(), Arc::new(sink))
            .run(vec![job(&work, 0, words, CAROL_PHONES)])
            .unwrap()
    };

    run(CAROL_WORDS);
    let summary = run("carol-1 1 0.1 0.4 3\n");

    let current = fs::read_to_string(output.path().join("memo.TextGrid")).unwrap();
    assert!(current.contains("\"bye\""));
    let backup = fs::read_to_string(output.path().join(".backup/memo.TextGrid")).unwrap();
    assert!(backup.contains("\"hello\""));
    assert!(summary.written[0].backup.is_some());
}
