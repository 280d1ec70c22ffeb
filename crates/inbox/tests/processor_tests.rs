//! End-to-end tests for the processing loop with a recording converter

use autom4b_config::{Config, OnComplete};
use autom4b_inbox::{
    BookKey, ConversionJob, ConversionOutput, Converter, EnvFailedBookStore, InboxProcessor,
    InboxResult, InboxStatus, MemoryFailedBookStore, SkipReason,
};
use serial_test::serial;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Writes a dummy `.m4b` for every job and remembers what it was asked
#[derive(Default)]
struct RecordingConverter {
    jobs: Mutex<Vec<ConversionJob>>,
}

impl RecordingConverter {
    fn titles(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|job| job.metadata.title.clone())
            .collect()
    }
}

impl Converter for RecordingConverter {
    fn check_available(&self) -> InboxResult<()> {
        Ok(())
    }

    fn convert(&self, job: &ConversionJob) -> InboxResult<ConversionOutput> {
        fs::write(&job.output_file, b"m4b")?;
        self.jobs.lock().unwrap().push(job.clone());
        Ok(ConversionOutput::success())
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, relative.as_bytes()).unwrap();
}

fn key(raw: &str) -> BookKey {
    BookKey::new(raw).unwrap()
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.inbox_dir = root.join("inbox");
    config.paths.converted_dir = root.join("converted");
    config.paths.archive_dir = root.join("archive");
    config.paths.backup_dir = root.join("backup");
    config.paths.working_dir = root.join("working");
    config.app.wait_time_secs = 0;
    config.app.sleep_time_secs = 0;
    config.conversion.on_complete = OnComplete::TestDoNothing;
    config
}

/// BookA is flat, BookB is a two-disc book
fn scenario_inbox(root: &Path) {
    let inbox = root.join("inbox");
    touch(&inbox, "BookA/part1.mp3");
    touch(&inbox, "BookA/part2.mp3");
    touch(&inbox, "BookB/Disc 1 of 2/c1.mp3");
    touch(&inbox, "BookB/Disc 2 of 2/c2.mp3");
}

fn memory_processor(config: Config, converter: Arc<RecordingConverter>) -> InboxProcessor {
    init_logging();
    let processor =
        InboxProcessor::new(config, Box::new(MemoryFailedBookStore::new()), converter).unwrap();
    processor.startup_checks().unwrap();
    processor
}

#[tokio::test]
async fn test_flat_book_converted_multi_disc_rejected() {
    let temp = TempDir::new().unwrap();
    scenario_inbox(temp.path());
    let converter = Arc::new(RecordingConverter::default());
    let mut processor = memory_processor(test_config(temp.path()), converter.clone());

    let report = processor.run_cycle().await.unwrap();

    assert_eq!(report.converted, vec![key("BookA")]);
    assert_eq!(converter.titles(), vec!["BookA".to_string()]);
    assert!(temp.path().join("converted/BookA/BookA.m4b").is_file());

    assert_eq!(report.failed.len(), 1);
    let (failed_key, reason) = &report.failed[0];
    assert_eq!(failed_key, &key("BookB"));
    assert!(reason.contains("multi-disc"));
    assert!(reason.contains("reorganize"));

    let state = processor.state();
    assert_eq!(state.len(), 2);
    assert_eq!(state.matched_books().len(), 2);
    let failed = state.failed_books();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].key(), &key("BookB"));
    assert_eq!(failed[0].status(), InboxStatus::Failed);
}

#[tokio::test]
async fn test_failed_book_retried_only_after_change() {
    let temp = TempDir::new().unwrap();
    scenario_inbox(temp.path());
    let converter = Arc::new(RecordingConverter::default());
    let mut processor = memory_processor(test_config(temp.path()), converter.clone());

    processor.run_cycle().await.unwrap();
    let second = processor.run_cycle().await.unwrap();
    assert_eq!(second.skipped, Some(SkipReason::Unchanged));
    assert!(second.failed.is_empty());

    // The operator flattens BookB by hand
    let inbox = temp.path().join("inbox");
    fs::remove_dir_all(inbox.join("BookB")).unwrap();
    touch(&inbox, "BookB/c1.mp3");
    touch(&inbox, "BookB/c2.mp3");

    let third = processor.run_cycle().await.unwrap();
    assert_eq!(third.skipped, None);
    assert_eq!(third.converted, vec![key("BookB")]);
    assert!(third.failed.is_empty());
    assert_eq!(converter.titles(), vec!["BookA".to_string(), "BookB".to_string()]);

    let book_b = processor.state().get(&key("BookB")).unwrap();
    assert_eq!(book_b.status(), InboxStatus::Ok);
    assert_eq!(book_b.failed_reason(), None);
}

#[tokio::test]
async fn test_multi_disc_flattened_when_enabled() {
    let temp = TempDir::new().unwrap();
    let inbox = temp.path().join("inbox");
    touch(&inbox, "Dune/Disc 1/01.mp3");
    touch(&inbox, "Dune/Disc 2/02.mp3");

    let mut config = test_config(temp.path());
    config.conversion.flatten_multi_disc_books = true;
    let mut processor = memory_processor(config, Arc::new(RecordingConverter::default()));

    let report = processor.run_cycle().await.unwrap();
    assert_eq!(report.flattened, vec![key("Dune")]);
    assert_eq!(report.converted, vec![key("Dune")]);
    assert!(inbox.join("Dune/01.mp3").is_file());
    assert!(inbox.join("Dune/02.mp3").is_file());
    assert!(!inbox.join("Dune/Disc 1").exists());
}

#[tokio::test]
async fn test_flattening_that_would_reorder_is_rejected() {
    let temp = TempDir::new().unwrap();
    let inbox = temp.path().join("inbox");
    // Disc order plays b before a, alphabetical order would not
    touch(&inbox, "Emma/Disc 1/b.mp3");
    touch(&inbox, "Emma/Disc 2/a.mp3");

    let mut config = test_config(temp.path());
    config.conversion.flatten_multi_disc_books = true;
    let converter = Arc::new(RecordingConverter::default());
    let mut processor = memory_processor(config, converter.clone());

    let report = processor.run_cycle().await.unwrap();
    assert!(report.flattened.is_empty());
    assert!(report.converted.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.contains("reorder"));

    assert!(inbox.join("Emma/Disc 1/b.mp3").is_file());
    assert!(inbox.join("Emma/Disc 2/a.mp3").is_file());
    assert!(converter.titles().is_empty());
}

#[tokio::test]
async fn test_match_filter_limits_processing() {
    let temp = TempDir::new().unwrap();
    scenario_inbox(temp.path());
    let mut config = test_config(temp.path());
    config.conversion.match_filter = Some("^booka$".to_string());
    let converter = Arc::new(RecordingConverter::default());
    let mut processor = memory_processor(config, converter.clone());

    let report = processor.run_cycle().await.unwrap();
    assert_eq!(report.converted, vec![key("BookA")]);
    assert!(report.failed.is_empty());
    assert_eq!(report.counts.filtered, 1);
    assert_eq!(processor.state().len(), 2);

    processor.state_mut().set_match_filter(None).unwrap();
    let book_b = processor.state().get(&key("BookB")).unwrap();
    assert_eq!(book_b.status(), InboxStatus::Ok);
    let eligible: Vec<String> = processor
        .state()
        .eligible_books()
        .iter()
        .map(|item| item.key().to_string())
        .collect();
    assert_eq!(eligible, vec!["BookA".to_string(), "BookB".to_string()]);
}

#[tokio::test]
async fn test_archive_removes_book_from_registry() {
    let temp = TempDir::new().unwrap();
    touch(&temp.path().join("inbox"), "BookA/part1.mp3");
    let mut config = test_config(temp.path());
    config.conversion.on_complete = OnComplete::Archive;
    let mut processor = memory_processor(config, Arc::new(RecordingConverter::default()));

    let report = processor.run_cycle().await.unwrap();
    assert_eq!(report.converted, vec![key("BookA")]);
    assert!(temp.path().join("archive/BookA/part1.mp3").is_file());

    let next = processor.run_cycle().await.unwrap();
    assert_eq!(next.skipped, Some(SkipReason::EmptyInbox));
    assert!(processor.state().is_empty());
}

#[tokio::test]
#[serial]
async fn test_failures_survive_restart() {
    const VAR: &str = "AUTOM4B_IT_FAILED_BOOKS";
    let temp = TempDir::new().unwrap();
    scenario_inbox(temp.path());
    let env_file = temp.path().join(".env");
    std::env::remove_var(VAR);
    init_logging();

    let store = EnvFailedBookStore::new(VAR).with_env_file(&env_file);
    let mut first = InboxProcessor::new(
        test_config(temp.path()),
        Box::new(store),
        Arc::new(RecordingConverter::default()),
    )
    .unwrap();
    first.startup_checks().unwrap();
    first.run_cycle().await.unwrap();
    let reason = first.state().failed_books()[0]
        .failed_reason()
        .unwrap()
        .to_string();
    drop(first);

    // A new process only has the .env file
    std::env::remove_var(VAR);
    dotenvy::from_path(&env_file).unwrap();

    let store = EnvFailedBookStore::new(VAR).with_env_file(&env_file);
    let mut restarted = InboxProcessor::new(
        test_config(temp.path()),
        Box::new(store),
        Arc::new(RecordingConverter::default()),
    )
    .unwrap();
    restarted.state_mut().init().unwrap();

    let failed = restarted.state().failed_books();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].key(), &key("BookB"));
    assert_eq!(failed[0].failed_reason(), Some(reason.as_str()));
    assert!(reason.contains("multi-disc"));

    std::env::remove_var(VAR);
}

#[tokio::test]
async fn test_series_books_converted_separately() {
    let temp = TempDir::new().unwrap();
    let inbox = temp.path().join("inbox");
    touch(&inbox, "Saga/Book 1/01.mp3");
    touch(&inbox, "Saga/Book 2/01.mp3");

    let mut config = test_config(temp.path());
    config.conversion.convert_series = true;
    let converter = Arc::new(RecordingConverter::default());
    let mut processor = memory_processor(config, converter.clone());

    let report = processor.run_cycle().await.unwrap();
    assert_eq!(report.converted, vec![key("Saga/Book 1"), key("Saga/Book 2")]);
    assert!(temp.path().join("converted/Saga/Book 1/Book 1.m4b").is_file());
    assert!(temp.path().join("converted/Saga/Book 2/Book 2.m4b").is_file());
    assert_eq!(processor.state().series_parents(), vec![key("Saga")]);
}

#[tokio::test]
async fn test_multiple_books_in_one_folder_rejected_without_series() {
    let temp = TempDir::new().unwrap();
    let inbox = temp.path().join("inbox");
    touch(&inbox, "Saga/Book 1/01.mp3");
    touch(&inbox, "Saga/Book 2/01.mp3");
    let mut processor =
        memory_processor(test_config(temp.path()), Arc::new(RecordingConverter::default()));

    let report = processor.run_cycle().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.contains("series conversion"));
}

#[tokio::test]
async fn test_failed_folder_fixed_into_series_is_split_and_converted() {
    let temp = TempDir::new().unwrap();
    let inbox = temp.path().join("inbox");
    touch(&inbox, "Other/01.mp3");
    touch(&inbox, "Saga/Disc 1/01.mp3");
    touch(&inbox, "Saga/Bonus/01.mp3");

    let mut config = test_config(temp.path());
    config.conversion.convert_series = true;
    let converter = Arc::new(RecordingConverter::default());
    let mut processor = memory_processor(config, converter.clone());

    let first = processor.run_cycle().await.unwrap();
    assert_eq!(first.converted, vec![key("Other")]);
    assert_eq!(first.failed.len(), 1);
    assert_eq!(first.failed[0].0, key("Saga"));

    fs::rename(inbox.join("Saga/Disc 1"), inbox.join("Saga/Book 1")).unwrap();
    fs::rename(inbox.join("Saga/Bonus"), inbox.join("Saga/Book 2")).unwrap();

    let second = processor.run_cycle().await.unwrap();
    assert_eq!(second.split, vec![key("Saga")]);
    assert_eq!(second.converted, vec![key("Saga/Book 1"), key("Saga/Book 2")]);
    assert!(second.failed.is_empty());
    assert_eq!(
        converter.titles(),
        vec!["Other".to_string(), "Book 1".to_string(), "Book 2".to_string()]
    );

    let third = processor.run_cycle().await.unwrap();
    assert_eq!(third.skipped, Some(SkipReason::Unchanged));
    let keys: Vec<String> = processor
        .state()
        .matched_books()
        .iter()
        .map(|item| item.key().to_string())
        .collect();
    assert_eq!(keys, vec!["Other", "Saga/Book 1", "Saga/Book 2"]);
}

#[tokio::test]
async fn test_restored_failure_retried_after_rename() {
    let temp = TempDir::new().unwrap();
    let inbox = temp.path().join("inbox");
    touch(&inbox, "Rome/Part IX.mp3");
    touch(&inbox, "Rome/Part V.mp3");
    init_logging();
    let store = MemoryFailedBookStore::new();

    let mut first = InboxProcessor::new(
        test_config(temp.path()),
        Box::new(store.clone()),
        Arc::new(RecordingConverter::default()),
    )
    .unwrap();
    first.startup_checks().unwrap();
    let report = first.run_cycle().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    drop(first);

    let converter = Arc::new(RecordingConverter::default());
    let mut restarted = InboxProcessor::new(
        test_config(temp.path()),
        Box::new(store.clone()),
        converter.clone(),
    )
    .unwrap();
    let report = restarted.run_cycle().await.unwrap();
    assert!(report.converted.is_empty());
    assert_eq!(
        restarted.state().get(&key("Rome")).unwrap().status(),
        InboxStatus::Failed
    );

    // Renaming keeps each file's mtime
    fs::rename(inbox.join("Rome/Part IX.mp3"), inbox.join("Rome/Part 09.mp3")).unwrap();
    fs::rename(inbox.join("Rome/Part V.mp3"), inbox.join("Rome/Part 05.mp3")).unwrap();

    let report = restarted.run_cycle().await.unwrap();
    assert_eq!(report.converted, vec![key("Rome")]);
    assert_eq!(converter.titles(), vec!["Rome".to_string()]);
    assert_eq!(
        restarted.state().get(&key("Rome")).unwrap().status(),
        InboxStatus::Ok
    );
}

#[tokio::test]
async fn test_retried_book_that_fails_again_is_reported_as_such() {
    let temp = TempDir::new().unwrap();
    scenario_inbox(temp.path());
    let mut processor =
        memory_processor(test_config(temp.path()), Arc::new(RecordingConverter::default()));

    let first = processor.run_cycle().await.unwrap();
    assert_eq!(first.failed[0].0, key("BookB"));
    assert!(first.failed_again.is_empty());

    // Still a multi-disc book after the change
    touch(&temp.path().join("inbox"), "BookB/Disc 2 of 2/c3.mp3");

    let second = processor.run_cycle().await.unwrap();
    assert_eq!(second.failed.len(), 1);
    assert_eq!(second.failed[0].0, key("BookB"));
    assert_eq!(second.failed_again, vec![key("BookB")]);
    assert_eq!(
        processor.state().get(&key("BookB")).unwrap().status(),
        InboxStatus::Failed
    );
}
