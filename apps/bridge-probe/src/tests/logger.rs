// Unit tests for logger setup.

use crate::logger::{LOG_FILE_NAME, build_dispatch, initialize};

use crate::error::ProbeError;

use tempfile::TempDir;

/// **VALUE**: Verifies building the dispatch creates the log file.
///
/// **WHY THIS MATTERS**: Users are pointed at the log file when a probe fails.
#[test]
fn given_log_dir_when_dispatch_built_then_log_file_created() {
    // GIVEN: An empty directory
    let dir = TempDir::new().unwrap();

    // WHEN: Building the dispatch
    let dispatch = build_dispatch(dir.path());

    // THEN: File exists
    assert!(dispatch.is_ok());
    assert!(dir.path().join(LOG_FILE_NAME).exists());
}

/// **VALUE**: Verifies an unusable directory is reported, not panicked on.
#[test]
fn given_missing_log_dir_when_dispatch_built_then_probe_error() {
    // GIVEN: A directory that does not exist
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope").join("deeper");

    // WHEN: Building the dispatch
    let result = build_dispatch(&missing);

    // THEN: Probe error naming the file
    match result {
        Err(ProbeError::Probe { message, .. }) => assert!(message.contains(LOG_FILE_NAME)),
        Err(other) => panic!("Expected Probe error, got {other:?}"),
        Ok(_) => panic!("Expected an error"),
    }
}

/// **VALUE**: Verifies a second initialization is a no-op.
///
/// **BUG THIS CATCHES**: Propagating `SetLoggerError` from the second call.
#[test]
fn given_initialized_logger_when_initialized_again_then_ok() {
    // GIVEN: An initialized logger
    let dir = TempDir::new().unwrap();
    initialize(dir.path()).unwrap();

    // WHEN: Initializing again
    let again = initialize(dir.path());

    // THEN: Ok
    assert!(again.is_ok());
}
