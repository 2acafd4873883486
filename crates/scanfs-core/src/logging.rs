//! Logging setup for one run.
//!
//! Two layers over one registry:
//! - a DEBUG-level file layer writing the per-run `summary` artifact
//!   (produced even on fatal failure), and
//! - an INFO-level plain layer on stdout for operator-facing progress.

use scanfs_common::Result;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Initialize logging with `summary_path` as the full-operation log.
///
/// Call once per process, after the output directory exists.
pub fn init(summary_path: &Path) -> Result<()> {
    let summary = File::create(summary_path)?;

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Arc::new(summary))
        .with_filter(LevelFilter::DEBUG);

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_level(false)
        .without_time()
        .with_filter(LevelFilter::INFO);

    // try_init: a second init (tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with(file_layer)
        .with(stdout_layer)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_creates_summary_file() {
        let dir = tempdir().unwrap();
        let summary = dir.path().join("summary");
        // The global subscriber can only be set once per process; the file
        // must exist regardless of whether this test won that race.
        let _ = init(&summary);
        assert!(summary.exists());
    }
}
