//! Concurrent grading of many images.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::models::{GradeOutcome, GradeResult};
use crate::pipeline::Grader;

/// Default per-image time limit.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Images graded at the same time.
    pub jobs: usize,
    /// Limit for a single image.
    pub timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    Graded { result: GradeResult },
    CardNotFound,
    Failed { error: String },
    TimedOut { seconds: u64 },
}

impl BatchStatus {
    pub fn is_graded(&self) -> bool {
        matches!(self, BatchStatus::Graded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: BatchStatus,
}

/// Grade every path, at most `options.jobs` at a time.
///
/// Entries come back in input order. A failing image never stops the others.
pub async fn grade_batch(grader: Arc<Grader>, paths: Vec<PathBuf>, options: BatchOptions) -> Vec<BatchEntry> {
    let permits = Arc::new(Semaphore::new(options.jobs.max(1)));
    info!(images = paths.len(), jobs = options.jobs.max(1), "Grading batch");

    let handles: Vec<_> = paths
        .into_iter()
        .map(|path| {
            let grader = Arc::clone(&grader);
            let permits = Arc::clone(&permits);
            let limit = options.timeout;
            let task_path = path.clone();
            let handle = tokio::spawn(async move { grade_one(grader, permits, task_path, limit).await });
            (path, handle)
        })
        .collect();

    let mut entries = Vec::with_capacity(handles.len());
    for (path, handle) in handles {
        let status = match handle.await {
            Ok(status) => status,
            Err(e) => BatchStatus::Failed {
                error: format!("grading task failed: {e}"),
            },
        };
        entries.push(BatchEntry { path, status });
    }
    entries
}

async fn grade_one(grader: Arc<Grader>, permits: Arc<Semaphore>, path: PathBuf, limit: Duration) -> BatchStatus {
    let permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return BatchStatus::Failed { error: e.to_string() },
    };

    // Held until the blocking work ends, even after a timeout.
    let work_path = path.clone();
    let work = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        grader.grade_path(&work_path)
    });

    match timeout(limit, work).await {
        Err(_) => {
            warn!(path = %path.display(), seconds = limit.as_secs(), "Grading timed out");
            BatchStatus::TimedOut {
                seconds: limit.as_secs(),
            }
        }
        Ok(Err(e)) => BatchStatus::Failed {
            error: format!("grading task panicked: {e}"),
        },
        Ok(Ok(Err(e))) => {
            let error = e.to_string();
            warn!(path = %path.display(), %error, "Grading failed");
            BatchStatus::Failed { error }
        }
        Ok(Ok(Ok(GradeOutcome::Graded(result)))) => BatchStatus::Graded { result },
        Ok(Ok(Ok(GradeOutcome::CardNotFound))) => BatchStatus::CardNotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_json_shape() {
        let entry = BatchEntry {
            path: PathBuf::from("card.png"),
            status: BatchStatus::Graded {
                result: GradeResult {
                    centering: 1.0,
                    corners: 1.0,
                    edges: 1.0,
                    surface: 1.0,
                    grade: 10.0,
                },
            },
        };
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["path"], "card.png");
        assert_eq!(json["status"], "graded");
        assert_eq!(json["result"]["Grade"], 10.0);

        let missing = BatchEntry {
            path: PathBuf::from("blank.png"),
            status: BatchStatus::CardNotFound,
        };
        let json = serde_json::to_value(&missing).expect("serialize");
        assert_eq!(json["status"], "card_not_found");

        let slow = serde_json::to_value(BatchStatus::TimedOut { seconds: 30 }).expect("serialize");
        assert_eq!(slow["status"], "timed_out");
        assert_eq!(slow["seconds"], 30);
    }

    #[tokio::test]
    async fn test_missing_files_fail_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = vec![dir.path().join("a.png"), dir.path().join("b.png")];
        let options = BatchOptions {
            jobs: 1,
            timeout: Duration::from_secs(5),
        };

        let entries = grade_batch(Arc::new(Grader::default()), paths.clone(), options).await;
        assert_eq!(entries.len(), 2);
        for (entry, path) in entries.iter().zip(&paths) {
            assert_eq!(&entry.path, path);
            assert!(matches!(entry.status, BatchStatus::Failed { .. }), "{entry:?}");
            assert!(!entry.status.is_graded());
        }
    }
}
