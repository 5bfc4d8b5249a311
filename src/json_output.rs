//! JSON output for GUI integration
//!
//! When the --json-progress flag is enabled, all progress and status
//! information is emitted as JSON lines on stdout, suppressing all other
//! output.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Last progress emission timestamp (milliseconds since epoch)
/// Used for throttling progress updates to ~25 FPS (40ms between updates)
static LAST_PROGRESS_MS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    /// Progress update
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    /// An image converged and was written out
    FileSaved {
        input_path: String,
        output_path: String,
        iterations: usize,
        bytes: u64,
    },
    /// A job failed
    FileFailed { input_path: String, error: String },
    /// Run summary
    Summary {
        total_files: usize,
        saved: usize,
        abandoned: usize,
        failed: usize,
        duration_secs: f64,
    },
}

impl JsonMessage {
    /// Emit JSON message to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Create and emit a progress message, throttled to ~25 FPS for smooth
    /// GUI updates. The final tick (current == total) is always emitted so
    /// the consumer sees 100% completion.
    pub fn progress(current: usize, total: usize, message: impl Into<String>) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let last_ms = LAST_PROGRESS_MS.load(Ordering::Relaxed);

        if now_ms.saturating_sub(last_ms) >= 40 || current == total {
            LAST_PROGRESS_MS.store(now_ms, Ordering::Relaxed);
            Self::Progress {
                current,
                total,
                message: message.into(),
            }
            .emit();
        }
    }

    /// Create and emit a file saved message
    pub fn file_saved(input_path: &Path, output_path: &Path, iterations: usize, bytes: u64) {
        Self::FileSaved {
            input_path: input_path.display().to_string(),
            output_path: output_path.display().to_string(),
            iterations,
            bytes,
        }
        .emit();
    }

    /// Create and emit a file failed message
    pub fn file_failed(input_path: &Path, error: impl Into<String>) {
        Self::FileFailed {
            input_path: input_path.display().to_string(),
            error: error.into(),
        }
        .emit();
    }

    /// Create and emit a summary message
    pub fn summary(
        total_files: usize,
        saved: usize,
        abandoned: usize,
        failed: usize,
        duration_secs: f64,
    ) {
        Self::Summary {
            total_files,
            saved,
            abandoned,
            failed,
            duration_secs,
        }
        .emit();
    }
}
