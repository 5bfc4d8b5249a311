use anyhow::Result;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared by every job of one run.
///
/// A fresh signal is created per run; the engine cancels the previous run's
/// signal when a new run starts. Cancelling is idempotent and never un-set
/// within the same run. Workers only read the flag, at job start and at each
/// shrink-loop iteration, so an in-flight encode finishes its current
/// iteration before the job stops.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run this signal belongs to.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Whether two handles observe the same underlying flag.
    pub(crate) fn same_flag(&self, other: &CancelSignal) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// Batch progress counter shared across worker threads.
pub struct BatchProgress {
    pub total_files: usize,
    pub processed_count: AtomicUsize,
}

impl BatchProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            processed_count: AtomicUsize::new(0),
        }
    }

    /// Increment processed count and return the new count.
    pub fn increment(&self) -> usize {
        self.processed_count.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Fan a list of files out over the current rayon pool.
///
/// Each file becomes one independent job. The progress callback fires once
/// per terminal job with the completed count; completion order is whatever
/// the pool produces and must not be relied upon. Per-job errors land in the
/// result vector and never abort the rest of the batch.
pub fn run_jobs_parallel<T, F, P>(
    files: &[PathBuf],
    process_fn: F,
    progress_callback: P,
) -> Vec<Result<T>>
where
    T: Send,
    F: Fn(&Path) -> Result<T> + Send + Sync,
    P: Fn(usize, usize) + Send + Sync,
{
    let progress = BatchProgress::new(files.len());

    files
        .par_iter()
        .map(|file_path| {
            let result = process_fn(file_path);

            let completed = progress.increment();
            progress_callback(completed, progress.total_files);

            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_signal_is_sticky() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());

        signal.cancel();
        assert!(signal.is_cancelled());

        // Cancelling again is a no-op, the flag stays set
        signal.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_cancel_signal_shared_across_clones() {
        let signal = CancelSignal::new();
        let clone = signal.clone();

        assert!(signal.same_flag(&clone));
        assert!(!signal.same_flag(&CancelSignal::new()));

        clone.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_batch_progress_counts() {
        let progress = BatchProgress::new(10);

        assert_eq!(progress.increment(), 1);
        assert_eq!(progress.increment(), 2);

        for _ in 0..8 {
            progress.increment();
        }
        assert_eq!(progress.processed_count.load(Ordering::Relaxed), 10);
        assert_eq!(progress.total_files, 10);
    }

    #[test]
    fn test_run_jobs_parallel_reports_every_job() {
        let files: Vec<PathBuf> = (0..8).map(|i| PathBuf::from(format!("f{}.jpg", i))).collect();
        let ticks = AtomicUsize::new(0);

        let results = run_jobs_parallel(
            &files,
            |path| {
                if path.to_string_lossy().contains('3') {
                    Err(anyhow::anyhow!("bad file"))
                } else {
                    Ok(())
                }
            },
            |_completed, total| {
                assert_eq!(total, 8);
                ticks.fetch_add(1, Ordering::Relaxed);
            },
        );

        // One tick per job, failures included
        assert_eq!(ticks.load(Ordering::Relaxed), 8);
        assert_eq!(results.len(), 8);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }
}
