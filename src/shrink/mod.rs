pub mod batch;
pub mod convergence;
pub mod size;

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use walkdir::WalkDir;

use crate::utils::{has_valid_extension, verbose_println};
pub use batch::{BatchProgress, CancelSignal};
pub use size::SizeUnit;

/// Target encoding for the shrunk output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[value(name = "png")]
    Png,
    #[value(name = "jpg", alias = "jpeg")]
    Jpeg,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub(crate) fn image_format(&self) -> image::ImageFormat {
        match self {
            OutputFormat::Png => image::ImageFormat::Png,
            OutputFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Png => write!(f, "PNG"),
            OutputFormat::Jpeg => write!(f, "JPEG"),
        }
    }
}

/// Immutable per-run configuration. A new run builds a new value; nothing
/// mutates one after the batch starts.
#[derive(Debug, Clone)]
pub struct ShrinkConfig {
    pub output_dir: PathBuf,
    /// Maximum encoded output size, expressed in `unit`.
    pub max_size: u64,
    pub unit: SizeUnit,
    pub format: OutputFormat,
    pub parallel_jobs: usize,
    /// Lowercase input extensions accepted during discovery.
    pub extensions: Vec<String>,
    pub verbose: bool,
}

impl ShrinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(anyhow::anyhow!("Maximum size must be positive"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("No output path chosen"));
        }
        if self.parallel_jobs == 0 {
            return Err(anyhow::anyhow!("Parallel job count must be positive"));
        }
        if self.extensions.is_empty() {
            return Err(anyhow::anyhow!("No valid input extensions specified"));
        }
        Ok(())
    }
}

/// Terminal state of one shrink job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShrinkOutcome {
    /// The encoded image fit the budget and was written out.
    Saved {
        output_path: PathBuf,
        iterations: usize,
        bytes: u64,
        width: u32,
        height: u32,
    },
    /// The run was cancelled before this job converged. No file was written.
    Abandoned,
}

/// Batch coordinator: fans shrink jobs out over a bounded worker pool.
pub struct ShrinkEngine {
    config: ShrinkConfig,
    pool: rayon::ThreadPool,
    /// Signal of the run currently in flight. Replaced, and the old one
    /// cancelled, whenever a new run starts.
    active_cancel: Mutex<CancelSignal>,
}

impl ShrinkEngine {
    /// Validate the configuration and build the worker pool.
    ///
    /// The pool is local to this engine rather than rayon's global one, so
    /// embedders and tests can create several engines in one process.
    pub fn new(config: ShrinkConfig) -> Result<Self> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_jobs)
            .build()
            .context("Failed to initialize worker pool")?;

        Ok(Self {
            config,
            pool,
            active_cancel: Mutex::new(CancelSignal::new()),
        })
    }

    pub fn config(&self) -> &ShrinkConfig {
        &self.config
    }

    /// Expand the input paths into the list of image files to process.
    ///
    /// Plain files are taken as-is, directories are walked recursively; both
    /// are filtered by the accepted input extensions. The list is sorted so
    /// submission order is stable, but completion order is still undefined.
    pub fn discover_images(&self, input_paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut image_files = Vec::new();

        for input_path in input_paths {
            verbose_println(
                self.config.verbose,
                &format!("Scanning: {}", input_path.display()),
            );

            let walker = WalkDir::new(input_path).follow_links(false).max_depth(10);

            for entry in walker {
                let entry = entry.context("Failed to read directory entry")?;
                let path = entry.path();

                if path.is_file() && has_valid_extension(path, &self.config.extensions) {
                    image_files.push(path.to_path_buf());
                }
            }
        }

        image_files.sort();
        Ok(image_files)
    }

    /// Run the whole batch to its terminal aggregate state.
    ///
    /// Starting a run cancels any previous run of this engine: the prior
    /// run's signal is flipped so its in-flight jobs abandon at their next
    /// checkpoint, and `cancel` becomes the active signal. Each run should
    /// bring a fresh signal.
    ///
    /// Creates the output directory, fans every path out to the worker pool
    /// and blocks until all jobs are terminal. `on_progress` fires once per
    /// terminal job with (completed, total); `on_log` receives one line per
    /// saved or failed file and a single final "Done" line. Both are called
    /// synchronously from worker threads, so any thread-affinity marshaling
    /// is the caller's concern.
    ///
    /// Jobs observe `cancel` at their start and at each loop iteration;
    /// cancelled jobs finish as `Abandoned` without writing or logging.
    pub fn run<P, L>(
        &self,
        files: &[PathBuf],
        cancel: &CancelSignal,
        on_progress: P,
        on_log: L,
    ) -> Result<Vec<Result<ShrinkOutcome>>>
    where
        P: Fn(usize, usize) + Send + Sync,
        L: Fn(&str) + Send + Sync,
    {
        {
            let mut active = self.active_cancel.lock().unwrap();
            if !active.same_flag(cancel) {
                active.cancel();
            }
            *active = cancel.clone();
        }

        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                self.config.output_dir.display()
            )
        })?;

        let config = &self.config;

        let results = self.pool.install(|| {
            batch::run_jobs_parallel(
                files,
                |path| {
                    let result = convergence::shrink_file(path, config, cancel);

                    match &result {
                        Ok(ShrinkOutcome::Saved { iterations, .. }) => {
                            let stem = path
                                .file_stem()
                                .and_then(|s| s.to_str())
                                .unwrap_or("unknown");
                            on_log(&format!(
                                "Saving image {} after {} iterations",
                                stem, iterations
                            ));
                        }
                        // Cancellation is a deliberate abandonment, not a failure
                        Ok(ShrinkOutcome::Abandoned) => {}
                        Err(e) => {
                            on_log(&format!("Failed to process {}: {:#}", path.display(), e));
                        }
                    }

                    result
                },
                &on_progress,
            )
        });

        on_log("Done");
        Ok(results)
    }
}
