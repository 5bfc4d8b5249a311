use clap::Parser;
use std::path::PathBuf;

use crate::shrink::{OutputFormat, SizeUnit};

#[derive(Parser, Debug)]
#[command(
    name = "image-batcher",
    about = "Batch image shrinker: re-encodes images until they fit a target file size",
    long_about = "
Image Batcher

Shrinks batches of raster images until each one's encoded size falls at or
below a target budget. Every image is re-encoded in memory, compared against
the budget, and downscaled to 75% of its dimensions until it fits; the result
is written to the output directory as PNG or JPEG.

Jobs run in parallel on a worker pool sized to the logical core count by
default, with one progress tick per finished file.

Example Usage:
  # Shrink a folder of photos to at most 200 KB each, saved as JPEG
  image-batcher -i ~/Photos -o ~/shrunk -m 200 -u kb -f jpg

  # Single files, byte-exact budget, PNG output
  image-batcher -i a.bmp -i b.tiff -o ./out -m 500000 -u bytes -f png

  # Limit parallelism and emit JSON progress lines for an embedding GUI
  image-batcher -i ~/Photos -o ~/shrunk -m 1 -u mb -j 2 --json-progress"
)]
pub struct Args {
    /// Input image files or directories (can be specified multiple times)
    #[arg(short = 'i', long = "input", required = true, value_name = "DIR|FILE")]
    pub input_paths: Vec<PathBuf>,

    /// Output directory for shrunk images (created if absent)
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Maximum encoded output size, expressed in --unit
    #[arg(short = 'm', long = "max-size", value_name = "SIZE")]
    pub max_size: u64,

    /// Unit the size budget is expressed in
    #[arg(short = 'u', long = "unit", default_value = "kb")]
    pub unit: SizeUnit,

    /// Output image format
    #[arg(short = 'f', long = "format", default_value = "jpg")]
    pub format: OutputFormat,

    /// Number of parallel jobs (0 = number of logical cores)
    #[arg(short = 'j', long = "jobs", default_value = "0", value_name = "N")]
    pub jobs: usize,

    /// Comma-separated input file extensions to accept
    #[arg(long = "extensions", default_value = "png,jpg,jpeg,bmp,tif,tiff")]
    pub extensions_str: String,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Emit machine-readable JSON progress lines on stdout, suppressing
    /// all other output
    #[arg(long = "json-progress")]
    pub json_progress: bool,
}

impl Args {
    /// Parse the extension filter into a lowercase list
    pub fn extensions(&self) -> Vec<String> {
        self.extensions_str
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Worker pool size: explicit job count, or the logical core count
    pub fn parallel_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }
}
