use anyhow::Result;
use clap::Parser;
use console::style;
use std::time::Instant;

use image_batcher::cli::Args;
use image_batcher::json_output::JsonMessage;
use image_batcher::shrink::{CancelSignal, ShrinkConfig, ShrinkEngine, ShrinkOutcome};
use image_batcher::utils::{
    create_progress_bar, format_duration, format_size, validate_inputs, verbose_println,
};

fn main() -> Result<()> {
    let start_time = Instant::now();
    let args = Args::parse();

    if !args.json_progress {
        println!("{}", style("Image Batcher").bold().blue());
        println!(
            "{}",
            style("Shrinks images until they fit a size budget").dim()
        );
        println!();
    }

    validate_inputs(&args)?;

    let config = ShrinkConfig {
        output_dir: args.output_dir.clone(),
        max_size: args.max_size,
        unit: args.unit,
        format: args.format,
        parallel_jobs: args.parallel_jobs(),
        extensions: args.extensions(),
        verbose: args.verbose && !args.json_progress,
    };

    if config.verbose {
        println!("{}", style("Configuration:").bold());
        println!("  Size budget: {} {}", config.max_size, config.unit);
        println!("  Output format: {}", config.format);
        println!("  Output directory: {}", config.output_dir.display());
        println!("  Parallel jobs: {}", config.parallel_jobs);
        println!("  Extensions: {:?}", config.extensions);
        println!();
    }

    let engine = ShrinkEngine::new(config)?;

    // Discover all images
    let image_files = engine.discover_images(&args.input_paths)?;
    verbose_println(
        engine.config().verbose,
        &format!("Found {} image files", image_files.len()),
    );

    if image_files.is_empty() {
        if args.json_progress {
            JsonMessage::summary(0, 0, 0, 0, start_time.elapsed().as_secs_f64());
        } else {
            println!(
                "{}",
                style("No images found with specified extensions").red()
            );
        }
        return Ok(());
    }

    // One fresh cancellation signal per run. A GUI shell would keep a clone
    // and flip it from its cancel action; the CLI runs each batch to the end.
    let cancel = CancelSignal::new();

    let json_progress = args.json_progress;
    let progress_bar = if json_progress {
        None
    } else {
        Some(create_progress_bar(image_files.len() as u64))
    };

    let results = engine.run(
        &image_files,
        &cancel,
        |completed, total| {
            if let Some(pb) = progress_bar.as_ref() {
                pb.set_position(completed as u64);
            }
            if json_progress {
                JsonMessage::progress(completed, total, "Shrinking images");
            }
        },
        |line| {
            // Suspend the bar for each log line so output stays readable;
            // in JSON mode per-file details are emitted after the run
            if let Some(pb) = progress_bar.as_ref() {
                pb.println(line);
            }
        },
    )?;

    if let Some(pb) = progress_bar.as_ref() {
        pb.finish_and_clear();
    }

    let mut saved = 0usize;
    let mut abandoned = 0usize;
    let mut failed = 0usize;
    let mut bytes_written = 0u64;
    for result in &results {
        match result {
            Ok(ShrinkOutcome::Saved { bytes, .. }) => {
                saved += 1;
                bytes_written += bytes;
            }
            Ok(ShrinkOutcome::Abandoned) => abandoned += 1,
            Err(_) => failed += 1,
        }
    }

    let total_time = start_time.elapsed();

    if json_progress {
        for (input_path, result) in image_files.iter().zip(&results) {
            match result {
                Ok(ShrinkOutcome::Saved {
                    output_path,
                    iterations,
                    bytes,
                    ..
                }) => JsonMessage::file_saved(input_path, output_path, *iterations, *bytes),
                Ok(ShrinkOutcome::Abandoned) => {}
                Err(e) => JsonMessage::file_failed(input_path, format!("{:#}", e)),
            }
        }
        JsonMessage::summary(
            results.len(),
            saved,
            abandoned,
            failed,
            total_time.as_secs_f64(),
        );
    } else {
        println!();
        println!("{}", style("Results Summary:").bold().green());
        println!("  Saved: {}", style(saved).bold().green());
        if saved > 0 {
            println!("  Output written: {}", style(format_size(bytes_written)).bold());
        }
        if abandoned > 0 {
            println!("  Abandoned: {}", style(abandoned).bold().yellow());
        }
        if failed > 0 {
            println!("  Failed: {}", style(failed).bold().red());
        }
        println!("  Total time: {}", format_duration(total_time));
    }

    if failed == results.len() {
        return Err(anyhow::anyhow!("All {} jobs failed", failed));
    }

    Ok(())
}
