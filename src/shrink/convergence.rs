use anyhow::{Context, Result};
use fast_image_resize::{images::Image, ResizeOptions, Resizer};
use image::{ImageBuffer, RgbImage};
use std::io::Cursor;
use std::path::Path;

use super::batch::CancelSignal;
use super::{OutputFormat, ShrinkConfig, ShrinkOutcome};

/// Per-iteration downscale factor. Dimensions are rounded up, so the map
/// `d -> ceil(0.75 * d)` strictly decreases for d >= 4 and has fixed points
/// at 1, 2 and 3 pixels.
const SHRINK_FACTOR: f64 = 0.75;

/// Run the full shrink pipeline for one input file.
///
/// Checks cancellation before doing any work, decodes the image and hands it
/// to the convergence loop. Decode failures abort this job only.
pub fn shrink_file(
    path: &Path,
    config: &ShrinkConfig,
    cancel: &CancelSignal,
) -> Result<ShrinkOutcome> {
    if cancel.is_cancelled() {
        return Ok(ShrinkOutcome::Abandoned);
    }

    let img = image::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?;
    let rgb_img = img.to_rgb8();

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Input file has no usable name: {}", path.display()))?;

    shrink_to_budget(rgb_img, stem, config, cancel)
}

/// Iteratively re-encode and downscale until the encoded size fits the budget.
///
/// Each pass encodes the current image to an in-memory buffer, compares the
/// buffer length (converted into the budget unit) against the budget and
/// either persists the buffer as `<output_dir>/<stem>.<ext>` or resamples to
/// 75% of the current dimensions and tries again. The previous pixel buffer
/// is dropped as soon as the resampled one replaces it.
///
/// If the dimensions stop changing (the image is down to the fixed point of
/// the ceiling map) and the encoding still exceeds the budget, the budget is
/// unreachable in this format and the job fails instead of spinning forever.
pub fn shrink_to_budget(
    mut img: RgbImage,
    stem: &str,
    config: &ShrinkConfig,
    cancel: &CancelSignal,
) -> Result<ShrinkOutcome> {
    let mut iteration = 1usize;

    loop {
        if cancel.is_cancelled() {
            return Ok(ShrinkOutcome::Abandoned);
        }

        let encoded = encode_to_memory(&img, config.format)?;
        let converted = config.unit.convert(encoded.len() as u64);

        if converted <= config.max_size {
            let output_path = config
                .output_dir
                .join(format!("{}.{}", stem, config.format.extension()));
            std::fs::write(&output_path, &encoded)
                .with_context(|| format!("Failed to write image: {}", output_path.display()))?;

            let (width, height) = img.dimensions();
            return Ok(ShrinkOutcome::Saved {
                output_path,
                iterations: iteration,
                bytes: encoded.len() as u64,
                width,
                height,
            });
        }

        let (width, height) = img.dimensions();
        let (new_width, new_height) = next_dimensions(width, height);
        if (new_width, new_height) == (width, height) {
            return Err(anyhow::anyhow!(
                "{}: image cannot be shrunk below {}x{} but its {} encoding still exceeds {} {}",
                stem,
                width,
                height,
                config.format,
                config.max_size,
                config.unit
            ));
        }

        img = resample(&img, new_width, new_height)?;
        iteration += 1;
    }
}

/// Dimensions for the next shrink iteration: 75% of the current ones,
/// rounded up.
pub fn next_dimensions(width: u32, height: u32) -> (u32, u32) {
    let new_width = (width as f64 * SHRINK_FACTOR).ceil() as u32;
    let new_height = (height as f64 * SHRINK_FACTOR).ceil() as u32;
    (new_width, new_height)
}

/// Encode an image into an in-memory buffer in the requested format.
pub fn encode_to_memory(img: &RgbImage, format: OutputFormat) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image::write_buffer_with_format(
        &mut cursor,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgb8,
        format.image_format(),
    )
    .with_context(|| format!("Failed to encode image as {}", format))?;
    Ok(cursor.into_inner())
}

/// Resample an image to exact dimensions using a high-quality algorithm.
fn resample(img: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let (src_width, src_height) = img.dimensions();

    if src_width == width && src_height == height {
        return Ok(img.clone());
    }

    let src_image = Image::from_vec_u8(
        src_width,
        src_height,
        img.as_raw().clone(),
        fast_image_resize::PixelType::U8x3,
    )?;
    let mut dst_image = Image::new(width, height, fast_image_resize::PixelType::U8x3);

    let mut resizer = Resizer::new();
    resizer.resize(&src_image, &mut dst_image, Some(&ResizeOptions::default()))?;

    let output: RgbImage = ImageBuffer::from_raw(width, height, dst_image.buffer().to_vec())
        .context("Resampled buffer has unexpected length")?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shrink::SizeUnit;
    use image::Rgb;

    fn create_test_image(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn test_config(dir: &std::path::Path, max_size: u64, unit: SizeUnit) -> ShrinkConfig {
        ShrinkConfig {
            output_dir: dir.to_path_buf(),
            max_size,
            unit,
            format: OutputFormat::Png,
            parallel_jobs: 1,
            extensions: vec!["png".to_string()],
            verbose: false,
        }
    }

    #[test]
    fn test_next_dimensions_rounds_up() {
        assert_eq!(next_dimensions(100, 100), (75, 75));
        assert_eq!(next_dimensions(75, 75), (57, 57));
        assert_eq!(next_dimensions(10, 6), (8, 5));
    }

    #[test]
    fn test_next_dimensions_fixed_points() {
        // ceil(0.75 * d) == d for d in 1..=3, strictly smaller above
        for d in 1..=3u32 {
            assert_eq!(next_dimensions(d, d), (d, d));
        }
        for d in 4..200u32 {
            let (w, _) = next_dimensions(d, d);
            assert!(w < d);
        }
    }

    #[test]
    fn test_dimensions_shrink_monotonically() {
        let (mut w, mut h) = (1920u32, 1080u32);
        loop {
            let (nw, nh) = next_dimensions(w, h);
            assert!(nw <= w && nh <= h);
            assert!(nw >= 1 && nh >= 1);
            if (nw, nh) == (w, h) {
                break;
            }
            (w, h) = (nw, nh);
        }
        assert!(w <= 3 && h <= 3);
    }

    #[test]
    fn test_generous_budget_saves_on_first_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 10, SizeUnit::Megabytes);
        let cancel = CancelSignal::new();

        let outcome = shrink_to_budget(create_test_image(64, 48), "photo", &config, &cancel)
            .unwrap();

        match outcome {
            ShrinkOutcome::Saved {
                output_path,
                iterations,
                bytes,
                width,
                height,
            } => {
                assert_eq!(iterations, 1);
                assert_eq!((width, height), (64, 48));
                assert_eq!(output_path, dir.path().join("photo.png"));
                assert_eq!(std::fs::metadata(&output_path).unwrap().len(), bytes);
            }
            other => panic!("expected Saved, got {:?}", other),
        }
    }

    /// Deterministic noise that PNG cannot compress away, so the first
    /// encoding reliably exceeds a small byte budget.
    fn create_noise_image(width: u32, height: u32) -> RgbImage {
        let mut state = 0x2545f491u32;
        ImageBuffer::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            Rgb([
                (state >> 16) as u8,
                (state >> 8) as u8,
                state as u8,
            ])
        })
    }

    #[test]
    fn test_tight_budget_forces_multiple_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 2000, SizeUnit::Bytes);
        let cancel = CancelSignal::new();

        let original = create_noise_image(128, 128);
        let original_bytes = encode_to_memory(&original, OutputFormat::Png).unwrap();
        assert!(
            original_bytes.len() > 2000,
            "test image must start over budget"
        );

        let outcome = shrink_to_budget(original, "big", &config, &cancel).unwrap();

        match outcome {
            ShrinkOutcome::Saved {
                iterations,
                bytes,
                width,
                height,
                ..
            } => {
                assert!(iterations > 1);
                assert!(bytes <= 2000);
                assert!(width < 128 && height < 128);
            }
            other => panic!("expected Saved, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_job_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 10, SizeUnit::Megabytes);
        let cancel = CancelSignal::new();
        cancel.cancel();

        let outcome = shrink_to_budget(create_test_image(32, 32), "photo", &config, &cancel)
            .unwrap();

        assert!(matches!(outcome, ShrinkOutcome::Abandoned));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unreachable_budget_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // Even a 1x1 PNG carries dozens of bytes of format overhead
        let config = test_config(dir.path(), 1, SizeUnit::Bytes);
        let cancel = CancelSignal::new();

        let result = shrink_to_budget(create_test_image(1, 1), "dot", &config, &cancel);

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_jpeg_output_uses_jpg_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), 10, SizeUnit::Megabytes);
        config.format = OutputFormat::Jpeg;
        let cancel = CancelSignal::new();

        let outcome = shrink_to_budget(create_test_image(16, 16), "pic", &config, &cancel)
            .unwrap();

        match outcome {
            ShrinkOutcome::Saved { output_path, .. } => {
                assert_eq!(output_path, dir.path().join("pic.jpg"));
            }
            other => panic!("expected Saved, got {:?}", other),
        }
    }

    #[test]
    fn test_shrink_file_rejects_unreadable_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 10, SizeUnit::Megabytes);
        let cancel = CancelSignal::new();

        let result = shrink_file(std::path::Path::new("no/such/file.png"), &config, &cancel);
        assert!(result.is_err());
    }
}
