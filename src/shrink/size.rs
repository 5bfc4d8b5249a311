use clap::ValueEnum;
use std::fmt;

/// Unit in which the size budget is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SizeUnit {
    /// Raw byte count
    #[value(name = "bytes", alias = "b")]
    Bytes,
    /// Kibibytes (1024 bytes)
    #[value(name = "kb")]
    Kilobytes,
    /// Mebibytes (1024 * 1024 bytes)
    #[value(name = "mb")]
    Megabytes,
}

impl SizeUnit {
    /// Convert a raw byte count into this unit.
    ///
    /// Division truncates, so a 1535-byte buffer is 1 KB. The budget
    /// comparison in the shrink loop relies on exactly this behavior.
    pub fn convert(&self, bytes: u64) -> u64 {
        match self {
            SizeUnit::Bytes => bytes,
            SizeUnit::Kilobytes => bytes / 1024,
            SizeUnit::Megabytes => bytes / 1024 / 1024,
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeUnit::Bytes => write!(f, "bytes"),
            SizeUnit::Kilobytes => write!(f, "KB"),
            SizeUnit::Megabytes => write!(f, "MB"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_is_identity() {
        for size in [0u64, 1, 1023, 1024, 1_048_576, u64::MAX] {
            assert_eq!(SizeUnit::Bytes.convert(size), size);
        }
    }

    #[test]
    fn test_kilobytes_truncates() {
        assert_eq!(SizeUnit::Kilobytes.convert(0), 0);
        assert_eq!(SizeUnit::Kilobytes.convert(1023), 0);
        assert_eq!(SizeUnit::Kilobytes.convert(1024), 1);
        assert_eq!(SizeUnit::Kilobytes.convert(1535), 1);
        assert_eq!(SizeUnit::Kilobytes.convert(1024 * 50 + 1023), 50);
    }

    #[test]
    fn test_megabytes_truncates() {
        assert_eq!(SizeUnit::Megabytes.convert(1_048_575), 0);
        assert_eq!(SizeUnit::Megabytes.convert(1_048_576), 1);
        assert_eq!(SizeUnit::Megabytes.convert(3 * 1_048_576 + 42), 3);
    }

    #[test]
    fn test_conversion_is_monotonic() {
        for unit in [SizeUnit::Bytes, SizeUnit::Kilobytes, SizeUnit::Megabytes] {
            let mut last = 0;
            for size in (0..4_000_000u64).step_by(97_311) {
                let converted = unit.convert(size);
                assert!(converted >= last, "{:?} not monotonic at {}", unit, size);
                last = converted;
            }
        }
    }
}
