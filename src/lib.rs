// Library exports for reuse by GUI shells and other applications
pub mod cli;
pub mod json_output;
pub mod shrink;
pub mod utils;

// Re-export commonly used types
pub use cli::Args;
pub use json_output::JsonMessage;
pub use shrink::{
    CancelSignal, OutputFormat, ShrinkConfig, ShrinkEngine, ShrinkOutcome, SizeUnit,
};
