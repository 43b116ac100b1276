//! Output formatting
//!
//! Human-readable or JSON output, selected by global flags.

mod formatter;

pub use formatter::Formatter;

/// Output settings shared by the whole run
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Print JSON instead of human-readable text
    pub json: bool,
    /// Disable colors
    pub no_color: bool,
    /// Only print errors
    pub quiet: bool,
}
