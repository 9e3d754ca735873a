#![warn(clippy::pedantic)]
// Noisy doc/signature lints (would require annotating every pub function)
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference: keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Intentional casts in timestamp and size handling
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod bus;
pub mod channels;
pub mod cli;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod providers;
pub mod safety;
pub(crate) mod utils;

/// Re-exports for fuzz targets. Not part of the public API.
#[doc(hidden)]
pub mod fuzz_api {
    pub use crate::utils::prompt::parse_image_count;

    /// Wrapper around the moderation parser chain for fuzz targets.
    pub fn parse_verdict(text: &str) -> Option<bool> {
        crate::safety::moderation::parse_verdict(text)
    }
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
