//! Image prompt directives.
//!
//! Users may append a standalone `n=<count>` token to an image prompt to ask
//! for several images. The token is stripped before the prompt reaches a
//! generator or the moderation classifier.

use super::regex::RegexPatterns;
use std::ops::RangeInclusive;

pub const DEFAULT_IMAGE_COUNT: u32 = 1;
pub const IMAGE_COUNT_RANGE: RangeInclusive<u32> = 1..=4;

/// Extract the image count directive from a prompt.
///
/// Returns the requested count (falling back to `default_n` when absent or
/// outside `range`) and the prompt with the directive removed and whitespace
/// runs collapsed.
pub fn parse_image_count(prompt: &str, default_n: u32, range: RangeInclusive<u32>) -> (u32, String) {
    let text = prompt.trim();
    if text.is_empty() {
        return (default_n, String::new());
    }

    let Some(caps) = RegexPatterns::count_directive().captures(text) else {
        return (default_n, text.to_string());
    };
    let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
        return (default_n, text.to_string());
    };

    let count = digits
        .as_str()
        .parse::<u32>()
        .ok()
        .filter(|n| range.contains(n))
        .unwrap_or(default_n);

    let joined = format!("{} {}", &text[..whole.start()], &text[whole.end()..]);
    let cleaned = RegexPatterns::whitespace_run()
        .replace_all(joined.trim(), " ")
        .into_owned();
    (count, cleaned)
}

/// Strip control directives from an image prompt.
pub fn normalize_image_prompt(prompt: &str) -> String {
    parse_image_count(prompt, DEFAULT_IMAGE_COUNT, IMAGE_COUNT_RANGE)
        .1
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests;
