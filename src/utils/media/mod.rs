//! Image and audio payload helpers shared by providers and channels.

use super::regex::RegexPatterns;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use std::collections::HashSet;

/// Raw base64 text shorter than this is not treated as an image.
const MIN_BARE_BASE64_LEN: usize = 64;

/// Decoded images smaller than this cannot carry a valid header.
const MIN_IMAGE_BYTES: usize = 16;

pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

pub fn is_data_image_url(url: &str) -> bool {
    let trimmed = url.trim();
    trimmed
        .get(..11)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:image/"))
        && trimmed.split_once(',').is_some_and(|(header, _)| {
            header.to_ascii_lowercase().ends_with(";base64")
        })
}

/// Remove whitespace inside the base64 payload of a data URI.
pub fn normalize_data_image_url(url: &str) -> String {
    if !is_data_image_url(url) {
        return url.to_string();
    }
    match url.trim().split_once(',') {
        Some((header, payload)) => {
            let payload: String = payload.split_whitespace().collect();
            format!("{},{}", header, payload)
        }
        None => url.to_string(),
    }
}

pub fn is_image_magic_bytes(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    // PNG: 89 50 4E 47
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return true;
    }
    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return true;
    }
    if data.starts_with(b"GIF8") {
        return true;
    }
    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return true;
    }
    false
}

/// Decode a `data:image/...;base64,` URI or a bare base64 image string.
///
/// Returns the mime type and image bytes, or `None` when the payload is not
/// decodable base64 or does not look like an image.
pub fn decode_image_data(data: &str) -> Option<(String, Vec<u8>)> {
    let raw = data.trim().trim_matches('"').trim_matches('\'');
    if raw.is_empty() {
        return None;
    }

    let mut mime = "image/png".to_string();
    let payload = if is_data_image_url(raw) {
        let (header, payload) = raw.split_once(',')?;
        if let Some(caps) = RegexPatterns::data_image_header().captures(header.trim()) {
            mime = caps[1].to_ascii_lowercase();
        }
        payload
    } else if raw
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("base64,"))
    {
        &raw[7..]
    } else {
        let allowed = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+/=_-".contains(c) || c.is_whitespace());
        if !allowed || raw.split_whitespace().map(str::len).sum::<usize>() < MIN_BARE_BASE64_LEN {
            return None;
        }
        raw
    };

    let mut payload: String = payload.split_whitespace().collect();
    if payload.is_empty() {
        return None;
    }
    let pad = (4 - payload.len() % 4) % 4;
    payload.extend(std::iter::repeat_n('=', pad));

    let bytes = STANDARD
        .decode(payload.as_bytes())
        .or_else(|_| URL_SAFE.decode(payload.as_bytes()))
        .ok()?;
    if bytes.len() < MIN_IMAGE_BYTES || !is_image_magic_bytes(&bytes) {
        return None;
    }
    Some((mime, bytes))
}

fn unique_keep_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Extract bare http(s) URLs, trimming trailing punctuation.
pub fn extract_http_urls(text: &str) -> Vec<String> {
    let urls = RegexPatterns::http_url()
        .find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}', '"', '\''])
                .to_string()
        })
        .filter(|url| is_http_url(url))
        .collect();
    unique_keep_order(urls)
}

fn unwrap_image_target(raw: &str) -> &str {
    let inside = raw.trim();
    if let Some(rest) = inside.strip_prefix('<')
        && let Some(end) = rest.find('>')
    {
        return rest[..end].trim();
    }
    inside
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches('"')
        .trim_matches('\'')
}

/// Collect image sources from free-form model output.
///
/// Recognizes markdown images, HTML `img` tags, inline data URIs, base64
/// payloads under common JSON keys and bare URLs. Order of first appearance
/// is preserved; duplicates are dropped.
pub fn extract_image_sources(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut sources = Vec::new();
    let mut push_source = |candidate: &str| {
        let item = candidate.trim().trim_matches('"').trim_matches('\'');
        if is_http_url(item) {
            sources.push(item.to_string());
        } else if is_data_image_url(item) {
            sources.push(normalize_data_image_url(item));
        }
    };

    for caps in RegexPatterns::markdown_image().captures_iter(text) {
        push_source(unwrap_image_target(&caps[1]));
    }
    for caps in RegexPatterns::html_img_src().captures_iter(text) {
        push_source(&caps[1]);
    }
    for m in RegexPatterns::data_image_uri().find_iter(text) {
        push_source(m.as_str());
    }
    for caps in RegexPatterns::json_base64_field().captures_iter(text) {
        let payload: String = caps[1].split_whitespace().collect();
        if !payload.is_empty() {
            sources.push(format!("data:image/png;base64,{}", payload));
        }
    }
    sources.extend(extract_http_urls(text));

    unique_keep_order(sources)
}

/// Guess the audio container from a Content-Type header, falling back to magic bytes.
pub fn guess_audio_extension(content_type: Option<&str>, data: &[u8]) -> &'static str {
    let ct = content_type.unwrap_or("").to_ascii_lowercase();
    if ct.contains("audio/mpeg") || ct.contains("audio/mp3") {
        return "mp3";
    }
    if ct.contains("audio/wav") || ct.contains("audio/x-wav") || ct.contains("audio/wave") {
        return "wav";
    }
    let head = &data[..data.len().min(16)];
    if head.starts_with(b"RIFF") && head.windows(4).any(|w| w == b"WAVE") {
        return "wav";
    }
    if head.starts_with(b"ID3") || (head.len() >= 2 && head[0] == 0xFF && (head[1] & 0xE0) == 0xE0)
    {
        return "mp3";
    }
    "wav"
}

pub fn audio_mime(extension: &str) -> &'static str {
    match extension {
        "mp3" => "audio/mpeg",
        _ => "audio/wav",
    }
}

/// File extension for an image mime type.
pub fn image_extension(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}
