use regex::Regex;
use std::sync::LazyLock;

/// Compiled regex patterns that are reused across the codebase
pub struct RegexPatterns;

impl RegexPatterns {
    /// Regex for matching markdown bold (**text**)
    pub fn markdown_bold() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"\*\*(.*?)\*\*").expect("Failed to compile markdown bold regex")
        });
        &RE
    }

    /// Regex for matching markdown images (![alt](src))
    pub fn markdown_image() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").expect("Failed to compile markdown image regex")
        });
        &RE
    }

    /// Regex for matching HTML img tags and capturing their src
    pub fn html_img_src() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["'][^>]*>"#)
                .expect("Failed to compile html img regex")
        });
        &RE
    }

    /// Regex for matching inline data:image URIs
    pub fn data_image_uri() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?i)data:image/[a-z0-9.+-]+;base64,[A-Za-z0-9+/=\s]+")
                .expect("Failed to compile data uri regex")
        });
        &RE
    }

    /// Regex for the header part of a data:image URI, capturing the mime type
    pub fn data_image_header() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?i)^data:(image/[a-z0-9.+-]+);base64$")
                .expect("Failed to compile data uri header regex")
        });
        &RE
    }

    /// Regex for base64 payloads under common JSON image keys
    pub fn json_base64_field() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r#""(?:b64_json|base64|image_base64)"\s*:\s*"([A-Za-z0-9+/=\s]+)""#)
                .expect("Failed to compile json base64 regex")
        });
        &RE
    }

    /// Regex for bare http(s) URLs
    pub fn http_url() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r#"https?://[^\s<>()\[\]"']+"#).expect("Failed to compile url regex")
        });
        &RE
    }

    /// Regex for a standalone `n=<digits>` token
    pub fn count_directive() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?:^|\s)n=(\d+)(?:\s|$)").expect("Failed to compile count directive regex")
        });
        &RE
    }

    /// Regex for runs of two or more whitespace characters
    pub fn whitespace_run() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"\s{2,}").expect("Failed to compile whitespace regex")
        });
        &RE
    }

    /// Regex for the first-to-last brace span of a text
    pub fn json_object_span() -> &'static Regex {
        static RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("Failed to compile json span regex"));
        &RE
    }

    /// Regex for Feishu mention placeholders (`@_user_1`) in message text
    pub fn feishu_mention() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"@_user_\d+\s*").expect("Failed to compile feishu mention regex")
        });
        &RE
    }

    /// Regex for `nsfw: true` / `"nsfw"=true` style assignments (lowercased input)
    pub fn nsfw_true() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r#""?nsfw"?\s*[:=]\s*true"#).expect("Failed to compile nsfw regex")
        });
        &RE
    }

    /// Regex for `nsfw: false` / `"nsfw"=false` style assignments (lowercased input)
    pub fn nsfw_false() -> &'static Regex {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r#""?nsfw"?\s*[:=]\s*false"#).expect("Failed to compile nsfw regex")
        });
        &RE
    }
}
