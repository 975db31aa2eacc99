//! Filename negotiation helpers for downloads.
//!
//! Derives a replacement filename from response headers: the
//! `Content-Disposition` filename parameter when present, otherwise an
//! extension looked up from the mime type. An optional allowlist policy
//! constrains the negotiated extension.

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};

/// Extension allowlist applied during negotiation.
///
/// Extensions outside the allowlist fall back to `fallback`. The comparison
/// is case-insensitive.
#[derive(Debug, Clone)]
pub struct ExtensionPolicy {
    allowed: Vec<String>,
    fallback: String,
}

impl ExtensionPolicy {
    /// Creates a policy from an allowlist and a fallback extension.
    #[must_use]
    pub fn new(allowed: &[&str], fallback: &str) -> Self {
        Self {
            allowed: allowed.iter().map(|ext| (*ext).to_string()).collect(),
            fallback: fallback.to_string(),
        }
    }

    /// Policy for gallery image downloads: common raster formats only.
    #[must_use]
    pub fn gallery_images() -> Self {
        Self::new(&["jpg", "jpeg", "png", "gif"], "jpg")
    }

    /// Resolves an extension candidate against the allowlist.
    ///
    /// A missing candidate also resolves to the fallback.
    #[must_use]
    pub fn apply(&self, candidate: Option<&str>) -> String {
        match candidate {
            Some(ext) if self.allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)) => {
                ext.to_string()
            }
            _ => self.fallback.clone(),
        }
    }
}

/// Splits a filename into base name and extension (without the dot).
pub(crate) fn split_name_extension(filename: &str) -> (String, Option<String>) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < filename.len() => (
            filename[..pos].to_string(),
            Some(filename[pos + 1..].to_string()),
        ),
        _ => (filename.to_string(), None),
    }
}

/// Parses a `key=value; key2="value2"` parameter list.
///
/// Keys are lowercased and values are stripped of surrounding quotes, the
/// way `Content-Disposition` parameters are conventionally written.
pub(crate) fn parse_param_map(raw: &str) -> Vec<(String, String)> {
    let mut map = Vec::new();
    for piece in raw.split(';') {
        let Some(index) = piece.find('=') else {
            continue;
        };
        let key = piece[..index].trim().to_lowercase();
        let mut value = piece[index + 1..].trim();
        if value.len() > 1 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        map.push((key, value.to_string()));
    }
    map
}

/// Extracts the filename parameter from a `Content-Disposition` header.
///
/// Percent-escapes in the value are decoded; a value that fails to decode
/// is used as-is.
pub(crate) fn disposition_filename(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    parse_param_map(raw)
        .into_iter()
        .find(|(key, _)| key == "filename")
        .map(|(_, value)| match urlencoding::decode(&value) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => value,
        })
}

/// Returns the mime part of the Content-Type header, without parameters.
///
/// `text/html; charset=ISO-8859-4` becomes `text/html`.
pub(crate) fn response_mime(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let mime = raw.split(';').next().unwrap_or(raw).trim();
    (!mime.is_empty()).then(|| mime.to_lowercase())
}

/// Standard extension lookup for mime types the engine encounters.
pub(crate) fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/bmp" => Some("bmp"),
        "text/html" => Some("html"),
        "text/plain" => Some("txt"),
        "application/json" => Some("json"),
        "application/xml" | "text/xml" => Some("xml"),
        "application/zip" => Some("zip"),
        "application/gzip" => Some("gz"),
        "application/pdf" => Some("pdf"),
        _ => None,
    }
}

/// Negotiates a filename from response headers.
///
/// Rules, in order:
/// 1. A `Content-Disposition` filename supplies both name and extension
///    candidates.
/// 2. Otherwise the mime type supplies an extension candidate via
///    [`extension_for_mime`].
/// 3. `fix_name` / `fix_extension` gate whether each candidate replaces the
///    original component; the policy (when present) constrains the final
///    extension.
pub(crate) fn negotiate_filename(
    headers: &HeaderMap,
    current: &str,
    fix_name: bool,
    fix_extension: bool,
    policy: Option<&ExtensionPolicy>,
) -> String {
    let (original_name, mut original_extension) = split_name_extension(current);

    let mut new_name = None;
    let mut new_extension = None;
    if let Some(suitable) = disposition_filename(headers) {
        let (name, extension) = split_name_extension(&suitable);
        new_name = Some(name);
        new_extension = extension;
    } else if let Some(mime) = response_mime(headers)
        && let Some(extension) = extension_for_mime(&mime)
    {
        original_extension = Some(extension.to_string());
    }

    let name = if fix_name {
        new_name.unwrap_or(original_name)
    } else {
        original_name
    };

    let extension = if fix_extension {
        let candidate = new_extension.or(original_extension);
        match policy {
            Some(policy) => Some(policy.apply(candidate.as_deref())),
            None => candidate,
        }
    } else {
        original_extension
    };

    match extension {
        Some(extension) => format!("{name}.{extension}"),
        None => name,
    }
}
