use anyhow::{Result, anyhow};
use std::path::Path;

/// Wallpapers are raster images only
pub const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/avif",
    "image/bmp",
    "image/heic",
];

const MAX_TITLE_LEN: usize = 120;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates MIME type against the image allowlist, returning the normalized type
pub fn validate_image_type(content_type: &str) -> Result<String> {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if ALLOWED_IMAGE_TYPES.contains(&normalized.as_str()) {
        return Ok(normalized);
    }

    Err(anyhow!(ValidationError {
        code: "INVALID_MIME_TYPE",
        message: format!(
            "MIME type '{}' is not allowed. Only raster images are accepted.",
            content_type
        ),
    }))
}

/// Sanitizes filename to prevent path traversal and header injection
pub fn sanitize_filename(filename: &str) -> Result<String> {
    // Only the last path component survives; treat backslashes as separators too
    let normalized = filename.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        }));
    }

    if filename.contains("..") {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.starts_with('.') {
        return Err(anyhow!(ValidationError {
            code: "HIDDEN_FILE",
            message: "Hidden files (starting with '.') are not allowed".to_string(),
        }));
    }

    Ok(sanitized)
}

pub fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_TITLE",
            message: "Title cannot be empty".to_string(),
        }));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(anyhow!(ValidationError {
            code: "INVALID_TITLE",
            message: format!("Title cannot exceed {} characters", MAX_TITLE_LEN),
        }));
    }
    Ok(trimmed.to_string())
}

/// Full validation for a staged upload request: `(filename, content_type)`
pub fn validate_upload_request(filename: &str, content_type: &str) -> Result<(String, String)> {
    let filename = sanitize_filename(filename)?;
    let content_type = validate_image_type(content_type)?;
    Ok((filename, content_type))
}

/// Clean name a browser saves a wallpaper under, e.g. `Mountain_Sunset.jpg`
pub fn download_filename(title: &str, key: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() {
        "wallpaper".to_string()
    } else {
        stem
    };

    match Path::new(key).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}
