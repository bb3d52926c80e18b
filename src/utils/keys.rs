use crate::utils::hash::short_hash;
use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};

pub const WALLPAPER_PREFIX: &str = "wallpapers";
pub const STAGING_PREFIX: &str = "staging";

const HASH_LEN: usize = 12;
const SUFFIX_LEN: usize = 6;

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// `wallpapers/<millis>_<hash><suffix>.<ext>`. The random suffix keeps keys
/// distinct for identical content generated in the same millisecond.
pub fn wallpaper_key(data: &[u8], extension: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}/{}_{}{}.{}",
        WALLPAPER_PREFIX,
        now.timestamp_millis(),
        short_hash(data, HASH_LEN),
        random_suffix(SUFFIX_LEN),
        extension
    )
}

pub fn staging_key(user_id: &str, extension: &str, now: DateTime<Utc>) -> String {
    let owner: String = user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!(
        "{}/{}/{}_{}.{}",
        STAGING_PREFIX,
        owner,
        now.timestamp_millis(),
        random_suffix(12),
        extension
    )
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime.split(';').next().unwrap_or("").trim() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

fn extension_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

/// Content sniffing first, then the reported type, then the source URL.
pub fn resolve_extension(data: &[u8], content_type: Option<&str>, source_url: &str) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.extension().to_string();
    }
    if let Some(ext) = content_type.and_then(extension_for_mime) {
        return ext.to_string();
    }
    extension_from_url(source_url).unwrap_or_else(|| "bin".to_string())
}

pub fn resolve_content_type(data: &[u8], reported: Option<&str>) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }
    reported
        .map(|s| s.to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}
