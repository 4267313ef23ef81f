use std::collections::BTreeMap;

use serde_json::Value;

use crate::common::error::JobError;

/// Named output presets, mirroring the transcoder's own profile registry.
/// Every profile sits on a tiled 512x512 pixel-interleaved base.
pub const PROFILE_NAMES: [&str; 11] = [
    "jpeg",
    "webp",
    "zstd",
    "lzw",
    "deflate",
    "packbits",
    "lzma",
    "lerc",
    "lerc_deflate",
    "lerc_zstd",
    "raw",
];

fn base() -> BTreeMap<String, String> {
    [
        ("TILED", "TRUE"),
        ("BLOCKXSIZE", "512"),
        ("BLOCKYSIZE", "512"),
        ("INTERLEAVE", "PIXEL"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}

/// Resolve a profile name into its creation-option map.
pub fn resolve(name: &str) -> Result<BTreeMap<String, String>, JobError> {
    let compress = match name {
        "jpeg" => Some("JPEG"),
        "webp" => Some("WEBP"),
        "zstd" => Some("ZSTD"),
        "lzw" => Some("LZW"),
        "deflate" => Some("DEFLATE"),
        "packbits" => Some("PACKBITS"),
        "lzma" => Some("LZMA"),
        "lerc" => Some("LERC"),
        "lerc_deflate" => Some("LERC_DEFLATE"),
        "lerc_zstd" => Some("LERC_ZSTD"),
        "raw" => None,
        other => return Err(JobError::UnknownProfile(other.to_string())),
    };

    let mut profile = base();
    if let Some(compress) = compress {
        profile.insert("COMPRESS".to_string(), compress.to_string());
    }
    if name == "jpeg" {
        profile.insert("PHOTOMETRIC".to_string(), "YCBCR".to_string());
    }

    Ok(profile)
}

/// Resolve `name`, overlay the per-job overrides, and force the BIGTIFF
/// floor. A caller-supplied BIGTIFF is discarded: large outputs must never
/// silently fail for lack of 64-bit offsets.
pub fn resolve_with_overrides(
    name: &str,
    overrides: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, String>, JobError> {
    let mut profile = resolve(name)?;

    for (key, value) in overrides {
        let key = key.to_uppercase();
        if key == "BIGTIFF" {
            continue;
        }
        let rendered = render_value(&key, value)?;
        profile.insert(key, rendered);
    }

    profile.insert("BIGTIFF".to_string(), "IF_SAFER".to_string());
    Ok(profile)
}

/// Render a JSON scalar for the transcoder command line. Non-scalar values
/// have no sensible rendering and fail the job.
pub fn render_value(key: &str, value: &Value) -> Result<String, JobError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(true) => Ok("true".to_string()),
        Value::Bool(false) => Ok("false".to_string()),
        _ => Err(JobError::InvalidOption {
            key: key.to_string(),
        }),
    }
}
