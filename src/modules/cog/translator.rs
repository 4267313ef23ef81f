use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use bytes::Bytes;
use serde_json::Value;
use tempfile::Builder as TempFileBuilder;
use tokio::process::Command;
use tracing::debug;

use crate::common::error::JobError;
use crate::modules::cog::profiles;

/// The external raster-to-COG tool, invoked like any other conversion
/// binary. It must handle remote (s3/http) datasets itself.
const COGEO_BIN: &str = "rio";

/// GDAL configuration applied to every invocation.
const GDAL_CONFIG: [(&str, &str); 3] = [
    ("GDAL_NUM_THREADS", "ALL_CPUS"),
    ("GDAL_TIFF_INTERNAL_MASK", "TRUE"),
    ("GDAL_TIFF_OVR_BLOCKSIZE", "128"),
];

const OVERVIEW_BLOCKSIZE: &str = "128";

/// Transcode `src` into a COG and return the artifact as in-memory bytes.
///
/// The tool writes into a temp file inside `work_dir`; the file is read
/// back and removed on every exit path, so only the returned buffer makes
/// it to the publisher.
pub async fn translate(
    src: &str,
    profile_name: &str,
    creation_options: &BTreeMap<String, String>,
    options: &BTreeMap<String, Value>,
    work_dir: &Path,
) -> Result<Bytes, JobError> {
    let dst = TempFileBuilder::new()
        .prefix("cog-")
        .suffix(".tif")
        .tempfile_in(work_dir)?;

    let args = translate_args(src, dst.path(), profile_name, creation_options, options)?;
    run(&args).await?;

    let data = tokio::fs::read(dst.path()).await?;
    Ok(Bytes::from(data))
}

/// COG-validity predicate, delegated to the external tool.
pub async fn validate(src: &str) -> Result<bool, JobError> {
    let args = vec![
        "cogeo".to_string(),
        "validate".to_string(),
        src.to_string(),
    ];
    let output = spawn(&args).await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.contains("is a valid cloud optimized GeoTIFF") {
        return Ok(true);
    }
    if stdout.contains("NOT a valid cloud optimized GeoTIFF") {
        return Ok(false);
    }

    Err(JobError::Translate(
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
    ))
}

fn translate_args(
    src: &str,
    dst: &Path,
    profile_name: &str,
    creation_options: &BTreeMap<String, String>,
    options: &BTreeMap<String, Value>,
) -> Result<Vec<String>, JobError> {
    let mut args = vec![
        "cogeo".to_string(),
        "create".to_string(),
        src.to_string(),
        dst.display().to_string(),
        "-p".to_string(),
        profile_name.to_string(),
    ];

    for (key, value) in creation_options {
        args.push("--co".to_string());
        args.push(format!("{}={}", key, value));
    }

    // Free-form passthrough, NAME=VALUE rendered as --name value.
    for (key, value) in options {
        args.push(format!("--{}", key.replace('_', "-")));
        args.push(profiles::render_value(key, value)?);
    }

    args.push("--overview-blocksize".to_string());
    args.push(OVERVIEW_BLOCKSIZE.to_string());
    args.push("--no-in-memory".to_string()); // bounded memory
    args.push("--allow-intermediate-compression".to_string()); // bounded disk
    args.push("--quiet".to_string());

    Ok(args)
}

async fn run(args: &[String]) -> Result<(), JobError> {
    let output = spawn(args).await?;

    if !output.status.success() {
        return Err(JobError::Translate(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    Ok(())
}

async fn spawn(args: &[String]) -> Result<std::process::Output, JobError> {
    debug!("{} {}", COGEO_BIN, args.join(" "));

    let mut command = Command::new(COGEO_BIN);
    command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    for (key, value) in GDAL_CONFIG {
        command.env(key, value);
    }

    command
        .output()
        .await
        .map_err(|e| JobError::Translate(format!("failed to spawn {}: {}", COGEO_BIN, e)))
}
