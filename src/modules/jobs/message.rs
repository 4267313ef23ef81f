use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::error::JobError;

/// One unit of work: convert `src_path` into a COG and publish it to
/// `s3://{dst_bucket}/{dst_prefix}`. Immutable from creation until the
/// queue message is deleted.
///
/// Unknown keys are ignored so external publishers can attach metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    pub src_path: String,
    pub dst_bucket: String,
    pub dst_prefix: String,
    pub profile_name: String,
    /// Creation-option overrides overlaid on the named profile.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profile_options: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_remote_read: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub copy_valid_cog: bool,
    /// Free-form transcoder parameters, passed through verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Parse a queue payload into a [`JobMessage`].
///
/// A payload is either the raw message, or a notification envelope
/// (`{"Records": [{"body": ...}]}`) whose record body carries the message
/// under its `Message` key, itself either a JSON string or an inline
/// object. Exactly one envelope level is unwrapped.
pub fn parse_job(payload: &str) -> Result<JobMessage, JobError> {
    let value: Value = serde_json::from_str(payload)?;

    let inner = match value.get("Records").and_then(Value::as_array) {
        Some(records) => {
            let record = records
                .first()
                .ok_or_else(|| JobError::Envelope("empty Records".to_string()))?;

            let body = record
                .get("body")
                .and_then(Value::as_str)
                .ok_or_else(|| JobError::Envelope("record without a body".to_string()))?;
            let body: Value = serde_json::from_str(body)?;

            match body.get("Message") {
                Some(Value::String(raw)) => serde_json::from_str(raw)?,
                Some(other) => other.clone(),
                None => return Err(JobError::Envelope("body without a Message".to_string())),
            }
        }
        None => value,
    };

    Ok(serde_json::from_value(inner)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> JobMessage {
        JobMessage {
            src_path: "s3://b/in.tif".to_string(),
            dst_bucket: "out".to_string(),
            dst_prefix: "cogs/in.tif".to_string(),
            profile_name: "webp".to_string(),
            profile_options: BTreeMap::new(),
            allow_remote_read: false,
            copy_valid_cog: false,
            options: BTreeMap::new(),
        }
    }

    #[test]
    fn parses_raw_message_with_defaults() {
        let payload = json!({
            "src_path": "s3://b/in.tif",
            "dst_bucket": "out",
            "dst_prefix": "cogs/in.tif",
            "profile_name": "webp"
        })
        .to_string();

        let job = parse_job(&payload).unwrap();
        assert_eq!(job, sample());
        assert!(!job.allow_remote_read);
        assert!(!job.copy_valid_cog);
        assert!(job.profile_options.is_empty());
        assert!(job.options.is_empty());
    }

    #[test]
    fn enveloped_message_unwraps_to_identical_payload() {
        let raw = serde_json::to_string(&sample()).unwrap();
        let envelope = json!({
            "Records": [{ "body": json!({ "Message": raw }).to_string() }]
        })
        .to_string();

        assert_eq!(parse_job(&envelope).unwrap(), parse_job(&raw).unwrap());
    }

    #[test]
    fn envelope_accepts_inline_message_object() {
        let envelope = json!({
            "Records": [{
                "body": json!({ "Message": serde_json::to_value(sample()).unwrap() }).to_string()
            }]
        })
        .to_string();

        assert_eq!(parse_job(&envelope).unwrap(), sample());
    }

    #[test]
    fn envelope_without_message_is_rejected() {
        let envelope = json!({
            "Records": [{ "body": json!({ "Subject": "hi" }).to_string() }]
        })
        .to_string();

        assert!(matches!(
            parse_job(&envelope),
            Err(JobError::Envelope(_))
        ));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let payload = json!({
            "src_path": "https://h/x.tif",
            "dst_bucket": "out",
            "dst_prefix": "cogs/x.tif",
            "profile_name": "deflate",
            "published_by": "some-upstream-system"
        })
        .to_string();

        assert!(parse_job(&payload).is_ok());
    }

    #[test]
    fn false_flags_are_not_serialized() {
        let raw = serde_json::to_value(sample()).unwrap();
        assert!(raw.get("allow_remote_read").is_none());
        assert!(raw.get("copy_valid_cog").is_none());
        assert!(raw.get("profile_options").is_none());
    }

    #[test]
    fn option_values_keep_their_json_types() {
        let payload = json!({
            "src_path": "s3://b/in.tif",
            "dst_bucket": "out",
            "dst_prefix": "cogs/in.tif",
            "profile_name": "webp",
            "profile_options": { "QUALITY": 90 },
            "options": { "overview_resampling": "bilinear" }
        })
        .to_string();

        let job = parse_job(&payload).unwrap();
        assert_eq!(job.profile_options["QUALITY"], json!(90));
        assert_eq!(job.options["overview_resampling"], json!("bilinear"));
    }
}
