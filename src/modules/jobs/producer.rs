use std::collections::{BTreeMap, HashSet};

use anyhow::{Result, bail};
use futures_util::StreamExt;
use lapin::{BasicProperties, options::BasicPublishOptions};
use serde_json::Value;
use tracing::{error, info};

use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::modules::jobs::message::JobMessage;
use crate::modules::jobs::source::SourceRef;

/// Messages per publish batch.
pub const BATCH_SIZE: usize = 50;
/// Concurrent batch senders.
pub const MAX_CONCURRENCY: usize = 50;

/// Destination and conversion settings shared by every job in a run.
#[derive(Debug, Clone)]
pub struct JobParams {
    pub bucket: String,
    pub prefix: String,
    pub profile_name: String,
    pub profile_options: BTreeMap<String, Value>,
    pub options: BTreeMap<String, Value>,
    pub allow_remote_read: bool,
    pub copy_valid_cog: bool,
}

/// Reject the whole run on the first invalid scheme or duplicate source,
/// before anything touches the network.
pub fn validate_sources(sources: &[String]) -> Result<()> {
    let invalid: Vec<&str> = sources
        .iter()
        .filter(|source| SourceRef::parse(source).is_err())
        .map(|source| source.as_str())
        .collect();
    if !invalid.is_empty() {
        bail!(
            "Schemes of {:?} are not valid, must be one of s3/http/https",
            invalid
        );
    }

    let mut seen = HashSet::new();
    let mut dupes: Vec<&str> = sources
        .iter()
        .map(|source| source.trim())
        .filter(|source| !seen.insert(*source))
        .collect();
    dupes.sort_unstable();
    dupes.dedup();
    if !dupes.is_empty() {
        bail!("Duplicated sources {:?} cannot be processed", dupes);
    }

    Ok(())
}

/// One message per source, in input order. Each job gets its own
/// destination key, `{prefix}/{source filename}`.
pub fn build_messages(sources: &[String], params: &JobParams) -> Result<Vec<JobMessage>> {
    validate_sources(sources)?;

    sources
        .iter()
        .map(|raw| {
            let source = SourceRef::parse(raw)?;
            Ok(JobMessage {
                src_path: source.as_str().to_string(),
                dst_bucket: params.bucket.clone(),
                dst_prefix: format!(
                    "{}/{}",
                    params.prefix.trim_end_matches('/'),
                    source.filename()?
                ),
                profile_name: params.profile_name.clone(),
                profile_options: params.profile_options.clone(),
                allow_remote_read: params.allow_remote_read,
                copy_valid_cog: params.copy_valid_cog,
                options: params.options.clone(),
            })
        })
        .collect()
}

pub fn chunk_messages(messages: Vec<JobMessage>, size: usize) -> Vec<Vec<JobMessage>> {
    messages
        .chunks(size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Fan the messages out onto the exchange in batches of [`BATCH_SIZE`],
/// with at most [`MAX_CONCURRENCY`] senders in flight. Batches are
/// independent: a failed batch is logged and counted, the rest keep going.
/// Returns the number of failed batches.
pub async fn publish_all(
    queue: &RabbitMqService,
    topic: &str,
    messages: Vec<JobMessage>,
) -> Result<usize> {
    let batches = chunk_messages(messages, BATCH_SIZE);
    let total = batches.len();

    let failed = futures_util::stream::iter(batches.into_iter().enumerate())
        .map(|(index, batch)| async move {
            let count = batch.len();
            match send_batch(queue, topic, &batch).await {
                Ok(()) => {
                    info!("📤 Batch {}/{} sent ({} messages)", index + 1, total, count);
                    0usize
                }
                Err(e) => {
                    error!("❌ Batch {}/{} failed: {}", index + 1, total, e);
                    1usize
                }
            }
        })
        .buffer_unordered(MAX_CONCURRENCY)
        .fold(0usize, |acc, failures| async move { acc + failures })
        .await;

    Ok(failed)
}

/// Publish one batch on its own channel.
async fn send_batch(
    queue: &RabbitMqService,
    topic: &str,
    batch: &[JobMessage],
) -> Result<()> {
    let channel = queue.batch_channel().await?;

    for message in batch {
        let payload = serde_json::to_vec(message)?;
        channel
            .basic_publish(
                topic,
                "",
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2), // Persistent
            )
            .await?
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::jobs::message::parse_job;

    fn params() -> JobParams {
        JobParams {
            bucket: "out".to_string(),
            prefix: "cogs".to_string(),
            profile_name: "webp".to_string(),
            profile_options: BTreeMap::new(),
            options: BTreeMap::new(),
            allow_remote_read: false,
            copy_valid_cog: false,
        }
    }

    fn sources(count: usize) -> Vec<String> {
        (0..count)
            .map(|index| format!("s3://in/scene-{:03}.tif", index))
            .collect()
    }

    #[test]
    fn invalid_scheme_rejects_the_whole_batch() {
        let sources = vec![
            "s3://in/a.tif".to_string(),
            "ftp://in/b.tif".to_string(),
            "https://in/c.tif".to_string(),
        ];

        let err = validate_sources(&sources).unwrap_err();
        assert!(err.to_string().contains("ftp://in/b.tif"));
        assert!(build_messages(&sources, &params()).is_err());
    }

    #[test]
    fn duplicate_sources_reject_the_whole_batch() {
        let sources = vec![
            "s3://in/a.tif".to_string(),
            "s3://in/b.tif".to_string(),
            "s3://in/a.tif".to_string(),
        ];

        let err = validate_sources(&sources).unwrap_err();
        assert!(err.to_string().contains("s3://in/a.tif"));
    }

    #[test]
    fn valid_unique_sources_pass() {
        assert!(validate_sources(&sources(10)).is_ok());
    }

    #[test]
    fn builds_one_message_per_source_in_order() {
        let sources = vec![
            "s3://in/a.tif".to_string(),
            "https://host/data/b.tif".to_string(),
        ];

        let messages = build_messages(&sources, &params()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].src_path, "s3://in/a.tif");
        assert_eq!(messages[0].dst_prefix, "cogs/a.tif");
        assert_eq!(messages[1].dst_prefix, "cogs/b.tif");
        assert_eq!(messages[1].dst_bucket, "out");
    }

    #[test]
    fn produced_messages_parse_back_identically() {
        let messages = build_messages(&sources(3), &params()).unwrap();
        for message in &messages {
            let payload = serde_json::to_string(message).unwrap();
            assert_eq!(&parse_job(&payload).unwrap(), message);
        }
    }

    #[test]
    fn chunks_of_120_are_50_50_20_and_disjoint() {
        let messages = build_messages(&sources(120), &params()).unwrap();
        let batches = chunk_messages(messages, BATCH_SIZE);

        let sizes: Vec<usize> = batches.iter().map(|batch| batch.len()).collect();
        assert_eq!(sizes, vec![50, 50, 20]);

        let mut seen = HashSet::new();
        for batch in &batches {
            for message in batch {
                assert!(seen.insert(message.src_path.clone()));
            }
        }
        assert_eq!(seen.len(), 120);
    }
}
