use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use tracing::{error, info};

use crate::common::error::JobError;
use crate::modules::cog::{profiles, translator};
use crate::modules::jobs::acquire::{self, AcquiredSource};
use crate::modules::jobs::message::{self, JobMessage};
use crate::modules::jobs::source::{Scheme, SourceRef};
use crate::state::AppState;

/// How many messages one receive call may drain.
const RECEIVE_BATCH: usize = 10;
/// Backoff when the queue comes back empty.
const EMPTY_POLL_BACKOFF: Duration = Duration::from_secs(30);
/// Floor between consecutive polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll the queue forever, processing one message at a time. Acked only
/// after the full pipeline succeeds; anything else leaves the message for
/// the broker to redeliver (at-least-once).
pub async fn start_converter_worker(state: AppState) {
    info!("🛰️ Starting COG converter worker...");

    let queue_name = state.config.queue_name.clone();

    // A queue that cannot be resolved is a configuration error, not
    // something to retry.
    match state.queue.ensure_queue(&queue_name).await {
        Ok(pending) => info!(
            "🛰️ Listening on '{}' ({} messages waiting)",
            queue_name, pending
        ),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }

    loop {
        let deliveries = match state.queue.receive(&queue_name, RECEIVE_BATCH).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                error!("Failed to receive messages: {}", e);
                Vec::new()
            }
        };

        let idle = deliveries.is_empty();
        for delivery in deliveries {
            handle_delivery(&state, delivery).await;
        }

        if idle {
            tokio::time::sleep(EMPTY_POLL_BACKOFF).await;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Settle one delivery: ack on success, requeue on any failure. Per-job
/// errors never take the worker down.
async fn handle_delivery(state: &AppState, delivery: Delivery) {
    let payload = String::from_utf8_lossy(&delivery.data).to_string();

    let outcome = match message::parse_job(&payload) {
        Ok(job) => {
            info!("📦 Received job for {}", job.src_path);
            process_job(state, &job).await.map(|_| job)
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(job) => {
            info!(
                "✅ Job completed: {} -> s3://{}/{}",
                job.src_path, job.dst_bucket, job.dst_prefix
            );
            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                error!("Failed to ack message: {}", e);
            }
        }
        Err(e) => {
            error!("❌ Job failed, leaving message for redelivery: {}", e);
            let requeue = BasicNackOptions {
                requeue: true,
                ..BasicNackOptions::default()
            };
            if let Err(e) = delivery.nack(requeue).await {
                error!("Failed to requeue message: {}", e);
            }
        }
    }
}

/// Acquire, decide, transform, publish. Cleanup of the working copy is
/// owned by the `AcquiredSource` guard on every exit path.
pub async fn process_job(state: &AppState, job: &JobMessage) -> Result<(), JobError> {
    let source = SourceRef::parse(&job.src_path)?;

    // Resolve the profile before touching the network.
    let creation_options = profiles::resolve_with_overrides(&job.profile_name, &job.profile_options)?;

    // 1. Acquire the source
    let acquired = acquire::acquire(state, &source, job.allow_remote_read).await?;
    let dataset = acquired.dataset();

    // 2. Copy or transcode, 3. Publish
    if job.copy_valid_cog && translator::validate(&dataset).await? {
        info!("📄 {} is already a valid COG, copying as-is", job.src_path);
        copy_source(state, job, &source, &acquired).await?;
    } else {
        let output = translator::translate(
            &dataset,
            &job.profile_name,
            &creation_options,
            &job.options,
            Path::new(&state.config.work_dir),
        )
        .await?;

        info!(
            "⬆️ Uploading {} bytes to s3://{}/{}",
            output.len(),
            job.dst_bucket,
            job.dst_prefix
        );
        state
            .storage
            .put_object(&job.dst_bucket, &job.dst_prefix, output)
            .await?;
    }

    Ok(())
}

/// Byte-identical copy of the source to the destination.
async fn copy_source(
    state: &AppState,
    job: &JobMessage,
    source: &SourceRef,
    acquired: &AcquiredSource,
) -> Result<(), JobError> {
    match acquired {
        AcquiredSource::Local(file) => {
            state
                .storage
                .upload_file(&job.dst_bucket, &job.dst_prefix, file.path())
                .await
        }
        AcquiredSource::Remote(url) => {
            let data = fetch_remote(state, source, url).await?;
            state
                .storage
                .put_object(&job.dst_bucket, &job.dst_prefix, data)
                .await
        }
    }
}

async fn fetch_remote(
    state: &AppState,
    source: &SourceRef,
    url: &str,
) -> Result<Bytes, JobError> {
    match source.scheme() {
        Scheme::S3 => {
            let (bucket, key) = source.s3_parts()?;
            state.storage.get_object_bytes(&bucket, &key).await
        }
        Scheme::Http | Scheme::Https => {
            let response = state
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| JobError::Download(e.to_string()))?
                .error_for_status()
                .map_err(|e| JobError::Download(e.to_string()))?;

            response
                .bytes()
                .await
                .map_err(|e| JobError::Download(e.to_string()))
        }
    }
}
