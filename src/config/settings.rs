use crate::config::env::{self, EnvKey};

/// Worker configuration, read once at startup. The producer CLI only needs
/// `AMQP_URL` and reads it directly.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub amqp_url: String,
    pub queue_name: String,
    pub aws_access_key: String,
    pub aws_secret_key: String,
    pub aws_region: String,
    pub s3_endpoint: Option<String>,
    pub work_dir: String,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            amqp_url: env::get(EnvKey::AmqpUrl)?,
            queue_name: env::get(EnvKey::QueueName)?,
            aws_access_key: env::get(EnvKey::AwsAccessKey)?,
            aws_secret_key: env::get(EnvKey::AwsSecretKey)?,
            aws_region: env::get_or(EnvKey::AwsRegion, "us-east-1"),
            s3_endpoint: env::get_opt(EnvKey::S3Endpoint),
            work_dir: env::get_or(EnvKey::WorkDir, "/tmp"),
        })
    }
}
