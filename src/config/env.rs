use std::env;

pub enum EnvKey {
    AmqpUrl,
    QueueName,
    AwsAccessKey,
    AwsSecretKey,
    AwsRegion,
    S3Endpoint,
    WorkDir,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::AmqpUrl => "AMQP_URL",
            EnvKey::QueueName => "QUEUE_NAME",
            EnvKey::AwsAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::AwsSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::AwsRegion => "AWS_REGION",
            EnvKey::S3Endpoint => "S3_ENDPOINT",
            EnvKey::WorkDir => "WORK_DIR",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok()
}
