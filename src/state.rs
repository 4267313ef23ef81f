use crate::config::settings::AppConfig;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::storage::s3::StorageService;

/// Long-lived client handles owned by the worker and passed explicitly
/// into the acquire/publish/queue operations.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub queue: RabbitMqService,
    pub storage: StorageService,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        queue: RabbitMqService,
        storage: StorageService,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            queue,
            storage,
            http,
        }
    }
}
