use dotenvy::dotenv;
use tracing::info;

use cogforge::config::settings::AppConfig;
use cogforge::infrastructure::queue::rabbitmq::RabbitMqService;
use cogforge::infrastructure::storage::s3::StorageService;
use cogforge::state::AppState;
use cogforge::workers::converter;

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting worker...");

    let config = match AppConfig::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Incomplete configuration: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match RabbitMqService::new(&config.amqp_url).await {
        Ok(queue) => queue,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let storage = StorageService::new(&config);
    let http = reqwest::Client::new();

    let state = AppState::new(config, queue, storage, http);

    converter::start_converter_worker(state).await
}
