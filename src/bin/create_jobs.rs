use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

use anyhow::{Context, Result, bail};
use clap::Parser;
use dotenvy::dotenv;
use serde_json::Value;
use tracing::{error, info};

use cogforge::config::env::{self, EnvKey};
use cogforge::infrastructure::queue::rabbitmq::RabbitMqService;
use cogforge::modules::cog::profiles;
use cogforge::modules::jobs::producer::{self, JobParams};

/// Feed the conversion queue with COG jobs.
#[derive(Parser, Debug)]
#[command(
    name = "create-jobs",
    about = "Fan a list of raster sources out as COG conversion jobs"
)]
struct Cli {
    /// Newline-delimited source list, '-' for stdin.
    #[arg(default_value = "-")]
    sources: String,

    /// Cloud-Optimized GeoTIFF output profile.
    #[arg(short = 'p', long = "cog-profile", default_value = "deflate")]
    cog_profile: String,

    /// Profile creation-option overrides (NAME=VALUE, repeatable).
    #[arg(long = "co", value_name = "NAME=VALUE")]
    creation_options: Vec<String>,

    /// Free-form transcoder options (NAME=VALUE, repeatable).
    #[arg(long = "op", alias = "options", value_name = "NAME=VALUE")]
    options: Vec<String>,

    /// Don't copy sources locally, let the transcoder read them remotely.
    #[arg(long)]
    allow_remote_read: bool,

    /// Pure copy when a source is already a valid COG.
    #[arg(long)]
    copy_valid_cog: bool,

    /// Output object-store bucket.
    #[arg(long)]
    bucket: String,

    /// Destination key prefix.
    #[arg(long, default_value = "cogs")]
    prefix: String,

    /// Fanout exchange the job messages are published to.
    #[arg(long)]
    topic: String,
}

fn read_sources(arg: &str) -> Result<Vec<String>> {
    let reader: Box<dyn BufRead> = if arg == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(
            File::open(arg).with_context(|| format!("cannot open {}", arg))?,
        ))
    };

    let mut sources = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            sources.push(trimmed.to_string());
        }
    }

    Ok(sources)
}

fn parse_key_values(pairs: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut map = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid NAME=VALUE pair '{}'", pair))?;
        map.insert(
            key.trim().to_string(),
            Value::String(value.trim().to_string()),
        );
    }
    Ok(map)
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Everything below must fail before the first network call.
    profiles::resolve(&cli.cog_profile)?;

    let sources = read_sources(&cli.sources)?;
    if sources.is_empty() {
        bail!("no sources given");
    }

    let params = JobParams {
        bucket: cli.bucket,
        prefix: cli.prefix,
        profile_name: cli.cog_profile,
        profile_options: parse_key_values(&cli.creation_options)?,
        options: parse_key_values(&cli.options)?,
        allow_remote_read: cli.allow_remote_read,
        copy_valid_cog: cli.copy_valid_cog,
    };

    let messages = producer::build_messages(&sources, &params)?;
    info!("Prepared {} job messages", messages.len());

    let amqp_url = env::get(EnvKey::AmqpUrl).context("AMQP_URL not set")?;
    let queue = RabbitMqService::new(&amqp_url).await?;

    let failed = producer::publish_all(&queue, &cli.topic, messages).await?;
    if failed > 0 {
        error!("{} batch(es) failed to publish", failed);
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
