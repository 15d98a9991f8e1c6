//! RustStack S3 Inspect - dump the state of an S3 engine data directory.
//!
//! Boots an engine from the environment, rehydrating persisted bucket
//! metadata, and prints a JSON report of the configuration and every bucket
//! found. Bucket names given as arguments additionally list their current
//! keys.
//!
//! # Usage
//!
//! ```text
//! PERSISTENCE=1 DATA_DIR=/var/lib/ruststack/s3 ruststack-s3-inspect [BUCKET...]
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PERSISTENCE` | `false` | Read bucket metadata from `DATA_DIR/metadata` |
//! | `DATA_DIR` | `/var/lib/ruststack/s3` | Engine data directory |
//! | `S3_BLOB_BACKEND` | `memory` | Blob storage stack |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ruststack_s3_engine::service::{BucketInfo, BucketService};
use ruststack_s3_engine::token::ListParameters;
use ruststack_s3_engine::{EngineConfig, S3Engine};

/// Tool version reported in the output.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
/// Logs go to stderr so stdout stays valid JSON.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    version: &'static str,
    config: &'a EngineConfig,
    buckets: Vec<BucketInfo>,
    listings: Vec<Listing>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Listing {
    bucket: String,
    keys: Vec<String>,
}

/// Collect every current key of `bucket`, following continuation tokens.
fn list_all_keys(engine: &S3Engine, bucket: &str) -> Result<Vec<String>> {
    let params = ListParameters::default();
    let mut keys = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = engine
            .service()
            .list_objects(bucket, &params, token.as_deref())
            .with_context(|| format!("failed to list bucket {bucket}"))?;
        keys.extend(page.objects.into_iter().map(|o| o.key));
        match page.next_continuation_token {
            Some(next) => token = Some(next),
            None => return Ok(keys),
        }
    }
}

fn build_report<'a>(engine: &'a S3Engine, buckets: &[String]) -> Result<Report<'a>> {
    let listings = buckets
        .iter()
        .map(|bucket| {
            Ok(Listing {
                bucket: bucket.clone(),
                keys: list_all_keys(engine, bucket)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Report {
        version: VERSION,
        config: engine.config(),
        buckets: engine.bucket_summaries(),
        listings,
    })
}

fn main() -> Result<()> {
    let config = EngineConfig::from_env();
    init_tracing(&config.log_level)?;

    info!(
        data_dir = %config.data_dir.display(),
        persistence = config.persistence,
        backend = %config.blob_backend,
        version = VERSION,
        "inspecting RustStack S3 engine",
    );

    let engine = S3Engine::open(config).context("failed to open engine")?;
    let buckets: Vec<String> = std::env::args().skip(1).collect();
    let report = build_report(&engine, &buckets)?;

    let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
    println!("{json}");
    Ok(())
}
