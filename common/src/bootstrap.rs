// Bootstrap utilities for binary initialization

use crate::config::Settings;
use crate::queue::{NatsClient, NatsConfig};
use crate::storage::MinioClient;
use crate::worker::{image_checker, Dependencies};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Connect to NATS and make sure the bucket notification stream exists
///
/// # Errors
/// Returns error if the connection cannot be established or the stream cannot be created
#[tracing::instrument(skip(settings))]
pub async fn init_nats_client(settings: &Settings) -> Result<NatsClient> {
    info!("Initializing NATS client");

    let nats_client = NatsClient::new(NatsConfig::from(&settings.nats))
        .await
        .context("Failed to initialize NATS client")?;

    nats_client
        .initialize_stream(image_checker::TOPIC)
        .await
        .context("Failed to initialize bucket notification stream")?;

    info!("NATS client initialized");
    Ok(nats_client)
}

/// Create the MinIO client and verify the bucket is reachable
///
/// # Errors
/// Returns error if the client cannot be built or the health check fails
#[tracing::instrument(skip(settings))]
pub async fn init_minio_client(settings: &Settings) -> Result<MinioClient> {
    info!("Initializing MinIO client");

    let minio_client = MinioClient::new(&settings.minio)
        .await
        .context("Failed to initialize MinIO client")?;

    minio_client
        .health_check()
        .await
        .context("MinIO health check failed")?;

    info!("MinIO client initialized");
    Ok(minio_client)
}

/// Initialize every client the workers share
///
/// # Errors
/// Returns error if any client fails to initialize
pub async fn init_dependencies(settings: &Settings) -> Result<Arc<Dependencies>> {
    let nats_client = init_nats_client(settings).await?;
    let minio_client = init_minio_client(settings).await?;

    Ok(Arc::new(Dependencies::new(
        Arc::new(nats_client),
        Arc::new(minio_client),
    )))
}
