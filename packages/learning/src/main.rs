use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use common::storage::BlobStore;
use common::storage::filesystem::FilesystemBlobStore;
use common::storage::s3::S3BlobStore;
use learning::config::{AppConfig, CacheBackend, StorageBackend, StorageConfig};
use learning::consumers::consume_service_messages;
use learning::database::init_db;
use learning::services::relay::{DisabledPublisher, MqPublisher, NotificationRelay, Publisher};
use learning::services::review::{MemoryReviewCache, RedisReviewCache, ReviewCache, ReviewService};
use learning::state::{AppState, LocalFiles};
use mq::{MqConfig, init_mq};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct Stores {
    classes: Arc<dyn BlobStore>,
    materials: Arc<dyn BlobStore>,
    local_files: Option<LocalFiles>,
}

async fn build_stores(config: &StorageConfig) -> anyhow::Result<Stores> {
    match config.backend {
        StorageBackend::Filesystem => {
            let root = PathBuf::from(&config.local_root);
            let mut buckets = Vec::with_capacity(2);
            for bucket in [&config.classes_bucket, &config.materials_bucket] {
                let store = FilesystemBlobStore::new(
                    root.clone(),
                    bucket,
                    &config.public_base_url,
                    &config.signing_secret,
                )
                .await
                .with_context(|| format!("Failed to prepare bucket {bucket}"))?;
                buckets.push(Arc::new(store));
            }
            let classes: Arc<dyn BlobStore> = buckets[0].clone();
            let materials: Arc<dyn BlobStore> = buckets[1].clone();
            Ok(Stores {
                classes,
                materials,
                local_files: Some(LocalFiles { buckets }),
            })
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .context("storage.s3 must be set when storage.backend = \"s3\"")?;
            Ok(Stores {
                classes: Arc::new(S3BlobStore::new(&config.classes_bucket, s3)?),
                materials: Arc::new(S3BlobStore::new(&config.materials_bucket, s3)?),
                local_files: None,
            })
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::load().context("Failed to load config")?;

    let db = init_db(&config.database.url)
        .await
        .context("Failed to connect to the database")?;
    info!("Database connected");

    let stores = build_stores(&config.storage).await?;
    info!(
        classes_bucket = %config.storage.classes_bucket,
        materials_bucket = %config.storage.materials_bucket,
        "Blob storage ready"
    );

    let cache: Arc<dyn ReviewCache> = match config.cache.backend {
        CacheBackend::Redis => Arc::new(
            RedisReviewCache::connect(&config.cache.url)
                .await
                .context("Failed to connect to the review cache")?,
        ),
        CacheBackend::Memory => Arc::new(MemoryReviewCache::new()),
    };

    let mq = if config.mq.enabled {
        let mq = init_mq(MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to initialize MQ")?;
        info!(queue_name = %config.mq.queue_name, "MQ connected");
        Some(Arc::new(mq))
    } else {
        warn!("MQ disabled, notifications will be dropped");
        None
    };

    let publisher: Arc<dyn Publisher> = match &mq {
        Some(mq) => Arc::new(MqPublisher::new(Arc::clone(mq))),
        None => Arc::new(DisabledPublisher),
    };
    let relay = NotificationRelay::new(publisher);
    let reviews = ReviewService::new(
        cache,
        relay.clone(),
        config.services.reviews.clone(),
        config.cache.review_ttl(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let queue_name = config.mq.queue_name.clone();
    let state = AppState {
        db,
        config: Arc::new(config),
        class_store: stores.classes,
        material_store: stores.materials,
        local_files: stores.local_files,
        reviews,
        relay,
    };

    let consumer = mq.map(|mq| {
        tokio::spawn(consume_service_messages(state.clone(), mq, queue_name))
    });

    let app = learning::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(consumer) = consumer {
        consumer.abort();
    }
    info!("Shut down");
    Ok(())
}
