use anyhow::{Context, Result};
use sightline_core::{assets, AnnotationSink, FaceDetector, FaceSource, Pipeline};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sightlined starting");

    let config = Config::from_env();
    tracing::info!(
        model_dir = %config.model_dir.display(),
        output_dir = %config.output_dir.display(),
        bind = %config.bind_addr,
        "configuration loaded"
    );

    if config.fetch_assets {
        let model_dir = config.model_dir.clone();
        let face_sha256 = config.face_model_sha256.clone();
        let paths = tokio::task::spawn_blocking(move || assets::provision(&model_dir, face_sha256.as_deref()))
            .await
            .context("asset provisioning task panicked")?;
        if paths.face_model != config.face_model_path {
            tracing::info!(
                path = %config.face_model_path.display(),
                "FACE_MODEL_PATH is outside MODEL_DIR; it is not fetched"
            );
        }
    } else {
        tracing::info!("asset fetch disabled via SKIP_ASSET_FETCH");
    }

    // Load models synchronously (fail-fast): no traffic is served with a partial model.
    let (classifier, labels) = sightline_core::load_classifier(&config.weights_path(), &config.labels_path())
        .context("failed to load classifier and labels")?;
    let detector = FaceDetector::load(&config.face_model_path, config.face_threshold)
        .context("failed to load face detector")?;

    let face_source = config.face_source();
    if let FaceSource::Reference(path) = &face_source {
        tracing::warn!(
            path = %path.display(),
            "face analysis uses a fixed reference image, not the uploaded image"
        );
    }

    let pipeline = Pipeline::new(
        classifier,
        labels,
        detector,
        AnnotationSink::new(&config.output_dir),
        face_source,
    )
    .context("classifier and label table disagree")?;

    let engine = engine::spawn_engine(pipeline, config.queue_depth)?;
    let router = http::create_router(http::AppState { engine });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "sightlined ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("sightlined shutting down");
        })
        .await?;

    Ok(())
}
