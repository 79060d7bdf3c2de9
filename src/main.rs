use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use overture::adapters::aws::s3::S3Adapter;
use overture::adapters::engine::EngineAdapter;
use overture::application::postprocess::PostprocessService;
use overture::application::render::RenderService;
use overture::config::ServiceConfig;
use overture::http::{self, AppState};
use overture::media::cmd::RealFfmpegRunner;

#[tokio::main]
async fn main() {
    let config = ServiceConfig::from_env();

    tracing_subscriber::fmt::init();

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let storage = S3Adapter::new(s3_client, config.s3_bucket.clone());

    let engine = EngineAdapter::new(config.engine_binary.clone(), config.engine_entry.clone());
    let ffmpeg = RealFfmpegRunner::new(Duration::from_millis(config.encode_timeout_ms));

    let render = RenderService::new(
        engine,
        storage.clone(),
        ffmpeg,
        config.max_concurrent_renders,
        config.scratch_dir.clone(),
        Duration::from_millis(config.render_timeout_ms),
    );
    let postprocess =
        PostprocessService::new(storage.clone(), ffmpeg, config.scratch_dir.clone());

    let addr = format!("{}:{}", config.addr, config.port);
    let state = Arc::new(AppState {
        render,
        postprocess,
        storage,
        ffmpeg,
        config,
    });

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind TCP listener");
    info!(%addr, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed to start");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
