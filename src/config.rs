//! Environment-driven service configuration.

use std::env;
use std::path::PathBuf;

/// Runtime configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// S3 bucket receiving rendered artifacts
    pub s3_bucket: String,
    /// Directory for scratch render/postprocess files
    pub scratch_dir: PathBuf,
    /// Path to the headless rendering engine executable
    pub engine_binary: PathBuf,
    /// Entry point handed to the engine when bundling the composition catalog
    pub engine_entry: String,
    /// Maximum simultaneous heavy renders admitted
    pub max_concurrent_renders: usize,
    /// Hard deadline for a single engine invocation
    pub render_timeout_ms: u64,
    /// Hard deadline for a single ffmpeg/ffprobe invocation
    pub encode_timeout_ms: u64,
    /// Lifetime of presigned delivery URLs, in seconds
    pub presign_ttl_secs: u64,
    /// Age past which orphaned scratch files are purged
    pub scratch_max_age_ms: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            s3_bucket: env::var("S3_BUCKET").unwrap_or_else(|_| String::from("overture-renders")),
            scratch_dir: PathBuf::from(
                env::var("SCRATCH_DIR").unwrap_or_else(|_| String::from("/tmp/overture")),
            ),
            engine_binary: PathBuf::from(
                env::var("ENGINE_BINARY")
                    .unwrap_or_else(|_| String::from("/usr/local/bin/overture-engine")),
            ),
            engine_entry: env::var("ENGINE_ENTRY")
                .unwrap_or_else(|_| String::from("compositions/index.ts")),
            // A zero-permit gate would reject every render forever.
            max_concurrent_renders: parse_env("MAX_CONCURRENT_RENDERS", 1).max(1),
            render_timeout_ms: parse_env("RENDER_TIMEOUT_MS", 10 * 60 * 1000),
            encode_timeout_ms: parse_env("ENCODE_TIMEOUT_MS", 5 * 60 * 1000),
            presign_ttl_secs: parse_env("PRESIGN_TTL_SECS", 3600),
            scratch_max_age_ms: parse_env("SCRATCH_MAX_AGE_MS", 30 * 60 * 1000),
        }
    }
}

fn parse_env<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
