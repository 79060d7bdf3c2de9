use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::domain::render::{CompositionDescriptor, RenderOverrides};

/// Outbound port for the headless visual-composition rendering engine.
///
/// The engine is a black box: it exposes a composition catalog and turns a
/// composition id plus an opaque input object into a local media file.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait RenderEnginePort: Send + Sync {
    /// The live composition catalog. The production adapter bundles once per
    /// process and caches; repeated calls are cheap.
    async fn compositions(&self)
        -> Result<Vec<CompositionDescriptor>, Box<dyn Error + Send + Sync>>;

    /// Render a composition into `output_path`. Honors `cancel` mid-flight;
    /// a cancelled render must surface an error mentioning cancellation.
    async fn render(
        &self,
        composition: &CompositionDescriptor,
        input_props: &Value,
        overrides: RenderOverrides,
        output_path: &Path,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Version string of the installed engine, best-effort.
    async fn version(&self) -> String;
}
