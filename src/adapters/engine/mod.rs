//! Production adapter for the headless rendering engine.
//!
//! The engine is consumed strictly as a subprocess: one invocation bundles
//! the composition catalog, one renders a composition to a local file. The
//! catalog is bundled once per process and cached; the bundle is read-only
//! afterwards and safe to share across requests.

use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::process::Command as TokioCommand;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::render::{CompositionDescriptor, RenderOverrides};
use crate::ports::engine::RenderEnginePort;

pub struct EngineAdapter {
    binary: PathBuf,
    entry: String,
    catalog: OnceCell<Vec<CompositionDescriptor>>,
}

impl EngineAdapter {
    pub fn new(binary: PathBuf, entry: String) -> Self {
        Self {
            binary,
            entry,
            catalog: OnceCell::new(),
        }
    }

    /// Bundle the catalog and list its compositions. Runs once per process.
    async fn load_catalog(&self) -> Result<Vec<CompositionDescriptor>, Box<dyn Error + Send + Sync>> {
        info!(entry = %self.entry, "Bundling composition catalog");

        let output = TokioCommand::new(&self.binary)
            .arg("compositions")
            .arg("--entry").arg(&self.entry)
            .arg("--json")
            .output()
            .await?;

        if !output.status.success() {
            return Err(format!(
                "engine catalog listing failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )
            .into());
        }

        let catalog: Vec<CompositionDescriptor> = serde_json::from_slice(&output.stdout)?;
        info!(compositions = catalog.len(), "Composition catalog loaded");
        Ok(catalog)
    }
}

#[async_trait]
impl RenderEnginePort for EngineAdapter {
    async fn compositions(
        &self,
    ) -> Result<Vec<CompositionDescriptor>, Box<dyn Error + Send + Sync>> {
        let catalog = self
            .catalog
            .get_or_try_init(|| self.load_catalog())
            .await?;
        Ok(catalog.clone())
    }

    async fn render(
        &self,
        composition: &CompositionDescriptor,
        input_props: &Value,
        overrides: RenderOverrides,
        output_path: &Path,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut command = TokioCommand::new(&self.binary);
        command
            .arg("render")
            .arg("--entry").arg(&self.entry)
            .arg("--composition").arg(&composition.id)
            .arg("--width").arg(overrides.width.to_string())
            .arg("--height").arg(overrides.height.to_string())
            .arg("--fps").arg(overrides.fps.to_string())
            .arg("--props").arg(input_props.to_string())
            .arg("--output").arg(output_path);
        if let Some(frames) = overrides.duration_in_frames {
            command.arg("--frames").arg(frames.to_string());
        }
        // Dropping the in-flight future on cancellation reaps the child.
        command.kill_on_drop(true);

        let rendering = command.output();
        tokio::pin!(rendering);

        let output = tokio::select! {
            result = &mut rendering => result?,
            _ = cancel.cancelled() => {
                return Err("render cancelled before the engine finished".into());
            }
        };

        if !output.status.success() {
            return Err(format!(
                "engine exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )
            .into());
        }
        Ok(())
    }

    async fn version(&self) -> String {
        match TokioCommand::new(&self.binary).arg("--version").output().await {
            Ok(out) if out.status.success() => {
                String::from_utf8_lossy(&out.stdout).trim().to_string()
            }
            _ => String::from("unknown"),
        }
    }
}
