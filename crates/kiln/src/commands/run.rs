//! Run a named task.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use kiln_pipeline::{BuildResult, DesktopNotifier, Notifier, PipelineRunner};
use kiln_server::{ReloadHub, TaskGraph};

use crate::config::Settings;

/// Run the task registered under `name`.
///
/// Per-file failures are logged and do not fail the command.
pub async fn run(settings: Settings, name: &str) -> Result<()> {
    let notifier: Arc<dyn Notifier> = Arc::new(DesktopNotifier);
    let runner = PipelineRunner::new(settings.pipeline, notifier)?;
    let graph = TaskGraph::new(Arc::new(runner), ReloadHub::new(), settings.server);

    let task = graph.named(name)?;
    tracing::debug!("Running {:?}", task);

    let start = Instant::now();
    let results = graph.run(&task).await?;

    report(&results);
    tracing::info!("Finished '{}' in {}ms", name, start.elapsed().as_millis());

    Ok(())
}

fn report(results: &[BuildResult]) {
    for result in results {
        if result.is_success() {
            tracing::info!(
                "{}: {} files in {}ms",
                result.asset_class,
                result.outputs.len(),
                result.duration_ms
            );
        } else {
            tracing::warn!(
                "{}: {} of {} files failed",
                result.asset_class,
                result.errors.len(),
                result.files.len()
            );
        }
    }
}
