//! One-shot local run: `checkloop run --request <file>`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use checkloop::config::Config;
use checkloop::runtime::Runtime;
use checkloop::ui::{JsonLinesSink, RunUI};
use checkloop::workflow::EventSink;
use checkloop_common::{RunRequest, RunStatus};

pub fn load_request(path: &Path) -> Result<RunRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid run request: {}", path.display()))
}

pub async fn cmd_run(config: Config, request_path: &Path, json: bool, verbose: bool) -> Result<()> {
    let request = load_request(request_path)?;
    let max_iterations = request.config.max_iterations;

    let runtime = Arc::new(Runtime::build(config)?);
    let record = runtime.submit(request).await?;
    let run_id = record.run_id;
    tracing::info!(run_id = %run_id, "Starting run");

    let ui = (!json).then(|| Arc::new(RunUI::new(max_iterations, verbose)));

    // First Ctrl-C asks the engine to stop after the current step.
    let stopper = {
        let runtime = runtime.clone();
        let run_id = run_id.clone();
        let ui = ui.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                if let Some(ui) = &ui {
                    ui.stop_requested();
                }
                if let Err(e) = runtime.registry.request_stop(&run_id).await {
                    tracing::warn!(error = %e, "Failed to request stop");
                }
            }
        })
    };

    let outcome = match &ui {
        Some(ui) => runtime.drive(&run_id, ui.as_ref() as &dyn EventSink).await,
        None => runtime.drive(&run_id, &JsonLinesSink).await,
    };
    stopper.abort();

    let outcome = outcome?;
    match outcome.status {
        RunStatus::Failed => bail!("Run {} failed", run_id),
        status => {
            tracing::info!(run_id = %run_id, status = status.as_str(), "Run finished");
            Ok(())
        }
    }
}
