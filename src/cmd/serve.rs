//! HTTP control plane command: `checkloop serve`.

use std::sync::Arc;

use anyhow::Result;
use checkloop::config::Config;
use checkloop::runtime::Runtime;

pub async fn cmd_serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let report = config.validate();
    for warning in &report.warnings {
        tracing::warn!("{}", warning);
    }

    let runtime = Runtime::build(config)?;
    checkloop::server::start_server(Arc::new(runtime)).await
}
