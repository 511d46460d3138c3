mod config;
mod service;

use crate::config::Config;
use anyhow::{bail, Result};
use service::GatewayService;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        bail!("Usage: skillweave-gateway \"<query>\"");
    }

    // Load configuration
    let config = Config::load()?;

    // Plan (and optionally run) the query
    let gateway = GatewayService::new(config);
    if gateway.run(query.trim()).await? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
