mod chat;
mod cli;
mod nearby;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use beacon_core::{
    load_app_config, parse_incident_records, AppConfig, HttpIncidentSource, Incident,
    IncidentSource,
};
use clap::Parser;

fn main() -> ExitCode {
    let args = cli::Cli::parse();

    let data_dir = args.data_dir.to_string_lossy().into_owned();
    beacon_core::init_logging(&data_dir);
    let config = load_app_config(&data_dir);

    let res = match args.cmd {
        cli::Cmd::Nearby(n) => nearby::nearby(&config, args.json, n),
        cli::Cmd::Chat(c) => chat::chat(&data_dir, &config, args.json, c),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => cli::render_err(args.json, e),
    }
}

/// File first, then an explicit URL, then the configured endpoint.
pub(crate) fn load_incidents(
    config: &AppConfig,
    input: &cli::IncidentInput,
) -> anyhow::Result<Vec<Incident>> {
    if let Some(path) = input.incidents_file.as_deref() {
        return read_incidents_file(path);
    }
    let url = input
        .incidents_url
        .as_deref()
        .or(config.incidents_url())
        .ok_or_else(|| anyhow!("no incident source: pass --incidents-file or --incidents-url"))?;
    if !config.network_enabled() {
        return Err(anyhow!("network disabled by config; use --incidents-file"));
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build runtime")?;
    let source = HttpIncidentSource::new(url);
    rt.block_on(source.fetch_active_incidents())
        .with_context(|| format!("fetch incidents from {url}"))
}

fn read_incidents_file(path: &Path) -> anyhow::Result<Vec<Incident>> {
    let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    parse_incident_records(&raw).with_context(|| format!("parse {}", path.display()))
}
