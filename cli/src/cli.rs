use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "beacon", version, about = "Nearby incidents and per-incident chat rooms")]
pub struct Cli {
    /// Directory for logs and `beacon_config.json`.
    #[arg(long, global = true, env = "BEACON_DATA_DIR", default_value = ".beacon")]
    pub data_dir: PathBuf,

    /// Machine-readable output.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// List incidents within the radius of a location.
    Nearby(NearbyArgs),
    /// Join an incident's room, post messages and print the feed.
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
pub struct IncidentInput {
    /// JSON array of report records.
    #[arg(long, conflicts_with = "incidents_url")]
    pub incidents_file: Option<PathBuf>,

    /// Reports endpoint (falls back to the config file when omitted).
    #[arg(long)]
    pub incidents_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct NearbyArgs {
    #[command(flatten)]
    pub input: IncidentInput,

    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Defaults to the configured radius.
    #[arg(long)]
    pub radius_km: Option<f64>,
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    #[command(flatten)]
    pub input: IncidentInput,

    /// Incident whose room to join.
    #[arg(long)]
    pub room: String,

    /// Author key (an email in practice).
    #[arg(long, env = "BEACON_AUTHOR_KEY")]
    pub author: String,

    #[arg(long, env = "BEACON_DISPLAY_NAME", default_value = "")]
    pub name: String,

    /// Message to post; repeatable.
    #[arg(long = "message", short = 'm')]
    pub messages: Vec<String>,

    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

pub fn render_err(json: bool, err: anyhow::Error) -> std::process::ExitCode {
    if json {
        let body = serde_json::json!({ "ok": false, "error": format!("{err:#}") });
        println!("{body}");
    } else {
        eprintln!("error: {err:#}");
    }
    std::process::ExitCode::FAILURE
}
