mod backup;
mod calc;
mod config;
mod db;
mod ipc;
mod legacy;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use config::AppConfig;
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "marksd",
    about = "Mark calculation sidecar speaking JSON lines over stdio",
    version
)]
struct Cli {
    /// Workspace directory to open at startup
    #[arg(long)]
    workspace: Option<PathBuf>,
    /// Log filter, e.g. `info` or `marksd=debug`
    #[arg(long)]
    log_level: Option<String>,
    /// Default progressive-scaling factor (percent of the exam weight kept)
    #[arg(long, value_parser = config::parse_ps_factor)]
    ps_factor: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    if let Some(ws) = cli.workspace {
        config.workspace = Some(ws);
    }
    if let Some(level) = cli.log_level {
        config.telemetry.log_level = level;
    }
    if let Some(f) = cli.ps_factor {
        config.defaults.ps_factor = f;
    }
    telemetry::init(&config.telemetry)?;

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        defaults: config.defaults,
    };
    if let Some(ws) = config.workspace {
        let conn = db::open_db(&ws)
            .with_context(|| format!("failed to open workspace {}", ws.to_string_lossy()))?;
        tracing::info!(workspace = %ws.to_string_lossy(), "workspace opened");
        state.workspace = Some(ws);
        state.db = Some(conn);
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        ps_factor = state.defaults.ps_factor,
        "marksd ready"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                writeln!(stdout, "{}", resp)?;
                stdout.flush()?;
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        writeln!(stdout, "{}", resp)?;
        stdout.flush()?;
    }
    Ok(())
}
