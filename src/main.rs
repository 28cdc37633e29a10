use std::env;

use abenteuer_contracts::{Context, SearchCriteria};
use abenteuer_kernel::{CancelSignal, PlanRequest};
use chrono::{NaiveDate, Utc};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage:
  mikroabenteuer serve --config <path>
  mikroabenteuer suggest --config <path> [--date YYYY-MM-DD] --criteria <json-file> [--notes <text>]";

const DEFAULT_LOG_FILTER: &str = "mikroabenteuer=info,abenteuer_server=info,abenteuer_kernel=info";

#[derive(Default)]
struct Args {
    config_path: Option<String>,
    date: Option<String>,
    criteria_path: Option<String>,
    notes: Option<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Args {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "--config" => &mut parsed.config_path,
            "--date" => &mut parsed.date,
            "--criteria" => &mut parsed.criteria_path,
            "--notes" => &mut parsed.notes,
            _ => continue,
        };
        if let Some(v) = args.next() {
            *slot = Some(v);
        }
    }
    parsed
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let cmd = args.next().unwrap_or_default();
    if cmd != "serve" && cmd != "suggest" {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }
    let args = parse_args(args);

    let config_path = args
        .config_path
        .clone()
        .unwrap_or_else(|| String::from("./config/example-config.yaml"));
    let cfg = match abenteuer_config::load_and_validate(&config_path) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    if cmd == "serve" {
        if let Err(e) = abenteuer_server::serve(cfg).await {
            eprintln!("server exited with error: {e}");
            std::process::exit(1);
        }
        return;
    }

    match suggest(&cfg, &args).await {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("suggest failed: {e}");
            std::process::exit(1);
        }
    }
}

async fn suggest(cfg: &abenteuer_config::Config, args: &Args) -> Result<String, String> {
    let criteria_path = args
        .criteria_path
        .as_deref()
        .ok_or_else(|| format!("--criteria is required\n{USAGE}"))?;
    let date = match args.date.as_deref() {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|e| format!("invalid --date {text}: {e}"))?,
        None => Utc::now().date_naive(),
    };

    let criteria_text = std::fs::read_to_string(criteria_path)
        .map_err(|e| format!("read {criteria_path}: {e}"))?;
    let criteria: SearchCriteria =
        serde_json::from_str(&criteria_text).map_err(|e| format!("invalid criteria: {e}"))?;
    let context = Context::new(date, criteria, None, None).map_err(|e| e.to_string())?;
    let mut request = PlanRequest::new(context);
    if let Some(notes) = &args.notes {
        request = request.with_notes(notes.clone());
    }

    let pipeline = abenteuer_server::build_pipeline(cfg)?;
    let outcome = pipeline.plan(&request, &CancelSignal::never()).await;
    serde_json::to_string_pretty(&outcome).map_err(|e| e.to_string())
}
