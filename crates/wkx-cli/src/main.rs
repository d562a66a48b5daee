//! 🚀 wkx-cli — the front door of wikalytics.
//!
//! 🎬 *[narrator voice]* "It all started with a dashboard that wanted numbers..."
//! 📦 Thin wrapper: set up logging, parse args, load config, let `wkx::run`
//! do the heavy lifting, print what comes back. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::Table;
use serde_json::Value;
use tracing::error;
use tracing_subscriber::EnvFilter;

use wkx::client::ReportQuery;
use wkx::common::{FilterSpec, NormalisedResult, Row};
use wkx::filter::field_text;
use wkx::normalisers::NormaliserKind;
use wkx::permissions::Principal;
use wkx::{ReportSource, RunRequest};

/// 📊 Fetch an analytics report, normalise it, and print it.
#[derive(Debug, Parser)]
#[command(name = "wkx", version, about)]
struct Cli {
    /// TOML config file. Missing file = environment variables only.
    #[arg(long, short, default_value = "wkx.toml")]
    config: PathBuf,

    /// Which normaliser the report goes through.
    #[arg(value_enum)]
    report: ReportArg,

    /// API method to call, e.g. Actions.getPageUrls.
    #[arg(long, required_unless_present = "input", conflicts_with = "input")]
    method: Option<String>,

    /// Extra query parameter for the API call, key=value. Repeatable.
    #[arg(long = "param", value_parser = parse_pair)]
    params: Vec<(String, String)>,

    /// Normalise a payload from this file instead of calling the API.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Keep rows whose field contains the value, key=value. Repeatable; all must match.
    #[arg(long = "filter", value_parser = parse_pair)]
    filters: Vec<(String, String)>,

    /// Render the report for this user. Omit for the guest view.
    #[arg(long)]
    user: Option<String>,

    /// Print a table instead of JSON.
    #[arg(long)]
    table: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportArg {
    MostViewed,
    Visits,
}

impl From<ReportArg> for NormaliserKind {
    fn from(arg: ReportArg) -> Self {
        match arg {
            ReportArg::MostViewed => NormaliserKind::MostViewed,
            ReportArg::Visits => NormaliserKind::Visits,
        }
    }
}

fn parse_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing — RUST_LOG decides how chatty we are
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("Connection refused")
                || cause_str.contains("connection refused")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like the analytics server isn't reachable. \
                Double-check analytics.request_address and that the server is up. ☕"
            );
        }

        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    // 🔒 A missing config file is fine (env only). An unreadable path is not.
    let config_file = cli.config.as_path();
    let config_file = match config_file.try_exists().with_context(|| {
        format!("💀 Couldn't check whether the config file exists. Was checking here: '{}'", config_file.display())
    })? {
        true => Some(config_file),
        false => None,
    };
    let app_config = wkx::app_config::load_config(config_file)
        .context("💀 In wkx-cli, we couldn't load the configuration. Take a look at the file and the WKX_* variables.")?;

    let source = match (&cli.input, &cli.method) {
        (Some(path), _) => ReportSource::Inline(
            std::fs::read_to_string(path)
                .with_context(|| format!("💀 Couldn't read the report payload from '{}'", path.display()))?,
        ),
        (None, Some(method)) => ReportSource::Remote(
            cli.params
                .iter()
                .fold(ReportQuery::new(method.as_str()), |query, (key, value)| {
                    query.param(key.as_str(), value.as_str())
                }),
        ),
        (None, None) => anyhow::bail!("💀 Either --method or --input is needed. clap should have caught this."),
    };

    let request = RunRequest {
        kind: cli.report.into(),
        source,
        filters: cli.filters.into_iter().collect::<FilterSpec>(),
        principal: Principal::from_name(cli.user.as_deref()),
    };

    let the_result = wkx::run(app_config, request).await?;

    if cli.table {
        println!("{}", render_table(&the_result));
    } else {
        let the_json = serde_json::to_string_pretty(&the_result).context("💀 Couldn't serialise the result")?;
        println!("{the_json}");
    }

    Ok(())
}

/// 🍽️ One column per field (first-seen order), one line per row. Missing fields are blank.
fn render_table(result: &NormalisedResult) -> Table {
    let rows: Vec<&Row> = match result {
        NormalisedResult::Single(row) => vec![row],
        NormalisedResult::List(rows) => rows.iter().collect(),
    };

    let mut columns: Vec<&str> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key.as_str());
            }
        }
    }

    let mut table = Table::new();
    table.set_header(columns.iter().copied());
    for row in rows {
        table.add_row(columns.iter().map(|column| match row.get(*column) {
            Some(Value::Null) | None => String::new(),
            Some(value) => field_text(value).into_owned(),
        }));
    }
    table
}
