// ████████╗ ██████╗ ███████╗    ██╗██████╗ ██████╗
// ╚══██╔══╝██╔═══██╗██╔════╝    ██║██╔══██╗██╔══██╗
//    ██║   ██║   ██║███████╗    ██║██║  ██║██████╔╝
//    ██║   ██║   ██║╚════██║    ╚═╝██║  ██║██╔══██╗
//    ██║   ╚██████╔╝███████║    ██╗██████╔╝██║  ██║
//    ╚═╝    ╚═════╝ ╚══════╝    ╚═╝╚═════╝ ╚═╝  ╚═╝
//
// H A R V E S T E R
//
// Somebody has to read the terms of service. It may as well be a
// rate-limited Rust binary with a gzip habit.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use tosdr_harvester::artifact::write_ndjson_gz;
use tosdr_harvester::{Config, EditSiteClient, TosdrClient};

#[derive(Debug, Parser)]
#[command(name = "tosdr-harvester", version, about = "Harvest ToS;DR data into .ndjson.gz files")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output file (must end in .ndjson.gz). Defaults to a file under TOSDR_OUTPUT_DIR.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Every service in the catalog, metadata only.
    ServicesMetadata,

    /// Full service records, points included.
    Services {
        /// Comma-separated service ids.
        #[arg(long, value_delimiter = ',', required_unless_present = "all", conflicts_with = "all")]
        ids: Vec<u64>,

        /// Fetch every service listed in the catalog.
        #[arg(long)]
        all: bool,
    },

    /// Every case in the catalog.
    Cases,

    /// Points scraped from the edit site's case pages.
    CasePoints {
        /// Comma-separated case ids. Defaults to every case in the catalog.
        #[arg(long, value_delimiter = ',')]
        case_ids: Vec<u64>,
    },
}

impl Command {
    fn default_file_name(&self) -> &'static str {
        match self {
            Command::ServicesMetadata => "all_services_metadata.ndjson.gz",
            Command::Services { all: true, .. } => "all_services.ndjson.gz",
            Command::Services { .. } => "services.ndjson.gz",
            Command::Cases => "all_cases.ndjson.gz",
            Command::CasePoints { .. } => "case_points.ndjson.gz",
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}

/// Run one command to completion and write its records to `output`.
async fn run(command: &Command, config: &Config, output: &Path) -> Result<usize> {
    let written = match command {
        Command::ServicesMetadata => {
            let api = TosdrClient::new(config)?;
            let services = api.get_all_services_metadata().await?;
            write_ndjson_gz(&services, output)?
        }
        Command::Services { ids, all } => {
            let api = TosdrClient::new(config)?;
            let ids = if *all {
                api.get_all_services_metadata()
                    .await?
                    .into_iter()
                    .map(|service| service.id)
                    .collect()
            } else {
                ids.clone()
            };
            let services = api.get_services(&ids).await?;
            write_ndjson_gz(&services, output)?
        }
        Command::Cases => {
            let api = TosdrClient::new(config)?;
            let cases = api.get_all_cases().await?;
            write_ndjson_gz(&cases, output)?
        }
        Command::CasePoints { case_ids } => {
            let case_ids = if case_ids.is_empty() {
                let api = TosdrClient::new(config)?;
                api.get_all_cases().await?.into_iter().map(|case| case.id).collect()
            } else {
                case_ids.clone()
            };
            let edit_site = EditSiteClient::new(config)?;
            let points = edit_site.get_case_points_many(&case_ids).await?;
            write_ndjson_gz(&points, output)?
        }
    };
    Ok(written)
}

// One thread is plenty: every task spends its life waiting on the network
// or the rate limiter.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(config.log_json);

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| config.output_dir.join(cli.command.default_file_name()));

    info!(
        command = ?cli.command,
        output = %output.display(),
        api = %config.api_base_url,
        edit_site = %config.edit_site_base_url,
        "📜 tosdr-harvester starting"
    );

    tokio::select! {
        result = run(&cli.command, &config, &output) => {
            let written = result
                .with_context(|| format!("harvest into {} failed", output.display()))?;
            info!(records = written, output = %output.display(), "✅ Harvest complete");
            Ok(())
        }
        _ = signal::ctrl_c() => {
            warn!("🛑 Interrupted, abandoning in-flight requests");
            anyhow::bail!("interrupted before {} was written", output.display())
        }
    }
}
