use aqicast_core::backfill::{BackfillOptions, BackfillOutcome, BackfillReport, BackfillRequest};
use anyhow::Context;
use aqicast_core::config::Settings;
use aqicast_core::dataset::sink::{FileSink, OutputFormat};
use aqicast_core::ingest::HttpFeedClient;
use aqicast_core::time::calendar;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod preview;

#[derive(Debug, Parser)]
#[command(name = "aqicast_worker")]
struct Args {
    /// Station name or id understood by the feed (e.g. "barcelona", "@7397").
    /// Defaults to AQI_LOCATION.
    #[arg(long, global = true)]
    location: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the current snapshot once per day in a date range and write it as one dataset.
    Backfill {
        /// First day of the range (YYYY-MM-DD).
        #[arg(long)]
        start_date: String,

        /// Last day of the range, inclusive (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        end_date: Option<String>,

        /// Output file format: csv or parquet.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,

        /// Output directory. Defaults to AQI_DATA_DIR.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Fetch once and print the flattened feature rows.
    Features {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Fetch once and print the raw payload.
    Fetch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let res = run(&settings, args).await;
    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        let detail = format!("{err:#}");
        tracing::error!(error = %detail, "run failed");
    }
    res
}

async fn run(settings: &Settings, args: Args) -> anyhow::Result<()> {
    let credential = settings.require_api_token()?.to_string();
    let location = args
        .location
        .unwrap_or_else(|| settings.location.clone());
    let client = HttpFeedClient::from_settings(settings)?;

    match args.command {
        Command::Backfill {
            start_date,
            end_date,
            format,
            data_dir,
        } => {
            let start_date = calendar::parse_date(&start_date)?;
            let end_date = match end_date.as_deref() {
                Some(s) => calendar::parse_date(s)?,
                None => calendar::today_utc(),
            };

            let sink = FileSink::new(
                data_dir.unwrap_or_else(|| settings.data_dir.clone()),
                format,
            );
            let request = BackfillRequest {
                start_date,
                end_date,
                location,
                credential,
            };
            let options = BackfillOptions {
                request_delay: settings.request_delay,
            };

            let outcome = aqicast_core::backfill::backfill(&client, &sink, &request, &options).await?;
            report_outcome(&outcome);
            println!("{}", report_json(outcome.report())?);
        }
        Command::Features { limit } => {
            preview::print_features(&client, &location, &credential, limit).await?;
        }
        Command::Fetch => {
            preview::print_raw(&client, &location, &credential).await?;
        }
    }

    Ok(())
}

fn report_outcome(outcome: &BackfillOutcome) {
    let report = outcome.report();
    let skipped: Vec<String> = report
        .failures
        .iter()
        .map(|f| format!("{} ({})", f.date, f.kind))
        .collect();

    match outcome {
        BackfillOutcome::Written { receipt, .. } => tracing::info!(
            run_id = %report.run_id,
            path = %receipt.path.display(),
            rows = receipt.rows,
            ok_days = report.successes.len(),
            failed_days = report.failures.len(),
            ?skipped,
            "backfill complete"
        ),
        BackfillOutcome::NoData { .. } => tracing::warn!(
            run_id = %report.run_id,
            failed_days = report.failures.len(),
            ?skipped,
            "backfill complete: no data fetched"
        ),
    }
}

fn report_json(report: &BackfillReport) -> anyhow::Result<String> {
    serde_json::to_string_pretty(report).context("serializing backfill report")
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
