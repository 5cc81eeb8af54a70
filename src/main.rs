//! `elsync`: download eloverblik.dk usage and charges, and energidataservice.dk
//! emission declarations, to CSV files.
//!
//! Commands:
//! - `list`: print the metering points the refresh token has access to
//! - `get`: usage time series and charges for one or all metering points
//! - `emissions complete | period`: the hourly emission declaration dataset

use anyhow::{Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use elsync::{
    Authenticator, ChargeRecord, Config, CredentialStore, CsvSink, Dataset, DateWindow,
    EmissionQuery, EmissionRecord, HttpClient, LOCAL_TZ, LogObserver, Overrides,
    ProgressObserver, Resolution, SyncObserver, TimeSeriesRecord, list_metering_points,
    load_config, observability, sync_charges, sync_emissions, sync_usage, validate_range,
};

#[derive(Parser)]
#[command(
    name = "elsync",
    version,
    about = "Download Danish electricity usage, charges and emission data to CSV"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Discard the cached data access token and fetch a new one.
    #[arg(long, global = true, default_value_t = false)]
    refresh_token: bool,

    /// Directory the CSV files are written to.
    #[arg(long, global = true, default_value = ".")]
    output_dir: PathBuf,

    /// Decimal separator for numbers in the CSV output.
    #[arg(long, global = true)]
    decimal_separator: Option<char>,

    /// CSV field delimiter. Defaults to ';' when the decimal separator is ','.
    #[arg(long, global = true)]
    delimiter: Option<char>,

    /// Base URL of the eloverblik customer API.
    #[arg(long, global = true)]
    url: Option<String>,

    /// URL of the emission dataset.
    #[arg(long, global = true)]
    emissions_url: Option<String>,

    /// Refresh token from eloverblik.dk (otherwise ELSYNC_TOKEN or .elsyncrc).
    #[arg(long, global = true)]
    token: Option<String>,

    /// Where the data access token is cached.
    #[arg(long, global = true)]
    token_cache: Option<PathBuf>,

    /// Skip TLS certificate verification.
    #[arg(long, global = true, default_value_t = false)]
    insecure: bool,

    /// Log progress instead of drawing a progress bar.
    #[arg(long, global = true, default_value_t = false)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List metering points.
    List,
    /// Download usage and charges.
    Get {
        /// Only this metering point. Defaults to all listed metering points.
        #[arg(long)]
        meter_id: Option<String>,

        /// Actual, Quarter, Hour, Day, Month or Year.
        #[arg(long, default_value = "Actual")]
        aggregation: Resolution,

        /// First day (YYYY-MM-DD).
        #[arg(long)]
        from_date: Option<String>,

        /// Last day (YYYY-MM-DD), at most tomorrow.
        #[arg(long)]
        to_date: Option<String>,
    },
    /// Download hourly emission declarations.
    Emissions {
        #[command(subcommand)]
        mode: EmissionsMode,
    },
}

#[derive(Subcommand)]
enum EmissionsMode {
    /// The whole dataset.
    Complete,
    /// Hours between two dates.
    Period {
        /// First day (YYYY-MM-DD).
        #[arg(long)]
        from_date: Option<String>,

        /// Last day (YYYY-MM-DD).
        #[arg(long)]
        to_date: Option<String>,
    },
}

fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    let overrides = Overrides {
        url: cli.url.clone(),
        emissions_url: cli.emissions_url.clone(),
        token: cli.token.clone(),
        token_cache: cli.token_cache.clone(),
        decimal_separator: cli.decimal_separator,
        delimiter: cli.delimiter,
        verify: cli.insecure.then_some(false),
    };

    match &cli.command {
        Commands::List => {
            let config = load_config(overrides)?;
            run_list(&config, cli.refresh_token)
        }
        Commands::Get {
            meter_id,
            aggregation,
            from_date,
            to_date,
        } => {
            // Validate before touching configuration or the network.
            let range = validate_range(from_date.as_deref(), to_date.as_deref(), today())?;
            let config = load_config(overrides)?;
            let mut observer = observer(cli.no_progress);
            run_get(
                &config,
                &cli,
                meter_id.as_deref(),
                *aggregation,
                &range,
                observer.as_mut(),
            )
        }
        Commands::Emissions { mode } => {
            let query = match mode {
                EmissionsMode::Complete => EmissionQuery::complete(),
                EmissionsMode::Period { from_date, to_date } => {
                    let range =
                        validate_range(from_date.as_deref(), to_date.as_deref(), today())?;
                    EmissionQuery::period(&range)
                }
            };
            let config = load_config(overrides)?;
            let mut observer = observer(cli.no_progress);
            run_emissions(&config, &cli.output_dir, &query, observer.as_mut())
        }
    }
}

/// The current date in Denmark.
fn today() -> NaiveDate {
    Utc::now().with_timezone(&LOCAL_TZ).date_naive()
}

fn observer(no_progress: bool) -> Box<dyn SyncObserver> {
    if no_progress {
        Box::new(LogObserver)
    } else {
        Box::new(ProgressObserver::new())
    }
}

fn authenticate(config: &Config, refresh: bool) -> Result<HttpClient> {
    let mut client = HttpClient::new(&config.client_config())?;
    let mut auth = Authenticator::new(config.credential_store(), config.require_token()?);
    if refresh {
        info!(path = %config.token_cache.display(), "discarding cached data access token");
        auth.store_mut().clear()?;
    }
    auth.ensure_access_token(&mut client)?;
    Ok(client)
}

fn run_list(config: &Config, refresh: bool) -> Result<()> {
    let client = authenticate(config, refresh)?;
    let points = list_metering_points(&client)?;
    if points.is_empty() {
        bail!("no metering points found");
    }
    for point in &points {
        println!("{}", point.id);
        for (key, value) in &point.attributes {
            println!("  {key}: {value}");
        }
    }
    Ok(())
}

fn run_get(
    config: &Config,
    cli: &Cli,
    meter_id: Option<&str>,
    aggregation: Resolution,
    range: &DateWindow,
    observer: &mut dyn SyncObserver,
) -> Result<()> {
    let client = authenticate(config, cli.refresh_token)?;

    let meter_ids: Vec<String> = match meter_id {
        Some(id) => vec![id.trim().to_string()],
        None => list_metering_points(&client)?
            .into_iter()
            .map(|point| point.id)
            .collect(),
    };
    if meter_ids.is_empty() {
        bail!("no metering points found");
    }

    let options = config.csv_options();

    let usage_path = cli.output_dir.join(Dataset::Usage.file_name());
    let mut usage = CsvSink::<TimeSeriesRecord>::create(&usage_path, &options)?;
    let rows = sync_usage(&client, &meter_ids, range, aggregation, &mut usage, observer)?;
    info!(path = %usage_path.display(), rows, "usage written");

    let charges_path = cli.output_dir.join(Dataset::Charges.file_name());
    let mut charges = CsvSink::<ChargeRecord>::create(&charges_path, &options)?;
    let rows = sync_charges(&client, &meter_ids, &mut charges, observer)?;
    info!(path = %charges_path.display(), rows, "charges written");
    Ok(())
}

fn run_emissions(
    config: &Config,
    output_dir: &Path,
    query: &EmissionQuery,
    observer: &mut dyn SyncObserver,
) -> Result<()> {
    let client = HttpClient::new(&config.emissions_client_config())?;
    let path = output_dir.join(query.file_name());
    let mut sink = CsvSink::<EmissionRecord>::create(&path, &config.csv_options())?;
    let rows = sync_emissions(&client, query, &mut sink, observer)?;
    info!(path = %path.display(), rows, "emissions written");
    Ok(())
}
