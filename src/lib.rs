//! Download Danish electricity data to CSV.
//!
//! Two providers are covered:
//! - the eloverblik.dk customer API (metering points, usage time series and
//!   charges), authenticated with a long-lived refresh token that is exchanged
//!   for a cached data access token;
//! - the energidataservice.dk `DeclarationEmissionHour` dataset, which is public
//!   and paged by offset.
//!
//! Requests go through a blocking client that retries busy responses (429/503)
//! a bounded number of times. Long date ranges are split into windows the data
//! hub accepts, and every window or page is appended to its CSV file as soon as
//! it arrives, so an aborted run keeps what it already fetched.
//!
//! ## Quick start
//! - Put your refresh token in `ELSYNC_TOKEN` or in a `.elsyncrc` file
//!   (`token: <token>`) in the current or home directory.
//! - Authenticate, then call one of the `sync_*` functions with a sink.
//!
//! ```no_run
//! use anyhow::Result;
//! use elsync::{
//!     Authenticator, CsvSink, Dataset, HttpClient, LogObserver, Resolution, TimeSeriesRecord,
//!     load_config, sync_usage, validate_range,
//! };
//!
//! fn main() -> Result<()> {
//!     let config = load_config(Default::default())?;
//!     let mut client = HttpClient::new(&config.client_config())?;
//!     let mut auth = Authenticator::new(config.credential_store(), config.require_token()?);
//!     auth.ensure_access_token(&mut client)?;
//!
//!     let today = chrono::Local::now().date_naive();
//!     let range = validate_range(Some("2022-01-01"), Some("2024-06-01"), today)?;
//!     let mut sink = CsvSink::<TimeSeriesRecord>::create(
//!         std::path::Path::new(Dataset::Usage.file_name()),
//!         &config.csv_options(),
//!     )?;
//!     let meters = vec!["571313100000000001".to_string()];
//!     sync_usage(&client, &meters, &range, Resolution::Hour, &mut sink, &mut LogObserver)?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod auth;
mod client;
mod config;
mod eloverblik;
mod emissions;
mod error;
mod flatten;
mod observer;
mod paginate;
mod records;
mod sink;
mod store;
mod util;
mod window;

pub mod observability;

pub use auth::Authenticator;
pub use client::{
    ApiRequest, ApiResponse, ClientConfig, DEFAULT_RETRY_DELAY, DEFAULT_RETRY_MAX,
    DEFAULT_TIMEOUT, HttpClient, ReqwestTransport, Transport, TransportError,
};
pub use config::{Config, Overrides, load_config};
pub use eloverblik::{
    MeteringPoint, fetch_charges, fetch_time_series, list_metering_points, sync_charges,
    sync_usage,
};
pub use emissions::{EmissionQuery, emission_pages, sync_emissions};
pub use error::{Error, FailureReason, Result, Stage};
pub use flatten::{ChargesResponse, TimeSeriesResponse, flatten_charges, flatten_time_series};
pub use observer::{LogObserver, ProgressObserver, SyncObserver};
pub use paginate::{Batch, DEFAULT_PAGE_SIZE, Page, Paginator};
pub use records::{
    ChargeRecord, ChargeType, Decimal, EmissionRecord, LOCAL_TZ, NumberFormat, Resolution, Row,
    TimeSeriesRecord,
};
pub use sink::{CsvOptions, CsvSink, Dataset, RecordSink};
pub use store::{
    Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore, TOKEN_TTL, is_fresh,
};
pub use window::{DateWindow, MAX_SPAN_DAYS, Windows, parse_date, split, validate_range};

/// Default URLs of the two providers.
pub mod endpoints {
    pub use crate::eloverblik::DEFAULT_URL as ELOVERBLIK_URL;
    pub use crate::emissions::DEFAULT_URL as EMISSIONS_URL;
}
