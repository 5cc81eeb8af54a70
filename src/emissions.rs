//! Hourly emission declarations from energidataservice.dk.

use chrono::NaiveDate;

use crate::client::{HttpClient, Transport};
use crate::error::Result;
use crate::observer::SyncObserver;
use crate::paginate::{DEFAULT_PAGE_SIZE, Paginator};
use crate::records::EmissionRecord;
use crate::sink::{Dataset, RecordSink};
use crate::window::DateWindow;

pub const DEFAULT_URL: &str = "https://api.energidataservice.dk/dataset/DeclarationEmissionHour";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub limit: u64,
    pub sort: String,
    pub timezone: String,
}

impl Default for EmissionQuery {
    fn default() -> Self {
        Self::complete()
    }
}

impl EmissionQuery {
    /// The whole dataset, oldest hour first.
    pub fn complete() -> Self {
        Self {
            start: None,
            end: None,
            limit: DEFAULT_PAGE_SIZE,
            sort: "HourUTC ASC".to_string(),
            timezone: "dk".to_string(),
        }
    }

    /// Hours from midnight of `window.start` up to midnight of `window.end`.
    pub fn period(window: &DateWindow) -> Self {
        Self {
            start: Some(window.start),
            end: Some(window.end),
            ..Self::complete()
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("sort".to_string(), self.sort.clone()),
            ("timezone".to_string(), self.timezone.clone()),
        ];
        if let Some(start) = self.start {
            params.push(("start".to_string(), format!("{}T00:00", start.format("%Y-%m-%d"))));
        }
        if let Some(end) = self.end {
            params.push(("end".to_string(), format!("{}T00:00", end.format("%Y-%m-%d"))));
        }
        params
    }

    /// Output file name; period downloads are prefixed with their dates.
    pub fn file_name(&self) -> String {
        match (self.start, self.end) {
            (Some(start), Some(end)) => format!(
                "{}_{}-{}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d"),
                Dataset::Emissions.file_name()
            ),
            _ => Dataset::Emissions.file_name().to_string(),
        }
    }
}

/// Lazily pages through the dataset, ascending by offset.
pub fn emission_pages<'a, T: Transport>(
    client: &'a HttpClient<T>,
    query: &EmissionQuery,
) -> Paginator<'a, T, EmissionRecord> {
    Paginator::new(client, "", query.params(), query.limit)
}

/// Appends every page to `sink` as it arrives. Returns rows written.
pub fn sync_emissions<T, S, O>(
    client: &HttpClient<T>,
    query: &EmissionQuery,
    sink: &mut S,
    observer: &mut O,
) -> Result<u64>
where
    T: Transport,
    S: RecordSink<EmissionRecord> + ?Sized,
    O: SyncObserver + ?Sized,
{
    let mut written = 0u64;
    for batch in emission_pages(client, query) {
        let batch = batch?;
        sink.append(&batch.records)?;
        written += batch.records.len() as u64;
        observer.page_fetched(batch.offset, batch.total, batch.records.len());
    }
    observer.finished(Dataset::Emissions, written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_query_has_no_bounds() {
        let query = EmissionQuery::complete();
        assert_eq!(
            query.params(),
            vec![
                ("sort".to_string(), "HourUTC ASC".to_string()),
                ("timezone".to_string(), "dk".to_string()),
            ]
        );
        assert_eq!(query.file_name(), "energidataservice_declarationemissionhour.csv");
    }

    #[test]
    fn period_query_adds_midnight_bounds() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        )
        .unwrap();
        let query = EmissionQuery::period(&window);
        let params = query.params();
        assert!(params.contains(&("start".to_string(), "2023-01-01T00:00".to_string())));
        assert!(params.contains(&("end".to_string(), "2023-01-31T00:00".to_string())));
        assert_eq!(query.limit, 5000);
        assert_eq!(
            query.file_name(),
            "2023-01-01_2023-01-31-energidataservice_declarationemissionhour.csv"
        );
    }
}
