//! Usage and charges from the eloverblik.dk customer API.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::client::{HttpClient, Transport};
use crate::error::{Result, Stage};
use crate::flatten::{
    ChargesResponse, ResultStatus, TimeSeriesResponse, flatten_charges, flatten_time_series,
};
use crate::observer::SyncObserver;
use crate::records::{ChargeRecord, Resolution, TimeSeriesRecord};
use crate::sink::{Dataset, RecordSink};
use crate::window::{DateWindow, MAX_SPAN_DAYS};

pub const DEFAULT_URL: &str = "https://api.eloverblik.dk/CustomerApi/api/";

const METERING_POINTS_ENDPOINT: &str = "meteringpoints/meteringpoints";
const CHARGES_ENDPOINT: &str = "meteringpoints/meteringpoint/getcharges";

/// A consumption or production site the token has access to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeteringPoint {
    pub id: String,
    /// Every other field of the listing, stringified. Nulls become empty strings.
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, serde::Deserialize)]
struct MeteringPointsResponse {
    #[serde(default)]
    result: Vec<serde_json::Map<String, Value>>,
}

/// Body the data hub expects for per-meter queries.
fn meter_payload(meter_id: &str) -> Value {
    json!({ "meteringPoints": { "meteringPoint": [meter_id] } })
}

fn time_series_endpoint(window: &DateWindow, aggregation: Resolution) -> String {
    format!(
        "meterdata/gettimeseries/{}/{}/{}",
        window.start.format("%Y-%m-%d"),
        window.end.format("%Y-%m-%d"),
        aggregation.as_str()
    )
}

fn attribute_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Lists metering points in the order the data hub returns them.
pub fn list_metering_points<T: Transport>(client: &HttpClient<T>) -> Result<Vec<MeteringPoint>> {
    let response: MeteringPointsResponse = client
        .get(METERING_POINTS_ENDPOINT)
        .map_err(|e| e.in_stage(Stage::Fetch))?;

    let mut points = Vec::with_capacity(response.result.len());
    for mut fields in response.result {
        let id = match fields.remove("meteringPointId") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => {
                warn!("skipping metering point without meteringPointId");
                continue;
            }
        };
        let attributes = fields
            .iter()
            .map(|(key, value)| (key.clone(), attribute_text(value)))
            .collect();
        points.push(MeteringPoint { id, attributes });
    }
    info!(count = points.len(), "found metering point(s)");
    Ok(points)
}

/// Time series rows for one meter and one window. The window must already fit
/// the provider's span limit.
pub fn fetch_time_series<T: Transport>(
    client: &HttpClient<T>,
    meter_id: &str,
    window: &DateWindow,
    aggregation: Resolution,
) -> Result<Vec<TimeSeriesRecord>> {
    let response: TimeSeriesResponse = client
        .post(&time_series_endpoint(window, aggregation), &meter_payload(meter_id))
        .map_err(|e| e.in_stage(Stage::Fetch))?;
    warn_failed(meter_id, response.result.iter().map(|r| &r.status));
    Ok(flatten_time_series(meter_id, &response))
}

pub fn fetch_charges<T: Transport>(
    client: &HttpClient<T>,
    meter_id: &str,
) -> Result<Vec<ChargeRecord>> {
    let response: ChargesResponse = client
        .post(CHARGES_ENDPOINT, &meter_payload(meter_id))
        .map_err(|e| e.in_stage(Stage::Fetch))?;
    warn_failed(meter_id, response.result.iter().map(|r| &r.status));
    Ok(flatten_charges(meter_id, &response))
}

fn warn_failed<'a>(meter_id: &str, statuses: impl Iterator<Item = &'a ResultStatus>) {
    for status in statuses.filter(|s| s.is_failure()) {
        warn!(
            meter = meter_id,
            error_code = status.error_code,
            error_text = status.error_text.as_deref().unwrap_or(""),
            "data hub returned an unsuccessful result; skipping it"
        );
    }
}

/// Downloads usage for every meter over `range`, window by window, appending
/// each window's rows to `sink` as soon as it arrives. Returns rows written.
pub fn sync_usage<T, S, O>(
    client: &HttpClient<T>,
    meter_ids: &[String],
    range: &DateWindow,
    aggregation: Resolution,
    sink: &mut S,
    observer: &mut O,
) -> Result<u64>
where
    T: Transport,
    S: RecordSink<TimeSeriesRecord> + ?Sized,
    O: SyncObserver + ?Sized,
{
    let mut written = 0u64;
    for (index, meter_id) in meter_ids.iter().enumerate() {
        observer.meter_started(Dataset::Usage, meter_id, index, meter_ids.len());
        for window in range.split(MAX_SPAN_DAYS) {
            observer.window_started(meter_id, &window);
            let rows = fetch_time_series(client, meter_id, &window, aggregation)?;
            sink.append(&rows)?;
            written += rows.len() as u64;
            observer.window_completed(meter_id, &window, rows.len());
        }
    }
    observer.finished(Dataset::Usage, written);
    Ok(written)
}

/// Downloads charges for every meter, one request per meter.
pub fn sync_charges<T, S, O>(
    client: &HttpClient<T>,
    meter_ids: &[String],
    sink: &mut S,
    observer: &mut O,
) -> Result<u64>
where
    T: Transport,
    S: RecordSink<ChargeRecord> + ?Sized,
    O: SyncObserver + ?Sized,
{
    let mut written = 0u64;
    for (index, meter_id) in meter_ids.iter().enumerate() {
        observer.meter_started(Dataset::Charges, meter_id, index, meter_ids.len());
        let rows = fetch_charges(client, meter_id)?;
        sink.append(&rows)?;
        written += rows.len() as u64;
    }
    observer.finished(Dataset::Charges, written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn endpoint_and_payload_shapes() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
        )
        .unwrap();
        assert_eq!(
            time_series_endpoint(&window, Resolution::Hour),
            "meterdata/gettimeseries/2023-01-01/2023-02-01/Hour"
        );
        assert_eq!(
            meter_payload("571313100000000001"),
            json!({"meteringPoints": {"meteringPoint": ["571313100000000001"]}})
        );
    }

    #[test]
    fn attributes_are_stringified() {
        assert_eq!(attribute_text(&Value::Null), "");
        assert_eq!(attribute_text(&json!("E17")), "E17");
        assert_eq!(attribute_text(&json!(true)), "true");
        assert_eq!(attribute_text(&json!(42)), "42");
    }
}
