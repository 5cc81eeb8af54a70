//! Provider envelopes and the functions that flatten them into rows.
//!
//! The data hub nests time series as result → document → series → period →
//! point, and charges as result → {fees, subscriptions, tariffs → prices}.
//! Each flatten function walks one of those shapes in document order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::records::{ChargeRecord, ChargeType, Decimal, TimeSeriesRecord, to_local};

/// Status fields the data hub attaches to every per-meter result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultStatus {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default, rename = "errorCode")]
    pub error_code: Option<i64>,
    #[serde(default, rename = "errorText")]
    pub error_text: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl ResultStatus {
    pub fn is_failure(&self) -> bool {
        self.success == Some(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeriesResponse {
    #[serde(default)]
    pub result: Vec<TimeSeriesResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeriesResult {
    #[serde(default, rename = "MyEnergyData_MarketDocument")]
    pub document: Option<MarketDocument>,
    #[serde(flatten)]
    pub status: ResultStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDocument {
    #[serde(default, rename = "TimeSeries")]
    pub time_series: Vec<TimeSeries>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeries {
    #[serde(default, rename = "mRID")]
    pub mrid: Option<String>,
    #[serde(default, rename = "Period")]
    pub periods: Vec<Period>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Period {
    /// ISO 8601 period code. Unknown codes are kept, not rejected.
    #[serde(deserialize_with = "string_or_empty")]
    pub resolution: String,
    #[serde(rename = "timeInterval")]
    pub time_interval: TimeInterval,
    #[serde(default, rename = "Point")]
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Point {
    #[serde(deserialize_with = "position")]
    pub position: u32,
    #[serde(default, rename = "out_Quantity.quantity")]
    pub quantity: Option<Decimal>,
    #[serde(default, rename = "out_Quantity.quality", deserialize_with = "string_or_empty")]
    pub quality: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargesResponse {
    #[serde(default)]
    pub result: Vec<ChargesResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargesResult {
    #[serde(default)]
    pub result: Option<ChargeSet>,
    #[serde(flatten)]
    pub status: ResultStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChargeSet {
    #[serde(default)]
    pub fees: Vec<Charge>,
    #[serde(default)]
    pub subscriptions: Vec<Charge>,
    #[serde(default)]
    pub tariffs: Vec<Tariff>,
}

/// Descriptive fields shared by fees, subscriptions and tariffs.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeInfo {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub owner: String,
    #[serde(default, rename = "validFromDate", deserialize_with = "string_or_empty")]
    pub valid_from: String,
    #[serde(default, rename = "validToDate")]
    pub valid_to: Option<String>,
    #[serde(default, rename = "periodType", deserialize_with = "string_or_empty")]
    pub period_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Charge {
    #[serde(flatten)]
    pub info: ChargeInfo,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tariff {
    #[serde(flatten)]
    pub info: ChargeInfo,
    #[serde(default)]
    pub prices: Vec<TariffPrice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffPrice {
    #[serde(deserialize_with = "position")]
    pub position: u32,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// One row per point, in document order. Results without a document are skipped.
pub fn flatten_time_series(meter_id: &str, response: &TimeSeriesResponse) -> Vec<TimeSeriesRecord> {
    let mut rows = Vec::new();
    for document in response.result.iter().filter_map(|r| r.document.as_ref()) {
        for series in &document.time_series {
            for period in &series.periods {
                let start = period.time_interval.start;
                let end = period.time_interval.end;
                rows.extend(period.points.iter().map(|point| TimeSeriesRecord {
                    meter_id: meter_id.to_string(),
                    resolution: period.resolution.clone(),
                    period_start_utc: start,
                    period_end_utc: end,
                    period_start_local: to_local(start),
                    period_end_local: to_local(end),
                    position: point.position,
                    quantity: point.quantity.clone(),
                    quality: point.quality.clone(),
                }));
            }
        }
    }
    rows
}

/// Fees, then subscriptions, then one row per tariff price point.
pub fn flatten_charges(meter_id: &str, response: &ChargesResponse) -> Vec<ChargeRecord> {
    let mut rows = Vec::new();
    for set in response.result.iter().filter_map(|r| r.result.as_ref()) {
        let flat = |charge_type: ChargeType, charge: &Charge| {
            charge_record(meter_id, charge_type, &charge.info, None, charge.price.as_ref(), charge.quantity.clone())
        };
        rows.extend(set.fees.iter().map(|c| flat(ChargeType::Fee, c)));
        rows.extend(set.subscriptions.iter().map(|c| flat(ChargeType::Subscription, c)));

        for tariff in &set.tariffs {
            rows.extend(tariff.prices.iter().map(|point| {
                charge_record(
                    meter_id,
                    ChargeType::Tariff,
                    &tariff.info,
                    Some(point.position),
                    point.price.as_ref(),
                    None,
                )
            }));
        }
    }
    rows
}

fn charge_record(
    meter_id: &str,
    charge_type: ChargeType,
    info: &ChargeInfo,
    position: Option<u32>,
    price: Option<&Decimal>,
    quantity: Option<Decimal>,
) -> ChargeRecord {
    ChargeRecord {
        meter_id: meter_id.to_string(),
        charge_type,
        name: info.name.clone(),
        description: info.description.clone(),
        owner: info.owner.clone(),
        valid_from: info.valid_from.clone(),
        valid_to: info.valid_to.clone(),
        period_type: info.period_type.clone(),
        position,
        price: price.cloned(),
        quantity,
    }
}

/// Positions arrive as `"1"` from the data hub but as `1` from some mirrors.
fn position<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    let value = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid position '{s}'")))?,
    };
    if value == 0 {
        return Err(serde::de::Error::custom("position must be 1 or greater"));
    }
    Ok(value)
}

fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
