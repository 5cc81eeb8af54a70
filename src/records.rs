//! Flat row types written to the CSV files, and how values are rendered.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use serde_json::value::RawValue;

use crate::error::Error;

/// Zone the provider's customers live in; used for the `*_local` columns.
pub const LOCAL_TZ: Tz = chrono_tz::Europe::Copenhagen;

const UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// A decimal number kept in the exact text the provider sent.
///
/// Values never pass through floating point, so `0.1` stays `0.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal(String);

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.parse::<f64>().is_err() {
            return Err(Error::InvalidInput(format!("'{s}' is not a decimal number")));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    /// Accepts a JSON string or a bare JSON number and keeps its token verbatim,
    /// so `21.0` stays `21.0` and long fractions keep every digit.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        let token = raw.get().trim();
        if token.starts_with('"') {
            let text: String = serde_json::from_str(token).map_err(serde::de::Error::custom)?;
            text.parse().map_err(serde::de::Error::custom)
        } else {
            token.parse().map_err(serde::de::Error::custom)
        }
    }
}

/// How numbers are rendered in output rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub decimal_separator: char,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
        }
    }
}

impl NumberFormat {
    pub fn new(decimal_separator: char) -> Self {
        Self { decimal_separator }
    }

    pub fn decimal(&self, value: &Decimal) -> String {
        if self.decimal_separator == '.' {
            value.0.clone()
        } else {
            value.0.replace('.', &self.decimal_separator.to_string())
        }
    }

    pub fn optional(&self, value: Option<&Decimal>) -> String {
        value.map(|v| self.decimal(v)).unwrap_or_default()
    }
}

/// Bucketing of time series points. Also the `aggregation` path segment of a
/// time series request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Resolution {
    #[default]
    Actual,
    Quarter,
    Hour,
    Day,
    Month,
    Year,
}

impl Resolution {
    pub const ALL: [Resolution; 6] = [
        Self::Actual,
        Self::Quarter,
        Self::Hour,
        Self::Day,
        Self::Month,
        Self::Year,
    ];

    /// Name used in request URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actual => "Actual",
            Self::Quarter => "Quarter",
            Self::Hour => "Hour",
            Self::Day => "Day",
            Self::Month => "Month",
            Self::Year => "Year",
        }
    }

    /// ISO 8601 duration the provider reports on each period.
    pub fn period_code(&self) -> &'static str {
        match self {
            Self::Actual => "Actual",
            Self::Quarter => "PT15M",
            Self::Hour => "PT1H",
            Self::Day => "P1D",
            Self::Month => "P1M",
            Self::Year => "P1Y",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    /// Accepts both request names (`Hour`) and period codes (`PT1H`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s) || r.period_code() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown resolution '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeType {
    Fee,
    Subscription,
    Tariff,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fee => "fee",
            Self::Subscription => "subscription",
            Self::Tariff => "tariff",
        }
    }
}

/// Something that becomes one CSV row under a fixed header.
pub trait Row {
    const HEADER: &'static [&'static str];

    fn to_row(&self, format: &NumberFormat) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    pub meter_id: String,
    /// Period code as reported (`PT1H`, `PT15M`, ...), written through unchanged.
    pub resolution: String,
    pub period_start_utc: DateTime<Utc>,
    pub period_end_utc: DateTime<Utc>,
    pub period_start_local: DateTime<Tz>,
    pub period_end_local: DateTime<Tz>,
    pub position: u32,
    /// Empty when the data hub has no reading for the point.
    pub quantity: Option<Decimal>,
    pub quality: String,
}

impl Row for TimeSeriesRecord {
    const HEADER: &'static [&'static str] = &[
        "meter_id",
        "resolution",
        "timestart_utc",
        "timeend_utc",
        "timestart_local",
        "timeend_local",
        "point_position",
        "point_out_quantity",
        "point_out_quality",
    ];

    fn to_row(&self, format: &NumberFormat) -> Vec<String> {
        vec![
            self.meter_id.clone(),
            self.resolution.clone(),
            self.period_start_utc.format(UTC_FORMAT).to_string(),
            self.period_end_utc.format(UTC_FORMAT).to_string(),
            self.period_start_local.format(LOCAL_FORMAT).to_string(),
            self.period_end_local.format(LOCAL_FORMAT).to_string(),
            self.position.to_string(),
            format.optional(self.quantity.as_ref()),
            self.quality.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRecord {
    pub meter_id: String,
    pub charge_type: ChargeType,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub valid_from: String,
    pub valid_to: Option<String>,
    pub period_type: String,
    /// Only set for tariff price points.
    pub position: Option<u32>,
    pub price: Option<Decimal>,
    /// Only set for fees and subscriptions.
    pub quantity: Option<Decimal>,
}

impl Row for ChargeRecord {
    const HEADER: &'static [&'static str] = &[
        "meter_id",
        "chargetype",
        "name",
        "description",
        "owner",
        "validfromdate",
        "validtodate",
        "periodtype",
        "position",
        "price",
        "quantity",
    ];

    fn to_row(&self, format: &NumberFormat) -> Vec<String> {
        vec![
            self.meter_id.clone(),
            self.charge_type.as_str().to_string(),
            self.name.clone(),
            self.description.clone(),
            self.owner.clone(),
            self.valid_from.clone(),
            self.valid_to.clone().unwrap_or_default(),
            self.period_type.clone(),
            self.position.map(|p| p.to_string()).unwrap_or_default(),
            format.optional(self.price.as_ref()),
            format.optional(self.quantity.as_ref()),
        ]
    }
}

/// One hour of the emission declaration dataset, columns as published.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmissionRecord {
    #[serde(rename = "HourUTC")]
    pub hour_utc: String,
    #[serde(rename = "HourDK")]
    pub hour_dk: String,
    #[serde(default)]
    pub price_area: String,
    #[serde(default)]
    pub fuel_allocation_method: String,
    #[serde(default)]
    pub edition: String,
    #[serde(rename = "CO2originPerkWh", default)]
    pub co2_origin_per_kwh: Option<Decimal>,
    #[serde(rename = "CO2PerkWh", default)]
    pub co2_per_kwh: Option<Decimal>,
    #[serde(rename = "SO2PerkWh", default)]
    pub so2_per_kwh: Option<Decimal>,
    #[serde(rename = "NOxPerkWh", default)]
    pub nox_per_kwh: Option<Decimal>,
    #[serde(rename = "NMvocPerkWh", default)]
    pub nmvoc_per_kwh: Option<Decimal>,
    #[serde(rename = "CH4PerkWh", default)]
    pub ch4_per_kwh: Option<Decimal>,
    #[serde(rename = "COPerkWh", default)]
    pub co_per_kwh: Option<Decimal>,
    #[serde(rename = "N2OPerkWh", default)]
    pub n2o_per_kwh: Option<Decimal>,
    #[serde(rename = "ParticlesPerkWh", default)]
    pub particles_per_kwh: Option<Decimal>,
    #[serde(rename = "CoalFlyAshPerkWh", default)]
    pub coal_fly_ash_per_kwh: Option<Decimal>,
    #[serde(rename = "CoalSlagPerkWh", default)]
    pub coal_slag_per_kwh: Option<Decimal>,
    #[serde(rename = "DesulpPerkWh", default)]
    pub desulp_per_kwh: Option<Decimal>,
    #[serde(rename = "FuelGasWastePerkWh", default)]
    pub fuel_gas_waste_per_kwh: Option<Decimal>,
    #[serde(rename = "BioashPerkWh", default)]
    pub bioash_per_kwh: Option<Decimal>,
    #[serde(rename = "WasteSlagPerkWh", default)]
    pub waste_slag_per_kwh: Option<Decimal>,
    #[serde(rename = "RadioactiveWastePerkWh", default)]
    pub radioactive_waste_per_kwh: Option<Decimal>,
}

impl Row for EmissionRecord {
    const HEADER: &'static [&'static str] = &[
        "HourUTC",
        "HourDK",
        "PriceArea",
        "FuelAllocationMethod",
        "Edition",
        "CO2originPerkWh",
        "CO2PerkWh",
        "SO2PerkWh",
        "NOxPerkWh",
        "NMvocPerkWh",
        "CH4PerkWh",
        "COPerkWh",
        "N2OPerkWh",
        "ParticlesPerkWh",
        "CoalFlyAshPerkWh",
        "CoalSlagPerkWh",
        "DesulpPerkWh",
        "FuelGasWastePerkWh",
        "BioashPerkWh",
        "WasteSlagPerkWh",
        "RadioactiveWastePerkWh",
    ];

    fn to_row(&self, format: &NumberFormat) -> Vec<String> {
        let pollutants = [
            &self.co2_origin_per_kwh,
            &self.co2_per_kwh,
            &self.so2_per_kwh,
            &self.nox_per_kwh,
            &self.nmvoc_per_kwh,
            &self.ch4_per_kwh,
            &self.co_per_kwh,
            &self.n2o_per_kwh,
            &self.particles_per_kwh,
            &self.coal_fly_ash_per_kwh,
            &self.coal_slag_per_kwh,
            &self.desulp_per_kwh,
            &self.fuel_gas_waste_per_kwh,
            &self.bioash_per_kwh,
            &self.waste_slag_per_kwh,
            &self.radioactive_waste_per_kwh,
        ];

        let mut row = vec![
            self.hour_utc.clone(),
            self.hour_dk.clone(),
            self.price_area.clone(),
            self.fuel_allocation_method.clone(),
            self.edition.clone(),
        ];
        row.extend(pollutants.into_iter().map(|v| format.optional(v.as_ref())));
        row
    }
}

pub(crate) fn to_local(utc: DateTime<Utc>) -> DateTime<Tz> {
    utc.with_timezone(&LOCAL_TZ)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn decimal(json: &str) -> Decimal {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn decimals_keep_provider_text() {
        assert_eq!(decimal("\"0.123\"").as_str(), "0.123");
        assert_eq!(decimal("0.1").as_str(), "0.1");
        assert_eq!(decimal("42").as_str(), "42");
        assert_eq!(decimal("0.00001").as_str(), "0.00001");
        assert_eq!(decimal("21.0").as_str(), "21.0");
        assert_eq!(decimal("1.10").as_str(), "1.10");
        assert_eq!(
            decimal("0.12345678901234567891").as_str(),
            "0.12345678901234567891"
        );
        assert_eq!(decimal("\"21.00\"").as_str(), "21.00");
        assert!(serde_json::from_str::<Decimal>("true").is_err());
        assert!(serde_json::from_str::<Decimal>("\"abc\"").is_err());
        assert_eq!(serde_json::from_str::<Option<Decimal>>("null").unwrap(), None);
    }

    #[test]
    fn decimal_separator_is_applied_on_output() {
        let comma = NumberFormat::new(',');
        assert_eq!(comma.decimal(&decimal("\"1.25\"")), "1,25");
        assert_eq!(NumberFormat::default().decimal(&decimal("\"1.25\"")), "1.25");
        assert_eq!(comma.optional(None), "");
    }

    #[test]
    fn resolution_parses_names_and_codes() {
        assert_eq!("Hour".parse::<Resolution>().unwrap(), Resolution::Hour);
        assert_eq!("quarter".parse::<Resolution>().unwrap(), Resolution::Quarter);
        assert_eq!("PT1H".parse::<Resolution>().unwrap(), Resolution::Hour);
        assert_eq!("P1M".parse::<Resolution>().unwrap(), Resolution::Month);
        assert!("PT5M".parse::<Resolution>().is_err());
    }

    #[test]
    fn local_time_follows_daylight_saving() {
        let winter = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap();
        assert_eq!(
            to_local(winter).format(LOCAL_FORMAT).to_string(),
            "2024-01-10T13:00:00+01:00"
        );
        assert_eq!(
            to_local(summer).format(LOCAL_FORMAT).to_string(),
            "2024-07-10T14:00:00+02:00"
        );
    }

    #[test]
    fn charge_row_leaves_absent_fields_empty() {
        let record = ChargeRecord {
            meter_id: "571313100000000000".to_string(),
            charge_type: ChargeType::Tariff,
            name: "Nettarif".to_string(),
            description: String::new(),
            owner: "5790000000000".to_string(),
            valid_from: "2024-01-01T00:00:00".to_string(),
            valid_to: None,
            period_type: "P1D".to_string(),
            position: Some(3),
            price: Some(decimal("0.2")),
            quantity: None,
        };
        let row = record.to_row(&NumberFormat::new(','));
        assert_eq!(row.len(), ChargeRecord::HEADER.len());
        assert_eq!(row[6], "");
        assert_eq!(row[8], "3");
        assert_eq!(row[9], "0,2");
        assert_eq!(row[10], "");
    }

    #[test]
    fn emission_record_passthrough() {
        let record: EmissionRecord = serde_json::from_str(
            r#"{"HourUTC":"2023-01-01T00:00:00","HourDK":"2023-01-01T01:00:00",
                "PriceArea":"DK1","FuelAllocationMethod":"125%","Edition":"Production",
                "CO2originPerkWh":96.5,"CO2PerkWh":90,"SO2PerkWh":null}"#,
        )
        .unwrap();
        let row = record.to_row(&NumberFormat::default());
        assert_eq!(row.len(), EmissionRecord::HEADER.len());
        assert_eq!(&row[..5], ["2023-01-01T00:00:00", "2023-01-01T01:00:00", "DK1", "125%", "Production"]);
        assert_eq!(row[5], "96.5");
        assert_eq!(row[6], "90");
        assert_eq!(row[7], "");
        assert_eq!(row[20], "");
    }
}
