use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};

use crate::error::{AttemptFailure, Error};

/// Hourly measurements that can be requested from the weather source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WeatherFeature {
    #[serde(rename = "temperature_2m", alias = "temperature")]
    Temperature,
    #[serde(rename = "relativehumidity_2m", alias = "humidity")]
    Humidity,
    #[serde(rename = "windspeed_10m", alias = "windspeed")]
    Windspeed,
    #[serde(rename = "rain")]
    Rain,
}

impl WeatherFeature {
    /// Column name used by the weather API and by derived daily columns.
    pub fn api_name(&self) -> &'static str {
        match self {
            WeatherFeature::Temperature => "temperature_2m",
            WeatherFeature::Humidity => "relativehumidity_2m",
            WeatherFeature::Windspeed => "windspeed_10m",
            WeatherFeature::Rain => "rain",
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            WeatherFeature::Temperature => "temperature",
            WeatherFeature::Humidity => "humidity",
            WeatherFeature::Windspeed => "windspeed",
            WeatherFeature::Rain => "rain",
        }
    }

    pub const fn all() -> &'static [WeatherFeature] {
        &[
            WeatherFeature::Temperature,
            WeatherFeature::Humidity,
            WeatherFeature::Windspeed,
            WeatherFeature::Rain,
        ]
    }

    /// Features the disruption model is trained on.
    pub const fn model_inputs() -> &'static [WeatherFeature] {
        &[WeatherFeature::Temperature, WeatherFeature::Rain]
    }
}

impl fmt::Display for WeatherFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

impl FromStr for WeatherFeature {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lower = value.trim().to_lowercase();

        WeatherFeature::all()
            .iter()
            .copied()
            .find(|f| f.api_name() == lower || f.short_name() == lower)
            .ok_or_else(|| {
                Error::config(format!(
                    "Unknown weather feature '{value}'. Supported features: temperature, humidity, windspeed, rain."
                ))
            })
    }
}

/// Reduction applied to an hourly feature when building daily rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Min,
    Max,
    Sum,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Sum => "sum",
        }
    }
}

/// `{feature}_{statistic}`, e.g. `temperature_2m_mean`.
pub fn column_name(feature: WeatherFeature, statistic: Statistic) -> String {
    format!("{}_{}", feature.api_name(), statistic.as_str())
}

/// The daily columns the model expects, in request order.
pub const MODEL_COLUMNS: [(WeatherFeature, Statistic); 4] = [
    (WeatherFeature::Temperature, Statistic::Mean),
    (WeatherFeature::Temperature, Statistic::Min),
    (WeatherFeature::Temperature, Statistic::Max),
    (WeatherFeature::Rain, Statistic::Sum),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, Error> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::config(format!(
                "Latitude {latitude} is outside the valid range -90..=90"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::config(format!(
                "Longitude {longitude} is outside the valid range -180..=180"
            )));
        }

        Ok(Self { latitude, longitude })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// Inclusive range of calendar dates; `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, Error> {
        if start > end {
            return Err(Error::config(format!(
                "Start date {start} must not be after end date {end}"
            )));
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyWeatherRow {
    pub time: NaiveDateTime,
    pub values: BTreeMap<WeatherFeature, Option<f64>>,
}

impl HourlyWeatherRow {
    pub fn value(&self, feature: WeatherFeature) -> Option<f64> {
        self.values.get(&feature).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyTable {
    pub features: Vec<WeatherFeature>,
    pub rows: Vec<HourlyWeatherRow>,
}

impl HourlyTable {
    pub fn has_feature(&self, feature: WeatherFeature) -> bool {
        self.features.contains(&feature)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentConditions {
    pub time: NaiveDateTime,
    pub temperature: f64,
    pub windspeed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub current: Option<CurrentConditions>,
    pub hourly: HourlyTable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyFeatureRow {
    pub date: NaiveDate,
    pub temperature_2m_mean: f64,
    pub temperature_2m_min: f64,
    pub temperature_2m_max: f64,
    pub rain_sum: f64,
}

/// Body sent to the prediction service: a daily row without its date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionRequest {
    pub temperature_2m_mean: f64,
    pub temperature_2m_min: f64,
    pub temperature_2m_max: f64,
    pub rain_sum: f64,
}

impl PredictionRequest {
    pub fn columns() -> Vec<String> {
        MODEL_COLUMNS
            .iter()
            .map(|(feature, stat)| column_name(*feature, *stat))
            .collect()
    }

    /// Values in the same order as [`PredictionRequest::columns`].
    pub fn values(&self) -> [f64; 4] {
        [
            self.temperature_2m_mean,
            self.temperature_2m_min,
            self.temperature_2m_max,
            self.rain_sum,
        ]
    }
}

impl From<&DailyFeatureRow> for PredictionRequest {
    fn from(row: &DailyFeatureRow) -> Self {
        Self {
            temperature_2m_mean: row.temperature_2m_mean,
            temperature_2m_min: row.temperature_2m_min,
            temperature_2m_max: row.temperature_2m_max,
            rain_sum: row.rain_sum,
        }
    }
}

// Keys come from `column_name` so they cannot drift from the aggregator.
impl Serialize for PredictionRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(MODEL_COLUMNS.len()))?;
        for (column, value) in Self::columns().iter().zip(self.values()) {
            map.serialize_entry(column, &value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Estimated total disruption minutes for the day.
    pub minutes: f64,
    /// Name of the candidate endpoint that answered.
    pub endpoint: String,
    #[serde(skip)]
    pub failed_attempts: Vec<AttemptFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisruptionEvent {
    pub id: String,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub cause: String,
}

impl DisruptionEvent {
    pub fn duration_minutes(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPrediction {
    pub features: DailyFeatureRow,
    pub prediction: Prediction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlookReport {
    pub generated_for: NaiveDate,
    pub location: Location,
    pub current: Option<CurrentConditions>,
    /// First forecast day, the headline figure.
    pub today: Option<DailyPrediction>,
    pub observed_minutes_today: f64,
    pub days: Vec<DailyPrediction>,
    #[serde(skip)]
    pub hourly: HourlyTable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_parses_short_and_api_names() {
        for feature in WeatherFeature::all() {
            assert_eq!(feature.api_name().parse::<WeatherFeature>().unwrap(), *feature);
            assert_eq!(feature.short_name().parse::<WeatherFeature>().unwrap(), *feature);
        }
        assert_eq!(" Rain ".parse::<WeatherFeature>().unwrap(), WeatherFeature::Rain);
    }

    #[test]
    fn unknown_feature_is_configuration_error() {
        let err = "snowfall".parse::<WeatherFeature>().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("Unknown weather feature 'snowfall'"));
    }

    #[test]
    fn location_rejects_out_of_range_coordinates() {
        assert!(Location::new(52.31, 4.94).is_ok());
        assert!(Location::new(-90.0, 180.0).is_ok());
        assert!(matches!(Location::new(90.5, 0.0), Err(Error::Configuration(_))));
        assert!(matches!(Location::new(0.0, -180.1), Err(Error::Configuration(_))));
        assert!(matches!(Location::new(f64::NAN, 0.0), Err(Error::Configuration(_))));
    }

    #[test]
    fn date_range_rejects_start_after_end() {
        let d = |s: &str| s.parse::<NaiveDate>().unwrap();

        let single = DateRange::new(d("2022-01-01"), d("2022-01-01")).unwrap();
        assert_eq!(single.start(), single.end());

        let err = DateRange::new(d("2022-12-31"), d("2022-01-01")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn request_keys_match_aggregated_column_names() {
        let row = DailyFeatureRow {
            date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            temperature_2m_mean: 4.0,
            temperature_2m_min: 2.0,
            temperature_2m_max: 6.0,
            rain_sum: 1.0,
        };

        let request = serde_json::to_value(PredictionRequest::from(&row)).unwrap();
        let row_json = serde_json::to_value(&row).unwrap();

        let object = request.as_object().unwrap();
        assert_eq!(object.len(), 4);
        for (feature, stat) in MODEL_COLUMNS {
            let key = column_name(feature, stat);
            assert_eq!(object.get(&key), row_json.get(&key), "column {key}");
        }
        assert_eq!(request["temperature_2m_mean"], 4.0);
        assert_eq!(request["rain_sum"], 1.0);
    }

    #[test]
    fn disruption_duration_in_minutes() {
        let t = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap();
        let event = DisruptionEvent {
            id: "1".into(),
            title: "Amsterdam - Utrecht".into(),
            start: t("2024-03-01T08:00"),
            end: t("2024-03-01T09:30"),
            cause: "storm".into(),
        };
        assert_eq!(event.duration_minutes(), 90.0);
    }
}
