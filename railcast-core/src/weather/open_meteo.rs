use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    error::{Error, Result, truncate_body},
    model::{
        CurrentConditions, DateRange, Forecast, HourlyTable, HourlyWeatherRow, Location,
        WeatherFeature,
    },
};

use super::WeatherSource;

pub const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/era5";

const ORIGIN: &str = "open-meteo";
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Open-Meteo client. No API key is needed.
#[derive(Debug, Clone)]
pub struct OpenMeteo {
    http: Client,
    forecast_url: String,
    archive_url: String,
}

impl OpenMeteo {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            forecast_url: FORECAST_URL.to_string(),
            archive_url: ARCHIVE_URL.to_string(),
        }
    }

    pub fn with_base_urls(mut self, forecast_url: &str, archive_url: &str) -> Self {
        self.forecast_url = forecast_url.to_string();
        self.archive_url = archive_url.to_string();
        self
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        debug!("GET {url} {query:?}");

        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| Error::Transport { url: url.to_string(), source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| Error::Transport { url: url.to_string(), source })?;

        if !status.is_success() {
            return Err(Error::Service {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl WeatherSource for OpenMeteo {
    async fn forecast(&self, location: Location, features: &[WeatherFeature]) -> Result<Forecast> {
        let mut query = base_query(location, features)?;
        query.push(("current_weather", "true".to_string()));

        let body = self.get(&self.forecast_url, &query).await?;
        parse_forecast(&body, features)
    }

    async fn historical(
        &self,
        location: Location,
        range: &DateRange,
        features: &[WeatherFeature],
    ) -> Result<HourlyTable> {
        let mut query = base_query(location, features)?;
        query.push(("start_date", range.start().format("%Y-%m-%d").to_string()));
        query.push(("end_date", range.end().format("%Y-%m-%d").to_string()));

        let body = self.get(&self.archive_url, &query).await?;
        let parsed: OmResponse = serde_json::from_str(&body)
            .map_err(|e| Error::shape(ORIGIN, format!("invalid JSON: {e}")))?;
        parse_hourly(parsed.hourly, features)
    }
}

fn base_query(location: Location, features: &[WeatherFeature]) -> Result<Vec<(&'static str, String)>> {
    if features.is_empty() {
        return Err(Error::config("Select at least one weather feature"));
    }

    let hourly = features
        .iter()
        .map(|f| f.api_name())
        .collect::<Vec<_>>()
        .join(",");

    Ok(vec![
        ("latitude", location.latitude.to_string()),
        ("longitude", location.longitude.to_string()),
        ("hourly", hourly),
    ])
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    time: String,
    temperature: f64,
    windspeed: f64,
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    hourly: Option<Map<String, Value>>,
    current_weather: Option<OmCurrent>,
}

pub(crate) fn parse_forecast(body: &str, features: &[WeatherFeature]) -> Result<Forecast> {
    let parsed: OmResponse = serde_json::from_str(body)
        .map_err(|e| Error::shape(ORIGIN, format!("invalid JSON: {e}")))?;

    let current = parsed
        .current_weather
        .map(|c| {
            Ok::<_, Error>(CurrentConditions {
                time: parse_time(&c.time)?,
                temperature: c.temperature,
                windspeed: c.windspeed,
            })
        })
        .transpose()?;

    Ok(Forecast {
        current,
        hourly: parse_hourly(parsed.hourly, features)?,
    })
}

fn parse_hourly(hourly: Option<Map<String, Value>>, features: &[WeatherFeature]) -> Result<HourlyTable> {
    let hourly = hourly.ok_or_else(|| Error::shape(ORIGIN, "response has no 'hourly' table"))?;

    let times = column(&hourly, "time")?
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| Error::shape(ORIGIN, format!("non-string time value {v}")))
                .and_then(parse_time)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut columns = Vec::with_capacity(features.len());
    for feature in features {
        let values = column(&hourly, feature.api_name())?;
        if values.len() != times.len() {
            return Err(Error::shape(
                ORIGIN,
                format!(
                    "column '{feature}' has {} values but 'time' has {}",
                    values.len(),
                    times.len()
                ),
            ));
        }
        columns.push((*feature, values));
    }

    let rows = times
        .into_iter()
        .enumerate()
        .map(|(i, time)| HourlyWeatherRow {
            time,
            values: columns
                .iter()
                .map(|(feature, values)| (*feature, values[i].as_f64()))
                .collect(),
        })
        .collect();

    Ok(HourlyTable { features: features.to_vec(), rows })
}

fn column<'a>(hourly: &'a Map<String, Value>, name: &str) -> Result<&'a Vec<Value>> {
    hourly
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::shape(ORIGIN, format!("hourly table is missing '{name}'")))
}

fn parse_time(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT)
        .map_err(|e| Error::shape(ORIGIN, format!("bad timestamp '{s}': {e}")))
}
