//! Core library for the `railcast` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Weather and disruption sources (Open-Meteo, NS)
//! - Daily feature aggregation and the prediction service client
//! - The `Outlook` service tying them together
//!
//! It is used by `railcast-cli`, but can also back other front ends.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod disruption;
pub mod error;
pub mod model;
pub mod outlook;
pub mod predict;
pub mod weather;

#[cfg(test)]
mod test_server;

pub use aggregate::aggregate_daily;
pub use config::Config;
pub use disruption::{DisruptionSource, NsDisruptions, observed_minutes_on};
pub use error::{Error, Result};
pub use model::{
    DailyFeatureRow, DailyPrediction, DisruptionEvent, Forecast, HourlyTable, Location,
    OutlookReport, Prediction, PredictionRequest, WeatherFeature,
};
pub use outlook::Outlook;
pub use predict::{HttpTransport, PredictionClient};
pub use weather::{OpenMeteo, WeatherSource};

/// Build an [`Outlook`] wired to the real HTTP services described by `config`.
pub fn outlook_from_config(config: &Config) -> Result<Outlook> {
    let http = reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

    let predictor = PredictionClient::new(
        config.endpoints.clone(),
        Box::new(HttpTransport::new(config.timeout())?),
    )?;

    Ok(Outlook::new(
        Box::new(OpenMeteo::new(http.clone())),
        Box::new(NsDisruptions::new(http, config.ns_api_key.clone())),
        predictor,
        config.cache_ttl(),
    ))
}
