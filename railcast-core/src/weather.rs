use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::Result,
    model::{DateRange, Forecast, HourlyTable, Location, WeatherFeature},
};

pub mod open_meteo;

pub use open_meteo::OpenMeteo;

#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    /// Current conditions plus the hourly forecast for the coming days.
    async fn forecast(&self, location: Location, features: &[WeatherFeature]) -> Result<Forecast>;

    /// Hourly reanalysis values for every date in `range`.
    async fn historical(
        &self,
        location: Location,
        range: &DateRange,
        features: &[WeatherFeature],
    ) -> Result<HourlyTable>;
}
