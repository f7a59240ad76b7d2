//! Fetch, aggregate and predict in one place, for any presentation layer.

use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, info};

use crate::{
    aggregate::aggregate_daily,
    cache::TtlCache,
    disruption::{DisruptionSource, observed_minutes_on},
    error::Result,
    model::{
        DailyFeatureRow, DailyPrediction, DateRange, DisruptionEvent, Forecast, HourlyTable,
        Location, OutlookReport, PredictionRequest, WeatherFeature,
    },
    predict::PredictionClient,
    weather::WeatherSource,
};

#[derive(Debug)]
pub struct Outlook {
    weather: Box<dyn WeatherSource>,
    disruptions: Box<dyn DisruptionSource>,
    predictor: PredictionClient,
    forecasts: TtlCache<String, Forecast>,
    events: TtlCache<(), Vec<DisruptionEvent>>,
}

impl Outlook {
    pub fn new(
        weather: Box<dyn WeatherSource>,
        disruptions: Box<dyn DisruptionSource>,
        predictor: PredictionClient,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            weather,
            disruptions,
            predictor,
            forecasts: TtlCache::new(cache_ttl),
            events: TtlCache::new(cache_ttl),
        }
    }

    pub async fn forecast(&self, location: Location, features: &[WeatherFeature]) -> Result<Forecast> {
        let key = format!(
            "{location}|{}",
            features.iter().map(|f| f.api_name()).collect::<Vec<_>>().join(",")
        );

        if let Some(hit) = self.forecasts.get(&key) {
            debug!("forecast cache hit for {key}");
            return Ok(hit);
        }

        let forecast = self.weather.forecast(location, features).await?;
        self.forecasts.insert(key, forecast.clone());
        Ok(forecast)
    }

    /// Hourly archive data. The range is validated before any request is made.
    pub async fn history(
        &self,
        location: Location,
        start: NaiveDate,
        end: NaiveDate,
        features: &[WeatherFeature],
    ) -> Result<HourlyTable> {
        let range = DateRange::new(start, end)?;
        self.weather.historical(location, &range, features).await
    }

    pub async fn history_daily(
        &self,
        location: Location,
        start: NaiveDate,
        end: NaiveDate,
        features: &[WeatherFeature],
    ) -> Result<Vec<DailyFeatureRow>> {
        let table = self.history(location, start, end, features).await?;
        aggregate_daily(&table)
    }

    /// Forecast days with each day's own prediction.
    pub async fn predict_days(&self, location: Location) -> Result<Vec<DailyPrediction>> {
        let forecast = self.forecast(location, WeatherFeature::model_inputs()).await?;
        self.predict_rows(aggregate_daily(&forecast.hourly)?).await
    }

    async fn predict_rows(&self, rows: Vec<DailyFeatureRow>) -> Result<Vec<DailyPrediction>> {
        let mut out = Vec::with_capacity(rows.len());
        for features in rows {
            let prediction = self.predictor.predict(&PredictionRequest::from(&features)).await?;
            out.push(DailyPrediction { features, prediction });
        }
        Ok(out)
    }

    /// Inactive disruptions as reported by the operator, cached for the TTL.
    pub async fn disruption_events(&self) -> Result<Vec<DisruptionEvent>> {
        if let Some(hit) = self.events.get(&()) {
            debug!("disruption cache hit");
            return Ok(hit);
        }

        let events = self.disruptions.fetch_inactive().await?;
        info!("fetched {} disruption records", events.len());
        self.events.insert((), events.clone());
        Ok(events)
    }

    pub async fn observed_today(&self, today: NaiveDate) -> Result<f64> {
        let events = self.disruption_events().await?;
        Ok(observed_minutes_on(&events, today))
    }

    pub async fn report(&self, location: Location, today: NaiveDate) -> Result<OutlookReport> {
        let forecast = self.forecast(location, WeatherFeature::model_inputs()).await?;
        let days = self.predict_rows(aggregate_daily(&forecast.hourly)?).await?;
        let observed_minutes_today = self.observed_today(today).await?;

        let headline = days
            .iter()
            .find(|d| d.features.date == today)
            .or_else(|| days.first())
            .cloned();

        Ok(OutlookReport {
            generated_for: today,
            location,
            current: forecast.current,
            today: headline,
            observed_minutes_today,
            days,
            hourly: forecast.hourly,
        })
    }
}
