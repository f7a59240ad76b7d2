//! Date-level reduction of hourly weather into model features.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::{
    error::{Error, Result},
    model::{DailyFeatureRow, HourlyTable, WeatherFeature},
};

#[derive(Debug, Default)]
struct DayAccumulator {
    temp_sum: f64,
    temp_count: usize,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    rain_sum: f64,
}

impl DayAccumulator {
    fn push_temperature(&mut self, value: f64) {
        self.temp_sum += value;
        self.temp_count += 1;
        self.temp_min = Some(self.temp_min.map_or(value, |m| m.min(value)));
        self.temp_max = Some(self.temp_max.map_or(value, |m| m.max(value)));
    }

    fn finish(self, date: NaiveDate) -> Result<DailyFeatureRow> {
        match (self.temp_min, self.temp_max) {
            (Some(min), Some(max)) if self.temp_count > 0 => Ok(DailyFeatureRow {
                date,
                temperature_2m_mean: self.temp_sum / self.temp_count as f64,
                temperature_2m_min: min,
                temperature_2m_max: max,
                rain_sum: self.rain_sum,
            }),
            _ => Err(Error::shape(
                "weather",
                format!("no temperature values for {date}"),
            )),
        }
    }
}

/// Group hourly rows by calendar date and reduce each date to
/// mean/min/max temperature and summed rain.
///
/// Rows are grouped by the naive date of their timestamp. Missing values are
/// skipped; rain treats them as zero. Output is sorted by date and contains
/// only dates that had at least one row.
pub fn aggregate_daily(table: &HourlyTable) -> Result<Vec<DailyFeatureRow>> {
    for required in WeatherFeature::model_inputs() {
        if !table.has_feature(*required) {
            return Err(Error::config(format!(
                "Daily aggregation needs '{required}' but the weather query did not include it"
            )));
        }
    }

    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();

    for row in &table.rows {
        let acc = days.entry(row.time.date()).or_default();
        if let Some(t) = row.value(WeatherFeature::Temperature) {
            acc.push_temperature(t);
        }
        if let Some(r) = row.value(WeatherFeature::Rain) {
            acc.rain_sum += r;
        }
    }

    days.into_iter()
        .map(|(date, acc)| acc.finish(date))
        .collect()
}
