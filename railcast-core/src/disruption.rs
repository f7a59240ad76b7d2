use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt::Debug;

use crate::{error::Result, model::DisruptionEvent};

pub mod ns;

pub use ns::NsDisruptions;

#[async_trait]
pub trait DisruptionSource: Send + Sync + Debug {
    /// All finished disruptions the operator still reports.
    async fn fetch_inactive(&self) -> Result<Vec<DisruptionEvent>>;
}

/// Events that started and ended on `today`.
///
/// An event crossing midnight matches neither of its dates and is left out.
pub fn events_on(events: &[DisruptionEvent], today: NaiveDate) -> Vec<&DisruptionEvent> {
    events
        .iter()
        .filter(|e| e.start.date() == today && e.end.date() == today)
        .collect()
}

/// Total minutes of disruptions on `today`, rounded to two decimals.
pub fn observed_minutes_on(events: &[DisruptionEvent], today: NaiveDate) -> f64 {
    let total: f64 = events_on(events, today)
        .into_iter()
        .map(DisruptionEvent::duration_minutes)
        .sum();

    (total * 100.0).round() / 100.0
}
