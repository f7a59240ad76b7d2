use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::{Error, Result, truncate_body},
    model::DisruptionEvent,
};

use super::DisruptionSource;

pub const DISRUPTIONS_URL: &str =
    "https://gateway.apiportal.ns.nl/reisinformatie-api/api/v3/disruptions";

const ORIGIN: &str = "ns";

/// NS reisinformatie disruptions endpoint.
#[derive(Debug, Clone)]
pub struct NsDisruptions {
    http: Client,
    api_key: Option<String>,
    url: String,
}

impl NsDisruptions {
    pub fn new(http: Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            url: DISRUPTIONS_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

#[async_trait]
impl DisruptionSource for NsDisruptions {
    async fn fetch_inactive(&self) -> Result<Vec<DisruptionEvent>> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::config(
                    "No NS subscription key configured.\n\
                     Hint: run `railcast configure` or set NS_APP_PRIMARY.",
                )
            })?;

        debug!("GET {}?isActive=false", self.url);

        let res = self
            .http
            .get(&self.url)
            .query(&[("isActive", "false")])
            .header("Cache-Control", "no-cache")
            .header("Ocp-Apim-Subscription-Key", api_key)
            .send()
            .await
            .map_err(|source| Error::Transport { url: self.url.clone(), source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| Error::Transport { url: self.url.clone(), source })?;

        if !status.is_success() {
            return Err(Error::Service {
                url: self.url.clone(),
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        parse_events(&body)
    }
}

#[derive(Debug, Deserialize)]
struct NsCause {
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NsTimespan {
    cause: Option<NsCause>,
}

#[derive(Debug, Deserialize)]
struct NsDisruption {
    id: Option<String>,
    title: Option<String>,
    start: Option<String>,
    end: Option<String>,
    #[serde(default)]
    timespans: Vec<NsTimespan>,
}

pub(crate) fn parse_events(body: &str) -> Result<Vec<DisruptionEvent>> {
    let raw: Vec<NsDisruption> = serde_json::from_str(body)
        .map_err(|e| Error::shape(ORIGIN, format!("expected an array of disruptions: {e}")))?;

    raw.into_iter().enumerate().map(|(i, d)| to_event(i, d)).collect()
}

fn to_event(index: usize, raw: NsDisruption) -> Result<DisruptionEvent> {
    let id = raw
        .id
        .ok_or_else(|| Error::shape(ORIGIN, format!("disruption #{index} has no id")))?;
    let missing = |field: &str| Error::shape(ORIGIN, format!("disruption {id} has no {field}"));

    let title = raw.title.ok_or_else(|| missing("title"))?;
    let start = parse_timestamp(raw.start.as_deref().ok_or_else(|| missing("start"))?)?;
    let end = parse_timestamp(raw.end.as_deref().ok_or_else(|| missing("end"))?)?;
    let cause = raw
        .timespans
        .into_iter()
        .next()
        .and_then(|t| t.cause)
        .and_then(|c| c.label)
        .ok_or_else(|| missing("timespans[0].cause.label"))?;

    Ok(DisruptionEvent { id, title, start, end, cause })
}

/// Wall-clock time in whatever offset the API reported.
fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Ok(dt.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| Error::shape(ORIGIN, format!("unrecognised timestamp '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{disruption::observed_minutes_on, test_server as serve};
    use std::time::Duration;
    use chrono::NaiveDate;

    const BODY: &str = r#"[
        {
            "id": "7001234",
            "type": "DISRUPTION",
            "title": "Amsterdam Centraal - Utrecht Centraal",
            "isActive": false,
            "start": "2024-03-01T08:12:00+0100",
            "end": "2024-03-01T09:42:00+0100",
            "timespans": [{"start": "2024-03-01T08:12:00+0100", "cause": {"label": "een seinstoring"}}]
        },
        {
            "id": "7001299",
            "title": "Leiden - Den Haag",
            "start": "2024-03-01T23:00:00+01:00",
            "end": "2024-03-02T01:00:00+01:00",
            "timespans": [{"cause": {"label": "werkzaamheden"}}]
        }
    ]"#;

    #[test]
    fn parses_ns_events_with_offsets() {
        let events = parse_events(BODY).unwrap();
        assert_eq!(events.len(), 2);

        let first = &events[0];
        assert_eq!(first.id, "7001234");
        assert_eq!(first.cause, "een seinstoring");
        assert_eq!(first.start.to_string(), "2024-03-01 08:12:00");
        assert_eq!(first.duration_minutes(), 90.0);

        assert_eq!(events[1].end.to_string(), "2024-03-02 01:00:00");
    }

    #[test]
    fn observed_minutes_excludes_midnight_crossing_event() {
        let events = parse_events(BODY).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(observed_minutes_on(&events, today), 90.0);
    }

    #[test]
    fn missing_cause_is_a_shape_error() {
        let body = r#"[{"id": "1", "title": "t", "start": "2024-03-01T08:00", "end": "2024-03-01T09:00", "timespans": []}]"#;
        let err = parse_events(body).unwrap_err();
        assert!(matches!(err, Error::DataShape { .. }));
        assert!(err.to_string().contains("disruption 1 has no timespans[0].cause.label"));
    }

    #[test]
    fn non_array_body_is_a_shape_error() {
        let err = parse_events(r#"{"message": "Access denied"}"#).unwrap_err();
        assert!(err.to_string().contains("expected an array"));
    }

    #[test]
    fn naive_timestamps_are_accepted() {
        assert_eq!(
            parse_timestamp("2024-03-01T23:00").unwrap().to_string(),
            "2024-03-01 23:00:00"
        );
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        // Unroutable URL: reaching the network would surface a transport error instead.
        let source = NsDisruptions::new(Client::new(), None).with_url("http://0.0.0.0:1/none");
        let err = source.fetch_inactive().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn fetch_sends_key_and_inactive_filter() {
        let server = serve::serve(200, BODY, Duration::ZERO).await;
        let source = NsDisruptions::new(Client::new(), Some("Key123".into())).with_url(&server.url);

        let events = source.fetch_inactive().await.unwrap();

        assert_eq!(events.len(), 2);
        let sent = &server.requests()[0];
        assert!(sent.contains("isactive=false"));
        assert!(sent.contains("ocp-apim-subscription-key: key123"));
        assert!(sent.contains("cache-control: no-cache"));
    }

    #[tokio::test]
    async fn error_status_is_a_service_error() {
        let server = serve::serve(
            401,
            r#"{"statusCode": 401, "message": "Access denied due to invalid subscription key."}"#,
            Duration::ZERO,
        )
        .await;
        let source = NsDisruptions::new(Client::new(), Some("wrong".into())).with_url(&server.url);

        let err = source.fetch_inactive().await.unwrap_err();

        assert!(matches!(err, Error::Service { status: 401, .. }));
        assert!(err.to_string().contains("401"));
    }
}
