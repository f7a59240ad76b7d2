//! Client for the disruption prediction service.
//!
//! The service may live at one of several addresses depending on where it is
//! deployed. Candidates are tried strictly in order and only transport
//! failures move on to the next one.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    error::{AttemptError, AttemptFailure, Error, Result, truncate_body},
    model::{Prediction, PredictionRequest},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How the request body is laid out for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// One flat JSON object keyed by column name.
    #[default]
    Flat,
    /// `{"dataframe_split": {"index": [0], "columns": [...], "data": [[...]]}}`,
    /// as hosted model-serving endpoints expect.
    DataframeSplit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointCandidate {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub format: PayloadFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl EndpointCandidate {
    pub fn flat(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            format: PayloadFormat::Flat,
            bearer_token: None,
        }
    }

    pub fn body(&self, request: &PredictionRequest) -> Value {
        match self.format {
            PayloadFormat::Flat => json!(request),
            PayloadFormat::DataframeSplit => json!({
                "dataframe_split": {
                    "index": [0],
                    "columns": PredictionRequest::columns(),
                    "data": [request.values()],
                }
            }),
        }
    }
}

/// Loopback primary, loopback secondary, then the LAN host.
pub fn default_endpoints() -> Vec<EndpointCandidate> {
    vec![
        EndpointCandidate::flat("loopback", "http://127.0.0.1:8000/predict_prepped_data"),
        EndpointCandidate::flat("localhost", "http://localhost:8000/predict_prepped_data"),
        EndpointCandidate::flat("lan", "http://192.168.1.72:8000/predict_prepped_data"),
    ]
}

#[async_trait]
pub trait PredictionTransport: Send + Sync + Debug {
    /// POST `body` to the candidate and return the decoded JSON response.
    async fn post_json(
        &self,
        endpoint: &EndpointCandidate,
        body: &Value,
    ) -> Result<Value, AttemptError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl PredictionTransport for HttpTransport {
    async fn post_json(
        &self,
        endpoint: &EndpointCandidate,
        body: &Value,
    ) -> Result<Value, AttemptError> {
        let mut req = self.http.post(&endpoint.url).json(body);
        if let Some(token) = &endpoint.bearer_token {
            req = req.bearer_auth(token);
        }

        let res = req
            .send()
            .await
            .map_err(|e| AttemptError::Transport(describe(&e)))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| AttemptError::Transport(describe(&e)))?;

        if !status.is_success() {
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| AttemptError::Decode(e.to_string()))
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connect failed: {err}")
    } else {
        err.to_string()
    }
}

#[derive(Debug)]
pub struct PredictionClient {
    endpoints: Vec<EndpointCandidate>,
    transport: Box<dyn PredictionTransport>,
}

impl PredictionClient {
    pub fn new(
        endpoints: Vec<EndpointCandidate>,
        transport: Box<dyn PredictionTransport>,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::config("At least one prediction endpoint is required"));
        }

        Ok(Self { endpoints, transport })
    }

    /// Send one day's features and return the first answer.
    pub async fn predict(&self, request: &PredictionRequest) -> Result<Prediction> {
        let mut failed = Vec::new();

        for endpoint in &self.endpoints {
            debug!("posting features to {} ({})", endpoint.name, endpoint.url);
            let body = endpoint.body(request);

            match self.transport.post_json(endpoint, &body).await {
                Ok(value) => {
                    let minutes = decode_prediction(&value).map_err(|message| {
                        Error::shape(endpoint.url.clone(), message)
                    })?;
                    info!("prediction {minutes} from {}", endpoint.name);

                    return Ok(Prediction {
                        minutes,
                        endpoint: endpoint.name.clone(),
                        failed_attempts: failed,
                    });
                }
                Err(AttemptError::Status { status, body }) => {
                    return Err(Error::Service {
                        url: endpoint.url.clone(),
                        status,
                        body,
                    });
                }
                Err(AttemptError::Decode(message)) => {
                    return Err(Error::shape(endpoint.url.clone(), message));
                }
                Err(reason) => {
                    let failure = AttemptFailure {
                        endpoint: endpoint.name.clone(),
                        reason,
                    };
                    warn!("prediction endpoint {failure}");
                    failed.push(failure);
                }
            }
        }

        Err(Error::EndpointsExhausted(failed))
    }
}

/// Pull the single scalar out of a one-row, one-column response.
///
/// Accepts a number, a numeric string, or any nesting of one-entry objects
/// and one-element arrays around one of those.
pub fn decode_prediction(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a finite number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not numeric")),
        Value::Array(items) if items.len() == 1 => decode_prediction(&items[0]),
        Value::Object(map) if map.len() == 1 => match map.values().next() {
            Some(inner) => decode_prediction(inner),
            None => Err("empty object".to_string()),
        },
        other => Err(format!("expected a single prediction value, got {other}")),
    }
}
