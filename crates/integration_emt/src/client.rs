//! EMT Madrid HTTP client
//!
//! Every endpoint is a form-encoded POST that answers with a JSON envelope
//! carrying a `ReturnCode`, or with the sentinel `[false]` when the request
//! was valid but matched nothing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::cache::{EmtCache, LineKey};
use crate::config::EmtConfig;
use crate::error::EmtError;
use crate::models::{
    Arrival, Direction, LineStops, Location, NearbyStop, NodeLines, ReturnCode, StopArg, StopId,
    StopIds, rows,
};

const ARRIVALS_PATH: &str = "/geo/GetArriveStop.php";
const STOPS_FROM_XY_PATH: &str = "/geo/GetStopsFromXY.php";
const STOPS_LINE_PATH: &str = "/geo/GetStopsLine.php";
const NODES_LINES_PATH: &str = "/bus/GetNodesLines.php";

/// Trait for EMT bus API clients
#[async_trait]
pub trait EmtClient: Send + Sync {
    /// Whether the API knows the stop
    async fn stop_exists(&self, stop: StopArg) -> Result<bool, EmtError>;

    /// Buses currently approaching a stop, possibly none
    async fn incoming_buses(&self, stop: StopArg) -> Result<Vec<Arrival>, EmtError>;

    /// Stops within `radius` meters of a location
    async fn stops_from_location(
        &self,
        location: Location,
        radius: u32,
    ) -> Result<Vec<NearbyStop>, EmtError>;

    /// Line details and stops, optionally for one direction token
    async fn stops_on_line(
        &self,
        line: &str,
        direction: Option<&str>,
    ) -> Result<LineStops, EmtError>;

    /// Node metadata, one row per recognized stop
    async fn nodes_lines(&self, stops: StopIds) -> Result<Vec<NodeLines>, EmtError>;
}

/// EMT client over `reqwest`, with its own caches
#[derive(Debug)]
pub struct EmtHttpClient {
    client: Client,
    config: EmtConfig,
    cache: EmtCache,
}

impl EmtHttpClient {
    /// Create a new EMT client
    ///
    /// # Errors
    ///
    /// Returns [`EmtError::Configuration`] if the configuration is invalid or
    /// the HTTP client cannot be initialized.
    pub fn new(config: &EmtConfig) -> Result<Self, EmtError> {
        config.validate().map_err(EmtError::Configuration)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmtError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
            cache: EmtCache::new(config.cache_max_entries),
        })
    }

    /// The caches owned by this client
    #[must_use]
    pub const fn cache(&self) -> &EmtCache {
        &self.cache
    }

    /// Line details for a typed direction, using the configured wire tokens
    ///
    /// # Errors
    ///
    /// Same as [`EmtClient::stops_on_line`].
    pub async fn stops_on_line_towards(
        &self,
        line: &str,
        direction: Direction,
    ) -> Result<LineStops, EmtError> {
        let token = self.config.direction_tokens.token(direction);
        self.stops_on_line(line, Some(token)).await
    }

    const fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.config.metadata_timeout_secs)
    }

    /// POST a form with the credential fields merged in and validate the envelope.
    ///
    /// Returns `Ok(None)` for the `[false]` sentinel.
    async fn post_form(
        &self,
        path: &str,
        fields: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, EmtError> {
        let url = format!("{}{path}", self.config.base_url);

        let mut form: Vec<(&str, &str)> = vec![
            ("cultureInfo", self.config.culture_info.as_str()),
            ("idClient", self.config.client_id.as_str()),
            ("passKey", self.config.passkey.expose_secret()),
        ];
        form.extend(fields.iter().map(|(key, val)| (*key, val.as_str())));

        debug!(%url, "Calling EMT API");
        let started = Instant::now();

        let mut request = self.client.post(&url).form(&form);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EmtError::Timeout {
                    timeout_secs: timeout.map_or(self.config.timeout_secs, |t| t.as_secs()),
                }
            } else {
                EmtError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status();
        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis(),
            "EMT API responded"
        );

        if status != StatusCode::OK {
            warn!(status = status.as_u16(), %url, "EMT API technical error");
            return Err(EmtError::Technical {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| EmtError::ParseError(e.to_string()))?;

        Self::parse_envelope(&body)
    }

    /// Parse a raw body and classify its `ReturnCode`
    fn parse_envelope(body: &str) -> Result<Option<Value>, EmtError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| EmtError::ParseError(e.to_string()))?;

        if is_empty_sentinel(&value) {
            debug!("EMT API empty response");
            return Ok(None);
        }

        if let Some(code) = ReturnCode::from_envelope(&value)? {
            if !code.is_success() {
                let description = value
                    .get("Description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                warn!(%code, %description, "EMT API error");
                return Err(EmtError::Api { code, description });
            }
            debug!(%code, "EMT API return code");
        }

        Ok(Some(value))
    }

    /// Query the node/line endpoint for one stop; only positive answers are cached
    async fn check_exists(&self, stop: StopId) -> Result<bool, EmtError> {
        if self.cache.stop_known(stop).await {
            return Ok(true);
        }

        let body = self
            .post_form(
                NODES_LINES_PATH,
                &[("Nodes", stop.to_string())],
                Some(self.metadata_timeout()),
            )
            .await?;

        let nodes: Vec<NodeLines> = match body {
            Some(body) => rows(body.get("resultValues"))?,
            None => Vec::new(),
        };

        if nodes.len() == 1 {
            debug!(%stop, "Stop exists");
            self.cache.insert_stop(stop).await;
            Ok(true)
        } else {
            debug!(%stop, rows = nodes.len(), "Stop does not exist");
            Ok(false)
        }
    }
}

#[async_trait]
impl EmtClient for EmtHttpClient {
    #[instrument(skip(self))]
    async fn stop_exists(&self, stop: StopArg) -> Result<bool, EmtError> {
        let stop = stop.parse()?;
        self.check_exists(stop).await
    }

    #[instrument(skip(self))]
    async fn incoming_buses(&self, stop: StopArg) -> Result<Vec<Arrival>, EmtError> {
        // The arrivals endpoint answers an unknown stop like a stop without buses
        let stop_id = if self.config.check_stop_exists {
            let stop_id = stop
                .parse()
                .map_err(|e| EmtError::stop_not_found(stop.as_str(), Some(e)))?;
            match self.check_exists(stop_id).await {
                Ok(true) => stop_id,
                Ok(false) => return Err(EmtError::stop_not_found(stop.as_str(), None)),
                Err(e) => return Err(EmtError::stop_not_found(stop.as_str(), Some(e))),
            }
        } else {
            stop.parse()?
        };

        let body = self
            .post_form(ARRIVALS_PATH, &[("idStop", stop_id.to_string())], None)
            .await?;

        let arrivals: Vec<Arrival> = match body {
            Some(body) => rows(body.get("arrives"))?,
            None => Vec::new(),
        };
        debug!(count = arrivals.len(), "Arrivals found");
        Ok(arrivals)
    }

    #[instrument(skip(self))]
    async fn stops_from_location(
        &self,
        location: Location,
        radius: u32,
    ) -> Result<Vec<NearbyStop>, EmtError> {
        if location.is_origin() || radius < 1 {
            debug!("Empty search area, not calling the EMT API");
            return Ok(Vec::new());
        }

        let fields = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("Radius", radius.to_string()),
        ];

        let stops: Vec<NearbyStop> = match self.post_form(STOPS_FROM_XY_PATH, &fields, None).await? {
            Some(body) => rows(body.get("stop"))?,
            None => Vec::new(),
        };
        debug!(count = stops.len(), "Nearby stops found");
        Ok(stops)
    }

    #[instrument(skip(self))]
    async fn stops_on_line(
        &self,
        line: &str,
        direction: Option<&str>,
    ) -> Result<LineStops, EmtError> {
        if line.trim().is_empty() {
            return Err(EmtError::InvalidInput("line must not be empty".to_string()));
        }

        let key = LineKey::new(line, direction);
        if let Some(cached) = self.cache.line(&key).await {
            return Ok(cached);
        }

        let direction = direction.filter(|d| !d.is_empty());
        let mut fields = vec![("line", line.to_string())];
        if let Some(token) = direction {
            if self.config.direction_tokens.parse(token).is_none() {
                return Err(EmtError::InvalidDirection(format!(
                    "{token:?} (expected {:?} or {:?})",
                    self.config.direction_tokens.outbound, self.config.direction_tokens.inbound
                )));
            }
            fields.push(("direction", token.to_string()));
        }

        let Some(body) = self.post_form(STOPS_LINE_PATH, &fields, None).await? else {
            return Err(EmtError::LineNotFound {
                line: line.to_string(),
                direction: direction.map(str::to_string),
            });
        };

        let stops: LineStops =
            serde_json::from_value(body).map_err(|e| EmtError::ParseError(e.to_string()))?;
        self.cache.insert_line(key, stops.clone()).await;
        Ok(stops)
    }

    #[instrument(skip(self))]
    async fn nodes_lines(&self, stops: StopIds) -> Result<Vec<NodeLines>, EmtError> {
        let ids = stops.parse()?;
        let joined = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|");

        let mut fields = Vec::new();
        if !ids.is_empty() {
            fields.push(("Nodes", joined.clone()));
        }

        let Some(body) = self
            .post_form(NODES_LINES_PATH, &fields, Some(self.metadata_timeout()))
            .await?
        else {
            return Err(EmtError::StopsNotFound(joined));
        };

        let nodes: Vec<NodeLines> = rows(body.get("resultValues"))?;
        debug!(count = nodes.len(), "Nodes found");
        Ok(nodes)
    }
}

/// The API's `[false]` body: a valid request that matched nothing
fn is_empty_sentinel(value: &Value) -> bool {
    matches!(value.as_array().map(Vec::as_slice), Some([Value::Bool(false)]))
}
