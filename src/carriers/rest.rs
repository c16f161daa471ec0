//! Simple REST/JSON tracking service.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Carrier, CarrierFamily, DeliveryOutcome, compact_day, http_client, join_url, send};
use crate::auth::CarrierSession;
use crate::config::AdapterSettings;
use crate::error::CarrierError;

#[derive(Debug, Deserialize)]
struct TrackingDocument {
    details: Option<Details>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Details {
    delivered_on: Option<String>,
}

/// REST/JSON tracking adapter.
pub struct RestCarrier {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RestCarrier {
    pub fn new(base_url: &str, settings: &AdapterSettings) -> Self {
        Self {
            client: http_client(settings),
            base_url: base_url.to_string(),
            timeout: settings.request_timeout,
        }
    }

    async fn lookup(&self, token: Option<&str>, tracking_id: &str) -> Result<Option<String>, CarrierError> {
        let url = join_url(&self.base_url, &["tracking", tracking_id])?;
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = send(request, self.timeout).await?;
        let text = response.text().await?;
        let document: TrackingDocument = serde_json::from_str(&text)?;
        delivered_on(&document)
    }
}

fn delivered_on(document: &TrackingDocument) -> Result<Option<String>, CarrierError> {
    let details = document
        .details
        .as_ref()
        .ok_or_else(|| CarrierError::Parse("no details in response".into()))?;

    let Some(raw) = details.delivered_on.as_deref().map(str::trim) else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }

    // Drop a trailing time component: `2024-05-01T14:00:00` or `05/01/2024 2:00 PM`.
    let day = raw.split(['T', ' ']).next().unwrap_or(raw);
    compact_day(day).map(Some)
}

#[async_trait]
impl Carrier for RestCarrier {
    fn family(&self) -> CarrierFamily {
        CarrierFamily::Rest
    }

    async fn resolve(&self, session: &CarrierSession, tracking_id: &str) -> DeliveryOutcome {
        let token = match session {
            CarrierSession::Bearer(token) => Some(token.expose_secret()),
            _ => None,
        };

        let result = self.lookup(token, tracking_id).await;
        match &result {
            Err(e) => warn!(tracking_id, error = %e, "REST lookup failed"),
            Ok(date) => debug!(tracking_id, delivered = date.is_some(), "REST lookup complete"),
        }
        DeliveryOutcome::from_lookup(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> TrackingDocument {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn strips_time_component() {
        let doc = parse(r#"{"details":{"deliveredOn":"2024-05-01T14:00:00Z"}}"#);
        assert_eq!(delivered_on(&doc).unwrap().as_deref(), Some("2024-05-01"));

        let doc = parse(r#"{"details":{"deliveredOn":"05/01/2024 2:00 PM"}}"#);
        assert_eq!(delivered_on(&doc).unwrap().as_deref(), Some("2024-05-01"));
    }

    #[test]
    fn null_or_blank_is_pending() {
        assert_eq!(delivered_on(&parse(r#"{"details":{"deliveredOn":null}}"#)).unwrap(), None);
        assert_eq!(delivered_on(&parse(r#"{"details":{"deliveredOn":" "}}"#)).unwrap(), None);
        assert_eq!(delivered_on(&parse(r#"{"details":{}}"#)).unwrap(), None);
    }

    #[test]
    fn missing_details_is_an_error() {
        assert!(delivered_on(&parse(r#"{"status":"unknown"}"#)).is_err());
    }
}
