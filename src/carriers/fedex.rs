//! FedEx Track API (OAuth2 bearer, JSON).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Carrier, CarrierFamily, DeliveryOutcome, http_client, iso_day, join_url, send};
use crate::auth::CarrierSession;
use crate::config::AdapterSettings;
use crate::error::CarrierError;

/// Date-time entry types that carry a delivery date, in priority order.
const DELIVERY_DATE_TYPES: &[&str] = &["ACTUAL_DELIVERY", "ESTIMATED_DELIVERY"];

#[derive(Debug, Deserialize)]
struct TrackResponse {
    output: Option<TrackOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackOutput {
    #[serde(default)]
    complete_track_results: Vec<CompleteTrackResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteTrackResult {
    #[serde(default)]
    track_results: Vec<TrackResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackResult {
    #[serde(default)]
    date_and_times: Vec<DateAndTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateAndTime {
    #[serde(rename = "type")]
    kind: Option<String>,
    date_time: Option<String>,
}

/// FedEx tracking adapter.
pub struct FedExCarrier {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl FedExCarrier {
    pub fn new(base_url: &str, settings: &AdapterSettings) -> Self {
        Self {
            client: http_client(settings),
            base_url: base_url.to_string(),
            timeout: settings.request_timeout,
        }
    }

    async fn lookup(&self, token: &str, tracking_id: &str) -> Result<Option<String>, CarrierError> {
        let url = join_url(&self.base_url, &["track", "v1", "trackingnumbers"])?;
        let body = serde_json::json!({
            "trackingInfo": [
                { "trackingNumberInfo": { "trackingNumber": tracking_id } }
            ],
            "includeDetailedScans": false
        });

        let response = send(
            self.client.post(url).bearer_auth(token).json(&body),
            self.timeout,
        )
        .await?;
        let text = response.text().await?;
        let payload: TrackResponse = serde_json::from_str(&text)?;

        delivery_date(&payload)
    }
}

/// First actual/estimated delivery entry of the first track result.
fn delivery_date(payload: &TrackResponse) -> Result<Option<String>, CarrierError> {
    let result = payload
        .output
        .as_ref()
        .and_then(|o| o.complete_track_results.first())
        .and_then(|c| c.track_results.first())
        .ok_or_else(|| CarrierError::Parse("no trackResults in response".into()))?;

    let entry = result.date_and_times.iter().find(|d| {
        d.kind
            .as_deref()
            .is_some_and(|k| DELIVERY_DATE_TYPES.contains(&k))
    });

    match entry {
        Some(DateAndTime {
            date_time: Some(dt),
            ..
        }) => iso_day(dt).map(Some),
        Some(_) => Err(CarrierError::Parse("delivery entry without dateTime".into())),
        None => Ok(None),
    }
}

#[async_trait]
impl Carrier for FedExCarrier {
    fn family(&self) -> CarrierFamily {
        CarrierFamily::FedEx
    }

    async fn resolve(&self, session: &CarrierSession, tracking_id: &str) -> DeliveryOutcome {
        let CarrierSession::Bearer(token) = session else {
            return DeliveryOutcome::from_lookup(Err(CarrierError::Session(
                "fedex requires a bearer token".into(),
            )));
        };

        let result = self.lookup(token.expose_secret(), tracking_id).await;
        if let Err(e) = &result {
            warn!(tracking_id, error = %e, "FedEx lookup failed");
        } else {
            debug!(tracking_id, "FedEx lookup complete");
        }
        DeliveryOutcome::from_lookup(result)
    }
}
