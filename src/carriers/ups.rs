//! UPS Track API (bearer token with transaction headers, JSON).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Carrier, CarrierFamily, DeliveryOutcome, compact_day, http_client, join_url, send};
use crate::auth::CarrierSession;
use crate::config::AdapterSettings;
use crate::error::CarrierError;

/// Value sent in the `transactionSrc` header.
const TRANSACTION_SRC: &str = "delivery-sync";

/// Activity status type marking a delivery.
const DELIVERED_STATUS: &str = "D";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackEnvelope {
    track_response: Option<TrackResponse>,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    #[serde(default)]
    shipment: Vec<Shipment>,
}

#[derive(Debug, Deserialize)]
struct Shipment {
    #[serde(default)]
    package: Vec<Package>,
}

#[derive(Debug, Deserialize)]
struct Package {
    #[serde(default)]
    activity: Vec<Activity>,
}

#[derive(Debug, Deserialize)]
struct Activity {
    status: Option<ActivityStatus>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActivityStatus {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// UPS tracking adapter.
pub struct UpsCarrier {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl UpsCarrier {
    pub fn new(base_url: &str, settings: &AdapterSettings) -> Self {
        Self {
            client: http_client(settings),
            base_url: base_url.to_string(),
            timeout: settings.request_timeout,
        }
    }

    async fn lookup(&self, token: &str, tracking_id: &str) -> Result<Option<String>, CarrierError> {
        let url = join_url(&self.base_url, &["api", "track", "v1", "details", tracking_id])?;
        let request = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("transId", Uuid::new_v4().simple().to_string())
            .header("transactionSrc", TRANSACTION_SRC);

        let response = send(request, self.timeout).await?;
        let text = response.text().await?;
        let envelope: TrackEnvelope = serde_json::from_str(&text)?;
        delivered_activity(&envelope)
    }
}

/// Date of the delivery activity on the first package of the first shipment.
fn delivered_activity(envelope: &TrackEnvelope) -> Result<Option<String>, CarrierError> {
    let package = envelope
        .track_response
        .as_ref()
        .and_then(|r| r.shipment.first())
        .and_then(|s| s.package.first())
        .ok_or_else(|| CarrierError::Parse("no shipment[0].package[0] in response".into()))?;

    let delivered = package.activity.iter().find(|a| {
        a.status
            .as_ref()
            .and_then(|s| s.kind.as_deref())
            .is_some_and(|k| k == DELIVERED_STATUS)
    });

    match delivered.and_then(|a| a.date.as_deref()) {
        Some(date) => compact_day(date).map(Some),
        None if delivered.is_some() => Err(CarrierError::Parse("delivery activity without date".into())),
        None => Ok(None),
    }
}

#[async_trait]
impl Carrier for UpsCarrier {
    fn family(&self) -> CarrierFamily {
        CarrierFamily::Ups
    }

    async fn resolve(&self, session: &CarrierSession, tracking_id: &str) -> DeliveryOutcome {
        let CarrierSession::Bearer(token) = session else {
            return DeliveryOutcome::from_lookup(Err(CarrierError::Session(
                "ups requires a bearer token".into(),
            )));
        };

        let result = self.lookup(token.expose_secret(), tracking_id).await;
        match &result {
            Err(e) => warn!(tracking_id, error = %e, "UPS lookup failed"),
            Ok(date) => debug!(tracking_id, delivered = date.is_some(), "UPS lookup complete"),
        }
        DeliveryOutcome::from_lookup(result)
    }
}
