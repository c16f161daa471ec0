//! A. Duie Pyle shipment status API (unauthenticated, XML).
//!
//! The backend penalizes bursts, so lookups pass through a shared
//! [`RateLimiter`] under the `pyle` key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Carrier, CarrierFamily, DeliveryOutcome, child_text, http_client, iso_day, join_url, send};
use crate::auth::CarrierSession;
use crate::config::AdapterSettings;
use crate::error::CarrierError;
use crate::throttle::RateLimiter;

/// Throttle key shared by every Pyle lookup.
pub const THROTTLE_KEY: &str = "pyle";

/// A. Duie Pyle tracking adapter.
pub struct PyleCarrier {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    limiter: Option<Arc<RateLimiter>>,
}

impl PyleCarrier {
    pub fn new(base_url: &str, settings: &AdapterSettings) -> Self {
        Self {
            client: http_client(settings),
            base_url: base_url.to_string(),
            timeout: settings.request_timeout,
            limiter: None,
        }
    }

    /// Space lookups through `limiter`.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    async fn lookup(&self, user: Option<&str>, tracking_id: &str) -> Result<Option<String>, CarrierError> {
        if let Some(limiter) = &self.limiter {
            limiter.throttle(THROTTLE_KEY).await;
        }

        let url = join_url(&self.base_url, &["2", "shipment", "status"])?;
        let mut query: Vec<(&str, &str)> = vec![("type", "0"), ("value", tracking_id)];
        if let Some(user) = user {
            query.insert(0, ("user", user));
        }

        let response = send(self.client.get(url).query(&query), self.timeout).await?;
        let body = response.text().await?;
        delivered_start(&body)
    }
}

/// `start` of the first `statusDetail` described as `DELIVERED`.
fn delivered_start(body: &str) -> Result<Option<String>, CarrierError> {
    let doc = roxmltree::Document::parse(body)?;

    let delivered = doc
        .descendants()
        .filter(|n| n.has_tag_name("statusDetail"))
        .find(|n| child_text(*n, "description") == Some("DELIVERED"));

    match delivered {
        Some(detail) => match child_text(detail, "start") {
            Some(start) if !start.is_empty() => iso_day(start).map(Some),
            _ => Err(CarrierError::Parse("DELIVERED status without start".into())),
        },
        None => Ok(None),
    }
}

#[async_trait]
impl Carrier for PyleCarrier {
    fn family(&self) -> CarrierFamily {
        CarrierFamily::Pyle
    }

    async fn resolve(&self, session: &CarrierSession, tracking_id: &str) -> DeliveryOutcome {
        let result = self.lookup(session.user(), tracking_id).await;
        match &result {
            Err(e) => warn!(tracking_id, error = %e, "Pyle lookup failed"),
            Ok(date) => debug!(tracking_id, delivered = date.is_some(), "Pyle lookup complete"),
        }
        DeliveryOutcome::from_lookup(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_delivered_status() {
        let body = r#"<shipmentStatus>
            <statusDetail><description>IN TRANSIT</description><start>2024-04-29T09:00:00</start></statusDetail>
            <statusDetail><description>DELIVERED</description><start>2024-05-01T13:30:00</start></statusDetail>
        </shipmentStatus>"#;
        assert_eq!(delivered_start(body).unwrap().as_deref(), Some("2024-05-01"));
    }

    #[test]
    fn undelivered_shipment_is_pending() {
        let body = "<shipmentStatus><statusDetail><description>PICKED UP</description>\
                    <start>2024-04-29</start></statusDetail></shipmentStatus>";
        assert_eq!(delivered_start(body).unwrap(), None);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(matches!(
            delivered_start("<shipmentStatus><statusDetail>"),
            Err(CarrierError::Parse(_))
        ));
    }
}
