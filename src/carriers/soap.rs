//! SOAP/XML tracking service.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Carrier, CarrierFamily, DeliveryOutcome, child_text, compact_day, http_client, send, xml_escape};
use crate::auth::CarrierSession;
use crate::config::AdapterSettings;
use crate::error::CarrierError;

const SOAP_ACTION: &str = "urn:tracking/TrackShipment";

/// SOAP tracking adapter.
pub struct SoapCarrier {
    client: reqwest::Client,
    endpoint: String,
    /// Event codes that mark a shipment as delivered.
    delivered_codes: Vec<String>,
    timeout: Duration,
}

impl SoapCarrier {
    pub fn new(endpoint: &str, delivered_codes: Vec<String>, settings: &AdapterSettings) -> Self {
        Self {
            client: http_client(settings),
            endpoint: endpoint.to_string(),
            delivered_codes,
            timeout: settings.request_timeout,
        }
    }

    async fn lookup(&self, tracking_id: &str) -> Result<Option<String>, CarrierError> {
        let request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(envelope(tracking_id));

        let response = send(request, self.timeout).await?;
        let body = response.text().await?;
        delivered_event(&body, &self.delivered_codes)
    }
}

fn envelope(tracking_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:trk="urn:tracking">
  <soap:Body>
    <trk:TrackShipment>
      <trk:TrackingNumber>{}</trk:TrackingNumber>
    </trk:TrackShipment>
  </soap:Body>
</soap:Envelope>"#,
        xml_escape(tracking_id)
    )
}

/// Date of the first `event` whose code is a terminal delivery code.
fn delivered_event(body: &str, codes: &[String]) -> Result<Option<String>, CarrierError> {
    let doc = roxmltree::Document::parse(body)?;

    if let Some(fault) = doc
        .descendants()
        .find(|n| n.tag_name().name() == "Fault")
    {
        let reason = child_text(fault, "faultstring").unwrap_or("unknown fault");
        return Err(CarrierError::Parse(format!("SOAP fault: {reason}")));
    }

    let event = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case("event"))
        .find(|n| {
            child_text(*n, "code")
                .is_some_and(|code| codes.iter().any(|c| c.eq_ignore_ascii_case(code)))
        });

    match event {
        Some(event) => {
            let stamp = child_text(event, "dateTime")
                .or_else(|| child_text(event, "date"))
                .ok_or_else(|| CarrierError::Parse("delivery event without date".into()))?;
            compact_day(stamp).map(Some)
        }
        None => Ok(None),
    }
}

#[async_trait]
impl Carrier for SoapCarrier {
    fn family(&self) -> CarrierFamily {
        CarrierFamily::Soap
    }

    async fn resolve(&self, _session: &CarrierSession, tracking_id: &str) -> DeliveryOutcome {
        let result = self.lookup(tracking_id).await;
        match &result {
            Err(e) => warn!(tracking_id, error = %e, "SOAP lookup failed"),
            Ok(date) => debug!(tracking_id, delivered = date.is_some(), "SOAP lookup complete"),
        }
        DeliveryOutcome::from_lookup(result)
    }
}
