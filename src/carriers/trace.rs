//! XML trace request/response service.
//!
//! The request embeds requestor and authorization credentials next to the
//! PRO number and is sent ISO-8859-1 encoded. A response is only trusted
//! when its `Valid` flag is set.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use super::{Carrier, CarrierFamily, DeliveryOutcome, compact_day, http_client, send, xml_escape};
use crate::auth::CarrierSession;
use crate::config::AdapterSettings;
use crate::error::CarrierError;

/// XML trace adapter.
pub struct TraceCarrier {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl TraceCarrier {
    pub fn new(endpoint: &str, settings: &AdapterSettings) -> Self {
        Self {
            client: http_client(settings),
            endpoint: endpoint.to_string(),
            timeout: settings.request_timeout,
        }
    }

    async fn lookup(
        &self,
        requestor: &str,
        authorization: &str,
        tracking_id: &str,
    ) -> Result<Option<String>, CarrierError> {
        let body = trace_request(requestor, authorization, tracking_id);
        let request = self
            .client
            .post(&self.endpoint)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/xml; charset=ISO-8859-1",
            )
            .body(to_latin1(&body));

        let response = send(request, self.timeout).await?;
        let bytes = response.bytes().await?;
        trace_delivery(&from_latin1(&bytes))
    }
}

fn trace_request(requestor: &str, authorization: &str, tracking_id: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
         <TraceRequest>\
         <Requestor>{}</Requestor>\
         <Authorization>{}</Authorization>\
         <ProNumber>{}</ProNumber>\
         </TraceRequest>",
        xml_escape(requestor),
        xml_escape(authorization),
        xml_escape(tracking_id)
    )
}

/// Encode as ISO-8859-1, replacing unrepresentable characters with `?`.
fn to_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn from_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Strip the XML declaration; its encoding no longer matches the decoded text.
fn without_declaration(body: &str) -> &str {
    let trimmed = body.trim_start();
    match trimmed.strip_prefix("<?xml") {
        Some(rest) => rest.find("?>").map_or(trimmed, |end| &rest[end + 2..]),
        None => trimmed,
    }
}

/// Trimmed text of the first element anywhere below `root` with this local
/// name (case-insensitive).
fn field<'a>(root: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    root.descendants()
        .find(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case(name))
        .and_then(|n| n.text())
        .map(str::trim)
}

fn trace_delivery(body: &str) -> Result<Option<String>, CarrierError> {
    let doc = roxmltree::Document::parse(without_declaration(body))?;
    let root = doc.root_element();

    let valid = field(root, "valid")
        .is_some_and(|v| v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("y"));
    if !valid {
        let reason = field(root, "message").unwrap_or("trace marked invalid");
        return Err(CarrierError::Parse(reason.to_string()));
    }

    match field(root, "deliverydate") {
        Some(delivered) if !delivered.is_empty() => compact_day(delivered).map(Some),
        _ => Ok(None),
    }
}

#[async_trait]
impl Carrier for TraceCarrier {
    fn family(&self) -> CarrierFamily {
        CarrierFamily::Trace
    }

    async fn resolve(&self, session: &CarrierSession, tracking_id: &str) -> DeliveryOutcome {
        let CarrierSession::Account {
            user,
            password: Some(authorization),
        } = session
        else {
            return DeliveryOutcome::from_lookup(Err(CarrierError::Session(
                "trace requires requestor credentials".into(),
            )));
        };

        let result = self
            .lookup(user, authorization.expose_secret(), tracking_id)
            .await;
        match &result {
            Err(e) => warn!(tracking_id, error = %e, "Trace lookup failed"),
            Ok(date) => debug!(tracking_id, delivered = date.is_some(), "Trace lookup complete"),
        }
        DeliveryOutcome::from_lookup(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_embeds_credentials() {
        let body = trace_request("ops@example.com", "s3cr&t", "PRO-1");
        assert!(body.starts_with("<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>"));
        assert!(body.contains("<Requestor>ops@example.com</Requestor>"));
        assert!(body.contains("<Authorization>s3cr&amp;t</Authorization>"));
        assert!(body.contains("<ProNumber>PRO-1</ProNumber>"));
    }

    #[test]
    fn latin1_round_trips_accents() {
        assert_eq!(to_latin1("café€"), vec![b'c', b'a', b'f', 0xE9, b'?']);
        assert_eq!(from_latin1(&[b'c', 0xE9]), "cé");
    }

    #[test]
    fn valid_response_yields_date() {
        let body = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
                    <TraceResponse><Valid>true</Valid><DeliveryDate>20240501</DeliveryDate></TraceResponse>";
        assert_eq!(trace_delivery(body).unwrap().as_deref(), Some("2024-05-01"));
    }

    #[test]
    fn blank_delivery_date_is_pending() {
        let body = "<TraceResponse><Valid>Y</Valid><DeliveryDate/></TraceResponse>";
        assert_eq!(trace_delivery(body).unwrap(), None);
    }

    #[test]
    fn nested_fields_are_found() {
        let body = "<TraceResponse><Header><Valid>Y</Valid></Header>\
                    <Shipment><DeliveryDate>05/01/2024</DeliveryDate></Shipment></TraceResponse>";
        assert_eq!(trace_delivery(body).unwrap().as_deref(), Some("2024-05-01"));
    }

    #[tokio::test]
    async fn session_without_authorization_is_unusable() {
        let carrier = TraceCarrier::new("http://127.0.0.1:9/trace", &AdapterSettings::default());
        let session = CarrierSession::Account {
            user: "ops".into(),
            password: None,
        };
        assert_eq!(
            carrier.resolve(&session, "PRO-1").await,
            DeliveryOutcome::Error("session unusable: trace requires requestor credentials".into())
        );
    }

    #[test]
    fn invalid_flag_is_an_error() {
        let body = "<TraceResponse><Valid>false</Valid><Message>PRO not found</Message></TraceResponse>";
        let err = trace_delivery(body).unwrap_err();
        assert!(err.to_string().contains("PRO not found"));
    }
}
