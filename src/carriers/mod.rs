//! Carrier adapters.
//!
//! Every adapter translates the uniform [`Carrier::resolve`] contract into one
//! backend protocol:
//! - **fedex**: OAuth2 bearer, JSON POST
//! - **pyle**: unauthenticated XML GET, throttled
//! - **soap**: SOAP 1.1 envelope, namespaced XML events
//! - **trace**: custom XML request/response with embedded credentials
//! - **ups**: bearer token plus transaction headers, JSON GET
//! - **rest**: plain JSON GET by identifier path
//!
//! Adapters never return `Err`: transport, status and parse failures are
//! folded into [`DeliveryOutcome::Error`] so one row cannot abort a batch.

pub mod fedex;
pub mod pyle;
pub mod rest;
pub mod soap;
pub mod trace;
pub mod ups;

pub use fedex::FedExCarrier;
pub use pyle::PyleCarrier;
pub use rest::RestCarrier;
pub use soap::SoapCarrier;
pub use trace::TraceCarrier;
pub use ups::UpsCarrier;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::auth::CarrierSession;
use crate::config::{AdapterSettings, TrackerConfig};
use crate::error::{CarrierError, ConfigError};
use crate::throttle::RateLimiter;

/// Protocol family a carrier code resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierFamily {
    FedEx,
    Pyle,
    Soap,
    Trace,
    Ups,
    Rest,
}

impl CarrierFamily {
    pub const ALL: [CarrierFamily; 6] = [
        Self::FedEx,
        Self::Pyle,
        Self::Soap,
        Self::Trace,
        Self::Ups,
        Self::Rest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FedEx => "fedex",
            Self::Pyle => "pyle",
            Self::Soap => "soap",
            Self::Trace => "trace",
            Self::Ups => "ups",
            Self::Rest => "rest",
        }
    }
}

impl fmt::Display for CarrierFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CarrierFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fedex" => Ok(Self::FedEx),
            "pyle" | "aduiepyle" => Ok(Self::Pyle),
            "soap" => Ok(Self::Soap),
            "trace" => Ok(Self::Trace),
            "ups" => Ok(Self::Ups),
            "rest" => Ok(Self::Rest),
            other => Err(ConfigError::UnknownFamily(other.to_string())),
        }
    }
}

/// Result of resolving one tracking identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Delivered on this `YYYY-MM-DD` day.
    Delivered(String),
    /// The shipment has no delivery date yet.
    NotYetDelivered,
    /// No adapter handles the carrier.
    Unsupported,
    /// Lookup failed; the message is written into the row.
    Error(String),
}

impl DeliveryOutcome {
    /// Fold an adapter's fallible lookup into an outcome.
    pub fn from_lookup(result: Result<Option<String>, CarrierError>) -> Self {
        match result {
            Ok(Some(date)) => Self::Delivered(date),
            Ok(None) => Self::NotYetDelivered,
            Err(e) => Self::Error(e.to_string()),
        }
    }
}

/// A tracking backend.
#[async_trait]
pub trait Carrier: Send + Sync {
    /// Family this adapter implements; also its diagnostic label.
    fn family(&self) -> CarrierFamily;

    /// Look up a tracking identifier. Must not panic or return early on
    /// failure; every failure becomes [`DeliveryOutcome::Error`].
    async fn resolve(&self, session: &CarrierSession, tracking_id: &str) -> DeliveryOutcome;
}

/// Build every adapter the configuration can support.
pub fn build_carriers(config: &TrackerConfig, limiter: Arc<RateLimiter>) -> Vec<Arc<dyn Carrier>> {
    let settings = &config.adapter;
    let mut carriers: Vec<Arc<dyn Carrier>> = vec![
        Arc::new(FedExCarrier::new(&config.fedex.base_url, settings)),
        Arc::new(PyleCarrier::new(&config.pyle.base_url, settings).with_limiter(limiter)),
        Arc::new(UpsCarrier::new(&config.ups.base_url, settings)),
    ];

    if let Some(endpoint) = &config.soap.endpoint {
        carriers.push(Arc::new(SoapCarrier::new(
            endpoint,
            config.soap.delivered_codes.clone(),
            settings,
        )));
    }
    if let Some(endpoint) = &config.trace.endpoint {
        carriers.push(Arc::new(TraceCarrier::new(endpoint, settings)));
    }
    if let Some(base_url) = &config.rest.base_url {
        carriers.push(Arc::new(RestCarrier::new(base_url, settings)));
    }

    carriers
}

/// HTTP client honoring the adapter's request timeout.
pub(crate) fn http_client(settings: &AdapterSettings) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Send a request, mapping timeouts and non-2xx statuses to `CarrierError`.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response, CarrierError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            CarrierError::Timeout(timeout)
        } else {
            CarrierError::from(e)
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(CarrierError::Status(status.as_u16()));
    }
    Ok(response)
}

/// Join a base URL with path segments, percent-encoding each segment.
pub(crate) fn join_url(base: &str, segments: &[&str]) -> Result<reqwest::Url, CarrierError> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| CarrierError::Transport(format!("bad base URL {base:?}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| CarrierError::Transport(format!("base URL {base:?} cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Truncate an ISO-8601 date-time to its calendar day.
pub(crate) fn iso_day(raw: &str) -> Result<String, CarrierError> {
    let head = raw.trim().get(..10).unwrap_or(raw.trim());
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| CarrierError::Parse(format!("unrecognized date {raw:?}")))
}

/// Convert a compact `YYYYMMDD...` (or `MM/DD/YYYY`) date to `YYYY-MM-DD`.
pub(crate) fn compact_day(raw: &str) -> Result<String, CarrierError> {
    let raw = raw.trim();
    let parsed = raw
        .get(..8)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y%m%d").ok())
        .or_else(|| {
            raw.get(..10)
                .and_then(|head| NaiveDate::parse_from_str(head, "%m/%d/%Y").ok())
        })
        .or_else(|| raw.get(..10).and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()));

    parsed
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or_else(|| CarrierError::Parse(format!("unrecognized date {raw:?}")))
}

/// Escape text for embedding in an XML element.
pub(crate) fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Text of the first child element with the given local name (case-insensitive).
pub(crate) fn child_text<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name().eq_ignore_ascii_case(name))
        .and_then(|c| c.text())
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_parses_aliases() {
        assert_eq!("FedEx".parse::<CarrierFamily>().unwrap(), CarrierFamily::FedEx);
        assert_eq!("ADUIEPYLE".parse::<CarrierFamily>().unwrap(), CarrierFamily::Pyle);
        assert!("dhl".parse::<CarrierFamily>().is_err());
    }

    #[test]
    fn outcome_from_lookup() {
        assert_eq!(
            DeliveryOutcome::from_lookup(Ok(Some("2024-05-01".into()))),
            DeliveryOutcome::Delivered("2024-05-01".into())
        );
        assert_eq!(DeliveryOutcome::from_lookup(Ok(None)), DeliveryOutcome::NotYetDelivered);
        assert_eq!(
            DeliveryOutcome::from_lookup(Err(CarrierError::Status(404))),
            DeliveryOutcome::Error("HTTP 404".into())
        );
    }

    #[test]
    fn date_helpers() {
        assert_eq!(iso_day("2024-05-01T10:22:00-04:00").unwrap(), "2024-05-01");
        assert!(iso_day("soon").is_err());
        assert_eq!(compact_day("20240501").unwrap(), "2024-05-01");
        assert_eq!(compact_day("20240501134500").unwrap(), "2024-05-01");
        assert_eq!(compact_day("05/01/2024").unwrap(), "2024-05-01");
        assert!(compact_day("").is_err());
    }

    #[test]
    fn join_url_encodes_segments() {
        let url = join_url("http://127.0.0.1:9/api/", &["tracking", "A B"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/api/tracking/A%20B");
    }

    #[test]
    fn xml_escape_handles_markup() {
        assert_eq!(xml_escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
    }
}
