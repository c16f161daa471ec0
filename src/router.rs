//! Carrier code routing.
//!
//! Routing is data: a [`RouteTable`] lists the carrier codes each family
//! answers for, and a [`CarrierRouter`] pairs that table with the registered
//! adapters. Adding a carrier means adding codes, not dispatch logic.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::carriers::{Carrier, CarrierFamily, build_carriers};
use crate::config::TrackerConfig;
use crate::error::ConfigError;
use crate::throttle::RateLimiter;

/// Carrier codes per family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    entries: Vec<(CarrierFamily, Vec<String>)>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::empty()
            .with_codes(CarrierFamily::FedEx, &["FEP", "FEE", "FEU", "FEA", "FED", "FEC"])
            .with_codes(CarrierFamily::Pyle, &["DUE"])
    }
}

impl RouteTable {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Replace the code set for `family`.
    pub fn with_codes(mut self, family: CarrierFamily, codes: &[&str]) -> Self {
        let codes = codes.iter().map(|c| normalize(c)).filter(|c| !c.is_empty()).collect();
        self.entries.retain(|(f, _)| *f != family);
        self.entries.push((family, codes));
        self
    }

    /// Parse `FAMILY=CODE,CODE;FAMILY=CODE` and layer it over the default
    /// table. Families not mentioned keep their default codes.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut table = Self::default();
        for entry in spec.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (family, codes) = entry.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
                key: "CARRIER_ROUTES".into(),
                message: format!("expected FAMILY=CODES, got {entry:?}"),
            })?;
            let family: CarrierFamily = family.parse()?;
            let codes: Vec<&str> = codes.split(',').collect();
            table = table.with_codes(family, &codes);
        }
        Ok(table)
    }

    pub fn codes(&self, family: CarrierFamily) -> &[String] {
        self.entries
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, codes)| codes.as_slice())
            .unwrap_or(&[])
    }

    pub fn entries(&self) -> &[(CarrierFamily, Vec<String>)] {
        &self.entries
    }
}

/// Where a carrier code goes.
#[derive(Clone)]
pub enum Route {
    Adapter(Arc<dyn Carrier>),
    Unsupported,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adapter(carrier) => write!(f, "Adapter({})", carrier.family()),
            Self::Unsupported => f.write_str("Unsupported"),
        }
    }
}

/// Maps carrier codes to adapters.
pub struct CarrierRouter {
    families: HashMap<String, CarrierFamily>,
    adapters: HashMap<CarrierFamily, Arc<dyn Carrier>>,
}

impl CarrierRouter {
    pub fn new(table: &RouteTable) -> Self {
        let mut families = HashMap::new();
        for (family, codes) in table.entries() {
            for code in codes {
                if let Some(previous) = families.insert(code.clone(), *family) {
                    warn!(code = %code, %previous, now = %family, "Carrier code routed twice; last wins");
                }
            }
        }
        Self {
            families,
            adapters: HashMap::new(),
        }
    }

    /// Router over the configured route table with every adapter the
    /// configuration supports.
    pub fn from_config(config: &TrackerConfig, limiter: Arc<RateLimiter>) -> Self {
        build_carriers(config, limiter)
            .into_iter()
            .fold(Self::new(&config.routes), Self::with)
    }

    /// Register an adapter for its family, replacing any previous one.
    pub fn register(&mut self, carrier: Arc<dyn Carrier>) {
        let family = carrier.family();
        debug!(%family, "Registered carrier adapter");
        self.adapters.insert(family, carrier);
    }

    /// Builder form of [`CarrierRouter::register`].
    pub fn with(mut self, carrier: Arc<dyn Carrier>) -> Self {
        self.register(carrier);
        self
    }

    /// Family configured for a code, regardless of adapter registration.
    pub fn family_of(&self, carrier_code: &str) -> Option<CarrierFamily> {
        self.families.get(&normalize(carrier_code)).copied()
    }

    /// Resolve a carrier code (trimmed, case-insensitive).
    pub fn route(&self, carrier_code: &str) -> Route {
        self.family_of(carrier_code)
            .and_then(|family| self.adapters.get(&family))
            .map(|carrier| Route::Adapter(Arc::clone(carrier)))
            .unwrap_or(Route::Unsupported)
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}
