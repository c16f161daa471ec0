//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::router::RouteTable;

/// Default number of lookups in flight per batch.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default per-request timeout applied by every adapter.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Minimum spacing between calls to the throttled backend.
pub const THROTTLE_MIN_INTERVAL: Duration = Duration::from_millis(2500);

/// Settings shared by every carrier adapter.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// OAuth client credentials for a carrier API.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// FedEx (OAuth2 JSON) settings.
#[derive(Debug, Clone)]
pub struct FedExConfig {
    pub base_url: String,
    pub credentials: Option<ClientCredentials>,
}

/// A. Duie Pyle (plain XML) settings.
#[derive(Debug, Clone)]
pub struct PyleConfig {
    pub base_url: String,
    pub user_email: Option<String>,
}

/// SOAP tracking service settings.
#[derive(Debug, Clone)]
pub struct SoapConfig {
    pub endpoint: Option<String>,
    pub delivered_codes: Vec<String>,
}

/// XML trace service settings.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub endpoint: Option<String>,
    pub requestor: Option<String>,
    pub authorization: Option<SecretString>,
}

/// UPS (bearer REST/JSON) settings.
#[derive(Debug, Clone)]
pub struct UpsConfig {
    pub base_url: String,
    pub credentials: Option<ClientCredentials>,
}

/// Simple REST/JSON tracking settings.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: Option<String>,
    pub auth_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

/// Run configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Directory scanned for ledger documents.
    pub work_dir: PathBuf,
    /// File extension of ledger documents (without the dot).
    pub extension: String,
    /// Maximum number of lookups in flight.
    pub concurrency: usize,
    pub adapter: AdapterSettings,
    /// Minimum spacing for throttled backends.
    pub throttle_interval: Duration,
    pub routes: RouteTable,
    /// When set, logs are written to a daily rolling file in this directory.
    pub log_dir: Option<PathBuf>,
    pub fedex: FedExConfig,
    pub pyle: PyleConfig,
    pub soap: SoapConfig,
    pub trace: TraceConfig,
    pub ups: UpsConfig,
    pub rest: RestConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            extension: "xlsx".to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            adapter: AdapterSettings::default(),
            throttle_interval: THROTTLE_MIN_INTERVAL,
            routes: RouteTable::default(),
            log_dir: None,
            fedex: FedExConfig {
                base_url: "https://apis.fedex.com".to_string(),
                credentials: None,
            },
            pyle: PyleConfig {
                base_url: "https://api.aduiepyle.com".to_string(),
                user_email: None,
            },
            soap: SoapConfig {
                endpoint: None,
                delivered_codes: default_delivered_codes(),
            },
            trace: TraceConfig {
                endpoint: None,
                requestor: None,
                authorization: None,
            },
            ups: UpsConfig {
                base_url: "https://onlinetools.ups.com".to_string(),
                credentials: None,
            },
            rest: RestConfig {
                base_url: None,
                auth_url: None,
                username: None,
                password: None,
            },
        }
    }
}

fn default_delivered_codes() -> Vec<String> {
    ["D1", "DL", "DLV", "DEL"].iter().map(|c| c.to_string()).collect()
}

impl TrackerConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let work_dir = env_opt("TRACK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);

        let extension = env_opt("TRACK_EXTENSION")
            .map(|e| e.trim_start_matches('.').to_string())
            .unwrap_or(defaults.extension);

        let concurrency: usize = env_parse("TRACK_CONCURRENCY")?.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRACK_CONCURRENCY".into(),
                message: "must be at least 1".into(),
            });
        }

        let request_timeout = env_parse::<u64>("TRACK_REQUEST_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let throttle_interval = env_parse::<u64>("TRACK_THROTTLE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(THROTTLE_MIN_INTERVAL);

        let routes = match env_opt("CARRIER_ROUTES") {
            Some(spec) => RouteTable::parse(&spec)?,
            None => RouteTable::default(),
        };

        Ok(Self {
            work_dir,
            extension,
            concurrency,
            adapter: AdapterSettings { request_timeout },
            throttle_interval,
            routes,
            log_dir: env_opt("LOG_DIR").map(PathBuf::from),
            fedex: FedExConfig {
                base_url: env_opt("FEDEX_BASE_URL").unwrap_or(defaults.fedex.base_url),
                credentials: client_credentials("FEDEX_CLIENT_ID", "FEDEX_CLIENT_SECRET"),
            },
            pyle: PyleConfig {
                base_url: env_opt("ADUIEPYLE_BASE_URL").unwrap_or(defaults.pyle.base_url),
                user_email: env_opt("ADUIEPYLE_EMAIL"),
            },
            soap: SoapConfig {
                endpoint: env_opt("SOAP_TRACK_URL"),
                delivered_codes: env_list("SOAP_EVENT_CODES")
                    .unwrap_or(defaults.soap.delivered_codes),
            },
            trace: TraceConfig {
                endpoint: env_opt("TRACE_URL"),
                requestor: env_opt("TRACE_REQUESTOR"),
                authorization: env_opt("TRACE_AUTHORIZATION").map(SecretString::from),
            },
            ups: UpsConfig {
                base_url: env_opt("UPS_BASE_URL").unwrap_or(defaults.ups.base_url),
                credentials: client_credentials("UPS_CLIENT_ID", "UPS_CLIENT_SECRET"),
            },
            rest: RestConfig {
                base_url: env_opt("REST_TRACK_URL"),
                auth_url: env_opt("REST_AUTH_URL"),
                username: env_opt("REST_USERNAME"),
                password: env_opt("REST_PASSWORD").map(SecretString::from),
            },
        })
    }
}

/// Read a non-empty, trimmed environment variable.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            })
        })
        .transpose()
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = env_opt(key)?
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

fn client_credentials(id_key: &str, secret_key: &str) -> Option<ClientCredentials> {
    Some(ClientCredentials {
        client_id: env_opt(id_key)?,
        client_secret: SecretString::from(env_opt(secret_key)?),
    })
}
