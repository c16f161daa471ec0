//! Carrier sessions and the once-per-run authentication bootstrap.
//!
//! A family whose session cannot be established is left out of the
//! [`SessionSet`]; the scheduler then treats its carrier codes as unsupported
//! for the rest of the run.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use crate::carriers::{CarrierFamily, http_client};
use crate::config::{ClientCredentials, TrackerConfig};
use crate::error::AuthError;

/// Pre-authenticated context for one carrier family.
#[derive(Debug, Clone)]
pub enum CarrierSession {
    /// OAuth or custom-issued bearer token.
    Bearer(SecretString),
    /// Account identity, optionally with a secret sent alongside requests.
    Account {
        user: String,
        password: Option<SecretString>,
    },
    /// No credentials needed.
    Anonymous,
}

impl CarrierSession {
    /// Account user, if this session carries one.
    pub fn user(&self) -> Option<&str> {
        match self {
            Self::Account { user, .. } => Some(user),
            _ => None,
        }
    }
}

/// Sessions available for this run, keyed by family. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct SessionSet {
    sessions: HashMap<CarrierFamily, Arc<CarrierSession>>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, family: CarrierFamily, session: CarrierSession) {
        self.sessions.insert(family, Arc::new(session));
    }

    /// Builder form of [`SessionSet::insert`].
    pub fn with(mut self, family: CarrierFamily, session: CarrierSession) -> Self {
        self.insert(family, session);
        self
    }

    pub fn get(&self, family: CarrierFamily) -> Option<Arc<CarrierSession>> {
        self.sessions.get(&family).cloned()
    }

    pub fn contains(&self, family: CarrierFamily) -> bool {
        self.sessions.contains_key(&family)
    }

    pub fn families(&self) -> Vec<CarrierFamily> {
        let mut families: Vec<_> = self.sessions.keys().copied().collect();
        families.sort();
        families
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token: Option<String>,
}

impl TokenResponse {
    fn into_token(self) -> Option<String> {
        self.access_token.or(self.token).filter(|t| !t.is_empty())
    }
}

/// Establish every session the configuration allows. Never fails as a whole:
/// each family that cannot authenticate is logged and skipped.
pub async fn bootstrap_sessions(config: &TrackerConfig) -> SessionSet {
    let client = http_client(&config.adapter);
    let mut sessions = SessionSet::new();

    for family in CarrierFamily::ALL {
        match establish(&client, config, family).await {
            Ok(session) => {
                info!(%family, "Carrier session ready");
                sessions.insert(family, session);
            }
            Err(AuthError::NotConfigured { .. }) => {
                info!(%family, "Carrier not configured; its codes will be skipped");
            }
            Err(e) => {
                warn!(%family, error = %e, "Carrier authentication failed; its codes will be skipped");
                eprintln!("   Warning: {e}");
            }
        }
    }

    sessions
}

async fn establish(
    client: &reqwest::Client,
    config: &TrackerConfig,
    family: CarrierFamily,
) -> Result<CarrierSession, AuthError> {
    let not_configured = || AuthError::NotConfigured {
        family: family.to_string(),
    };

    match family {
        CarrierFamily::FedEx => {
            let creds = config.fedex.credentials.as_ref().ok_or_else(not_configured)?;
            let url = format!("{}/oauth/token", config.fedex.base_url.trim_end_matches('/'));
            client_credentials_token(client, &url, creds, false, family)
                .await
                .map(CarrierSession::Bearer)
        }
        CarrierFamily::Ups => {
            let creds = config.ups.credentials.as_ref().ok_or_else(not_configured)?;
            let url = format!(
                "{}/security/v1/oauth/token",
                config.ups.base_url.trim_end_matches('/')
            );
            client_credentials_token(client, &url, creds, true, family)
                .await
                .map(CarrierSession::Bearer)
        }
        CarrierFamily::Pyle => Ok(match &config.pyle.user_email {
            Some(user) => CarrierSession::Account {
                user: user.clone(),
                password: None,
            },
            None => CarrierSession::Anonymous,
        }),
        CarrierFamily::Soap => {
            config.soap.endpoint.as_ref().ok_or_else(not_configured)?;
            Ok(CarrierSession::Anonymous)
        }
        CarrierFamily::Trace => {
            config.trace.endpoint.as_ref().ok_or_else(not_configured)?;
            let (Some(requestor), Some(authorization)) =
                (&config.trace.requestor, &config.trace.authorization)
            else {
                return Err(not_configured());
            };
            Ok(CarrierSession::Account {
                user: requestor.clone(),
                password: Some(authorization.clone()),
            })
        }
        CarrierFamily::Rest => {
            config.rest.base_url.as_ref().ok_or_else(not_configured)?;
            match (&config.rest.auth_url, &config.rest.username, &config.rest.password) {
                (Some(auth_url), Some(username), Some(password)) => {
                    custom_token(client, auth_url, username, password, family)
                        .await
                        .map(CarrierSession::Bearer)
                }
                _ => Ok(CarrierSession::Anonymous),
            }
        }
    }
}

/// OAuth2 client-credentials grant. UPS expects the client pair as HTTP basic
/// auth, FedEx as form fields.
pub async fn client_credentials_token(
    client: &reqwest::Client,
    url: &str,
    creds: &ClientCredentials,
    basic_auth: bool,
    family: CarrierFamily,
) -> Result<SecretString, AuthError> {
    let request = if basic_auth {
        client
            .post(url)
            .basic_auth(&creds.client_id, Some(creds.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
    } else {
        client.post(url).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.expose_secret()),
        ])
    };

    read_token(request, family).await
}

/// Token from a custom auth endpoint taking a JSON username/password body.
pub async fn custom_token(
    client: &reqwest::Client,
    url: &str,
    username: &str,
    password: &SecretString,
    family: CarrierFamily,
) -> Result<SecretString, AuthError> {
    let body = serde_json::json!({
        "username": username,
        "password": password.expose_secret(),
    });
    read_token(client.post(url).json(&body), family).await
}

async fn read_token(
    request: reqwest::RequestBuilder,
    family: CarrierFamily,
) -> Result<SecretString, AuthError> {
    let failed = |reason: String| AuthError::RequestFailed {
        family: family.to_string(),
        reason,
    };

    let response = request.send().await.map_err(|e| failed(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Rejected {
            family: family.to_string(),
            status: status.as_u16(),
        });
    }

    let payload: TokenResponse = response.json().await.map_err(|e| failed(e.to_string()))?;
    payload
        .into_token()
        .map(SecretString::from)
        .ok_or_else(|| AuthError::MissingToken {
            family: family.to_string(),
            field: "access_token".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_families_are_omitted() {
        let sessions = bootstrap_sessions(&TrackerConfig::default()).await;
        // Pyle works without credentials; everything else needs configuration.
        assert_eq!(sessions.families(), vec![CarrierFamily::Pyle]);
        assert!(matches!(
            sessions.get(CarrierFamily::Pyle).as_deref(),
            Some(CarrierSession::Anonymous)
        ));
    }

    #[tokio::test]
    async fn account_sessions_come_from_config() {
        let mut config = TrackerConfig::default();
        config.pyle.user_email = Some("ops@example.com".into());
        config.trace.endpoint = Some("http://127.0.0.1:9/trace".into());
        config.trace.requestor = Some("ops".into());
        config.trace.authorization = Some(SecretString::from("key"));

        let sessions = bootstrap_sessions(&config).await;
        assert_eq!(
            sessions.get(CarrierFamily::Pyle).and_then(|s| s.user().map(str::to_string)),
            Some("ops@example.com".to_string())
        );
        assert!(sessions.contains(CarrierFamily::Trace));
    }

    #[test]
    fn token_response_accepts_either_field() {
        let a: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(a.into_token().as_deref(), Some("abc"));
        let b: TokenResponse = serde_json::from_str(r#"{"token":"xyz"}"#).unwrap();
        assert_eq!(b.into_token().as_deref(), Some("xyz"));
        let c: TokenResponse = serde_json::from_str(r#"{"access_token":""}"#).unwrap();
        assert_eq!(c.into_token(), None);
    }
}
