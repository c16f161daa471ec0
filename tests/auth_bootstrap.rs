//! Session bootstrap against mock token endpoints.
//!
//! A family whose token request fails must drop out of the session set
//! without affecting the others, and its rows must then be skipped.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpListener;
use tokio::time::timeout;

use delivery_sync::auth::{CarrierSession, bootstrap_sessions, client_credentials_token, custom_token};
use delivery_sync::carriers::{CarrierFamily, FedExCarrier};
use delivery_sync::config::{ClientCredentials, TrackerConfig};
use delivery_sync::error::AuthError;
use delivery_sync::ledger::ShipmentRow;
use delivery_sync::progress::NullReporter;
use delivery_sync::router::{CarrierRouter, RouteTable};
use delivery_sync::scheduler::RowScheduler;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

fn credentials(id: &str) -> Option<ClientCredentials> {
    Some(ClientCredentials {
        client_id: id.to_string(),
        client_secret: SecretString::from("secret"),
    })
}

/// FedEx rejects the grant; UPS issues a token only for basic auth.
fn token_app() -> Router {
    Router::new()
        .route("/oauth/token", post(|| async { StatusCode::UNAUTHORIZED }))
        .route(
            "/security/v1/oauth/token",
            post(|headers: HeaderMap, body: String| async move {
                let basic = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.starts_with("Basic "));
                if !basic || !body.contains("grant_type=client_credentials") {
                    return (StatusCode::BAD_REQUEST, String::new());
                }
                (StatusCode::OK, r#"{"access_token":"ups-token","expires_in":3600}"#.to_string())
            }),
        )
}

#[tokio::test]
async fn rejected_family_is_left_out() {
    timeout(TEST_TIMEOUT, async {
        let base = serve(token_app()).await;
        let mut config = TrackerConfig::default();
        config.fedex.base_url = base.clone();
        config.fedex.credentials = credentials("fedex-client");
        config.ups.base_url = base;
        config.ups.credentials = credentials("ups-client");

        let sessions = bootstrap_sessions(&config).await;

        assert_eq!(
            sessions.families(),
            vec![CarrierFamily::Pyle, CarrierFamily::Ups]
        );
        match sessions.get(CarrierFamily::Ups).as_deref() {
            Some(CarrierSession::Bearer(token)) => assert_eq!(token.expose_secret(), "ups-token"),
            other => panic!("unexpected UPS session: {other:?}"),
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rows_of_a_rejected_family_are_unsupported() {
    timeout(TEST_TIMEOUT, async {
        let base = serve(token_app()).await;
        let mut config = TrackerConfig::default();
        config.fedex.base_url = base.clone();
        config.fedex.credentials = credentials("fedex-client");

        let sessions = bootstrap_sessions(&config).await;
        assert!(!sessions.contains(CarrierFamily::FedEx));

        // The adapter exists but has no session, so it must never be called.
        let router = CarrierRouter::new(&RouteTable::default())
            .with(Arc::new(FedExCarrier::new(&base, &config.adapter)));
        let scheduler = RowScheduler::new(Arc::new(router), Arc::new(sessions), 2);
        let mut rows = vec![ShipmentRow::new(0, "FEP", "X1")];

        let summary = scheduler.run(&mut rows, &NullReporter::default()).await;

        assert_eq!(summary.unsupported, 1);
        assert_eq!(summary.eligible, 0);
        assert!(rows[0].delivered_date.is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn token_response_without_token_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let app = Router::new().route(
            "/oauth/token",
            post(|| async { r#"{"token_type":"bearer","expires_in":3600}"# }),
        );
        let base = serve(app).await;
        let client = reqwest::Client::new();
        let creds = credentials("fedex-client").unwrap();

        let err = client_credentials_token(
            &client,
            &format!("{base}/oauth/token"),
            &creds,
            false,
            CarrierFamily::FedEx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::MissingToken { ref family, .. } if family == "fedex"));

        let mut config = TrackerConfig::default();
        config.fedex.base_url = base;
        config.fedex.credentials = Some(creds);
        assert!(!bootstrap_sessions(&config).await.contains(CarrierFamily::FedEx));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn custom_endpoint_issues_rest_token() {
    timeout(TEST_TIMEOUT, async {
        let app = Router::new().route(
            "/auth",
            post(|body: String| async move {
                let request: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
                if request["username"] == "ops" && request["password"] == "pw" {
                    (StatusCode::OK, r#"{"token":"rest-token"}"#.to_string())
                } else {
                    (StatusCode::FORBIDDEN, String::new())
                }
            }),
        );
        let base = serve(app).await;
        let client = reqwest::Client::new();

        let token = custom_token(
            &client,
            &format!("{base}/auth"),
            "ops",
            &SecretString::from("pw"),
            CarrierFamily::Rest,
        )
        .await
        .unwrap();
        assert_eq!(token.expose_secret(), "rest-token");

        let err = custom_token(
            &client,
            &format!("{base}/auth"),
            "ops",
            &SecretString::from("wrong"),
            CarrierFamily::Rest,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::Rejected { status: 403, .. }));
    })
    .await
    .expect("test timed out");
}
