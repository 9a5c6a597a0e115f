//! Diagnostics application.
//!
//! A small application that reports what the bridge made visible to it.
//! It is served in-process by a co-resident front end, or as the
//! `diagnostics-app` binary behind a proxied one, and answers the same
//! way in both.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::Version;
use axum::routing::get;
use axum::{Extension, Json, Router};

use crate::backend::ClientCertificate;
use crate::binding::BackendEnvironment;
use crate::hosting::ConnectionIntent;

/// Value reported when a variable is absent.
pub const NO_VALUE: &str = "NOVALUE";

/// The application framework's own https port variable. The bridge never
/// sets it; an operator may.
pub const APP_HTTPS_PORT: &str = "HTTPS_PORT";

pub fn diagnostics_router() -> Router {
    Router::new()
        .route("/BRIDGE_HTTPS_PORT", get(bridge_https_port))
        .route("/HTTPS_PORT", get(app_https_port))
        .route("/CheckProtocol", get(check_protocol))
        .route("/GetClientCert", get(client_cert))
        .route("/ConnectionClose", get(connection_close))
        .route("/ServerAddresses", get(server_addresses))
        .route("/Environment", get(environment))
}

async fn bridge_https_port(Extension(env): Extension<Arc<BackendEnvironment>>) -> String {
    env.https_port()
        .map(|port| port.to_string())
        .unwrap_or_else(|| NO_VALUE.to_string())
}

async fn app_https_port(Extension(env): Extension<Arc<BackendEnvironment>>) -> String {
    env.get(APP_HTTPS_PORT).unwrap_or(NO_VALUE).to_string()
}

async fn check_protocol(request: Request) -> &'static str {
    match request.version() {
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    }
}

async fn client_cert(ClientCertificate(identity): ClientCertificate) -> String {
    match identity {
        Some(identity) => format!("Enabled;{}", identity.thumbprint()),
        None => "Disabled".to_string(),
    }
}

async fn connection_close() -> (ConnectionIntent, &'static str) {
    (ConnectionIntent::RequestClose, "Closing")
}

async fn server_addresses(Extension(env): Extension<Arc<BackendEnvironment>>) -> String {
    env.server_addresses()
        .first()
        .map(|address| address.to_string())
        .unwrap_or_else(|| NO_VALUE.to_string())
}

async fn environment(
    Extension(env): Extension<Arc<BackendEnvironment>>,
) -> Json<BTreeMap<String, String>> {
    Json(
        env.bridge_entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::ClientIdentity;
    use axum::body::Body;
    use axum::http::{header, StatusCode};
    use tower::ServiceExt;

    fn app(env: BackendEnvironment) -> Router {
        diagnostics_router().layer(Extension(Arc::new(env)))
    }

    async fn get_text(app: Router, request: axum::http::Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn get(path: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn bridge_https_port_or_novalue() {
        let env = BackendEnvironment::from_vars([("BRIDGE_HTTPS_PORT", "44301")]);
        assert_eq!(get_text(app(env), get("/BRIDGE_HTTPS_PORT")).await.1, "44301");

        let (status, body) =
            get_text(app(BackendEnvironment::default()), get("/BRIDGE_HTTPS_PORT")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, NO_VALUE);
    }

    #[tokio::test]
    async fn app_https_port_is_separate_from_bridge_signal() {
        let env = BackendEnvironment::from_vars([("BRIDGE_HTTPS_PORT", "44301")]);
        assert_eq!(get_text(app(env), get("/HTTPS_PORT")).await.1, NO_VALUE);

        let env = BackendEnvironment::from_vars([("BRIDGE_HTTPS_PORT", "44301"), ("HTTPS_PORT", "8443")]);
        assert_eq!(get_text(app(env.clone()), get("/HTTPS_PORT")).await.1, "8443");
        assert_eq!(get_text(app(env), get("/BRIDGE_HTTPS_PORT")).await.1, "44301");
    }

    #[tokio::test]
    async fn protocol_is_reported() {
        let mut request = get("/CheckProtocol");
        *request.version_mut() = Version::HTTP_2;
        assert_eq!(get_text(app(BackendEnvironment::default()), request).await.1, "HTTP/2");
        assert_eq!(
            get_text(app(BackendEnvironment::default()), get("/CheckProtocol")).await.1,
            "HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn client_cert_from_extension() {
        let identity = ClientIdentity::from_der(vec![0x30, 0x00]);
        let mut request = get("/GetClientCert");
        request
            .extensions_mut()
            .insert(ClientCertificate(Some(identity.clone())));
        assert_eq!(
            get_text(app(BackendEnvironment::default()), request).await.1,
            format!("Enabled;{}", identity.thumbprint())
        );
        assert_eq!(
            get_text(app(BackendEnvironment::default()), get("/GetClientCert")).await.1,
            "Disabled"
        );
    }

    #[tokio::test]
    async fn connection_close_sets_intent() {
        let response = app(BackendEnvironment::default())
            .oneshot(get("/ConnectionClose"))
            .await
            .unwrap();
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }

    #[tokio::test]
    async fn server_addresses_first_entry() {
        let env = BackendEnvironment::from_vars([(
            "BRIDGE_SERVER_ADDRESSES",
            "https://localhost:44301/shop;http://localhost:8080/shop",
        )]);
        assert_eq!(
            get_text(app(env), get("/ServerAddresses")).await.1,
            "https://localhost:44301/shop"
        );
    }

    #[tokio::test]
    async fn environment_hides_token() {
        let env = BackendEnvironment::from_vars([
            ("BRIDGE_HTTPS_PORT", "5001"),
            ("BRIDGE_TOKEN", "secret"),
            ("PATH", "/bin"),
        ]);
        let (_, body) = get_text(app(env), get("/Environment")).await;
        let parsed: BTreeMap<String, String> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["BRIDGE_HTTPS_PORT"], "5001");
    }
}
