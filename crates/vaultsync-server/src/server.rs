use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use directories::ProjectDirs;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    auth::{require_auth, AuthConfig},
    handlers::{clear_all, clear_config, download, health, status, upload},
    AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token for the auth gate ($VAULTSYNC_API_TOKEN).
    pub api_token: Option<String>,
    /// Basic-auth pair ($VAULTSYNC_USERNAME / $VAULTSYNC_PASSWORD);
    /// both must be set for the scheme to be active.
    pub username: Option<String>,
    pub password: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("VAULTSYNC_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("VAULTSYNC_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),
            api_token: std::env::var("VAULTSYNC_API_TOKEN").ok(),
            username: std::env::var("VAULTSYNC_USERNAME").ok(),
            password: std::env::var("VAULTSYNC_PASSWORD").ok(),
            data_dir: std::env::var("VAULTSYNC_DATA_DIR").ok().map(PathBuf::from),
            cors_origins: std::env::var("VAULTSYNC_CORS_ORIGINS").ok(),
        }
    }
}

impl ServerConfig {
    /// Collapse the credential fields into the gate's immutable config.
    /// Basic auth requires both halves of the pair.
    pub fn auth(&self) -> AuthConfig {
        AuthConfig {
            api_token: self.api_token.clone().filter(|t| !t.is_empty()),
            basic: match (&self.username, &self.password) {
                (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => {
                    Some((u.clone(), p.clone()))
                }
                _ => None,
            },
        }
    }
}

/// Resolve the storage directory for per-configuration record files.
///
/// Priority:
/// 1. Explicit config value
/// 2. `VAULTSYNC_DATA_DIR` environment variable
/// 3. Platform-specific app data dir (`~/.local/share/vaultsync/`, etc.)
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(d) = data_dir {
        std::fs::create_dir_all(d).context("create data dir")?;
        return Ok(d.clone());
    }

    if let Ok(dir) = std::env::var("VAULTSYNC_DATA_DIR") {
        let path = PathBuf::from(dir);
        std::fs::create_dir_all(&path).context("create VAULTSYNC_DATA_DIR")?;
        return Ok(path);
    }

    let dirs = ProjectDirs::from("", "", "vaultsync")
        .context("could not determine platform data directory")?;
    let path = dirs.data_dir().to_owned();
    std::fs::create_dir_all(&path).context("create platform data dir")?;
    Ok(path)
}

/// Assemble the application routes around `state`.
pub fn router(state: AppState) -> Router {
    // Open routes: liveness and the status overview.
    let public = Router::new()
        .route("/health", get(health))
        .route("/status", get(status));

    // Everything that touches blob data sits behind the gate, download
    // included — the gate is only open when no credentials are configured.
    let protected = Router::new()
        .route("/sync/{config}", post(upload))
        .route("/sync/{config}", get(download))
        .route("/clear/{config}", post(clear_config))
        .route("/clear", post(clear_all))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new().merge(public).merge(protected).with_state(state)
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using storage directory");

    let store = crate::store::Store::open(&data_dir).context("open store")?;

    let auth = cfg.auth();
    match (&auth.api_token, &auth.basic) {
        (Some(_), _) => info!("auth gate: bearer token"),
        (None, Some(_)) => info!("auth gate: basic credentials"),
        (None, None) => warn!("no credentials configured — anyone can read and write backups"),
    }

    let state = AppState { store, auth };
    let cors = build_cors(cfg.cors_origins.as_deref());

    let app = router(state).layer(cors).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "vaultsync server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn make_app(api_token: Option<&str>) -> (Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let state = AppState {
            store: crate::store::Store::open(dir.path()).unwrap(),
            auth: AuthConfig {
                api_token: api_token.map(str::to_owned),
                basic: None,
            },
        };
        (router(state), dir)
    }

    fn upload_request(auth_header: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/sync/work").header(header::CONTENT_TYPE, "application/json");
        if let Some(value) = auth_header {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder
            .body(Body::from(r#"{"encrypted_data":"{\"v\":1}"}"#))
            .unwrap()
    }

    #[tokio::test]
    async fn write_without_token_is_challenged_with_it_succeeds() {
        let (app, _dir) = make_app(Some("sekrit"));

        let resp = app.clone().oneshot(upload_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let challenge = resp.headers().get(header::WWW_AUTHENTICATE).unwrap();
        assert!(challenge.to_str().unwrap().starts_with("Bearer"));

        let resp = app
            .clone()
            .oneshot(upload_request(Some("Bearer wrong")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(upload_request(Some("Bearer sekrit")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn download_sits_behind_the_gate_too() {
        let (app, _dir) = make_app(Some("sekrit"));

        app.clone()
            .oneshot(upload_request(Some("Bearer sekrit")))
            .await
            .unwrap();

        let req = Request::get("/sync/work").body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::get("/sync/work")
            .header(header::AUTHORIZATION, "Bearer sekrit")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_and_health_stay_open_when_token_is_set() {
        let (app, _dir) = make_app(Some("sekrit"));

        for path in ["/status", "/health"] {
            let req = Request::get(path).body(Body::empty()).unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{path} should be open");
        }
    }

    #[tokio::test]
    async fn everything_is_open_without_credentials() {
        let (app, _dir) = make_app(None);
        let resp = app.oneshot(upload_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn auth_requires_both_basic_halves() {
        let cfg = ServerConfig {
            username: Some("alice".into()),
            password: None,
            api_token: None,
            ..base()
        };
        assert!(cfg.auth().is_open());

        let cfg = ServerConfig {
            username: Some("alice".into()),
            password: Some("pw".into()),
            api_token: None,
            ..base()
        };
        assert_eq!(cfg.auth().basic, Some(("alice".into(), "pw".into())));
    }

    #[test]
    fn empty_token_means_open() {
        let cfg = ServerConfig {
            api_token: Some(String::new()),
            ..base()
        };
        assert!(cfg.auth().is_open());
    }

    fn base() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            api_token: None,
            username: None,
            password: None,
            data_dir: None,
            cors_origins: None,
        }
    }
}
