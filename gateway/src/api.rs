//! The gateway HTTP surface: thin axum handlers over the bridge crate's
//! cache, resolver, and fan-out fetcher.

use crate::config::Config;
use crate::errors::ApiError;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use bridge::cache::{CACHE_TTL, Namespace, TtlCache};
use bridge::client::{BridgeClient, FileKey};
use bridge::fetcher::{BundleResult, Fetcher};
use bridge::normalize::NormalizedRecord;
use bridge::registry;
use bridge::resolver;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Deadline for the upstream dependency probe behind `/status`.
const STATUS_PROBE_DEADLINE: Duration = Duration::from_secs(8);

const ROUTES: &[&str] = &[
    "/",
    "/health",
    "/status",
    "/debug",
    "/api/pull",
    "/api/filetext",
    "/api/pushmail",
    "/api/bundle",
    "/api/cache/flush",
    "/api/registry",
    "/api/debug-bridge",
    "/api/about",
    "/api/version",
];

pub struct AppState {
    client: BridgeClient,
    fetcher: Fetcher,
    cache: Arc<TtlCache<NormalizedRecord>>,
    registry_path: PathBuf,
    proxy_key: Option<String>,
    started_at: Instant,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let client = BridgeClient::new(&config.bridge.url, &config.bridge.token);
        let cache = Arc::new(TtlCache::new(CACHE_TTL));
        AppState {
            fetcher: Fetcher::new(client.clone(), cache.clone()),
            client,
            cache,
            registry_path: config.registry_path.clone(),
            // An empty credential cannot authorize anything; treat it as
            // unconfigured so flush stays refused.
            proxy_key: config.proxy_key.clone().filter(|k| !k.is_empty()),
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/debug", get(debug_echo))
        .route("/api/pull", get(pull))
        .route("/api/filetext", get(filetext))
        .route("/api/pushmail", get(pushmail))
        .route("/api/bundle", get(bundle))
        .route("/api/cache/flush", post(cache_flush))
        .route("/api/registry", get(registry_view))
        .route("/api/debug-bridge", get(debug_bridge))
        .route("/api/about", get(about))
        .route("/api/version", get(version))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(config: Config) -> Result<(), std::io::Error> {
    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    let state = Arc::new(AppState::from_config(&config));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("gateway listening on {addr}");
    axum::serve(listener, router(state)).await
}

async fn root() -> &'static str {
    "OK"
}

/// Liveness only; never touches the upstream.
async fn health() -> Json<Value> {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    Json(json!({ "ok": true, "ts": ts }))
}

/// Upstream dependency probe with a bounded deadline.
async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let up = state.client.ping(STATUS_PROBE_DEADLINE).await;
    Json(json!({ "ok": true, "bridge": if up { "up" } else { "down" } }))
}

async fn debug_echo(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    Json(json!({ "query": params }))
}

#[derive(Deserialize)]
struct AliasParams {
    alias: Option<String>,
    /// Short-form fallback some callers use.
    a: Option<String>,
}

impl AliasParams {
    fn require_alias(&self) -> Result<String, ApiError> {
        let alias = self
            .alias
            .as_deref()
            .or(self.a.as_deref())
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if alias.is_empty() {
            return Err(ApiError::MissingParameter("alias"));
        }
        Ok(alias)
    }
}

async fn pull(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AliasParams>,
) -> Result<Json<NormalizedRecord>, ApiError> {
    let alias = params.require_alias()?;
    let (record, _cached) = state
        .fetcher
        .fetch_one(Namespace::Pull, &FileKey::Alias(alias))
        .await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct FiletextParams {
    alias: Option<String>,
    id: Option<String>,
}

async fn filetext(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FiletextParams>,
) -> Result<Json<NormalizedRecord>, ApiError> {
    let id = params.id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let alias = params
        .alias
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    // An id wins over an alias; each gets its own cache namespace.
    let (namespace, key) = match (id, alias) {
        (Some(id), _) => (Namespace::Id, FileKey::Id(id.to_string())),
        (None, Some(alias)) => (
            Namespace::Alias,
            FileKey::Alias(alias.to_ascii_lowercase()),
        ),
        (None, None) => return Err(ApiError::MissingParameter("alias or id")),
    };

    let (record, _cached) = state.fetcher.fetch_one(namespace, &key).await?;
    Ok(Json(record))
}

/// Side effecting upstream call; never cached.
async fn pushmail(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AliasParams>,
) -> Result<Json<Value>, ApiError> {
    let alias = params.require_alias()?;
    state.client.push_mail(&alias).await?;
    Ok(Json(json!({ "ok": true, "alias": alias, "status": "sent_to_gmail" })))
}

#[derive(Deserialize)]
struct BundleParams {
    aliases: Option<String>,
}

async fn bundle(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BundleParams>,
) -> Result<Json<BundleResult>, ApiError> {
    let input = params.aliases.unwrap_or_default();
    let aliases = resolver::resolve(&input, &state.registry_path).await?;
    let result = state.fetcher.fetch_bundle(Namespace::Bundle, aliases).await;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct FlushParams {
    key: Option<String>,
}

async fn cache_flush(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<FlushParams>,
) -> Result<Json<Value>, ApiError> {
    let presented = headers
        .get("x-proxy-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(params.key);

    // Fail closed: with no configured key, flush is never allowed.
    match (&state.proxy_key, presented) {
        (Some(expected), Some(presented)) if *expected == presented => {}
        _ => return Err(ApiError::Forbidden),
    }

    let flushed = state.cache.flush();
    tracing::info!(flushed, "cache flushed");
    Ok(Json(json!({ "ok": true, "flushed": flushed })))
}

async fn registry_view(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let registry = registry::load(&state.registry_path).await?;

    let base = registry.base.clone().unwrap_or_else(|| {
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{host}")
    });

    let audiences: Vec<Value> = registry
        .audiences
        .iter()
        .map(|audience| {
            json!({
                "alias": audience.alias,
                "name": audience.name.clone().unwrap_or_else(|| audience.alias.clone()),
                "pull_url": format!("{base}/api/filetext?alias={}", audience.alias),
                "push_url": format!("{base}/api/pushmail?alias={}", audience.alias),
            })
        })
        .collect();

    Ok(Json(json!({
        "project": registry.project.clone().unwrap_or_else(|| "Bridge Gateway".to_string()),
        "base": base,
        "endpoints": {
            "filetext": format!("{base}/api/filetext?alias="),
            "pushmail": format!("{base}/api/pushmail?alias="),
            "debug": format!("{base}/api/debug-bridge?"),
        },
        "audiences": audiences,
    })))
}

/// Operator diagnostics: forwards the query string to the bridge as-is and
/// reports what came back. Never cached, never echoes the token.
async fn debug_bridge(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let params: Vec<(String, String)> = params.into_iter().collect();
    let raw = state.client.raw(&params).await?;
    Ok(Json(json!({
        "ok": true,
        "status": raw.status,
        "contentType": raw.content_type,
        "bodyPreview": raw.body_preview,
    })))
}

/// Build and environment introspection. Secrets are reported as booleans
/// only, never echoed.
async fn about(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "env": {
            "proxy_key": state.proxy_key.is_some(),
        },
        "uptime_s": state.started_at.elapsed().as_secs(),
        "routes": ROUTES,
    }))
}

async fn version() -> Json<Value> {
    Json(json!({ "build": concat!("gateway-", env!("CARGO_PKG_VERSION")) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BridgeConfig, Listener};
    use axum::http::StatusCode;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(bridge_url: &str, proxy_key: Option<&str>, registry_path: PathBuf) -> Config {
        Config {
            listener: Listener::default(),
            bridge: BridgeConfig {
                url: bridge_url.to_string(),
                token: "secret".to_string(),
            },
            proxy_key: proxy_key.map(str::to_string),
            registry_path,
        }
    }

    async fn start_gateway(config: Config) -> String {
        let state = Arc::new(AppState::from_config(&config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        format!("http://{addr}")
    }

    fn write_registry(contents: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "{contents}").unwrap();
        tmp
    }

    // Non-routable in practice: nothing listens on this port in tests.
    const DEAD_BRIDGE: &str = "http://127.0.0.1:9";

    #[tokio::test]
    async fn health_succeeds_while_bridge_is_down() {
        let base = start_gateway(test_config(DEAD_BRIDGE, None, "registry.json".into())).await;

        let response = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["ok"], json!(true));
        assert!(body["ts"].is_u64());
    }

    #[tokio::test]
    async fn status_reports_down_for_unreachable_bridge() {
        let base = start_gateway(test_config(DEAD_BRIDGE, None, "registry.json".into())).await;

        let body: Value = reqwest::get(format!("{base}/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["bridge"], json!("down"));
    }

    #[tokio::test]
    async fn flush_is_refused_when_no_key_is_configured() {
        let base = start_gateway(test_config(DEAD_BRIDGE, None, "registry.json".into())).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/cache/flush"))
            .header("x-proxy-key", "anything")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], json!("forbidden"));
    }

    #[tokio::test]
    async fn empty_configured_key_still_fails_closed() {
        let base =
            start_gateway(test_config(DEAD_BRIDGE, Some(""), "registry.json".into())).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/cache/flush?key="))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn flush_with_matching_key_reports_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("alias", "ca1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "t" })))
            .mount(&server)
            .await;

        let base = start_gateway(test_config(
            &server.uri(),
            Some("flush-key"),
            "registry.json".into(),
        ))
        .await;
        let client = reqwest::Client::new();

        // Warm one entry, then flush it.
        client
            .get(format!("{base}/api/pull?alias=ca1"))
            .send()
            .await
            .unwrap();

        let response = client
            .post(format!("{base}/api/cache/flush"))
            .header("x-proxy-key", "flush-key")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["flushed"], json!(1));
    }

    #[tokio::test]
    async fn flush_accepts_the_query_parameter_form() {
        let base = start_gateway(test_config(
            DEAD_BRIDGE,
            Some("flush-key"),
            "registry.json".into(),
        ))
        .await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/cache/flush?key=flush-key"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn pull_without_alias_is_a_400() {
        let base = start_gateway(test_config(DEAD_BRIDGE, None, "registry.json".into())).await;

        let response = reqwest::get(format!("{base}/api/pull")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], json!("alias is required"));
    }

    #[tokio::test]
    async fn pull_returns_the_normalized_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("action", "fileText"))
            .and(query_param("alias", "ca1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "name": "n", "text": "t" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let base =
            start_gateway(test_config(&server.uri(), None, "registry.json".into())).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .get(format!("{base}/api/pull?alias=CA1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({ "ok": true, "alias": "ca1", "name": "n", "text": "t" }));

        // Second request is a cache hit; the mock's expect(1) verifies no
        // further upstream call happened.
        let again: Value = client
            .get(format!("{base}/api/pull?alias=ca1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(again, body);
    }

    #[tokio::test]
    async fn pull_maps_upstream_failure_to_502_with_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "boom" })))
            .mount(&server)
            .await;

        let base =
            start_gateway(test_config(&server.uri(), None, "registry.json".into())).await;
        let response = reqwest::get(format!("{base}/api/pull?alias=ca1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], json!(500));
        assert_eq!(body["source"]["detail"], json!("boom"));
    }

    #[tokio::test]
    async fn filetext_requires_alias_or_id() {
        let base = start_gateway(test_config(DEAD_BRIDGE, None, "registry.json".into())).await;

        let response = reqwest::get(format!("{base}/api/filetext")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn filetext_by_id_uses_the_id_namespace() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("id", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "t" })))
            .expect(1)
            .mount(&server)
            .await;

        let base =
            start_gateway(test_config(&server.uri(), None, "registry.json".into())).await;
        let body: Value = reqwest::get(format!("{base}/api/filetext?id=42"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["alias"], json!("42"));
        assert_eq!(body["text"], json!("t"));
    }

    #[tokio::test]
    async fn bundle_returns_mixed_outcomes_with_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("alias", "good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "t" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("alias", "bad"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "boom" })))
            .mount(&server)
            .await;

        let base =
            start_gateway(test_config(&server.uri(), None, "registry.json".into())).await;
        let response = reqwest::get(format!("{base}/api/bundle?aliases=good,bad,good"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["total"], json!(2));
        assert_eq!(body["loaded"], json!(1));
        assert_eq!(body["aliases"], json!(["good", "bad"]));
        assert_eq!(body["results"][0]["ok"], json!(true));
        assert_eq!(body["results"][1]["ok"], json!(false));
    }

    #[tokio::test]
    async fn bundle_all_resolves_through_the_registry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "t" })))
            .mount(&server)
            .await;

        let registry = write_registry(
            r#"{ "audiences": [ { "alias": "ca1" }, { "alias": "ca2" } ] }"#,
        );
        let base = start_gateway(test_config(
            &server.uri(),
            None,
            registry.path().to_path_buf(),
        ))
        .await;

        let body: Value = reqwest::get(format!("{base}/api/bundle?aliases=all"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["total"], json!(2));
        assert_eq!(body["aliases"], json!(["ca1", "ca2"]));
    }

    #[tokio::test]
    async fn bundle_without_aliases_is_a_400() {
        let base = start_gateway(test_config(DEAD_BRIDGE, None, "registry.json".into())).await;

        let response = reqwest::get(format!("{base}/api/bundle")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bundle_all_with_empty_registry_is_a_404() {
        let registry = write_registry(r#"{ "audiences": [] }"#);
        let base = start_gateway(test_config(
            DEAD_BRIDGE,
            None,
            registry.path().to_path_buf(),
        ))
        .await;

        let response = reqwest::get(format!("{base}/api/bundle?aliases=all"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn registry_view_builds_urls_from_the_request_host() {
        let registry = write_registry(
            r#"{ "project": "demo", "audiences": [ { "alias": "ca1", "name": "First" } ] }"#,
        );
        let base = start_gateway(test_config(
            DEAD_BRIDGE,
            None,
            registry.path().to_path_buf(),
        ))
        .await;

        let body: Value = reqwest::get(format!("{base}/api/registry"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["project"], json!("demo"));
        assert_eq!(body["base"], json!(base));
        assert_eq!(body["audiences"][0]["name"], json!("First"));
        assert_eq!(
            body["audiences"][0]["pull_url"],
            json!(format!("{base}/api/filetext?alias=ca1"))
        );
    }

    #[tokio::test]
    async fn registry_view_reports_load_errors_as_500() {
        let base = start_gateway(test_config(
            DEAD_BRIDGE,
            None,
            "/no/such/registry.json".into(),
        ))
        .await;

        let response = reqwest::get(format!("{base}/api/registry")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], json!("registry_load_error"));
    }

    #[tokio::test]
    async fn pushmail_reports_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("action", "pushtogmail"))
            .and(query_param("alias", "ca1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let base =
            start_gateway(test_config(&server.uri(), None, "registry.json".into())).await;
        let body: Value = reqwest::get(format!("{base}/api/pushmail?alias=ca1"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            body,
            json!({ "ok": true, "alias": "ca1", "status": "sent_to_gmail" })
        );
    }

    #[tokio::test]
    async fn debug_bridge_previews_the_raw_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("action", "ping"))
            .and(query_param("token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;

        let base =
            start_gateway(test_config(&server.uri(), None, "registry.json".into())).await;
        let body: Value = reqwest::get(format!("{base}/api/debug-bridge?action=ping"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["status"], json!(200));
        assert_eq!(body["bodyPreview"], json!("pong"));
        // The injected token must not leak back to the caller.
        assert!(body.get("bridge_url").is_none());
    }

    #[tokio::test]
    async fn about_reports_secret_presence_as_booleans_only() {
        let base = start_gateway(test_config(
            DEAD_BRIDGE,
            Some("flush-key"),
            "registry.json".into(),
        ))
        .await;

        let body: Value = reqwest::get(format!("{base}/api/about"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["env"]["proxy_key"], json!(true));
        assert!(body.to_string().find("flush-key").is_none());
        assert!(body["routes"].as_array().unwrap().len() >= 10);
    }
}
