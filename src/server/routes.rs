//! HTTP surface (spec §4.9/§6): `/process`, `/output-stream`, `/history`,
//! `/form-config`, `/health`, `/`, `/stream`.

use crate::server::config::ServerConfig;
use crate::server::form::FormConfig;
use crate::server::session::SessionStore;
use crate::server::sse;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const SESSION_COOKIE: &str = "talkpipe_session_id";

pub struct AppState {
    pub sessions: SessionStore,
    pub config: ServerConfig,
    pub form_config: FormConfig,
    pub port: u16,
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/process", post(process))
        .route("/output-stream", get(output_stream))
        .route("/history", get(history).delete(clear_history))
        .route("/form-config", get(form_config))
        .route("/health", get(health))
        .route("/", get(index))
        .route("/stream", get(stream_view))
        .with_state(state.clone());

    if !state.config.cors_allowed_origins.is_empty() {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        router = router.layer(tower_http::cors::CorsLayer::new().allow_origin(origins));
    }

    router
}

fn session_id_from_cookies(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn session_cookie_header(id: &str) -> (header::HeaderName, String) {
    (header::SET_COOKIE, format!("{SESSION_COOKIE}={id}; HttpOnly; SameSite=Lax; Max-Age=86400; Path=/"))
}

fn check_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.config.api_key else { return Ok(()) };
    let provided = headers.get("X-API-Key").and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, Json(json!({"status": "error", "message": "invalid or missing API key"})))
            .into_response())
    }
}

async fn process(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = check_api_key(&state, &headers) {
        return response;
    }

    let existing = session_id_from_cookies(&headers);
    let session = state.sessions.get_or_create(existing.as_deref());
    let minted_cookie = existing.is_none();

    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let result = session.process(body.clone());

    let mut response = match result {
        Ok(outputs) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "message": "processed",
                "data": {"input": body, "output": outputs, "count": outputs.len()},
                "timestamp": timestamp,
            })),
        )
            .into_response(),
        Err(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": message,
                "data": {"input": body, "output": Value::Array(vec![]), "count": 0},
                "timestamp": timestamp,
            })),
        )
            .into_response(),
    };

    if minted_cookie {
        let (name, value) = session_cookie_header(&session.id);
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

async fn output_stream(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let id = session_id_from_cookies(&headers);
    let session = state.sessions.get_or_create(id.as_deref());
    sse::output_stream(session).into_response()
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let id = session_id_from_cookies(&headers);
    let session = state.sessions.get_or_create(id.as_deref());
    let entries = session.history(query.limit);
    Json(json!({"entries": entries, "count": entries.len()})).into_response()
}

async fn clear_history(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let id = session_id_from_cookies(&headers);
    let session = state.sessions.get_or_create(id.as_deref());
    session.clear_history();
    Json(json!({"status": "ok", "message": "history cleared"})).into_response()
}

async fn form_config(State(state): State<Arc<AppState>>) -> Json<FormConfig> {
    Json(state.form_config.clone())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    Json(json!({"status": "healthy", "timestamp": timestamp, "port": state.port}))
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render_form(&state.form_config))
}

async fn stream_view() -> Html<&'static str> {
    Html(
        "<!doctype html><html><body><h1>ChatterLang event stream</h1>\
         <pre id=\"events\"></pre>\
         <script>const es = new EventSource('/output-stream'); \
         es.onmessage = e => { document.getElementById('events').textContent += e.data + '\\n'; };</script>\
         </body></html>",
    )
}

fn render_form(config: &FormConfig) -> String {
    let mut fields = String::new();
    for field in &config.fields {
        fields.push_str(&format!(
            "<label>{label}<input type=\"{ty}\" name=\"{name}\" placeholder=\"{placeholder}\"{required}></label><br>",
            label = field.label,
            ty = field.field_type,
            name = field.name,
            placeholder = field.placeholder.clone().unwrap_or_default(),
            required = if field.required { " required" } else { "" },
        ));
    }
    format!(
        "<!doctype html><html><body><h1>{title}</h1><form id=\"f\">{fields}</form></body></html>",
        title = config.title,
        fields = fields,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_session_id_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("other=1; talkpipe_session_id=abc123"));
        assert_eq!(session_id_from_cookies(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn missing_cookie_header_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(session_id_from_cookies(&headers), None);
    }

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            sessions: SessionStore::new(
                crate::server::session::PASS_THROUGH_SCRIPT,
                std::time::Duration::from_secs(60),
            ),
            config: ServerConfig {
                cors_allowed_origins: Vec::new(),
                api_key: None,
                session_ttl_seconds: 60,
                default_llm_model: None,
                default_llm_source: None,
                llm_base_url: None,
            },
            form_config: FormConfig::default(),
            port: 0,
        })
    }

    async fn post_process(app: Router, cookie: Option<&str>, value: i64) -> (Option<String>, Value) {
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri("/process")
            .header("content-type", "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, format!("talkpipe_session_id={cookie}"));
        }
        let request = builder.body(axum::body::Body::from(value.to_string())).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| raw.split(';').next())
            .and_then(|kv| kv.split_once('=').map(|(_, v)| v.to_string()));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        (set_cookie, json)
    }

    async fn get_history(app: Router, cookie: &str) -> Value {
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/history")
            .header(header::COOKIE, format!("talkpipe_session_id={cookie}"))
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn two_sessions_see_only_their_own_history() {
        let state = test_state();

        let (cookie_a, _) = post_process(router(state.clone()), None, 1).await;
        let cookie_a = cookie_a.expect("first request mints a session cookie");
        for n in 2..=10 {
            post_process(router(state.clone()), Some(&cookie_a), n).await;
        }

        let (cookie_b, _) = post_process(router(state.clone()), None, 100).await;
        let cookie_b = cookie_b.expect("second client mints its own session cookie");
        for n in 101..=109 {
            post_process(router(state.clone()), Some(&cookie_b), n).await;
        }

        assert_ne!(cookie_a, cookie_b);

        let history_a = get_history(router(state.clone()), &cookie_a).await;
        let inputs_a: Vec<i64> = history_a["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["input"].as_i64().unwrap())
            .collect();
        assert_eq!(inputs_a, (1..=10).collect::<Vec<_>>());

        let history_b = get_history(router(state.clone()), &cookie_b).await;
        let inputs_b: Vec<i64> = history_b["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["input"].as_i64().unwrap())
            .collect();
        assert_eq!(inputs_b, (100..=109).collect::<Vec<_>>());
    }
}
