//! The single gate handler behind every path.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use flywheel_core::{Config, Status};
use flywheel_lifecycle::Pong;
use tracing::{debug, error, warn};

use crate::action::{with_start_action, without_action, Action};
use crate::pages;
use crate::GateState;

pub async fn gate(State(state): State<GateState>, req: Request) -> Response {
    let action = Action::from_uri(req.uri());
    let host = request_host(&req);
    debug!(method = %req.method(), uri = %req.uri(), %host, ?action, "gate request");

    let Some(kind) = action.ping_kind() else {
        return config_response(&state.config);
    };

    let mut pong = match state.lifecycle.ping(kind).await {
        Ok(pong) => pong,
        Err(e) => {
            error!(error = %e, "lifecycle request failed");
            return pages::error(&e.to_string());
        }
    };
    if pong.error.is_none() {
        pong.error = action.error();
    }

    match action {
        // Redirect so a refresh does not start again.
        Action::Start => Redirect::temporary(&without_action(req.uri())).into_response(),
        Action::PassThrough => pass_through(&state, req, pong, &host).await,
        Action::Status => json_reply(&pong, None),
        _ => {
            let location = prefers_html(req.headers()).then(|| without_action(req.uri()));
            json_reply(&pong, location)
        }
    }
}

async fn pass_through(state: &GateState, req: Request, pong: Pong, host: &str) -> Response {
    if let Some(e) = &pong.error {
        return pages::error(e);
    }

    match pong.status {
        Status::Stopped => pages::stopped(&with_start_action(req.uri())),
        Status::Starting => pages::starting(),
        Status::Stopping => pages::stopping(),
        Status::Unhealthy => pages::unhealthy(),
        Status::Started => {
            let backend = state.config.backend_for(host).to_string();
            match state.forwarder.forward(req, &backend).await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(%backend, error = %e, "forwarding failed");
                    (StatusCode::BAD_GATEWAY, format!("Bad Gateway: {e}")).into_response()
                }
            }
        }
    }
}

/// Serialize the reply. With `location` set, browsers are sent back to the
/// page they came from.
fn json_reply(pong: &Pong, location: Option<String>) -> Response {
    let body = match serde_json::to_string_pretty(pong) {
        Ok(body) => body,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let status = match (&pong.error, &location) {
        (Some(_), _) => StatusCode::INTERNAL_SERVER_ERROR,
        (None, Some(_)) => StatusCode::TEMPORARY_REDIRECT,
        (None, None) => StatusCode::OK,
    };

    let mut resp = (status, [(header::CONTENT_TYPE, "application/json")], body).into_response();
    if let Some(location) = location.filter(|_| status == StatusCode::TEMPORARY_REDIRECT) {
        if let Ok(value) = location.parse() {
            resp.headers_mut().insert(header::LOCATION, value);
        }
    }
    resp
}

fn config_response(config: &Config) -> Response {
    match serde_json::to_string_pretty(config) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Whether `text/html` appears in Accept before any `application/json`.
fn prefers_html(headers: &HeaderMap) -> bool {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match (accept.find("text/html"), accept.find("application/json")) {
        (Some(html), Some(json)) => html < json,
        (Some(_), None) => true,
        _ => false,
    }
}

fn request_host(req: &Request) -> String {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::HeaderValue;
    use chrono::{TimeZone, Utc};
    use flywheel_core::LifecycleSnapshot;
    use flywheel_lifecycle::{channel, PingKind};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::{build_router, Forwarder};

    /// Answers every ping with `snapshot`, recording what was asked.
    fn stub_lifecycle(
        snapshot: LifecycleSnapshot,
    ) -> (flywheel_lifecycle::LifecycleHandle, Arc<Mutex<Vec<PingKind>>>) {
        let (handle, mut rx) = channel(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        tokio::spawn(async move {
            while let Some(ping) = rx.recv().await {
                recorded.lock().unwrap().push(ping.kind);
                let _ = ping.reply.send(snapshot.clone());
            }
        });
        (handle, seen)
    }

    fn state(snapshot: LifecycleSnapshot) -> (GateState, Arc<Mutex<Vec<PingKind>>>) {
        let config = Config::from_json_str(
            r#"{ "endpoint": "127.0.0.1:9", "instances": ["i-1"], "idle-timeout": "90m" }"#,
        )
        .unwrap();
        let (lifecycle, seen) = stub_lifecycle(snapshot);
        let state = GateState {
            lifecycle,
            config: Arc::new(config),
            forwarder: Forwarder::default(),
        };
        (state, seen)
    }

    fn snapshot(status: Status) -> LifecycleSnapshot {
        LifecycleSnapshot {
            status,
            stop_at: Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap(),
            ..Default::default()
        }
    }

    fn get(uri: &str) -> Request {
        Request::builder()
            .uri(uri)
            .header(header::HOST, "app.example")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn stopped_serves_start_link() {
        let (state, seen) = state(snapshot(Status::Stopped));
        let resp = build_router(state).oneshot(get("/docs?page=2")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_string(resp).await;
        assert!(body.contains("flywheel=start"));
        assert_eq!(*seen.lock().unwrap(), vec![PingKind::Touch]);
    }

    #[tokio::test]
    async fn transitional_statuses_serve_pages() {
        for (status, text) in [
            (Status::Starting, "starting"),
            (Status::Stopping, "powered down"),
            (Status::Unhealthy, "unhealthy"),
        ] {
            let (state, _) = state(snapshot(status));
            let resp = build_router(state).oneshot(get("/")).await.unwrap();
            assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
            assert!(body_string(resp).await.contains(text));
        }
    }

    #[tokio::test]
    async fn reply_error_serves_error_page() {
        let (state, _) = state(snapshot(Status::Started).with_error("boom"));
        let resp = build_router(state).oneshot(get("/")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(resp).await.contains("boom"));
    }

    #[tokio::test]
    async fn start_redirects_without_action() {
        for status in [Status::Stopped, Status::Started, Status::Unhealthy] {
            let (state, seen) = state(snapshot(status));
            let resp = build_router(state)
                .oneshot(get("/app?x=1&flywheel=start"))
                .await
                .unwrap();

            assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
            assert_eq!(resp.headers()[header::LOCATION], "/app?x=1");
            assert_eq!(*seen.lock().unwrap(), vec![PingKind::Start]);
        }
    }

    #[tokio::test]
    async fn status_returns_json() {
        let (state, seen) = state(snapshot(Status::Started));
        let resp = build_router(state).oneshot(get("/?flywheel=status")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let json: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(json["status"], "STARTED");
        assert_eq!(json["stop-due-at"], "2024-03-01T13:00:00Z");
        assert_eq!(*seen.lock().unwrap(), vec![PingKind::Status]);
    }

    #[tokio::test]
    async fn stop_redirects_browsers_only() {
        let (state, _) = state(snapshot(Status::Stopping));
        let router = build_router(state);

        let resp = router.clone().oneshot(get("/p?flywheel=stop")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut req = get("/p?flywheel=stop");
        req.headers_mut().insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/json;q=0.9"),
        );
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[header::LOCATION], "/p");
        assert!(body_string(resp).await.contains("STOPPING"));
    }

    #[tokio::test]
    async fn stop_in_sends_duration() {
        let (state, seen) = state(snapshot(Status::Started));
        build_router(state)
            .oneshot(get("/?flywheel=stop-in:5m"))
            .await
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![PingKind::StopIn(std::time::Duration::from_secs(300))]
        );
    }

    #[tokio::test]
    async fn malformed_stop_in_reports_error() {
        let (state, seen) = state(snapshot(Status::Started));
        let resp = build_router(state)
            .oneshot(get("/?flywheel=stop-in:later"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(resp).await.contains("invalid duration"));
        assert_eq!(*seen.lock().unwrap(), vec![PingKind::Status]);
    }

    #[tokio::test]
    async fn overflowing_stop_in_reports_error() {
        let (state, seen) = state(snapshot(Status::Started));
        let resp = build_router(state)
            .oneshot(get("/?flywheel=stop-in:5000000000000000000h5000000000000000000h"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(json["status"], "STARTED");
        assert!(json["error"].as_str().unwrap().contains("invalid duration"));
        assert_eq!(*seen.lock().unwrap(), vec![PingKind::Status]);
    }

    #[tokio::test]
    async fn config_is_served_without_lifecycle() {
        let (state, seen) = state(snapshot(Status::Stopped));
        let resp = build_router(state).oneshot(get("/?flywheel=config")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(json["endpoint"], "127.0.0.1:9");
        assert_eq!(json["idle-timeout"], "1h30m");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_backend_is_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (mut state, _) = state(snapshot(Status::Started));
        let mut config = (*state.config).clone();
        config.endpoint = addr;
        state.config = Arc::new(config);

        let resp = build_router(state).oneshot(get("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn accept_negotiation_takes_first_match() {
        let mut headers = HeaderMap::new();
        assert!(!prefers_html(&headers));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json, text/html"));
        assert!(!prefers_html(&headers));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        assert!(prefers_html(&headers));
    }
}
