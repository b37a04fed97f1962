use crate::state::{AppState, SimState};
use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use mars_core::{Command, EventEnvelope, PrincipalId};
use serde::Deserialize;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const OPERATOR: &str = "principal_operator";

#[cfg(test)]
pub fn make_router(state: AppState) -> Router {
    make_router_with_cors(state, HeaderValue::from_static("http://localhost:5173"))
}

pub fn make_router_with_cors(state: AppState, cors_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/meta", get(meta_handler))
        .route("/api/v1/snapshot", get(snapshot_handler))
        .route("/api/v1/metrics", get(metrics_handler))
        .route("/api/v1/stream", get(stream_handler))
        .route("/api/v1/commands", post(command_handler))
        .route("/api/v1/time_ratio", post(time_ratio_handler))
        .route("/api/v1/save", post(save_handler))
        .route("/api/v1/pause", post(pause_handler))
        .route("/api/v1/resume", post(resume_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn meta_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    let sim = app_state.sim.lock();
    let meta = &sim.game_state.meta;
    Json(serde_json::json!({
        "pulse": meta.pulse,
        "sol": meta.time.sol(),
        "millisol": meta.time.millisol(),
        "seed": meta.seed,
        "content_version": meta.content_version,
        "pulses_per_sec": app_state.pulses_per_sec,
        "time_ratio": sim.clock.time_ratio(),
        "paused": app_state.paused.load(Ordering::Relaxed),
    }))
}

pub async fn snapshot_handler(
    State(app_state): State<AppState>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let sim = app_state.sim.lock();
    match serde_json::to_string(&sim.game_state) {
        Ok(json) => {
            drop(sim);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                json,
            )
        }
        Err(err) => {
            drop(sim);
            tracing::error!("snapshot serialization failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "application/json")],
                r#"{"error":"serialization failed"}"#.to_string(),
            )
        }
    }
}

pub async fn metrics_handler(
    State(app_state): State<AppState>,
) -> Json<VecDeque<mars_core::MetricsSnapshot>> {
    let sim = app_state.sim.lock();
    Json(sim.metrics_history.clone())
}

/// Queues an operator command for the next pulse.
pub async fn command_handler(
    State(app_state): State<AppState>,
    Json(command): Json<Command>,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut sim = app_state.sim.lock();
    let pulse = sim.game_state.meta.pulse;
    let SimState {
        next_command_id,
        pending_commands,
        ..
    } = &mut *sim;
    let envelope = mars_control::make_cmd(
        &PrincipalId(OPERATOR.to_string()),
        pulse,
        next_command_id,
        command,
    );
    let command_id = envelope.id.clone();
    pending_commands.push_back(envelope);
    drop(sim);

    tracing::info!(%command_id, pulse, "operator command queued");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"command_id": command_id, "execute_at_pulse": pulse})),
    )
}

#[derive(Deserialize)]
pub struct TimeRatioRequest {
    time_ratio: f64,
}

pub async fn time_ratio_handler(
    State(app_state): State<AppState>,
    Json(request): Json<TimeRatioRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut sim = app_state.sim.lock();
    match sim.clock.set_time_ratio(request.time_ratio) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"time_ratio": request.time_ratio})),
        ),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": err.to_string()})),
        ),
    }
}

pub async fn save_handler(
    State(app_state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(run_dir) = app_state.run_dir.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "no run directory (started with --no-metrics?)"})),
        );
    };

    let sim = app_state.sim.lock();
    let pulse = sim.game_state.meta.pulse;
    let body = match serde_json::to_string_pretty(&sim.game_state) {
        Ok(json) => json,
        Err(err) => {
            drop(sim);
            tracing::error!("save serialization failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "serialization failed"})),
            );
        }
    };
    drop(sim);

    let saves_dir = run_dir.join("saves");
    if let Err(err) = std::fs::create_dir_all(&saves_dir) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("create saves dir: {err}")})),
        );
    }
    let path = saves_dir.join(format!("save_{pulse}.json"));
    if let Err(err) = std::fs::write(&path, body) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": format!("write save: {err}")})),
        );
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"path": path.display().to_string(), "pulse": pulse})),
    )
}

pub async fn pause_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    app_state.paused.store(true, Ordering::Relaxed);
    Json(serde_json::json!({"paused": true}))
}

pub async fn resume_handler(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    app_state.paused.store(false, Ordering::Relaxed);
    Json(serde_json::json!({"paused": false}))
}

pub async fn stream_handler(
    State(app_state): State<AppState>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = app_state.event_tx.subscribe();
    let sim = app_state.sim.clone();

    let stream = async_stream::stream! {
        let mut heartbeat = tokio::time::interval(Duration::from_millis(200));
        heartbeat.tick().await; // discard the immediate first tick
        let mut flush = tokio::time::interval(Duration::from_millis(50));
        flush.tick().await;
        let mut pending: Vec<EventEnvelope> = Vec::new();
        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(events) => pending.extend(events),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = flush.tick() => {
                    if !pending.is_empty() {
                        let data = serde_json::to_string(&pending).unwrap_or_default();
                        pending.clear();
                        yield Ok(Event::default().data(data));
                    }
                }
                _ = heartbeat.tick() => {
                    let pulse = sim.lock().game_state.meta.pulse;
                    let hb = serde_json::json!({"heartbeat": true, "pulse": pulse});
                    yield Ok(Event::default().data(hb.to_string()));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::make_test_sim;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn make_test_state(run_dir: Option<PathBuf>) -> AppState {
        let (event_tx, _) = broadcast::channel(64);
        AppState {
            sim: Arc::new(parking_lot::Mutex::new(make_test_sim())),
            event_tx,
            paused: Arc::new(AtomicBool::new(false)),
            pulses_per_sec: 10.0,
            run_dir,
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_meta_reports_clock() {
        let app = make_router(make_test_state(None));
        let response = app.oneshot(get("/api/v1/meta")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["pulse"], 0);
        assert_eq!(json["sol"], 1);
        assert_eq!(json["paused"], false);
    }

    #[tokio::test]
    async fn test_snapshot_is_valid_json() {
        let app = make_router(make_test_state(None));
        let response = app.oneshot(get("/api/v1/snapshot")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["agents"]["agent_0001"].is_object());
    }

    #[tokio::test]
    async fn test_metrics_starts_empty() {
        let app = make_router(make_test_state(None));
        let response = app.oneshot(get("/api/v1/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_command_is_queued() {
        let state = make_test_state(None);
        let app = make_router(state.clone());
        let body = serde_json::json!({
            "StartMission": {"kind": "Exploration", "initiator": "agent_0001"}
        });
        let response = app
            .oneshot(post_json("/api/v1/commands", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["command_id"], "cmd_000000");

        let sim = state.sim.lock();
        assert_eq!(sim.pending_commands.len(), 1);
        assert_eq!(sim.next_command_id, 1);
    }

    #[tokio::test]
    async fn test_unknown_command_is_rejected() {
        let state = make_test_state(None);
        let app = make_router(state.clone());
        let body = serde_json::json!({"LaunchRocket": {}});
        let response = app
            .oneshot(post_json("/api/v1/commands", &body))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert!(state.sim.lock().pending_commands.is_empty());
    }

    #[tokio::test]
    async fn test_time_ratio_validation() {
        let state = make_test_state(None);
        let response = make_router(state.clone())
            .oneshot(post_json(
                "/api/v1/time_ratio",
                &serde_json::json!({"time_ratio": -5.0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_router(state.clone())
            .oneshot(post_json(
                "/api/v1/time_ratio",
                &serde_json::json!({"time_ratio": 250.0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!((state.sim.lock().clock.time_ratio() - 250.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let state = make_test_state(None);
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/pause")
            .body(Body::empty())
            .unwrap();
        let response = make_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.paused.load(Ordering::Relaxed));

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/resume")
            .body(Body::empty())
            .unwrap();
        make_router(state.clone()).oneshot(request).await.unwrap();
        assert!(!state.paused.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_save_without_run_dir_is_unavailable() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/save")
            .body(Body::empty())
            .unwrap();
        let response = make_router(make_test_state(None))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_save_writes_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/save")
            .body(Body::empty())
            .unwrap();
        let response = make_router(make_test_state(Some(dir.path().to_path_buf())))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let saved = dir.path().join("saves").join("save_0.json");
        let text = std::fs::read_to_string(saved).unwrap();
        let restored: mars_core::GameState = serde_json::from_str(&text).unwrap();
        assert_eq!(restored.agents.len(), 3);
    }
}
