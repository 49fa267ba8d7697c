use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::observability::TimingGuard;
use crate::rules::{Engine, RuleSet, SetRule};
use crate::sets::MemorySetStore;

use super::request::EvaluateRequest;
use super::response::{
    ErrorResponse, EvaluateResponse, HealthResponse, ReadyResponse, RuleInfo, RuleVerdict,
    RulesResponse, SetEntriesResponse, SetsResponse,
};

/// Shared application state.
pub struct AppState {
    /// Set store the rules are installed against
    pub store: Arc<MemorySetStore>,

    /// Decision engine (owns the metrics registry)
    pub engine: Engine,

    /// Current rule set (updated via watch channel)
    pub ruleset_rx: watch::Receiver<Arc<RuleSet>>,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/evaluate", post(handle_evaluate))
        .route("/v1/rules", get(handle_rules))
        .route("/v1/sets", get(handle_sets))
        .route("/v1/sets/:name", get(handle_set_entries))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run a packet through the installed rules.
async fn handle_evaluate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EvaluateRequest>,
) -> axum::response::Response {
    let request_id = Uuid::new_v4();
    let ruleset = state.ruleset_rx.borrow().clone();

    let selected: Vec<&Arc<SetRule>> = match &req.rule_id {
        Some(id) => match ruleset.get(id) {
            Some(rule) => vec![rule],
            None => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::not_found(format!("unknown rule: {id}"))),
                )
                    .into_response();
            }
        },
        None => ruleset.rules.iter().collect(),
    };

    let mut packet = req.packet;
    let mut results = Vec::with_capacity(selected.len());

    for rule in selected {
        let verdict = {
            let _timing = TimingGuard::new(state.engine.metrics());
            state.engine.evaluate(&mut packet, &rule.config)
        };

        debug!(
            request_id = %request_id,
            rule_id = rule.id(),
            matched = verdict.matched,
            write = ?verdict.effects.write,
            "Rule evaluated"
        );

        results.push(RuleVerdict {
            rule_id: rule.id().to_string(),
            matched: verdict.matched,
            effects: verdict.effects,
        });
    }

    info!(
        request_id = %request_id,
        rules = results.len(),
        matched = results.iter().filter(|r| r.matched).count(),
        "Evaluation completed"
    );

    (
        StatusCode::OK,
        Json(EvaluateResponse {
            request_id,
            ruleset_version: ruleset.version.clone(),
            results,
            meta: packet.meta,
        }),
    )
        .into_response()
}

/// Installed rules in save form.
async fn handle_rules(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ruleset = state.ruleset_rx.borrow().clone();

    Json(RulesResponse {
        ruleset_version: ruleset.version.clone(),
        rules: ruleset
            .rules
            .iter()
            .map(|r| RuleInfo {
                id: r.id().to_string(),
                rule: r.config.to_string().trim_start().to_string(),
            })
            .collect(),
    })
}

async fn handle_sets(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SetsResponse {
        sets: state.store.list(),
    })
}

async fn handle_set_entries(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> axum::response::Response {
    match state.store.entries(&name) {
        Ok(entries) => {
            (StatusCode::OK, Json(SetEntriesResponse { name, entries })).into_response()
        }
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found(e.to_string())),
        )
            .into_response(),
    }
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ruleset = state.ruleset_rx.borrow();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        ruleset_version: ruleset.version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Readiness check endpoint.
async fn handle_ready(State(state): State<Arc<AppState>>) -> axum::response::Response {
    let ruleset = state.ruleset_rx.borrow();

    if ruleset.is_empty() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("No rules loaded", "NOT_READY")),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(ReadyResponse {
            ready: true,
            ruleset_version: ruleset.version.clone(),
            rules: ruleset.len(),
        }),
    )
        .into_response()
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rules = state.ruleset_rx.borrow().len();

    let metrics = format!(
        r#"# HELP setset_uptime_seconds Application uptime in seconds
# TYPE setset_uptime_seconds counter
setset_uptime_seconds {}

# HELP setset_rules Number of rules installed
# TYPE setset_rules gauge
setset_rules {}

{}"#,
        state.start_time.elapsed().as_secs(),
        rules,
        state.engine.metrics().to_prometheus(),
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        metrics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RuleDef, RulesFile, SetTarget};
    use crate::observability::EngineMetrics;
    use crate::sets::{SetSpec, SetStore};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app_state(rules: Vec<RuleDef>) -> Arc<AppState> {
        let sets = [SetSpec::new("seen", 1, 16), SetSpec::new("pending", 1, 16)];
        let store = Arc::new(MemorySetStore::with_sets(sets).unwrap());
        let dyn_store: Arc<dyn SetStore> = store.clone();

        let file = RulesFile {
            version: "test-v1".to_string(),
            rules,
        };
        let ruleset = Arc::new(RuleSet::from_file(&file, &dyn_store, None).unwrap());
        let (_tx, rx) = watch::channel(ruleset);

        Arc::new(AppState {
            store,
            engine: Engine::new(Arc::new(EngineMetrics::new())),
            ruleset_rx: rx,
            start_time: Instant::now(),
            version: "0.1.0-test".to_string(),
        })
    }

    fn track_rule() -> RuleDef {
        let mut def = RuleDef::new("track");
        def.add_set = Some(SetTarget::new("seen", "src").unwrap());
        def.classify = true;
        def.timeout = Some(60);
        def
    }

    const PACKET: &str = r#"{"packet": {"fields": [{"src": {"addr": "10.0.0.1"}, "dst": {"addr": "10.0.0.2"}}]}}"#;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn evaluate_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/evaluate")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(test_app_state(vec![]));

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["ruleset_version"], "test-v1");
    }

    #[tokio::test]
    async fn test_ready_without_rules() {
        let app = create_router(test_app_state(vec![]));

        let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_evaluate_tracks_flow() {
        let state = test_app_state(vec![track_rule()]);
        let app = create_router(state.clone());

        let first = app.clone().oneshot(evaluate_request(PACKET)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let json = body_json(first).await;
        assert_eq!(json["results"][0]["rule_id"], "track");
        assert_eq!(json["results"][0]["matched"], false);
        assert_eq!(json["results"][0]["effects"]["write"], "written");

        let second = app.oneshot(evaluate_request(PACKET)).await.unwrap();
        let json = body_json(second).await;
        assert_eq!(json["results"][0]["matched"], true);

        assert_eq!(state.store.len("seen").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_evaluate_unknown_rule() {
        let app = create_router(test_app_state(vec![track_rule()]));

        let body = r#"{"packet": {"fields": []}, "rule_id": "nope"}"#;
        let response = app.oneshot(evaluate_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rules_endpoint_renders_save_form() {
        let app = create_router(test_app_state(vec![track_rule()]));

        let request = Request::builder().uri("/v1/rules").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        let json = body_json(response).await;
        assert_eq!(
            json["rules"][0]["rule"],
            "--ss-add-set seen src --ss-timeout 60 --ss-match"
        );
    }

    #[tokio::test]
    async fn test_sets_endpoints() {
        let app = create_router(test_app_state(vec![track_rule()]));

        let request = Request::builder().uri("/v1/sets").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["sets"][1]["name"], "seen");
        assert_eq!(json["sets"][1]["references"], 1);

        let request = Request::builder()
            .uri("/v1/sets/missing")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = create_router(test_app_state(vec![track_rule()]));

        app.clone().oneshot(evaluate_request(PACKET)).await.unwrap();

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(text.contains("setset_rules 1"));
        assert!(text.contains("setset_packets_total 1"));
    }
}
