use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::Method,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use vigil_shared::constants::REPORT_TTL_HOURS;
use vigil_shared::ReportView;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::rate_limit::{rate_limit_middleware, RateLimiter, WriteAction};
use crate::service::{AlertService, SubmitReceipt, SubmitReport, SubscribeRequest};
use crate::store::StoreStats;
use crate::subscriptions::SubscriptionOutcome;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AlertService>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
    pub started_at: Instant,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    // Only the write endpoints are throttled, each against its own budget.
    let reports = Router::new()
        .route("/reports", post(submit_report))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limiter.throttle(WriteAction::SubmitReport),
            rate_limit_middleware,
        ));
    let subscriptions = Router::new()
        .route("/subscribe", post(subscribe))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limiter.throttle(WriteAction::Subscribe),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/stats", get(stats))
        .route("/reports/zone/:zone", get(reports_by_zone))
        .route("/reports/category/:category", get(reports_by_category))
        .merge(reports)
        .merge(subscriptions)
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    push_enabled: bool,
    reports: usize,
    uptime_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    report_ttl_hours: i64,
    push_enabled: bool,
}

#[derive(Serialize)]
struct SubmitResponse {
    success: bool,
    #[serde(flatten)]
    receipt: SubmitReceipt,
}

#[derive(Serialize)]
struct ReportsResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    count: usize,
    reports: Vec<ReportView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeResponse {
    success: bool,
    zone: String,
    affected_zones: Vec<String>,
    subscription_outcomes: SubscriptionOutcome,
}

#[derive(Deserialize)]
struct ZoneQuery {
    category: Option<String>,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        push_enabled: state.service.push_enabled(),
        reports: state.service.stats().await.total,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        report_ttl_hours: REPORT_TTL_HOURS,
        push_enabled: state.service.push_enabled(),
    })
}

async fn stats(State(state): State<AppState>) -> Json<StoreStats> {
    Json(state.service.stats().await)
}

async fn submit_report(
    State(state): State<AppState>,
    Json(req): Json<SubmitReport>,
) -> Result<Json<SubmitResponse>, ServerError> {
    let receipt = state.service.submit_report(req).await?;
    Ok(Json(SubmitResponse {
        success: true,
        receipt,
    }))
}

async fn reports_by_zone(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    Query(query): Query<ZoneQuery>,
) -> Json<ReportsResponse> {
    let reports = state
        .service
        .query_zone(&zone, query.category.as_deref())
        .await;
    Json(ReportsResponse {
        success: true,
        zone: Some(zone),
        category: query.category,
        count: reports.len(),
        reports,
    })
}

async fn reports_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<ReportsResponse>, ServerError> {
    let reports = state.service.query_category(&category).await?;
    Ok(Json(ReportsResponse {
        success: true,
        zone: None,
        category: Some(category.trim().to_ascii_lowercase()),
        count: reports.len(),
        reports,
    }))
}

async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ServerError> {
    let result = state.service.subscribe(req).await?;
    Ok(Json(SubscribeResponse {
        success: true,
        zone: result.zone,
        affected_zones: result.affected_zones,
        subscription_outcomes: result.outcome,
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::rate_limit::Quota;
    use crate::sanitize::LengthCapSanitizer;
    use crate::transport::testing::RecordingTransport;
    use crate::transport::{DisabledTransport, PushTransport};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app_with(transport: Arc<dyn PushTransport>, burst: f64) -> Router {
        let service = AlertService::new(
            Arc::new(SystemClock),
            transport,
            Arc::new(LengthCapSanitizer::default()),
        );
        build_router(AppState {
            service: Arc::new(service),
            rate_limiter: RateLimiter::new(Quota::new(0.001, burst), Quota::new(0.001, burst)),
            config: Arc::new(ServerConfig::default()),
            started_at: Instant::now(),
        })
    }

    fn app() -> Router {
        app_with(Arc::new(DisabledTransport), 100.0)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pushEnabled"], false);
        assert_eq!(body["reports"], 0);
    }

    #[tokio::test]
    async fn test_submit_then_query_zone() {
        let app = app_with(Arc::new(RecordingTransport::default()), 100.0);
        let (status, body) = send(
            &app,
            post_json(
                "/reports",
                json!({
                    "lat": 37.7749,
                    "lng": -122.4194,
                    "content": "Live music in the park",
                    "category": "fun",
                    "hasPhoto": true
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["category"], "fun");
        assert_eq!(body["affectedZones"].as_array().unwrap().len(), 9);
        assert_eq!(body["pushOutcome"]["status"], "completed");
        assert_eq!(body["pushOutcome"]["sent"], 9);

        let zone = body["zone"].as_str().unwrap().to_string();
        let (status, listed) = send(&app, get_req(&format!("/reports/zone/{zone}?category=fun"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["reports"][0]["content"], "Live music in the park");
        assert_eq!(listed["reports"][0]["hasPhoto"], true);
        assert_eq!(listed["reports"][0]["language"], "unknown");

        let (_, filtered) = send(&app, get_req(&format!("/reports/zone/{zone}?category=lost"))).await;
        assert_eq!(filtered["count"], 0);
    }

    #[tokio::test]
    async fn test_submit_with_push_disabled() {
        let (status, body) = send(
            &app(),
            post_json("/reports", json!({ "lat": 1.0, "lng": 2.0, "content": "Pothole" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category"], "safety");
        assert_eq!(body["pushOutcome"]["status"], "disabled");
        assert_eq!(body["pushOutcome"]["message"], "push notifications disabled");
    }

    #[tokio::test]
    async fn test_submit_missing_fields() {
        let (status, body) = send(&app(), post_json("/reports", json!({ "lat": 1.0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("lng, content"));
    }

    #[tokio::test]
    async fn test_category_query() {
        let app = app();
        for category in ["SAFETY", "lost"] {
            send(
                &app,
                post_json(
                    "/reports",
                    json!({ "lat": 1.0, "lng": 2.0, "content": "x", "category": category }),
                ),
            )
            .await;
        }

        let (status, body) = send(&app, get_req("/reports/category/safety")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category"], "safety");
        assert_eq!(body["count"], 1);

        let (status, body) = send(&app, get_req("/reports/category/bogus")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["validCategories"], json!(["safety", "fun", "lost"]));
    }

    #[tokio::test]
    async fn test_subscribe() {
        let app = app_with(Arc::new(RecordingTransport::default()), 100.0);
        let (status, body) = send(
            &app,
            post_json(
                "/subscribe",
                json!({ "lat": 51.5, "lng": -0.12, "platform": "android", "token": "abc" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["affectedZones"].as_array().unwrap().len(), 9);
        assert_eq!(body["subscriptionOutcomes"]["status"], "registered");
        assert_eq!(body["subscriptionOutcomes"]["subscribed"], 9);

        let (status, _) = send(&app, post_json("/subscribe", json!({ "platform": "ios" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let app = app();
        send(
            &app,
            post_json("/reports", json!({ "lat": 1.0, "lng": 2.0, "content": "x", "category": "fun" })),
        )
        .await;
        let (status, body) = send(&app, get_req("/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["byCategory"]["fun"], 1);
        assert_eq!(body["byCategory"]["lost"], 0);
    }

    #[tokio::test]
    async fn test_write_endpoints_are_rate_limited() {
        let app = app_with(Arc::new(DisabledTransport), 2.0);
        let body = json!({ "lat": 1.0, "lng": 2.0, "content": "x" });
        for _ in 0..2 {
            let (status, _) = send(&app, post_json("/reports", body.clone())).await;
            assert_eq!(status, StatusCode::OK);
        }
        let response = app
            .clone()
            .oneshot(post_json("/reports", body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[axum::http::header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after >= 1);

        // Subscriptions have their own budget.
        let (status, _) = send(&app, post_json("/subscribe", json!({ "lat": 1.0, "lng": 2.0 }))).await;
        assert_eq!(status, StatusCode::OK);

        // Reads are not throttled.
        let (status, _) = send(&app, get_req("/stats")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_location_outside_globe_is_rejected() {
        let (status, body) = send(
            &app(),
            post_json("/reports", json!({ "lat": 1e300, "lng": 0.0, "content": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid location"));

        let (status, _) = send(&app(), post_json("/subscribe", json!({ "lat": 0.0, "lng": 500.0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
