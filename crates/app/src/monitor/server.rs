//! Actix Web surface republishing the pipeline.
//!
//! `/video_feed` streams the multipart MJPEG feed, `/get_count` serves the
//! latest occupancy snapshot, `/stop_detection` halts the pipeline and
//! releases the camera. Authorization is a boolean capability at this
//! boundary; the core never inspects sessions or credentials.

use std::sync::{Arc, Mutex};

use actix_web::{
    http::header,
    web::{self, Bytes},
    App, HttpRequest, HttpResponse, HttpServer,
};
use anyhow::Context;
use async_stream::stream;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::monitor::{
    encoding::STREAM_BOUNDARY, pipeline::StartError, telemetry, PipelineController,
};

/// Decides whether a request may reach the monitoring routes.
pub(crate) trait AccessPolicy: Send + Sync {
    fn is_authorized(&self, req: &HttpRequest) -> bool;
}

/// Grants access to callers presenting the configured bearer token.
pub(crate) struct BearerTokenPolicy {
    token: String,
}

impl BearerTokenPolicy {
    pub(crate) fn new(token: String) -> Self {
        Self { token }
    }
}

impl AccessPolicy for BearerTokenPolicy {
    fn is_authorized(&self, req: &HttpRequest) -> bool {
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|candidate| candidate == self.token)
            .unwrap_or(false)
    }
}

/// Open policy for deployments without a configured token.
pub(crate) struct AllowAll;

impl AccessPolicy for AllowAll {
    fn is_authorized(&self, _req: &HttpRequest) -> bool {
        true
    }
}

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) controller: Arc<PipelineController>,
    pub(crate) policy: Arc<dyn AccessPolicy>,
}

pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/video_feed", web::get().to(video_feed))
        .route("/get_count", web::get().to(get_count))
        .route("/stop_detection", web::get().to(stop_detection))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Run the server until shutdown; Ctrl+C stops the pipeline first so the
/// camera is released before the listener goes away.
pub(crate) fn serve(
    bind_addr: &str,
    controller: Arc<PipelineController>,
    policy: Arc<dyn AccessPolicy>,
) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    {
        let controller = controller.clone();
        let shutdown_tx = Mutex::new(Some(shutdown_tx));
        ctrlc::set_handler(move || {
            info!("shutdown requested; stopping pipeline");
            controller.stop();
            if let Ok(mut guard) = shutdown_tx.lock() {
                if let Some(tx) = guard.take() {
                    let _ = tx.send(());
                }
            }
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let bind_addr = bind_addr.to_string();
    actix_web::rt::System::new().block_on(async move {
        let state = web::Data::new(ServerState { controller, policy });
        let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
            .bind(bind_addr.as_str())
            .with_context(|| format!("failed to bind {bind_addr}"))?
            .disable_signals()
            .run();

        let srv_handle = server.handle();
        actix_web::rt::spawn(async move {
            let _ = shutdown_rx.await;
            srv_handle.stop(true).await;
        });

        server.await.context("http server error")
    })
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({ "error": "Unauthorized" }))
}

/// Start the pipeline (when idle) and stream annotated frames until the
/// client disconnects or a stop is requested.
async fn video_feed(req: HttpRequest, state: web::Data<ServerState>) -> HttpResponse {
    if !state.policy.is_authorized(&req) {
        return unauthorized();
    }

    match state.controller.start() {
        Ok(mut frames) => {
            let body = stream! {
                while let Some(chunk) = frames.next_chunk().await {
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from(chunk));
                }
            };
            HttpResponse::Ok()
                .append_header(("Cache-Control", "no-cache"))
                .append_header((
                    "Content-Type",
                    format!("multipart/x-mixed-replace; boundary={STREAM_BOUNDARY}"),
                ))
                .streaming(body)
        }
        Err(StartError::AlreadyRunning) => {
            HttpResponse::Conflict().json(json!({ "error": "stream already active" }))
        }
        Err(StartError::Stopping) => HttpResponse::ServiceUnavailable()
            .json(json!({ "error": "pipeline is stopping; retry shortly" })),
        Err(err @ (StartError::Device(_) | StartError::Spawn(_))) => {
            error!("failed to start pipeline: {err}");
            HttpResponse::ServiceUnavailable().json(json!({ "error": "camera unavailable" }))
        }
    }
}

/// Latest occupancy snapshot as `{"count": n, "alarm": bool}`.
async fn get_count(req: HttpRequest, state: web::Data<ServerState>) -> HttpResponse {
    if !state.policy.is_authorized(&req) {
        return unauthorized();
    }
    HttpResponse::Ok().json(state.controller.occupancy())
}

/// Stop the pipeline and release the camera.
async fn stop_detection(state: web::Data<ServerState>) -> HttpResponse {
    // stop() joins the producer, which can wait out one frame read; keep
    // that off the async workers.
    let controller = state.controller.clone();
    if let Err(err) = web::block(move || controller.stop()).await {
        error!("stop worker failed: {err}");
    }
    HttpResponse::Ok().json(json!({ "status": "stopped" }))
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NoContent().finish(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{http::StatusCode, test, web, App};
    use serde_json::Value;

    use super::{routes, AccessPolicy, BearerTokenPolicy, ServerState};
    use crate::monitor::{
        pipeline::SourceFactory,
        state::RunState,
        testutil::{FixedDetector, StaticSource},
        PipelineController,
    };
    use video_ingest::FrameSource;

    fn controller(faces: usize) -> Arc<PipelineController> {
        let factory: Arc<SourceFactory> =
            Arc::new(|| Ok(Box::new(StaticSource) as Box<dyn FrameSource>));
        Arc::new(PipelineController::new(
            Arc::new(FixedDetector(faces)),
            factory,
            2,
            70,
        ))
    }

    fn state(controller: Arc<PipelineController>) -> web::Data<ServerState> {
        let policy: Arc<dyn AccessPolicy> =
            Arc::new(BearerTokenPolicy::new("secret".to_string()));
        web::Data::new(ServerState { controller, policy })
    }

    fn authorized() -> test::TestRequest {
        test::TestRequest::get().insert_header(("Authorization", "Bearer secret"))
    }

    #[actix_web::test]
    async fn get_count_requires_authorization() {
        let controller = controller(0);
        let app =
            test::init_service(App::new().app_data(state(controller.clone())).configure(routes))
                .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/get_count").to_request())
                .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        // An unauthorized probe must not touch pipeline state.
        assert_eq!(controller.run_state(), RunState::Idle);
    }

    #[actix_web::test]
    async fn get_count_reports_snapshot() {
        let app = test::init_service(App::new().app_data(state(controller(0))).configure(routes))
            .await;

        let resp = test::call_service(&app, authorized().uri("/get_count").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["alarm"], false);
    }

    #[actix_web::test]
    async fn wrong_token_is_rejected() {
        let app = test::init_service(App::new().app_data(state(controller(0))).configure(routes))
            .await;
        let req = test::TestRequest::get()
            .insert_header(("Authorization", "Bearer wrong"))
            .uri("/get_count")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn video_feed_requires_authorization() {
        let app = test::init_service(App::new().app_data(state(controller(0))).configure(routes))
            .await;
        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/video_feed").to_request())
                .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn video_feed_streams_multipart_content_type() {
        let controller = controller(0);
        let app =
            test::init_service(App::new().app_data(state(controller.clone())).configure(routes))
                .await;

        let resp = test::call_service(&app, authorized().uri("/video_feed").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert_eq!(content_type, "multipart/x-mixed-replace; boundary=frame");

        let stopper = controller.clone();
        let _ = web::block(move || stopper.stop()).await;
    }

    #[actix_web::test]
    async fn stop_after_feed_resets_count() {
        let controller = controller(3);
        let app =
            test::init_service(App::new().app_data(state(controller.clone())).configure(routes))
                .await;

        // Drive the pipeline directly; the HTTP feed wraps this same stream.
        let mut stream = controller.start().expect("start failed");
        let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next_chunk())
            .await
            .expect("timed out waiting for chunk")
            .expect("stream ended early");
        assert!(chunk.starts_with(b"--frame\r\n"));

        let resp =
            test::call_service(&app, authorized().uri("/stop_detection").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "stopped");

        let resp = test::call_service(&app, authorized().uri("/get_count").to_request()).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["alarm"], false);
    }

    #[actix_web::test]
    async fn second_feed_does_not_open_second_device() {
        let controller = controller(0);
        let app =
            test::init_service(App::new().app_data(state(controller.clone())).configure(routes))
                .await;

        let first = test::call_service(&app, authorized().uri("/video_feed").to_request()).await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = test::call_service(&app, authorized().uri("/video_feed").to_request()).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let stopper = controller.clone();
        let _ = web::block(move || stopper.stop()).await;
    }
}
