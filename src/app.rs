use std::any::Any;
use std::net::SocketAddr;
use std::path::Path;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    BoxError, Json, Router,
};
use serde_json::{json, Value};
use tower::{
    timeout::{error::Elapsed, TimeoutLayer},
    ServiceBuilder,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::state::AppState;
use crate::{auth, users};

const FRONTEND_NOT_BUILT: &str =
    "frontend not built - run `npm run build` in the frontend directory";

pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();

    let router = Router::new().nest(
        "/v1",
        Router::new()
            .merge(auth::router())
            .merge(users::router())
            .route("/health", get(health)),
    );

    let frontend = Path::new(&config.frontend_path);
    let router = if frontend.is_dir() {
        let index = frontend.join("index.html");
        router.fallback_service(ServeDir::new(frontend).fallback(ServeFile::new(index)))
    } else {
        tracing::warn!(path = %config.frontend_path, "frontend directory missing; static assets disabled");
        router.fallback(|| async { (StatusCode::NOT_FOUND, FRONTEND_NOT_BUILT) })
    };

    with_middleware(router.with_state(state), &config)
}

/// Outermost first: request id, tracing, CORS, timeout, then panic recovery
/// closest to the handlers.
fn with_middleware(router: Router, config: &AppConfig) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &axum::http::Request<_>| {
                        let method = req.method().clone();
                        let uri = req.uri().clone();
                        let request_id = req
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-");
                        tracing::info_span!(
                            "http_request",
                            %method,
                            uri = %uri,
                            request_id,
                            status = tracing::field::Empty
                        )
                    })
                    .on_response(
                        |res: &axum::http::Response<_>,
                         latency: std::time::Duration,
                         span: &tracing::Span| {
                            let status = res.status();
                            span.record("status", tracing::field::display(status));
                            let latency_ms = latency.as_millis() as u64;
                            if status.is_server_error() {
                                tracing::error!(%status, latency_ms, "response");
                            } else {
                                tracing::info!(%status, latency_ms, "response");
                            }
                        },
                    ),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(cors(config))
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .layer(TimeoutLayer::new(config.request_timeout))
            .layer(CatchPanicLayer::custom(handle_panic)),
    )
}

async fn handle_middleware_error(err: BoxError) -> AppError {
    if err.is::<Elapsed>() {
        AppError::Timeout
    } else {
        AppError::internal(err.to_string())
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    AppError::internal(detail).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Credentialed CORS restricted to the configured origins.
fn cors(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .allow_credentials(true)
}

pub async fn serve(app: Router, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
