// src/server/handler.rs
use crate::health::{Presenter, HEALTH_PATH, INFO_PATH, LIVE_PATH};
use crate::metrics::MetricsRegistry;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::Instrument;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("failed to build response: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("failed to serialize response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode metrics: {0}")]
    Metrics(String),
}

impl From<HandlerError> for Response<Body> {
    fn from(_: HandlerError) -> Self {
        let mut response = Response::new(Body::from("Internal Server Error"));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }
}

/// Routes the health listener's requests to the presenter.
#[derive(Clone)]
pub struct HealthHandler {
    presenter: Arc<Presenter>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl HealthHandler {
    pub fn new(presenter: Arc<Presenter>) -> Self {
        Self {
            presenter,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn handle(&self, req: Request<Body>) -> Result<Response<Body>, HandlerError> {
        match req.uri().path() {
            HEALTH_PATH => {
                let (status, report) = self.presenter.readiness().await;
                json_response(status, &report)
            }
            LIVE_PATH => text_response(StatusCode::OK, self.presenter.liveness()),
            INFO_PATH => json_response(StatusCode::OK, &self.presenter.info()),
            path if self.is_metrics_path(path) => self.metrics_response(),
            _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    fn is_metrics_path(&self, path: &str) -> bool {
        self.metrics.is_some() && self.presenter.config().metrics_path.as_deref() == Some(path)
    }

    fn metrics_response(&self) -> Result<Response<Body>, HandlerError> {
        let Some(registry) = &self.metrics else {
            return text_response(StatusCode::NOT_FOUND, "Not Found");
        };
        let body = registry
            .gather()
            .map_err(|e| HandlerError::Metrics(format!("{:#}", e)))?;

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))?)
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, HandlerError> {
    let body = serde_json::to_vec(value)?;
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))?)
}

fn text_response(status: StatusCode, body: &'static str) -> Result<Response<Body>, HandlerError> {
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body))?)
}

impl Service<Request<Body>> for HealthHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        let span = tracing::info_span!(
            "request",
            request_id = %uuid::Uuid::new_v4(),
            method = %req.method(),
            path = %req.uri().path(),
        );

        Box::pin(
            async move {
                let response = match handler.handle(req).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!(%e, "health handler error");
                        e.into()
                    }
                };
                tracing::debug!(status = %response.status(), "request served");
                Ok(response)
            }
            .instrument(span),
        )
    }
}
