// src/middleware/panic.rs
//
// Um handler que entra em pânico não derruba o processo: o pânico é
// logado e a chamada falha com INTERNAL.

use std::panic::AssertUnwindSafe;

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::FutureExt;
use serde_json::json;

use crate::common::error::RpcCode;

pub async fn panic_guard(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic_info) => {
            tracing::error!(
                request_id = %request_id,
                method = %method,
                uri = %uri,
                "💥 Handler entrou em pânico: {}",
                panic_message(&*panic_info)
            );

            let code = RpcCode::Internal;
            let body = Json(json!({
                "code": code.as_str(),
                "error": "Ocorreu um erro inesperado.",
                "request_id": request_id,
            }));
            (code.status(), body).into_response()
        }
    }
}

fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "pânico sem mensagem".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::util::ServiceExt;

    async fn boom() -> &'static str {
        panic!("estourou")
    }

    fn app() -> Router {
        Router::new()
            .route("/ok", get(|| async { "OK" }))
            .route("/boom", get(boom))
            .layer(middleware::from_fn(panic_guard))
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let response = app()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn healthy_requests_pass_through() {
        let response = app()
            .oneshot(Request::builder().uri("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn extracts_string_and_str_payloads() {
        assert_eq!(panic_message(&"fixo"), "fixo");
        assert_eq!(panic_message(&String::from("dinâmico")), "dinâmico");
        assert_eq!(panic_message(&42_u8), "pânico sem mensagem");
    }
}
