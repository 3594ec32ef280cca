//! Read-only HTTP surface over the consumer query interface

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use types::errors::SymbolError;
use types::symbol::Symbol;

use crate::analytics::{DepthMetrics, OrderBookMetrics};
use crate::session::{OrderBookSession, SessionStatus};
use crate::snapshot::BookSnapshot;

/// Errors returned by the HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(#[from] SymbolError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::InvalidSymbol(_) => (StatusCode::BAD_REQUEST, "INVALID_SYMBOL"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        let body = Json(json!({
            "error": code,
            "message": self.to_string()
        }));

        (status, body).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub book: OrderBookMetrics,
    pub depth: DepthMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolChangeRequest {
    pub base: String,
    pub quote: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolChangeResponse {
    pub symbol: Symbol,
    /// False when the symbol was already the requested one.
    pub changed: bool,
}

pub fn create_router(session: Arc<OrderBookSession>) -> Router {
    let api_routes = Router::new()
        .route("/book", get(get_book))
        .route("/metrics", get(get_metrics))
        .route("/status", get(get_status))
        .route("/symbol", post(change_symbol));

    Router::new()
        .nest("/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(session)
}

pub async fn get_book(State(session): State<Arc<OrderBookSession>>) -> Json<BookSnapshot> {
    Json(session.current_book())
}

pub async fn get_metrics(State(session): State<Arc<OrderBookSession>>) -> Json<MetricsResponse> {
    let (book, depth) = session.current_metrics();
    Json(MetricsResponse { book, depth })
}

pub async fn get_status(State(session): State<Arc<OrderBookSession>>) -> Json<SessionStatus> {
    Json(session.status())
}

pub async fn change_symbol(
    State(session): State<Arc<OrderBookSession>>,
    payload: Result<Json<SymbolChangeRequest>, JsonRejection>,
) -> Result<Json<SymbolChangeResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let changed = session.request_symbol_change(&request.base, &request.quote)?;
    Ok(Json(SymbolChangeResponse {
        symbol: session.requested_symbol(),
        changed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::Venue;
    use crate::events::{BookEvent, LevelUpdate};
    use types::numeric::DecimalText;
    use types::side::Side;

    fn session() -> Arc<OrderBookSession> {
        let session = OrderBookSession::new(Venue::Spot, Symbol::try_new("ETH", "USDT").unwrap());
        session.ingest(&BookEvent::Delta {
            updates: vec![
                LevelUpdate::new(
                    Side::Bid,
                    DecimalText::parse("99.50").unwrap(),
                    DecimalText::parse("2").unwrap(),
                ),
                LevelUpdate::new(
                    Side::Ask,
                    DecimalText::parse("100.50").unwrap(),
                    DecimalText::parse("1").unwrap(),
                ),
            ],
        });
        Arc::new(session)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_book() {
        let app = create_router(session());
        let response = app
            .oneshot(Request::get("/v1/book").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["bids"][0]["price"]["text"], "99.50");
        assert_eq!(body["symbol"]["base"], "ETH");
    }

    #[tokio::test]
    async fn test_get_metrics() {
        let Json(metrics) = get_metrics(State(session())).await;
        assert_eq!(metrics.book.mid_price, "100".parse().unwrap());
        assert_eq!(metrics.depth.bid_curve.len(), 1);
    }

    #[tokio::test]
    async fn test_get_status() {
        let app = create_router(session());
        let response = app
            .oneshot(Request::get("/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["state"], "Disconnected");
        assert_eq!(body["update_count"], 1);
    }

    #[tokio::test]
    async fn test_change_symbol() {
        let session = session();
        let app = create_router(Arc::clone(&session));
        let response = app
            .oneshot(
                Request::post("/v1/symbol")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"base":"btc","quote":"usdt"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["changed"], true);
        assert_eq!(session.requested_symbol().concatenated(), "BTCUSDT");
    }

    #[tokio::test]
    async fn test_change_symbol_rejects_empty_base() {
        let app = create_router(session());
        let response = app
            .oneshot(
                Request::post("/v1/symbol")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"base":"","quote":"usdt"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "INVALID_SYMBOL");
    }

    #[tokio::test]
    async fn test_change_symbol_rejects_malformed_body() {
        let app = create_router(session());
        let response = app
            .oneshot(
                Request::post("/v1/symbol")
                    .header("content-type", "application/json")
                    .body(Body::from("{"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "BAD_REQUEST");
    }
}
