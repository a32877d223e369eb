// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! REST API server for the settlement engine.
//!
//! Run with: `cargo run --example server`
//!
//! # Endpoints
//!
//! ```bash
//! # Place an order
//! curl -X POST http://localhost:3000/orders \
//!   -H "Content-Type: application/json" \
//!   -d '{"user_id": 1, "total_amount": "107.99", "tax_amount": "8.00"}'
//!
//! # Pay for it
//! curl -X POST http://localhost:3000/payments \
//!   -H "Content-Type: application/json" \
//!   -d '{"order_id": 1, "user_id": 1, "card": {"number": "4532015112830366",
//!        "holder_name": "Jane Smith", "expiry": "12/49", "cvv": "123"}}'
//!
//! # Ship it
//! curl -X PUT http://localhost:3000/admin/orders/1/status \
//!   -H "Content-Type: application/json" -H "X-Operator: alice" \
//!   -d '{"status": "shipped"}'
//!
//! # Refund payment 1
//! curl -X POST http://localhost:3000/payments/1/refund -H "X-Operator: alice"
//!
//! # Dashboard
//! curl http://localhost:3000/admin/dashboard/stats
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use order_settlement_rs::{
    Actor, CardDetails, Engine, ErrorKind, NewOrder, OrderId, OrderStatus, OrderView, PaymentId,
    PaymentResult, PaymentView, SettlementError, ShippingAddress, StatusCounts, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// === Request/Response DTOs ===

/// Request body for placing an order.
///
/// ```json
/// {"user_id": 1, "total_amount": "107.99", "tax_amount": "8.00"}
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: u64,
    pub total_amount: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
}

/// Request body for settling an order.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub order_id: u64,
    /// Paying customer; anonymous checkouts are recorded as the system.
    #[serde(default)]
    pub user_id: Option<u64>,
    pub card: CardDetails,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub counts: StatusCounts,
    pub total: u64,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the settlement engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Operator name from the `X-Operator` header.
fn operator(headers: &HeaderMap) -> Actor {
    let name = headers
        .get("x-operator")
        .and_then(|value| value.to_str().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or("admin");
    Actor::Operator(name.to_string())
}

// === Error Handling ===

/// Wrapper for converting `SettlementError` into HTTP responses.
pub struct AppError(SettlementError);

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match self.0.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "PAYMENT_ALREADY_COMPLETED"),
            ErrorKind::PaymentRejected => (StatusCode::UNPROCESSABLE_ENTITY, "PAYMENT_REJECTED"),
            ErrorKind::InvalidState => (StatusCode::CONFLICT, "INVALID_STATE"),
            ErrorKind::InvalidTransition => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            ErrorKind::InvalidInput => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ErrorKind::Store => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /orders - Place a checked-out order.
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderView>), AppError> {
    let user_id = UserId(request.user_id);
    let order = NewOrder::new(
        user_id,
        request.total_amount,
        request.tax_amount,
        request.shipping_address,
    )?;
    let view = state.engine.place_order(&Actor::Customer(user_id), order);
    Ok((StatusCode::CREATED, Json(view)))
}

/// POST /payments - Validate the card and settle the order.
async fn process_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<PaymentResult>, AppError> {
    let actor = request
        .user_id
        .map_or(Actor::System, |id| Actor::Customer(UserId(id)));
    let result = state
        .engine
        .process_payment(&actor, OrderId(request.order_id), &request.card)?;
    Ok(Json(result))
}

/// GET /payments/{id}
async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<PaymentView>, AppError> {
    Ok(Json(state.engine.get_payment(PaymentId(id))?))
}

/// GET /payments/order/{id}
async fn get_payment_by_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<PaymentView>, AppError> {
    Ok(Json(state.engine.get_payment_by_order(OrderId(id))?))
}

/// POST /payments/{id}/refund - Refund in full and cancel the order.
async fn refund_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<PaymentResult>, AppError> {
    let result = state.engine.refund(&operator(&headers), PaymentId(id))?;
    Ok(Json(result))
}

/// GET /admin/orders
async fn list_orders(State(state): State<AppState>) -> Result<Json<Vec<OrderView>>, AppError> {
    Ok(Json(state.engine.orders()?))
}

/// GET /admin/orders/status/{status} - Status name is case-insensitive.
async fn list_orders_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
) -> Result<Json<Vec<OrderView>>, AppError> {
    let status: OrderStatus = status.parse()?;
    Ok(Json(state.engine.orders_with_status(status)?))
}

/// GET /admin/orders/{id}
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(state.engine.get_order(OrderId(id))?))
}

/// PUT /admin/orders/{id}/status
async fn update_order_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<OrderView>, AppError> {
    let status: OrderStatus = request.status.parse()?;
    let view = state
        .engine
        .update_status(&operator(&headers), OrderId(id), status)?;
    Ok(Json(view))
}

/// GET /admin/dashboard/stats
async fn dashboard_stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, AppError> {
    let counts = state.engine.counts_by_status()?;
    let total = counts.total();
    Ok(Json(DashboardStats { counts, total }))
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/payments", post(process_payment))
        .route("/payments/{id}", get(get_payment))
        .route("/payments/order/{id}", get(get_payment_by_order))
        .route("/payments/{id}/refund", post(refund_payment))
        .route("/admin/orders", get(list_orders))
        .route("/admin/orders/status/{status}", get(list_orders_by_status))
        .route("/admin/orders/{id}", get(get_order))
        .route("/admin/orders/{id}/status", put(update_order_status))
        .route("/admin/dashboard/stats", get(dashboard_stats))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let state = AppState {
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    info!("settlement API listening on http://127.0.0.1:3000");

    axum::serve(listener, app).await.unwrap();
}
