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

//! # Order Settlement
//!
//! This library keeps storefront orders and their payments consistent: it
//! drives each order through its fulfillment lifecycle, settles card payments
//! against it, and refunds them.
//!
//! ## Core Components
//!
//! - [`Engine`]: Settlement orchestrator and operator entry point
//! - [`card`]: Luhn, expiry and CVV validation of presented cards
//! - [`lifecycle`]: Which order status changes are allowed, and by whom
//! - [`SettlementError`]: Error types, classified by [`ErrorKind`]
//! - [`StatusCounts`]: Dashboard projection
//!
//! ## Example
//!
//! ```
//! use order_settlement_rs::{Actor, CardDetails, Engine, NewOrder, OrderStatus, UserId};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let customer = Actor::Customer(UserId(1));
//!
//! // Checkout hands over a placed order
//! let order = NewOrder::new(UserId(1), dec!(107.99), dec!(8.00), None).unwrap();
//! let order_id = engine.place_order(&customer, order).order_id;
//!
//! // Settle it
//! let card = CardDetails::new("4532 0151 1283 0366", "Jane Smith", "12/49", "123");
//! let settled = engine.process_payment(&customer, order_id, &card).unwrap();
//! assert_eq!(settled.order.status, OrderStatus::Processing);
//! assert_eq!(settled.payment.amount, dec!(107.99));
//! assert_eq!(settled.payment.card_last_four, "0366");
//! ```
//!
//! ## Thread Safety
//!
//! Every operation on an order runs under that order's lock and commits all
//! of its writes at once. Calls on different orders proceed in parallel.

mod base;
pub mod card;
pub mod clock;
mod config;
mod engine;
pub mod error;
pub mod lifecycle;
mod order;
mod payment;
mod report;
mod store;

pub use base::{Actor, OrderId, PaymentId, TransactionRef, UserId};
pub use card::{CardDetails, RejectReason};
pub use clock::{Clock, FixedClock, ScriptedTokenSource, SystemClock, TokenSource, UuidTokenSource};
pub use config::EngineConfig;
pub use engine::{Engine, PaymentResult};
pub use error::{ErrorKind, SettlementError};
pub use order::{NewOrder, OrderStatus, OrderView, ShippingAddress, StatusChange};
pub use payment::{PaymentMethod, PaymentStatus, PaymentView};
pub use report::StatusCounts;
