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

//! Settlement engine.
//!
//! Orchestrates card checks, payment issuance and order status changes so
//! that every operation commits against one order or not at all.

use crate::base::{Actor, OrderId, PaymentId, UserId};
use crate::card::CardDetails;
use crate::clock::{Clock, SystemClock, TokenSource, UuidTokenSource};
use crate::config::EngineConfig;
use crate::error::SettlementError;
use crate::order::{NewOrder, OrderStatus, OrderView};
use crate::payment::{PaymentLedger, PaymentView};
use crate::report::StatusCounts;
use crate::store::OrderStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a settlement or refund: the payment and its order, as they
/// were committed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub payment: PaymentView,
    pub order: OrderView,
}

pub struct Engine {
    /// Orders indexed by order ID; each order carries its payment.
    orders: OrderStore,
    /// Payment IDs and transaction references.
    ledger: PaymentLedger,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Creates an empty engine with the default configuration, the system
    /// clock and UUID-based transaction references.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_collaborators(config, Arc::new(SystemClock), Arc::new(UuidTokenSource))
    }

    pub fn with_collaborators(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Engine {
            orders: OrderStore::new(config.lock_timeout),
            ledger: PaymentLedger::new(tokens, config.max_token_attempts),
            clock,
        }
    }

    /// Records a checked-out order in `Placed` status with no payment.
    pub fn place_order(&self, actor: &Actor, order: NewOrder) -> OrderView {
        let view = self
            .orders
            .insert(order, self.clock.now(), |data| data.view());
        info!(
            order = %view.order_id,
            user = %view.user_id,
            total = %view.total_amount,
            actor = %actor,
            "order placed"
        );
        view
    }

    /// Validates the card, records a completed payment for the order total
    /// and moves the order to `Processing`, as one atomic step.
    ///
    /// Checks run in this order, and the first failure wins:
    ///
    /// | Check | Error |
    /// |-------|-------|
    /// | Order exists | [`SettlementError::OrderNotFound`] |
    /// | No completed payment yet | [`SettlementError::PaymentAlreadyCompleted`] |
    /// | Order is `Placed` | [`SettlementError::InvalidTransition`] |
    /// | Card number, expiry and CVV | [`SettlementError::PaymentRejected`] |
    ///
    /// A rejected card leaves no payment record behind. Concurrent calls on
    /// the same order are serialized; exactly one of them can succeed.
    ///
    /// # Errors
    ///
    /// Any of the above, or a store failure
    /// ([`SettlementError::LockTimeout`], [`SettlementError::TransactionRefExhausted`]).
    pub fn process_payment(
        &self,
        actor: &Actor,
        order_id: OrderId,
        card: &CardDetails,
    ) -> Result<PaymentResult, SettlementError> {
        let now = self.clock.now();

        let result = self.orders.update(order_id, |order| {
            order.ensure_settleable()?;

            let card_last_four = card.verify(now).map_err(|reason| {
                debug!(order = %order_id, %reason, "card rejected");
                SettlementError::PaymentRejected(reason)
            })?;

            let payment = self.ledger.create(
                order.id,
                order.total_amount,
                order.payment.as_ref(),
                card_last_four,
                now,
            )?;
            order.settle(payment, actor, now)?;

            let payment = order
                .payment_view()
                .ok_or(SettlementError::NoPaymentForOrder(order_id))?;
            Ok(PaymentResult {
                payment,
                order: order.view(),
            })
        });

        match &result {
            Ok(settled) => info!(
                order = %order_id,
                payment = %settled.payment.payment_id,
                transaction = %settled.payment.transaction_id,
                amount = %settled.payment.amount,
                actor = %actor,
                "payment settled"
            ),
            Err(e) => debug!(order = %order_id, actor = %actor, error = %e, "payment refused"),
        }
        result
    }

    /// Returns the payment recorded for an order.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::OrderNotFound`] - No such order.
    /// - [`SettlementError::NoPaymentForOrder`] - The order was never paid.
    pub fn get_payment_by_order(&self, order_id: OrderId) -> Result<PaymentView, SettlementError> {
        self.orders
            .read(order_id, |order| order.payment_view())?
            .ok_or(SettlementError::NoPaymentForOrder(order_id))
    }

    /// Returns a payment by its own ID.
    ///
    /// # Errors
    ///
    /// [`SettlementError::PaymentNotFound`] if no such payment was issued.
    pub fn get_payment(&self, payment_id: PaymentId) -> Result<PaymentView, SettlementError> {
        let order_id = self
            .ledger
            .order_of(payment_id)
            .ok_or(SettlementError::PaymentNotFound(payment_id))?;

        self.orders
            .read(order_id, |order| {
                order.payment_view().filter(|p| p.payment_id == payment_id)
            })?
            .ok_or(SettlementError::PaymentNotFound(payment_id))
    }

    /// Fully refunds a completed payment and cancels its order, as one
    /// atomic step.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::PaymentNotFound`] - No such payment.
    /// - [`SettlementError::NotRefundable`] - The payment is not `Completed`.
    /// - [`SettlementError::InvalidTransition`] - The order has already shipped.
    pub fn refund(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
    ) -> Result<PaymentResult, SettlementError> {
        let order_id = self
            .ledger
            .order_of(payment_id)
            .ok_or(SettlementError::PaymentNotFound(payment_id))?;
        let now = self.clock.now();

        let result = self.orders.update(order_id, |order| {
            order.refund(payment_id, actor, now)?;
            let payment = order
                .payment_view()
                .ok_or(SettlementError::PaymentNotFound(payment_id))?;
            Ok(PaymentResult {
                payment,
                order: order.view(),
            })
        });

        match &result {
            Ok(refunded) => info!(
                order = %order_id,
                payment = %payment_id,
                amount = %refunded.payment.amount,
                actor = %actor,
                "payment refunded, order cancelled"
            ),
            Err(e) => debug!(payment = %payment_id, actor = %actor, error = %e, "refund refused"),
        }
        result
    }

    /// Operator entry point for moving an order through its lifecycle.
    ///
    /// Only `Processing -> Shipped`, `Shipped -> Delivered` and cancelling an
    /// unpaid `Placed` order are accepted; payment-driven moves go through
    /// [`process_payment`](Self::process_payment) and [`refund`](Self::refund).
    ///
    /// # Errors
    ///
    /// - [`SettlementError::OrderNotFound`] - No such order.
    /// - [`SettlementError::InvalidTransition`] - The move is not allowed; the
    ///   order is left as it was.
    pub fn update_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderView, SettlementError> {
        let now = self.clock.now();

        let result = self.orders.update(order_id, |order| {
            let from = order.status;
            order.transition(status, actor, now)?;
            Ok((from, order.view()))
        });

        match result {
            Ok((from, view)) => {
                info!(order = %order_id, %from, to = %status, actor = %actor, "order status changed");
                Ok(view)
            }
            Err(e) => {
                debug!(order = %order_id, to = %status, actor = %actor, error = %e, "status change refused");
                Err(e)
            }
        }
    }

    /// # Errors
    ///
    /// [`SettlementError::OrderNotFound`] if no such order exists.
    pub fn get_order(&self, order_id: OrderId) -> Result<OrderView, SettlementError> {
        self.orders.read(order_id, |order| order.view())
    }

    /// All orders, by ID.
    pub fn orders(&self) -> Result<Vec<OrderView>, SettlementError> {
        self.orders.scan(|order| order.view())
    }

    /// Orders currently in `status`, by ID.
    pub fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<OrderView>, SettlementError> {
        let views = self
            .orders
            .scan(|order| (order.status == status).then(|| order.view()))?;
        Ok(views.into_iter().flatten().collect())
    }

    /// A customer's order history, by ID.
    pub fn orders_for_user(&self, user_id: UserId) -> Result<Vec<OrderView>, SettlementError> {
        let views = self
            .orders
            .scan(|order| (order.user_id == user_id).then(|| order.view()))?;
        Ok(views.into_iter().flatten().collect())
    }

    /// Per-status order counts from a single pass over the store.
    ///
    /// Counts may be slightly stale while writes are in flight; with no
    /// writes in flight they sum to [`order_count`](Self::order_count).
    pub fn counts_by_status(&self) -> Result<StatusCounts, SettlementError> {
        Ok(self.orders.scan(|order| order.status)?.into_iter().collect())
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn payment_count(&self) -> usize {
        self.ledger.len()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
