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

//! Order records.
//!
//! # Example
//!
//! ```
//! use order_settlement_rs::{NewOrder, UserId};
//! use rust_decimal_macros::dec;
//!
//! let order = NewOrder::new(UserId(1), dec!(107.99), dec!(8.00), None).unwrap();
//! assert_eq!(order.total_amount(), dec!(107.99));
//! assert!(NewOrder::new(UserId(1), dec!(-1), dec!(0), None).is_err());
//! ```

use crate::base::{Actor, OrderId, PaymentId, UserId};
use crate::error::SettlementError;
use crate::lifecycle::{self, Trigger};
use crate::payment::{Payment, PaymentStatus, PaymentView};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Placed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        Self::Placed,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placed => "PLACED",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; unknown names are an error, never a default.
impl FromStr for OrderStatus {
    type Err = SettlementError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SettlementError::UnknownStatus(value.to_string()))
    }
}

/// Delivery address copied into the order at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: Option<String>,
}

impl ShippingAddress {
    /// `"address, city, state zip, country"`, as shown in the admin order list.
    pub fn one_line(&self) -> String {
        let mut line = format!(
            "{}, {}, {} {}",
            self.address, self.city, self.state, self.zip_code
        );
        if let Some(country) = self.country.as_deref().filter(|c| !c.is_empty()) {
            line.push_str(", ");
            line.push_str(country);
        }
        line
    }
}

/// Checkout output: the input contract for a new order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    user_id: UserId,
    total_amount: Decimal,
    tax_amount: Decimal,
    shipping_address: Option<ShippingAddress>,
}

impl NewOrder {
    /// # Errors
    ///
    /// [`SettlementError::InvalidAmount`] if either amount is negative or the
    /// tax exceeds the total.
    pub fn new(
        user_id: UserId,
        total_amount: Decimal,
        tax_amount: Decimal,
        shipping_address: Option<ShippingAddress>,
    ) -> Result<Self, SettlementError> {
        if total_amount < Decimal::ZERO {
            return Err(SettlementError::InvalidAmount("total must not be negative"));
        }
        if tax_amount < Decimal::ZERO {
            return Err(SettlementError::InvalidAmount("tax must not be negative"));
        }
        if tax_amount > total_amount {
            return Err(SettlementError::InvalidAmount("tax exceeds total"));
        }
        Ok(Self {
            user_id,
            total_amount,
            tax_amount,
            shipping_address,
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }
}

/// One committed status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    pub actor: Actor,
}

/// Read-only projection of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub tax_amount: Decimal,
    pub order_date: DateTime<Utc>,
    pub shipped_date: Option<DateTime<Utc>>,
    pub delivered_date: Option<DateTime<Utc>>,
    pub shipping_address: Option<ShippingAddress>,
    /// [`ShippingAddress::one_line`] of the address, for list displays.
    pub full_address: Option<String>,
    pub payment: Option<PaymentView>,
    pub history: Vec<StatusChange>,
}

/// Stored order. Owns its payment by value.
#[derive(Debug, Clone)]
pub(crate) struct OrderData {
    pub(crate) id: OrderId,
    pub(crate) user_id: UserId,
    pub(crate) status: OrderStatus,
    pub(crate) total_amount: Decimal,
    tax_amount: Decimal,
    order_date: DateTime<Utc>,
    shipped_date: Option<DateTime<Utc>>,
    delivered_date: Option<DateTime<Utc>>,
    shipping_address: Option<ShippingAddress>,
    pub(crate) payment: Option<Payment>,
    history: Vec<StatusChange>,
}

impl OrderData {
    pub(crate) fn place(id: OrderId, order: NewOrder, placed_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: order.user_id,
            status: OrderStatus::Placed,
            total_amount: order.total_amount,
            tax_amount: order.tax_amount,
            order_date: placed_at,
            shipped_date: None,
            delivered_date: None,
            shipping_address: order.shipping_address,
            payment: None,
            history: Vec::new(),
        }
    }

    fn assert_invariants(&self) {
        let payment_status = self.payment.as_ref().map(|p| p.status);
        debug_assert!(
            self.status != OrderStatus::Processing
                || payment_status == Some(PaymentStatus::Completed),
            "Invariant violated: order {} is PROCESSING without a completed payment",
            self.id
        );
        debug_assert!(
            payment_status != Some(PaymentStatus::Refunded)
                || self.status == OrderStatus::Cancelled,
            "Invariant violated: order {} has a refunded payment but is {}",
            self.id,
            self.status
        );
        debug_assert!(
            self.payment
                .as_ref()
                .is_none_or(|p| p.order_id == self.id && p.amount == self.total_amount),
            "Invariant violated: order {} payment does not match the order",
            self.id
        );
        debug_assert!(
            self.shipped_date.is_some()
                == matches!(self.status, OrderStatus::Shipped | OrderStatus::Delivered),
            "Invariant violated: order {} shipped date out of step with {}",
            self.id,
            self.status
        );
        debug_assert!(
            self.delivered_date.is_some() == (self.status == OrderStatus::Delivered),
            "Invariant violated: order {} delivered date out of step with {}",
            self.id,
            self.status
        );
    }

    pub(crate) fn has_completed_payment(&self) -> bool {
        self.payment.as_ref().is_some_and(Payment::is_completed)
    }

    fn ensure(&self, to: OrderStatus, trigger: Trigger) -> Result<(), SettlementError> {
        lifecycle::ensure(self.id, self.status, to, trigger, self.has_completed_payment())
    }

    /// Records the move and stamps the matching date. Legality is checked by
    /// the caller.
    fn apply(&mut self, to: OrderStatus, actor: &Actor, at: DateTime<Utc>) {
        match to {
            OrderStatus::Shipped => self.shipped_date = Some(at),
            OrderStatus::Delivered => self.delivered_date = Some(at),
            OrderStatus::Placed | OrderStatus::Processing | OrderStatus::Cancelled => {}
        }
        self.history.push(StatusChange {
            from: self.status,
            to,
            at,
            actor: actor.clone(),
        });
        self.status = to;
        self.assert_invariants();
    }

    /// Checks that settlement may move this order to `Processing`.
    pub(crate) fn ensure_settleable(&self) -> Result<(), SettlementError> {
        if self.has_completed_payment() {
            return Err(SettlementError::PaymentAlreadyCompleted(self.id));
        }
        self.ensure(OrderStatus::Processing, Trigger::Settlement)
    }

    /// Attaches a freshly completed payment and moves to `Processing`.
    pub(crate) fn settle(
        &mut self,
        payment: Payment,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<(), SettlementError> {
        self.ensure_settleable()?;
        self.payment = Some(payment);
        self.apply(OrderStatus::Processing, actor, at);
        Ok(())
    }

    /// Refunds the order's payment and cancels the order.
    pub(crate) fn refund(
        &mut self,
        payment_id: PaymentId,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<(), SettlementError> {
        let payment = self
            .payment
            .as_ref()
            .filter(|p| p.id == payment_id)
            .ok_or(SettlementError::PaymentNotFound(payment_id))?;
        payment.ensure_refundable()?;
        self.ensure(OrderStatus::Cancelled, Trigger::Refund)?;

        if let Some(payment) = self.payment.as_mut() {
            payment.refund()?;
        }
        self.apply(OrderStatus::Cancelled, actor, at);
        Ok(())
    }

    /// Operator-driven status change.
    pub(crate) fn transition(
        &mut self,
        to: OrderStatus,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<(), SettlementError> {
        self.ensure(to, Trigger::Operator)?;
        self.apply(to, actor, at);
        Ok(())
    }

    pub(crate) fn payment_view(&self) -> Option<PaymentView> {
        self.payment.as_ref().map(Payment::view)
    }

    pub(crate) fn view(&self) -> OrderView {
        OrderView {
            order_id: self.id,
            user_id: self.user_id,
            status: self.status,
            total_amount: self.total_amount,
            tax_amount: self.tax_amount,
            order_date: self.order_date,
            shipped_date: self.shipped_date,
            delivered_date: self.delivered_date,
            shipping_address: self.shipping_address.clone(),
            full_address: self.shipping_address.as_ref().map(ShippingAddress::one_line),
            payment: self.payment_view(),
            history: self.history.clone(),
        }
    }
}
