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

//! Payment records and the payment ledger.
//!
//! Payment State Machine
//!
//! ```text
//!  (Pending) ──settle──► Completed ──refund──► Refunded
//!      │
//!      └──decline──► Failed
//! ```
//!
//! Settlement is synchronous, so the ledger creates payments directly in
//! `Completed`. `Pending` and `Failed` exist for wire compatibility and are
//! never produced by this crate.

use crate::base::{OrderId, PaymentId, TransactionRef};
use crate::clock::TokenSource;
use crate::error::SettlementError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only supported instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreditCard => f.write_str("CREDIT_CARD"),
        }
    }
}

/// Stored payment. Lives inside its order's record; `order_id` is only a
/// back-reference.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Payment {
    pub(crate) id: PaymentId,
    pub(crate) order_id: OrderId,
    pub(crate) amount: Decimal,
    pub(crate) status: PaymentStatus,
    pub(crate) transaction_id: TransactionRef,
    pub(crate) method: PaymentMethod,
    pub(crate) card_last_four: String,
    pub(crate) paid_at: DateTime<Utc>,
}

impl Payment {
    pub(crate) fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    /// Fails unless the payment is `Completed`.
    pub(crate) fn ensure_refundable(&self) -> Result<(), SettlementError> {
        if self.is_completed() {
            Ok(())
        } else {
            Err(SettlementError::NotRefundable {
                payment: self.id,
                status: self.status,
            })
        }
    }

    /// Full refund. `Completed -> Refunded` is the only mutation a settled
    /// payment allows.
    pub(crate) fn refund(&mut self) -> Result<(), SettlementError> {
        self.ensure_refundable()?;
        self.status = PaymentStatus::Refunded;
        Ok(())
    }

    pub(crate) fn view(&self) -> PaymentView {
        PaymentView {
            payment_id: self.id,
            order_id: self.order_id,
            amount: self.amount,
            status: self.status,
            transaction_id: self.transaction_id.clone(),
            payment_method: self.method,
            card_last_four: self.card_last_four.clone(),
            payment_date: self.paid_at,
        }
    }
}

/// Read-only projection of a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentView {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub transaction_id: TransactionRef,
    pub payment_method: PaymentMethod,
    pub card_last_four: String,
    pub payment_date: DateTime<Utc>,
}

/// Issues payments and indexes them by id and transaction reference.
///
/// The ledger does not own payment records; each one is stored with its
/// order so that the pair is always written under a single lock.
pub(crate) struct PaymentLedger {
    next_id: AtomicU64,
    /// Payment ID to owning order, for refunds and lookups by payment.
    owners: DashMap<PaymentId, OrderId>,
    /// Issued references, for uniqueness.
    references: DashMap<TransactionRef, PaymentId>,
    tokens: Arc<dyn TokenSource>,
    max_token_attempts: u32,
}

impl PaymentLedger {
    pub(crate) fn new(tokens: Arc<dyn TokenSource>, max_token_attempts: u32) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            owners: DashMap::new(),
            references: DashMap::new(),
            tokens,
            max_token_attempts: max_token_attempts.max(1),
        }
    }

    /// Creates a completed payment for `order_id`.
    ///
    /// Must be called while holding the order's lock, with `current` being
    /// the order's existing payment.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::PaymentAlreadyCompleted`] - `current` is completed.
    /// - [`SettlementError::TransactionRefExhausted`] - No unique reference found.
    pub(crate) fn create(
        &self,
        order_id: OrderId,
        amount: Decimal,
        current: Option<&Payment>,
        card_last_four: String,
        paid_at: DateTime<Utc>,
    ) -> Result<Payment, SettlementError> {
        if current.is_some_and(Payment::is_completed) {
            return Err(SettlementError::PaymentAlreadyCompleted(order_id));
        }

        let id = PaymentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let transaction_id = self.reserve_reference(id)?;
        self.owners.insert(id, order_id);

        Ok(Payment {
            id,
            order_id,
            amount,
            status: PaymentStatus::Completed,
            transaction_id,
            method: PaymentMethod::CreditCard,
            card_last_four,
            paid_at,
        })
    }

    /// Returns the order a payment belongs to.
    pub(crate) fn order_of(&self, payment_id: PaymentId) -> Option<OrderId> {
        self.owners.get(&payment_id).map(|entry| *entry.value())
    }

    /// Number of payments issued.
    pub(crate) fn len(&self) -> usize {
        self.owners.len()
    }

    fn reserve_reference(&self, payment_id: PaymentId) -> Result<TransactionRef, SettlementError> {
        for attempt in 1..=self.max_token_attempts {
            let reference = TransactionRef::from_token(&self.tokens.next_token());

            // Entry API keeps check-and-insert atomic across threads.
            match self.references.entry(reference) {
                Entry::Occupied(entry) => {
                    debug!(attempt, reference = %entry.key(), "transaction reference collision");
                }
                Entry::Vacant(entry) => {
                    let reference = entry.key().clone();
                    entry.insert(payment_id);
                    return Ok(reference);
                }
            }
        }
        Err(SettlementError::TransactionRefExhausted)
    }
}
