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

//! Error types for order and payment operations.

use crate::base::{OrderId, PaymentId};
use crate::card::RejectReason;
use crate::order::OrderStatus;
use crate::payment::PaymentStatus;
use thiserror::Error;

/// Order and payment processing errors.
///
/// None of these are retried inside the engine. Only [`ErrorKind::Store`]
/// failures are worth retrying by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// Referenced order does not exist
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// Referenced payment does not exist
    #[error("payment {0} not found")]
    PaymentNotFound(PaymentId),

    /// The order exists but has never been paid
    #[error("no payment recorded for order {0}")]
    NoPaymentForOrder(OrderId),

    /// The order already carries a completed payment
    #[error("payment already completed for order {0}")]
    PaymentAlreadyCompleted(OrderId),

    /// Card details failed validation; nothing was recorded
    #[error("payment rejected: {0}")]
    PaymentRejected(RejectReason),

    /// Only completed payments can be refunded
    #[error("payment {payment} cannot be refunded while {status}")]
    NotRefundable {
        payment: PaymentId,
        status: PaymentStatus,
    },

    /// The order lifecycle does not allow this status change
    #[error("order {order} cannot move from {from} to {to}")]
    InvalidTransition {
        order: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Amount is negative, or tax exceeds the total
    #[error("invalid amount: {0}")]
    InvalidAmount(&'static str),

    /// Status string does not name an order status
    #[error("unknown order status '{0}'")]
    UnknownStatus(String),

    /// Another call held the order for longer than the configured lock timeout
    #[error("timed out waiting for order {0}")]
    LockTimeout(OrderId),

    /// Every generated transaction reference collided with an existing one
    #[error("could not allocate a unique transaction reference")]
    TransactionRefExhausted,
}

/// Coarse classification that adapters map onto their transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    PaymentRejected,
    InvalidState,
    InvalidTransition,
    InvalidInput,
    Store,
}

impl ErrorKind {
    /// Store failures are transient; everything else is a precondition the
    /// caller has to fix.
    pub fn is_retryable(self) -> bool {
        self == ErrorKind::Store
    }
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OrderNotFound(_) | Self::PaymentNotFound(_) | Self::NoPaymentForOrder(_) => {
                ErrorKind::NotFound
            }
            Self::PaymentAlreadyCompleted(_) => ErrorKind::Conflict,
            Self::PaymentRejected(_) => ErrorKind::PaymentRejected,
            Self::NotRefundable { .. } => ErrorKind::InvalidState,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::InvalidAmount(_) | Self::UnknownStatus(_) => ErrorKind::InvalidInput,
            Self::LockTimeout(_) | Self::TransactionRefExhausted => ErrorKind::Store,
        }
    }
}
