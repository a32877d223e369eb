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

//! Order status transition table.
//!
//! ```text
//!  Placed ──settlement──► Processing ──operator──► Shipped ──operator──► Delivered
//!    │                        │
//!    │ operator (unpaid)      │ refund
//!    └──────────► Cancelled ◄─┘
//! ```
//!
//! `Delivered` and `Cancelled` are terminal. Anything not drawn above is
//! rejected.

use crate::base::OrderId;
use crate::error::SettlementError;
use crate::order::OrderStatus;

/// What is driving a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// A successful card settlement.
    Settlement,
    /// A full refund of the order's payment.
    Refund,
    /// Direct action by operations staff.
    Operator,
}

/// Returns whether `from -> to` is allowed for `trigger`.
///
/// `payment_completed` tells whether the order currently carries a completed
/// payment; an operator may only cancel orders that do not.
pub fn is_permitted(
    from: OrderStatus,
    to: OrderStatus,
    trigger: Trigger,
    payment_completed: bool,
) -> bool {
    use OrderStatus::*;

    let may_cancel = match trigger {
        Trigger::Refund => true,
        Trigger::Operator => !payment_completed,
        Trigger::Settlement => false,
    };

    match from {
        Placed => match to {
            Processing => trigger == Trigger::Settlement,
            Cancelled => may_cancel,
            Placed | Shipped | Delivered => false,
        },
        Processing => match to {
            Shipped => trigger == Trigger::Operator,
            Cancelled => may_cancel,
            Placed | Processing | Delivered => false,
        },
        Shipped => match to {
            Delivered => trigger == Trigger::Operator,
            Placed | Processing | Shipped | Cancelled => false,
        },
        Delivered | Cancelled => false,
    }
}

/// [`is_permitted`] as a `Result`.
///
/// # Errors
///
/// [`SettlementError::InvalidTransition`] when the table forbids the move.
pub fn ensure(
    order: OrderId,
    from: OrderStatus,
    to: OrderStatus,
    trigger: Trigger,
    payment_completed: bool,
) -> Result<(), SettlementError> {
    if is_permitted(from, to, trigger, payment_completed) {
        Ok(())
    } else {
        Err(SettlementError::InvalidTransition { order, from, to })
    }
}
