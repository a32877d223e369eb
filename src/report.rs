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

//! Dashboard counts.

use crate::order::OrderStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of orders in each status, taken in a single pass over the store.
///
/// Every status is present, with zero when no order has it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCounts {
    counts: BTreeMap<OrderStatus, u64>,
}

impl StatusCounts {
    pub fn get(&self, status: OrderStatus) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OrderStatus, u64)> + '_ {
        self.counts.iter().map(|(status, count)| (*status, *count))
    }
}

impl Default for StatusCounts {
    fn default() -> Self {
        Self {
            counts: OrderStatus::ALL.into_iter().map(|s| (s, 0)).collect(),
        }
    }
}

impl FromIterator<OrderStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = OrderStatus>>(iter: I) -> Self {
        let mut counts = Self::default();
        for status in iter {
            *counts.counts.entry(status).or_insert(0) += 1;
        }
        counts
    }
}
