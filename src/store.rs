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

//! In-memory order store.
//!
//! Each order sits behind its own `parking_lot::Mutex`, so calls on
//! different orders never wait on each other while calls on the same order
//! are serialized. The map shard lock is released before the order lock is
//! taken; no code path holds two order locks at once.

use crate::base::OrderId;
use crate::error::SettlementError;
use crate::order::{NewOrder, OrderData};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

type Slot = Arc<Mutex<OrderData>>;

pub(crate) struct OrderStore {
    orders: DashMap<OrderId, Slot>,
    next_id: AtomicU64,
    lock_timeout: Duration,
}

impl OrderStore {
    pub(crate) fn new(lock_timeout: Duration) -> Self {
        Self {
            orders: DashMap::new(),
            next_id: AtomicU64::new(1),
            lock_timeout,
        }
    }

    /// Stores a new order under the next free ID.
    pub(crate) fn insert<R>(
        &self,
        order: NewOrder,
        placed_at: DateTime<Utc>,
        f: impl FnOnce(&OrderData) -> R,
    ) -> R {
        let id = OrderId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let data = OrderData::place(id, order, placed_at);
        let result = f(&data);
        self.orders.insert(id, Arc::new(Mutex::new(data)));
        result
    }

    fn slot(&self, id: OrderId) -> Result<Slot, SettlementError> {
        self.orders
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SettlementError::OrderNotFound(id))
    }

    /// Runs `f` against a private copy of the order and commits the copy only
    /// if `f` succeeds, all under the order's lock.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::OrderNotFound`] - No such order.
    /// - [`SettlementError::LockTimeout`] - The order stayed locked for longer
    ///   than the configured timeout.
    /// - Whatever `f` returns; the stored order is then unchanged.
    pub(crate) fn update<R>(
        &self,
        id: OrderId,
        f: impl FnOnce(&mut OrderData) -> Result<R, SettlementError>,
    ) -> Result<R, SettlementError> {
        let slot = self.slot(id)?;
        let mut data = self.lock(&slot, id)?;

        let mut draft = data.clone();
        let result = f(&mut draft)?;
        *data = draft;
        Ok(result)
    }

    /// Runs `f` against the order under its lock.
    pub(crate) fn read<R>(
        &self,
        id: OrderId,
        f: impl FnOnce(&OrderData) -> R,
    ) -> Result<R, SettlementError> {
        let slot = self.slot(id)?;
        let data = self.lock(&slot, id)?;
        Ok(f(&data))
    }

    /// Applies `f` to every order, one lock at a time, in ID order.
    ///
    /// Orders are visited in a single pass; writes that land on other
    /// orders meanwhile may or may not be seen.
    pub(crate) fn scan<R>(&self, mut f: impl FnMut(&OrderData) -> R) -> Result<Vec<R>, SettlementError> {
        let mut slots: Vec<(OrderId, Slot)> = self
            .orders
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        slots.sort_unstable_by_key(|(id, _)| *id);

        slots
            .iter()
            .map(|(id, slot)| self.lock(slot, *id).map(|data| f(&data)))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.orders.len()
    }

    fn lock<'a>(
        &self,
        slot: &'a Slot,
        id: OrderId,
    ) -> Result<parking_lot::MutexGuard<'a, OrderData>, SettlementError> {
        slot.try_lock_for(self.lock_timeout).ok_or_else(|| {
            warn!(order = %id, timeout_ms = self.lock_timeout.as_millis() as u64, "order lock timed out");
            SettlementError::LockTimeout(id)
        })
    }
}
