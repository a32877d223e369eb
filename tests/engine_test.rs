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

//! Engine public API integration tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use order_settlement_rs::{
    Actor, CardDetails, Engine, EngineConfig, ErrorKind, FixedClock, NewOrder, OrderId,
    OrderStatus, PaymentId, PaymentMethod, PaymentStatus, RejectReason, ScriptedTokenSource,
    SettlementError, ShippingAddress, UserId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
}

fn engine_with(clock: Arc<FixedClock>, tokens: &[&str]) -> Engine {
    Engine::with_collaborators(
        EngineConfig::default(),
        clock,
        Arc::new(ScriptedTokenSource::new(tokens.iter().copied())),
    )
}

fn engine() -> Engine {
    engine_with(Arc::new(FixedClock::new(start())), &[])
}

fn place(engine: &Engine, user: u64, total: Decimal) -> OrderId {
    let order = NewOrder::new(UserId(user), total, Decimal::ZERO, None).unwrap();
    engine.place_order(&Actor::Customer(UserId(user)), order).order_id
}

fn good_card() -> CardDetails {
    CardDetails::new("4532 0151 1283 0366", "Jane Smith", "08/29", "123")
}

fn customer() -> Actor {
    Actor::Customer(UserId(1))
}

fn operator() -> Actor {
    Actor::Operator("admin".into())
}

// === Placement ===

#[test]
fn placed_order_has_no_payment() {
    let engine = engine();
    let address = ShippingAddress {
        first_name: "Jane".into(),
        last_name: "Smith".into(),
        email: "jane@example.com".into(),
        address: "123 Main St".into(),
        city: "New York".into(),
        state: "NY".into(),
        zip_code: "10001".into(),
        country: Some("USA".into()),
        ..Default::default()
    };
    let order = NewOrder::new(UserId(1), dec!(107.99), dec!(8.00), Some(address.clone())).unwrap();

    let view = engine.place_order(&customer(), order);
    assert_eq!(view.order_id, OrderId(1));
    assert_eq!(view.status, OrderStatus::Placed);
    assert_eq!(view.order_date, start());
    assert_eq!(view.shipping_address, Some(address));
    assert_eq!(
        view.full_address.as_deref(),
        Some("123 Main St, New York, NY 10001, USA")
    );
    assert_eq!(engine.orders().unwrap()[0].full_address, view.full_address);
    assert!(view.payment.is_none());
    assert!(view.shipped_date.is_none());
    assert_eq!(
        engine.get_payment_by_order(view.order_id),
        Err(SettlementError::NoPaymentForOrder(view.order_id))
    );
}

#[test]
fn order_ids_are_sequential() {
    let engine = engine();
    assert_eq!(place(&engine, 1, dec!(1)), OrderId(1));
    assert_eq!(place(&engine, 1, dec!(2)), OrderId(2));
    assert_eq!(place(&engine, 2, dec!(3)), OrderId(3));
    assert_eq!(engine.order_count(), 3);
}

// === Settlement ===

#[test]
fn payment_moves_order_to_processing() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(107.99));

    let result = engine.process_payment(&customer(), order_id, &good_card()).unwrap();

    assert_eq!(result.order.status, OrderStatus::Processing);
    assert_eq!(result.payment.status, PaymentStatus::Completed);
    assert_eq!(result.payment.amount, dec!(107.99));
    assert_eq!(result.payment.order_id, order_id);
    assert_eq!(result.payment.payment_method, PaymentMethod::CreditCard);
    assert_eq!(result.payment.card_last_four, "0366");
    assert_eq!(result.payment.payment_date, start());
    assert_eq!(engine.payment_count(), 1);

    let stored = engine.get_order(order_id).unwrap();
    assert_eq!(stored, result.order);
    assert_eq!(engine.get_payment_by_order(order_id).unwrap(), result.payment);
}

#[test]
fn transaction_reference_format() {
    let engine = engine_with(Arc::new(FixedClock::new(start())), &["1f3a9c0b"]);
    let order_id = place(&engine, 1, dec!(10));

    let result = engine.process_payment(&customer(), order_id, &good_card()).unwrap();
    assert_eq!(result.payment.transaction_id.as_str(), "TXN-1F3A9C0B");
}

#[test]
fn transaction_references_are_unique() {
    // Second payment draws a colliding token first.
    let engine = engine_with(
        Arc::new(FixedClock::new(start())),
        &["AAAA0001", "AAAA0001", "BBBB0002"],
    );
    let first = place(&engine, 1, dec!(10));
    let second = place(&engine, 2, dec!(20));

    let a = engine.process_payment(&customer(), first, &good_card()).unwrap();
    let b = engine.process_payment(&customer(), second, &good_card()).unwrap();

    assert_eq!(a.payment.transaction_id.as_str(), "TXN-AAAA0001");
    assert_eq!(b.payment.transaction_id.as_str(), "TXN-BBBB0002");
}

#[test]
fn exhausted_references_leave_order_placed() {
    let engine = Engine::with_collaborators(
        EngineConfig::default().with_max_token_attempts(2),
        Arc::new(FixedClock::new(start())),
        Arc::new(ScriptedTokenSource::new(["SAME0000", "SAME0000", "SAME0000"])),
    );
    let first = place(&engine, 1, dec!(10));
    let second = place(&engine, 2, dec!(20));
    engine.process_payment(&customer(), first, &good_card()).unwrap();

    let result = engine.process_payment(&customer(), second, &good_card());
    assert_eq!(result, Err(SettlementError::TransactionRefExhausted));
    assert!(result.unwrap_err().kind().is_retryable());

    let order = engine.get_order(second).unwrap();
    assert_eq!(order.status, OrderStatus::Placed);
    assert!(order.payment.is_none());
    assert_eq!(engine.payment_count(), 1);
}

#[test]
fn second_payment_conflicts_and_changes_nothing() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(107.99));
    let first = engine.process_payment(&customer(), order_id, &good_card()).unwrap();

    let result = engine.process_payment(&customer(), order_id, &good_card());
    assert_eq!(result, Err(SettlementError::PaymentAlreadyCompleted(order_id)));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Conflict);

    assert_eq!(engine.get_order(order_id).unwrap(), first.order);
    assert_eq!(engine.payment_count(), 1);
}

#[test]
fn conflict_is_reported_before_card_problems() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(5));
    engine.process_payment(&customer(), order_id, &good_card()).unwrap();

    let bad_card = CardDetails::new("1234", "Jane Smith", "08/29", "123");
    assert_eq!(
        engine.process_payment(&customer(), order_id, &bad_card),
        Err(SettlementError::PaymentAlreadyCompleted(order_id))
    );
}

#[test]
fn payment_on_missing_order() {
    let engine = engine();
    let result = engine.process_payment(&customer(), OrderId(99), &good_card());
    assert_eq!(result, Err(SettlementError::OrderNotFound(OrderId(99))));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn invalid_card_is_rejected_without_record() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(10));
    let card = CardDetails::new("4532015112830367", "Jane Smith", "08/29", "123");

    let result = engine.process_payment(&customer(), order_id, &card);
    assert_eq!(
        result,
        Err(SettlementError::PaymentRejected(RejectReason::InvalidNumber))
    );
    assert_eq!(result.unwrap_err().to_string(), "payment rejected: invalid card");

    let order = engine.get_order(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Placed);
    assert!(order.payment.is_none());
    assert_eq!(engine.payment_count(), 0);

    // A good card still works afterwards.
    engine.process_payment(&customer(), order_id, &good_card()).unwrap();
}

#[test]
fn expired_card_and_bad_cvv_are_rejected() {
    let clock = Arc::new(FixedClock::new(start()));
    let engine = engine_with(clock.clone(), &[]);
    let order_id = place(&engine, 1, dec!(10));

    let expired = CardDetails::new("4111111111111111", "Jane Smith", "04/26", "123");
    assert_eq!(
        engine.process_payment(&customer(), order_id, &expired),
        Err(SettlementError::PaymentRejected(RejectReason::Expired))
    );

    // Valid through the end of its month.
    let this_month = CardDetails::new("4111111111111111", "Jane Smith", "05/26", "12");
    assert_eq!(
        engine.process_payment(&customer(), order_id, &this_month),
        Err(SettlementError::PaymentRejected(RejectReason::InvalidCvv))
    );

    let good = CardDetails::new("4111111111111111", "Jane Smith", "05/26", "1234");
    assert!(engine.process_payment(&customer(), order_id, &good).is_ok());
}

#[test]
fn cancelled_order_cannot_be_paid() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(10));
    engine
        .update_status(&operator(), order_id, OrderStatus::Cancelled)
        .unwrap();

    let result = engine.process_payment(&customer(), order_id, &good_card());
    assert!(matches!(
        result,
        Err(SettlementError::InvalidTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Processing,
            ..
        })
    ));
    assert_eq!(engine.payment_count(), 0);
}

// === Refunds ===

#[test]
fn refund_marks_payment_and_cancels_order() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(49.50));
    let settled = engine.process_payment(&customer(), order_id, &good_card()).unwrap();

    let refunded = engine.refund(&operator(), settled.payment.payment_id).unwrap();
    assert_eq!(refunded.payment.status, PaymentStatus::Refunded);
    assert_eq!(refunded.payment.amount, dec!(49.50));
    assert_eq!(refunded.payment.transaction_id, settled.payment.transaction_id);
    assert_eq!(refunded.order.status, OrderStatus::Cancelled);

    let order = engine.get_order(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment.unwrap().status, PaymentStatus::Refunded);
}

#[test]
fn second_refund_is_invalid_state() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(10));
    let payment_id = engine
        .process_payment(&customer(), order_id, &good_card())
        .unwrap()
        .payment
        .payment_id;
    engine.refund(&operator(), payment_id).unwrap();

    let result = engine.refund(&operator(), payment_id);
    assert_eq!(
        result,
        Err(SettlementError::NotRefundable {
            payment: payment_id,
            status: PaymentStatus::Refunded,
        })
    );
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn refund_of_unknown_payment() {
    let engine = engine();
    assert_eq!(
        engine.refund(&operator(), PaymentId(7)),
        Err(SettlementError::PaymentNotFound(PaymentId(7)))
    );
}

#[test]
fn shipped_order_cannot_be_refunded() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(10));
    let payment_id = engine
        .process_payment(&customer(), order_id, &good_card())
        .unwrap()
        .payment
        .payment_id;
    engine
        .update_status(&operator(), order_id, OrderStatus::Shipped)
        .unwrap();

    let result = engine.refund(&operator(), payment_id);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);

    let order = engine.get_order(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);
    assert_eq!(order.payment.unwrap().status, PaymentStatus::Completed);
}

#[test]
fn refunded_order_cannot_be_paid_again() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(10));
    let payment_id = engine
        .process_payment(&customer(), order_id, &good_card())
        .unwrap()
        .payment
        .payment_id;
    engine.refund(&operator(), payment_id).unwrap();

    let result = engine.process_payment(&customer(), order_id, &good_card());
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
    assert_eq!(engine.payment_count(), 1);
}

// === Lifecycle ===

#[test]
fn shipping_unpaid_order_is_invalid() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(10));

    let result = engine.update_status(&operator(), order_id, OrderStatus::Shipped);
    assert_eq!(
        result,
        Err(SettlementError::InvalidTransition {
            order: order_id,
            from: OrderStatus::Placed,
            to: OrderStatus::Shipped,
        })
    );

    let order = engine.get_order(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Placed);
    assert!(order.shipped_date.is_none());
    assert!(order.history.is_empty());
}

#[test]
fn ship_and_deliver_stamp_dates() {
    let clock = Arc::new(FixedClock::new(start()));
    let engine = engine_with(clock.clone(), &[]);
    let order_id = place(&engine, 1, dec!(10));
    engine.process_payment(&customer(), order_id, &good_card()).unwrap();

    let shipped_at = start() + Duration::days(1);
    clock.set(shipped_at);
    let shipped = engine
        .update_status(&operator(), order_id, OrderStatus::Shipped)
        .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert_eq!(shipped.shipped_date, Some(shipped_at));
    assert!(shipped.delivered_date.is_none());

    let delivered_at = start() + Duration::days(3);
    clock.set(delivered_at);
    let delivered = engine
        .update_status(&operator(), order_id, OrderStatus::Delivered)
        .unwrap();
    assert_eq!(delivered.shipped_date, Some(shipped_at));
    assert_eq!(delivered.delivered_date, Some(delivered_at));
    assert_eq!(delivered.order_date, start());

    let moves: Vec<_> = delivered.history.iter().map(|c| (c.from, c.to)).collect();
    assert_eq!(
        moves,
        vec![
            (OrderStatus::Placed, OrderStatus::Processing),
            (OrderStatus::Processing, OrderStatus::Shipped),
            (OrderStatus::Shipped, OrderStatus::Delivered),
        ]
    );
    assert_eq!(delivered.history[0].actor, customer());
    assert_eq!(delivered.history[2].actor, operator());
}

#[test]
fn terminal_states_reject_everything() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(10));
    engine.process_payment(&customer(), order_id, &good_card()).unwrap();
    engine
        .update_status(&operator(), order_id, OrderStatus::Shipped)
        .unwrap();
    engine
        .update_status(&operator(), order_id, OrderStatus::Delivered)
        .unwrap();

    for target in OrderStatus::ALL {
        let result = engine.update_status(&operator(), order_id, target);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
    }
    assert_eq!(
        engine.get_order(order_id).unwrap().status,
        OrderStatus::Delivered
    );
}

#[test]
fn operator_cannot_fake_settlement() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(10));

    let result = engine.update_status(&operator(), order_id, OrderStatus::Processing);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
}

#[test]
fn operator_cancels_only_unpaid_orders() {
    let engine = engine();
    let unpaid = place(&engine, 1, dec!(10));
    let paid = place(&engine, 2, dec!(20));
    engine.process_payment(&customer(), paid, &good_card()).unwrap();

    let cancelled = engine
        .update_status(&operator(), unpaid, OrderStatus::Cancelled)
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Paid orders are cancelled through a refund.
    let result = engine.update_status(&operator(), paid, OrderStatus::Cancelled);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
    assert_eq!(engine.get_order(paid).unwrap().status, OrderStatus::Processing);
}

#[test]
fn update_status_on_missing_order() {
    let engine = engine();
    assert_eq!(
        engine.update_status(&operator(), OrderId(3), OrderStatus::Shipped),
        Err(SettlementError::OrderNotFound(OrderId(3)))
    );
}

#[test]
fn status_names_parse_case_insensitively() {
    assert_eq!("shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
    assert_eq!("Processing".parse::<OrderStatus>(), Ok(OrderStatus::Processing));
    let err = "returned".parse::<OrderStatus>().unwrap_err();
    assert_eq!(err, SettlementError::UnknownStatus("returned".into()));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

// === Lookups and Reporting ===

#[test]
fn payment_lookups() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(10));
    let settled = engine.process_payment(&customer(), order_id, &good_card()).unwrap();

    assert_eq!(
        engine.get_payment(settled.payment.payment_id).unwrap(),
        settled.payment
    );
    assert_eq!(
        engine.get_payment_by_order(OrderId(42)),
        Err(SettlementError::OrderNotFound(OrderId(42)))
    );
}

#[test]
fn counts_by_status_sum_to_order_count() {
    let engine = engine();
    let ids: Vec<_> = (1..=6).map(|user| place(&engine, user, dec!(10))).collect();

    for id in &ids[..4] {
        engine.process_payment(&customer(), *id, &good_card()).unwrap();
    }
    engine
        .update_status(&operator(), ids[0], OrderStatus::Shipped)
        .unwrap();
    engine
        .update_status(&operator(), ids[1], OrderStatus::Shipped)
        .unwrap();
    engine
        .update_status(&operator(), ids[1], OrderStatus::Delivered)
        .unwrap();
    let payment = engine.get_payment_by_order(ids[2]).unwrap().payment_id;
    engine.refund(&operator(), payment).unwrap();

    let counts = engine.counts_by_status().unwrap();
    assert_eq!(counts.get(OrderStatus::Placed), 2);
    assert_eq!(counts.get(OrderStatus::Processing), 1);
    assert_eq!(counts.get(OrderStatus::Shipped), 1);
    assert_eq!(counts.get(OrderStatus::Delivered), 1);
    assert_eq!(counts.get(OrderStatus::Cancelled), 1);
    assert_eq!(counts.total(), engine.order_count() as u64);
}

#[test]
fn empty_engine_reports_zero_counts() {
    let engine = Engine::new();
    let counts = engine.counts_by_status().unwrap();
    assert_eq!(counts.total(), 0);
    assert!(counts.iter().all(|(_, count)| count == 0));
    assert!(engine.orders().unwrap().is_empty());
}

#[test]
fn order_listings() {
    let engine = engine();
    let a = place(&engine, 1, dec!(10));
    let b = place(&engine, 2, dec!(20));
    let c = place(&engine, 1, dec!(30));
    engine.process_payment(&customer(), b, &good_card()).unwrap();

    let placed: Vec<_> = engine
        .orders_with_status(OrderStatus::Placed)
        .unwrap()
        .into_iter()
        .map(|o| o.order_id)
        .collect();
    assert_eq!(placed, vec![a, c]);

    let mine: Vec<_> = engine
        .orders_for_user(UserId(1))
        .unwrap()
        .into_iter()
        .map(|o| o.order_id)
        .collect();
    assert_eq!(mine, vec![a, c]);

    assert!(engine.orders_with_status(OrderStatus::Shipped).unwrap().is_empty());
}

#[test]
fn views_are_detached_snapshots() {
    let engine = engine();
    let order_id = place(&engine, 1, dec!(10));
    let before = engine.get_order(order_id).unwrap();

    engine.process_payment(&customer(), order_id, &good_card()).unwrap();

    assert_eq!(before.status, OrderStatus::Placed);
    assert!(before.payment.is_none());
}

#[test]
fn zero_total_orders_settle() {
    let engine = engine();
    let order_id = place(&engine, 1, Decimal::ZERO);

    let result = engine.process_payment(&customer(), order_id, &good_card()).unwrap();
    assert_eq!(result.payment.amount, Decimal::ZERO);
}
