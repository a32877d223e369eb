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

//! Card validation.
//!
//! Structural checks and the Luhn checksum for presented card numbers, plus
//! expiry and CVV checks. Everything here is pure: nothing is stored, and the
//! full number never leaves this module except through [`last_four`].
//!
//! # Example
//!
//! ```
//! use order_settlement_rs::card;
//!
//! assert!(card::validate("4532 0151 1283 0366"));
//! assert!(!card::validate("4532 0151 1283 0367"));
//! assert_eq!(card::last_four("4532 0151 1283 0366"), "0366");
//! ```

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const MIN_DIGITS: usize = 13;
pub const MAX_DIGITS: usize = 19;

/// Why a card was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Wrong length, non-digit characters, or failed Luhn checksum
    #[error("invalid card")]
    InvalidNumber,

    /// Expiry is not of the form `MM/YY` with a month in 1..=12
    #[error("malformed expiry date")]
    MalformedExpiry,

    /// Expiry month is in the past
    #[error("card expired")]
    Expired,

    /// CVV is not 3 or 4 digits
    #[error("invalid security code")]
    InvalidCvv,
}

/// Removes all whitespace from a presented card number.
pub fn normalize(number: &str) -> String {
    number.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Returns `true` if the whitespace-stripped number has 13 to 19 digits and
/// passes the Luhn checksum.
pub fn validate(number: &str) -> bool {
    let digits = normalize(number);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        return false;
    }

    // Walk from the least significant digit, doubling every second one.
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(position, byte)| {
            let digit = u32::from(byte - b'0');
            if position % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                digit
            }
        })
        .sum();

    sum % 10 == 0
}

/// Last four characters of the whitespace-stripped number.
///
/// Meant for numbers that already passed [`validate`]; shorter input is
/// returned whole rather than panicking.
pub fn last_four(number: &str) -> String {
    let digits = normalize(number);
    let skip = digits.chars().count().saturating_sub(4);
    digits.chars().skip(skip).collect()
}

/// Returns `true` for a 3 or 4 digit security code.
pub fn validate_cvv(cvv: &str) -> bool {
    (3..=4).contains(&cvv.len()) && cvv.bytes().all(|b| b.is_ascii_digit())
}

/// Card expiry month, parsed from `MM/YY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExpiryDate {
    year: i32,
    month: u32,
}

/// Value of exactly two ASCII digits.
fn two_digits(field: &str) -> Option<u32> {
    match field.as_bytes() {
        [tens, ones] if tens.is_ascii_digit() && ones.is_ascii_digit() => {
            Some(u32::from(tens - b'0') * 10 + u32::from(ones - b'0'))
        }
        _ => None,
    }
}

impl ExpiryDate {
    /// Parses `MM/YY`: two digits on each side, month in 1..=12.
    pub fn parse(value: &str) -> Result<Self, RejectReason> {
        let (month, year) = value
            .split_once('/')
            .ok_or(RejectReason::MalformedExpiry)?;
        let month = two_digits(month).ok_or(RejectReason::MalformedExpiry)?;
        let year = two_digits(year).ok_or(RejectReason::MalformedExpiry)?;

        if !(1..=12).contains(&month) {
            return Err(RejectReason::MalformedExpiry);
        }

        Ok(Self {
            year: 2000 + year as i32,
            month,
        })
    }

    /// A card is good through the last day of its expiry month.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        (self.year, self.month) < (now.year(), now.month())
    }
}

/// Card details as presented by the customer.
///
/// `Debug` masks the number and CVV so the struct is safe to log.
#[derive(Clone, Deserialize, Serialize)]
pub struct CardDetails {
    pub number: String,
    pub holder_name: String,
    pub expiry: String,
    pub cvv: String,
}

impl CardDetails {
    pub fn new(
        number: impl Into<String>,
        holder_name: impl Into<String>,
        expiry: impl Into<String>,
        cvv: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            holder_name: holder_name.into(),
            expiry: expiry.into(),
            cvv: cvv.into(),
        }
    }

    /// Runs every check and returns the display-safe suffix on success.
    ///
    /// The number is checked first, so a bad number always reports
    /// [`RejectReason::InvalidNumber`].
    pub fn verify(&self, now: DateTime<Utc>) -> Result<String, RejectReason> {
        if !validate(&self.number) {
            return Err(RejectReason::InvalidNumber);
        }
        if ExpiryDate::parse(&self.expiry)?.is_expired_at(now) {
            return Err(RejectReason::Expired);
        }
        if !validate_cvv(&self.cvv) {
            return Err(RejectReason::InvalidCvv);
        }
        Ok(last_four(&self.number))
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &format_args!("**** {}", last_four(&self.number)))
            .field("holder_name", &self.holder_name)
            .field("expiry", &self.expiry)
            .field("cvv", &"***")
            .finish()
    }
}
