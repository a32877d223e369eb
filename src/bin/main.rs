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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use order_settlement_rs::{
    Actor, CardDetails, Engine, EngineConfig, NewOrder, OrderId, OrderStatus, OrderView,
    PaymentId, SettlementError, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Order Settlement - Replay a storefront command log
///
/// Reads order, payment, refund and status commands from a CSV file and
/// writes the resulting orders to stdout.
#[derive(Parser, Debug)]
#[command(name = "order-settlement-rs")]
#[command(about = "Replays order/payment commands and reports final order state", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: type,order,user,total,tax,card,expiry,cvv,status,payment
    /// Example: cargo run -- commands.csv > orders.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// How long to wait for a busy order before failing the command
    #[arg(long, value_name = "MS", default_value_t = 5_000)]
    lock_timeout_ms: u64,

    /// Print per-status order counts to stderr after the report
    #[arg(long)]
    stats: bool,
}

fn main() {
    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config =
        EngineConfig::default().with_lock_timeout(Duration::from_millis(args.lock_timeout_ms));

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match process_commands(BufReader::new(file), config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error processing commands: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_orders(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }

    if args.stats {
        match engine.counts_by_status() {
            Ok(counts) => {
                for (status, count) in counts.iter() {
                    eprintln!("{:<10} {}", status.as_str(), count);
                }
                eprintln!("{:<10} {}", "TOTAL", counts.total());
            }
            Err(e) => {
                eprintln!("Error collecting stats: {}", e);
                process::exit(1);
            }
        }
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, order, user, total, tax, card, expiry, cvv, status, payment`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    command: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    order: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    user: Option<u64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    total: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    tax: Option<Decimal>,
    #[serde(default)]
    card: Option<String>,
    #[serde(default)]
    expiry: Option<String>,
    #[serde(default)]
    cvv: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    payment: Option<u64>,
}

#[derive(Debug)]
enum Command {
    Place { order: NewOrder },
    Pay { order: OrderId, card: CardDetails },
    Status { order: OrderId, status: OrderStatus },
    Refund { payment: PaymentId },
}

#[derive(Debug, Error)]
enum RecordError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl CsvRecord {
    /// Converts the CSV record into a command, checking required fields.
    fn into_command(self) -> Result<Command, RecordError> {
        use RecordError::MissingField;

        match self.command.to_lowercase().as_str() {
            "place" => {
                let user = UserId(self.user.ok_or(MissingField("user"))?);
                let total = self.total.ok_or(MissingField("total"))?;
                let tax = self.tax.unwrap_or(Decimal::ZERO);
                let order = NewOrder::new(user, total, tax, None)?;
                Ok(Command::Place { order })
            }
            "pay" => {
                let order = OrderId(self.order.ok_or(MissingField("order"))?);
                let card = CardDetails::new(
                    self.card.ok_or(MissingField("card"))?,
                    "",
                    self.expiry.ok_or(MissingField("expiry"))?,
                    self.cvv.ok_or(MissingField("cvv"))?,
                );
                Ok(Command::Pay { order, card })
            }
            "status" => {
                let order = OrderId(self.order.ok_or(MissingField("order"))?);
                let status = self.status.ok_or(MissingField("status"))?.parse()?;
                Ok(Command::Status { order, status })
            }
            "refund" => {
                let payment = PaymentId(self.payment.ok_or(MissingField("payment"))?);
                Ok(Command::Refund { payment })
            }
            _ => Err(RecordError::UnknownCommand(self.command)),
        }
    }
}

fn apply(engine: &Engine, command: Command) -> Result<(), SettlementError> {
    match command {
        Command::Place { order } => {
            engine.place_order(&Actor::Customer(order.user_id()), order);
        }
        Command::Pay { order, card } => {
            engine.process_payment(&Actor::System, order, &card)?;
        }
        Command::Status { order, status } => {
            engine.update_status(&Actor::System, order, status)?;
        }
        Command::Refund { payment } => {
            engine.refund(&Actor::System, payment)?;
        }
    }
    Ok(())
}

/// Replays commands from a CSV reader against a fresh engine.
///
/// Streams the input, so arbitrarily large logs are fine. Malformed rows
/// and refused commands are logged and skipped; they never stop the replay.
///
/// # CSV Format
///
/// Expected columns: `type, order, user, total, tax, card, expiry, cvv, status, payment`
/// - `place`: `user`, `total`, optional `tax`
/// - `pay`: `order`, `card`, `expiry` (`MM/YY`), `cvv`
/// - `status`: `order`, `status` (e.g. `shipped`)
/// - `refund`: `payment`
///
/// # Example
///
/// ```csv
/// type,order,user,total,tax,card,expiry,cvv,status,payment
/// place,,7,107.99,8.00,,,,,
/// pay,1,,,,4532015112830366,12/49,123,,
/// status,1,,,,,,,shipped,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn process_commands<R: Read>(reader: R, config: EngineConfig) -> Result<Engine, csv::Error> {
    let engine = Engine::with_config(config);

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let (mut applied, mut skipped) = (0u64, 0u64);
    for (index, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let outcome = result
            .map_err(|e| e.to_string())
            .and_then(|record| record.into_command().map_err(|e| e.to_string()))
            .and_then(|command| apply(&engine, command).map_err(|e| e.to_string()));

        match outcome {
            Ok(()) => {
                applied += 1;
                debug!(line, "command applied");
            }
            Err(reason) => {
                skipped += 1;
                warn!(line, %reason, "skipping command");
            }
        }
    }
    info!(applied, skipped, "replay finished");

    Ok(engine)
}

/// One output row per order.
#[derive(Debug, Serialize)]
struct OrderRow {
    order: u64,
    user: u64,
    status: OrderStatus,
    total: Decimal,
    tax: Decimal,
    payment: Option<u64>,
    payment_status: Option<String>,
    transaction: Option<String>,
    card_last_four: Option<String>,
}

impl From<OrderView> for OrderRow {
    fn from(view: OrderView) -> Self {
        let payment = view.payment;
        OrderRow {
            order: view.order_id.0,
            user: view.user_id.0,
            status: view.status,
            total: view.total_amount,
            tax: view.tax_amount,
            payment: payment.as_ref().map(|p| p.payment_id.0),
            payment_status: payment.as_ref().map(|p| p.status.to_string()),
            transaction: payment.as_ref().map(|p| p.transaction_id.to_string()),
            card_last_four: payment.map(|p| p.card_last_four),
        }
    }
}

#[derive(Debug, Error)]
enum ReportError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

/// Write all orders, by ID, as CSV.
///
/// # CSV Format
///
/// Columns: `order, user, status, total, tax, payment, payment_status, transaction, card_last_four`
fn write_orders<W: Write>(engine: &Engine, writer: W) -> Result<(), ReportError> {
    let mut wtr = Writer::from_writer(writer);

    for view in engine.orders()? {
        wtr.serialize(OrderRow::from(view))?;
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
