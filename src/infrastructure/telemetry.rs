//! Telemetry sinks: structured log lines or an append-only JSON-lines file

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::domain::arbitrage::Opportunity;
use crate::domain::execution::ExecutionResult;
use crate::domain::telemetry::TelemetrySink;
use crate::shared::errors::AppError;

/// Emits every record as a tracing event under the `telemetry` target
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record_opportunity(&self, opportunity: &Opportunity) {
        info!(
            target: "telemetry",
            symbol = %opportunity.symbol,
            chain = %opportunity.chain,
            direction = ?opportunity.direction,
            edge_bps = opportunity.edge_bps,
            net_profit = opportunity.net_profit,
            gas_gwei = opportunity.gas_gwei,
            executable = opportunity.executable,
            reason = ?opportunity.reason,
            "opportunity"
        );
    }

    fn record_execution(&self, result: &ExecutionResult) {
        info!(
            target: "telemetry",
            plan_id = %result.plan_id,
            route = %result.route_id,
            status = ?result.status,
            actual_profit = ?result.actual_profit,
            gas_used = ?result.gas_used,
            tx_hash = ?result.tx_hash,
            error = ?result.error,
            "execution"
        );
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
enum Record<'a> {
    Opportunity(&'a Opportunity),
    Execution(&'a ExecutionResult),
}

#[derive(Serialize)]
struct Line<'a> {
    written_at: chrono::DateTime<Utc>,
    #[serde(flatten)]
    record: Record<'a>,
}

/// Appends one JSON document per record to a file
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write(&self, record: Record<'_>) {
        let line = Line {
            written_at: Utc::now(),
            record,
        };
        let json = match serde_json::to_string(&line) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize telemetry record: {}", e);
                return;
            }
        };

        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{}", json).and_then(|_| writer.flush()) {
            warn!("Failed to write telemetry record: {}", e);
        }
    }
}

impl TelemetrySink for JsonLinesSink {
    fn record_opportunity(&self, opportunity: &Opportunity) {
        self.write(Record::Opportunity(opportunity));
    }

    fn record_execution(&self, result: &ExecutionResult) {
        self.write(Record::Execution(result));
    }
}
