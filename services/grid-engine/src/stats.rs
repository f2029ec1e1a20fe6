//! Trading statistics and the bounded activity log

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{error, info, warn};

/// Activity log capacity; the oldest entry is evicted beyond this
pub const MAX_LOG_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub message: String,
    pub severity: LogSeverity,
}

/// Most-recent-first activity log
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and mirror it to tracing
    pub fn push(&mut self, severity: LogSeverity, message: impl Into<String>) {
        let message = message.into();

        match severity {
            LogSeverity::Info => info!("{}", message),
            LogSeverity::Success => info!("✅ {}", message),
            LogSeverity::Warning => warn!("⚠️ {}", message),
            LogSeverity::Error => error!("❌ {}", message),
        }

        self.entries.push_front(LogEntry {
            time: Utc::now(),
            message,
            severity,
        });
        self.entries.truncate(MAX_LOG_ENTRIES);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogSeverity::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(LogSeverity::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(LogSeverity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogSeverity::Error, message);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest entry
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    /// Newest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Execution counters and PnL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingStats {
    pub total_trades: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    pub total_pnl: Decimal,
    pub daily_pnl: Decimal,
    pub last_trade_time: Option<DateTime<Utc>>,
}

impl TradingStats {
    /// Fold in a completed submission batch
    ///
    /// `total_trades` counts placed orders only, so it moves with
    /// `successful_trades`.
    pub fn record_execution(&mut self, succeeded: u64, failed: u64, at: DateTime<Utc>) {
        self.total_trades += succeeded;
        self.successful_trades += succeeded;
        self.failed_trades += failed;
        self.last_trade_time = Some(at);
    }

    /// Submission aborted before any per-order result existed
    pub fn record_execution_error(&mut self) {
        self.failed_trades += 1;
    }

    /// Realized PnL reported from outside the engine
    pub fn record_pnl(&mut self, amount: Decimal) {
        self.total_pnl = self.total_pnl.saturating_add(amount);
        self.daily_pnl = self.daily_pnl.saturating_add(amount);
    }

    /// Midnight rollover; touches nothing but `daily_pnl`
    pub fn reset_daily(&mut self) {
        self.daily_pnl = Decimal::ZERO;
    }

    /// Percentage of attempted orders that were placed
    pub fn success_rate(&self) -> Option<Decimal> {
        let attempted = self.successful_trades + self.failed_trades;
        if attempted == 0 {
            return None;
        }
        Some(Decimal::from(self.successful_trades) * Decimal::ONE_HUNDRED / Decimal::from(attempted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded_newest_first() {
        let mut log = ActivityLog::new();
        for i in 0..(MAX_LOG_ENTRIES + 7) {
            log.info(format!("entry {}", i));
        }

        assert_eq!(log.len(), MAX_LOG_ENTRIES);
        assert_eq!(log.latest().unwrap().message, "entry 56");
        // entries 0..=6 evicted
        assert_eq!(log.iter().last().unwrap().message, "entry 7");
    }

    #[test]
    fn test_partial_batch_accounting() {
        let mut stats = TradingStats::default();
        let now = Utc::now();

        stats.record_execution(3, 2, now);
        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.successful_trades, 3);
        assert_eq!(stats.failed_trades, 2);
        assert_eq!(stats.last_trade_time, Some(now));

        stats.record_execution_error();
        assert_eq!(stats.failed_trades, 3);
        assert_eq!(stats.success_rate(), Some(Decimal::from(50)));
    }

    #[test]
    fn test_daily_reset_keeps_totals() {
        let mut stats = TradingStats::default();
        stats.record_pnl(Decimal::from(-30));
        stats.record_pnl(Decimal::from(10));
        stats.record_execution(1, 0, Utc::now());

        stats.reset_daily();
        assert_eq!(stats.daily_pnl, Decimal::ZERO);
        assert_eq!(stats.total_pnl, Decimal::from(-20));
        assert_eq!(stats.total_trades, 1);
        assert_eq!(TradingStats::default().success_rate(), None);
    }

    #[test]
    fn test_pnl_saturates() {
        let mut stats = TradingStats::default();
        stats.record_pnl(Decimal::MIN);
        stats.record_pnl(Decimal::MIN);
        assert_eq!(stats.total_pnl, Decimal::MIN);
        assert_eq!(stats.daily_pnl, Decimal::MIN);
    }
}
