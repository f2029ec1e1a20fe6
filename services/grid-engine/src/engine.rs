//! Engine loop controller
//!
//! Owns settings, stats, the activity log and the current strategy pair,
//! and runs one monitoring cycle at a time:
//!
//! ```text
//! Idle -> Monitoring -> Analyzing -> Executing -> Idle
//!              \             \            \
//!               +-------------+------------+--> Error -> Idle
//! ```
//!
//! The controller does not schedule anything itself; `runner` drives it
//! from a single task, so none of this state is shared.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{ConfidenceGates, EngineSettings, SettingsUpdate};
use crate::error::{EngineError, Result};
use crate::executor::{ExecutionReport, ExecutionSubmitter};
use crate::generator::{GenerationRequest, StrategyGenerator};
use crate::guard::{
    check_allocation, check_confidence, evaluate_circuit_breaker, ExecutionPath, GuardRejection,
};
use crate::plan::{build_execution_plan, ExecutionPlan};
use crate::portfolio::{is_valid_wallet_address, PortfolioSource};
use crate::reviewer::{ReviewRequest, StrategyReviewer};
use crate::stats::{ActivityLog, LogEntry, TradingStats};
use crate::types::{EngineStatus, MarketCondition, ReviewResult, StrategyDraft};

/// Collaborators consulted during a cycle
pub struct EngineServices {
    pub portfolio: Arc<dyn PortfolioSource>,
    pub generator: Arc<dyn StrategyGenerator>,
    pub reviewer: Arc<dyn StrategyReviewer>,
    pub submitter: ExecutionSubmitter,
}

/// Fixed per-process options
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub wallet_address: String,
    pub market_condition: MarketCondition,
    pub preferred_token: Option<String>,
    pub gates: ConfidenceGates,
    /// Circuit breaker balance until the first portfolio fetch
    pub reference_balance_usd: Option<Decimal>,
    pub expected_chain_id: u64,
}

/// The current (draft, review) pair. Replaced or discarded as a unit.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveStrategy {
    pub cycle_id: Uuid,
    pub draft: StrategyDraft,
    pub review: ReviewResult,
    /// Balance the draft was generated against
    pub portfolio_balance_usd: Decimal,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    InProgress,
}

/// How a cycle ended
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    /// Daily loss limit reached; the engine is now disabled
    CircuitBreakerTripped,
    Executed(ExecutionReport),
    /// Approved, but a guard refused submission
    ExecutionBlocked(GuardRejection),
    /// Submission could not start (network, translation, signer)
    ExecutionFailed(String),
    /// Approved below the auto gate or with auto-execute off
    AwaitingConfirmation,
    /// Reviewer said no; the pair is not kept
    Rejected(Box<ActiveStrategy>),
    /// Portfolio, generation or review failed
    Failed(String),
}

/// Compact view of the current strategy for status output
#[derive(Debug, Clone, Serialize)]
pub struct StrategySummary {
    pub cycle_id: Uuid,
    pub token: String,
    pub strategy_type: String,
    pub orders: usize,
    /// `None` when the amounts do not fit a decimal
    pub total_usd: Option<Decimal>,
    pub approved: bool,
    pub confidence_score: f64,
    pub executed: bool,
}

/// Point-in-time engine state, written to `state/now.json`
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub timestamp: DateTime<Utc>,
    pub status: EngineStatus,
    pub wallet_address: String,
    pub settings: EngineSettings,
    pub stats: TradingStats,
    pub circuit_breaker_tripped: bool,
    pub cycles_run: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub current_strategy: Option<StrategySummary>,
    pub logs: Vec<LogEntry>,
}

pub struct EngineController {
    services: EngineServices,
    options: EngineOptions,
    settings: EngineSettings,
    status: EngineStatus,
    stats: TradingStats,
    log: ActivityLog,
    current: Option<ActiveStrategy>,
    in_progress: bool,
    breaker_tripped: bool,
    last_balance_usd: Option<Decimal>,
    last_check: Option<DateTime<Utc>>,
    next_check: Option<DateTime<Utc>>,
    last_error: Option<String>,
    cycles_run: u64,
}

impl EngineController {
    /// New controller, always starting `Idle` and disabled
    pub fn new(
        services: EngineServices,
        options: EngineOptions,
        settings: EngineSettings,
    ) -> Result<Self> {
        if !is_valid_wallet_address(&options.wallet_address) {
            return Err(EngineError::InvalidWallet(options.wallet_address.clone()));
        }
        settings.validate()?;
        options.gates.validate()?;

        Ok(Self {
            services,
            options,
            settings: EngineSettings {
                enabled: false,
                ..settings
            },
            status: EngineStatus::Idle,
            stats: TradingStats::default(),
            log: ActivityLog::new(),
            current: None,
            in_progress: false,
            breaker_tripped: false,
            last_balance_usd: None,
            last_check: None,
            next_check: None,
            last_error: None,
            cycles_run: 0,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn stats(&self) -> &TradingStats {
        &self.stats
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn current(&self) -> Option<&ActiveStrategy> {
        self.current.as_ref()
    }

    pub fn is_breaker_tripped(&self) -> bool {
        self.breaker_tripped
    }

    /// Start time of the most recent cycle
    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.last_check
    }

    pub fn set_next_check(&mut self, next: Option<DateTime<Utc>>) {
        self.next_check = next;
    }

    /// Start the engine. Re-enabling is the only way to clear a tripped breaker.
    ///
    /// Returns false if it was already enabled.
    pub fn enable(&mut self) -> bool {
        if self.settings.enabled {
            return false;
        }
        if self.breaker_tripped {
            self.breaker_tripped = false;
            self.log.info("Circuit breaker cleared by operator");
        }
        self.settings.enabled = true;
        self.log.success("🚀 Autonomous trading engine started");
        true
    }

    /// Stop scheduling new cycles. A cycle already running finishes.
    ///
    /// Returns false if it was already disabled.
    pub fn disable(&mut self) -> bool {
        if !self.settings.enabled {
            return false;
        }
        self.settings.enabled = false;
        if !self.in_progress {
            self.status = EngineStatus::Idle;
        }
        self.log.warning("⏹️ Autonomous trading engine stopped");
        true
    }

    /// Validate and apply a settings change; invalid updates change nothing
    pub fn update_settings(&mut self, update: &SettingsUpdate) -> Result<EngineSettings> {
        let next = update.apply(&self.settings);
        next.validate()?;
        self.settings = next;
        self.log.info(format!(
            "Settings updated: max allocation {}%, max daily loss {}%, every {} min, auto-execute {}",
            self.settings.max_allocation_percent,
            self.settings.max_daily_loss_percent,
            self.settings.check_interval_minutes,
            if self.settings.auto_execute { "on" } else { "off" }
        ));
        Ok(self.settings.clone())
    }

    /// Realized PnL reported from outside
    pub fn record_pnl(&mut self, amount: Decimal) {
        self.stats.record_pnl(amount);
        self.log.info(format!(
            "PnL recorded: {} (today {})",
            amount, self.stats.daily_pnl
        ));
    }

    /// Midnight rollover. Leaves a tripped breaker latched.
    pub fn reset_daily_pnl(&mut self) {
        self.stats.reset_daily();
        self.log.info("📅 Daily PnL reset");
    }

    /// Run one monitoring cycle
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if !self.settings.enabled {
            return CycleOutcome::Skipped(SkipReason::Disabled);
        }
        if self.in_progress {
            return CycleOutcome::Skipped(SkipReason::InProgress);
        }

        self.in_progress = true;
        self.cycles_run += 1;
        let outcome = self.drive_cycle().await;
        self.in_progress = false;
        self.status = EngineStatus::Idle;
        outcome
    }

    async fn drive_cycle(&mut self) -> CycleOutcome {
        self.status = EngineStatus::Monitoring;
        self.last_check = Some(Utc::now());
        self.log.info("🔄 Starting monitoring cycle");

        let reference = self.last_balance_usd.or(self.options.reference_balance_usd);
        if let Some(balance) = reference {
            if self.trip_breaker_if_needed(balance) {
                return CycleOutcome::CircuitBreakerTripped;
            }
        }

        self.status = EngineStatus::Analyzing;
        self.current = None;

        let portfolio = match self
            .services
            .portfolio
            .fetch(&self.options.wallet_address)
            .await
        {
            Ok(portfolio) => portfolio,
            Err(e) => return self.cycle_failed("Portfolio fetch failed", e),
        };
        let balance = portfolio.total_balance_usd;
        self.last_balance_usd = Some(balance);

        // No balance was known at cycle start
        if reference.is_none() && self.trip_breaker_if_needed(balance) {
            return CycleOutcome::CircuitBreakerTripped;
        }

        let request = GenerationRequest {
            portfolio,
            market_condition: self.options.market_condition,
            preferred_token: self.options.preferred_token.clone(),
        };
        let draft = match self.services.generator.generate(&request).await {
            Ok(draft) => draft,
            Err(e) => return self.cycle_failed("Strategy generation failed", e),
        };
        self.log.info(format!(
            "📊 Strategy generated: {} on {}",
            draft.strategy_type, draft.recommended_token
        ));

        let request = ReviewRequest {
            draft,
            wallet_address: self.options.wallet_address.clone(),
            total_balance_usd: balance,
        };
        let review = match self.services.reviewer.review(&request).await {
            Ok(review) => review,
            Err(e) => return self.cycle_failed("Strategy review failed", e),
        };

        let active = ActiveStrategy {
            cycle_id: Uuid::new_v4(),
            draft: request.draft,
            review,
            portfolio_balance_usd: balance,
            executed: false,
            execution: None,
            created_at: Utc::now(),
        };

        if !active.review.approved {
            self.log.warning(format!(
                "❌ Strategy rejected ({}% confidence). Waiting for next cycle.",
                active.review.confidence_score
            ));
            return CycleOutcome::Rejected(Box::new(active));
        }

        let auto_gate = check_confidence(&self.options.gates, ExecutionPath::Auto, &active.review);
        let score = active.review.confidence_score;
        self.current = Some(active);

        match auto_gate {
            Ok(()) if self.settings.auto_execute => match self.execute_active().await {
                Ok(report) => CycleOutcome::Executed(report),
                Err(EngineError::Guard(rejection)) => CycleOutcome::ExecutionBlocked(rejection),
                Err(e) => CycleOutcome::ExecutionFailed(e.to_string()),
            },
            _ => {
                self.log.warning(format!(
                    "⏸️ Strategy approved ({}% confidence). Awaiting manual confirmation.",
                    score
                ));
                CycleOutcome::AwaitingConfirmation
            }
        }
    }

    fn trip_breaker_if_needed(&mut self, balance: Decimal) -> bool {
        match evaluate_circuit_breaker(self.stats.daily_pnl, balance, &self.settings) {
            Ok(()) => false,
            Err(rejection) => {
                self.settings.enabled = false;
                self.breaker_tripped = true;
                self.status = EngineStatus::Idle;
                self.log.error(format!("🔴 {}. Engine disabled.", rejection));
                true
            }
        }
    }

    fn cycle_failed(&mut self, context: &str, err: EngineError) -> CycleOutcome {
        self.status = EngineStatus::Error;
        let message = match err.raw_response() {
            Some(raw) => format!("{}: {} (raw response: {})", context, err, raw),
            None => format!("{}: {}", context, err),
        };
        if err.is_cycle_recoverable() {
            self.log.error(format!("❌ {}", message));
        } else {
            // retrying on the next tick cannot fix this
            self.settings.enabled = false;
            self.log.error(format!("❌ {}. Engine disabled.", message));
        }
        self.last_error = Some(message.clone());
        CycleOutcome::Failed(message)
    }

    /// Operator confirmation of the held strategy
    ///
    /// Re-runs the allocation check against current settings. The auto
    /// confidence gate does not apply here.
    pub async fn execute_manually(&mut self) -> Result<ExecutionReport> {
        let active = self.current.as_ref().ok_or(EngineError::NoActiveStrategy)?;
        if active.executed {
            return Err(EngineError::AlreadyExecuted);
        }
        check_confidence(&self.options.gates, ExecutionPath::Manual, &active.review)?;

        self.in_progress = true;
        let result = self.execute_active().await;
        self.in_progress = false;
        self.status = EngineStatus::Idle;
        result
    }

    /// Allocation check, submission and accounting for the current pair
    ///
    /// Logs exactly one summary entry for the attempt.
    async fn execute_active(&mut self) -> Result<ExecutionReport> {
        let Some(active) = self.current.as_ref() else {
            return Err(EngineError::NoActiveStrategy);
        };

        let check = match check_allocation(
            &active.draft.grid_orders,
            active.portfolio_balance_usd,
            &self.settings,
        ) {
            Ok(check) => check,
            Err(rejection) => {
                self.log
                    .warning(format!("🛑 Execution blocked: {}", rejection));
                return Err(EngineError::Guard(rejection));
            }
        };

        self.status = EngineStatus::Executing;
        let draft = active.draft.clone();
        tracing::info!(
            "💰 Placing {} orders ({}% of portfolio)",
            draft.grid_orders.len(),
            check.allocation_percent.round_dp(1)
        );

        match self.services.submitter.submit(&draft).await {
            Ok(report) => {
                self.stats
                    .record_execution(report.succeeded, report.failed, report.submitted_at);

                let attempted = report.succeeded + report.failed;
                if report.all_succeeded() {
                    self.log.success(format!(
                        "✅ Placed {} orders on {}",
                        report.succeeded, report.asset
                    ));
                } else {
                    self.log.warning(format!(
                        "Placed {} of {} orders on {}, {} failed",
                        report.succeeded, attempted, report.asset, report.failed
                    ));
                }

                if let Some(active) = self.current.as_mut() {
                    active.executed = true;
                    active.execution = Some(report.clone());
                }
                self.status = EngineStatus::Idle;
                Ok(report)
            }
            Err(e) => {
                self.stats.record_execution_error();
                self.status = EngineStatus::Error;
                let message = format!("Execution error: {}", e);
                self.log.error(format!("❌ {}", message));
                self.last_error = Some(message);
                Err(e)
            }
        }
    }

    /// Execution plan for the held strategy, nothing is submitted
    pub fn preview_plan(&self) -> Result<ExecutionPlan> {
        let active = self.current.as_ref().ok_or(EngineError::NoActiveStrategy)?;
        let plan = build_execution_plan(
            &active.draft,
            &active.review,
            &self.options.wallet_address,
            &self.options.gates,
            self.options.expected_chain_id,
        )?;
        Ok(plan)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            timestamp: Utc::now(),
            status: self.status,
            wallet_address: self.options.wallet_address.clone(),
            settings: self.settings.clone(),
            stats: self.stats.clone(),
            circuit_breaker_tripped: self.breaker_tripped,
            cycles_run: self.cycles_run,
            last_check: self.last_check,
            next_check: self.next_check,
            last_error: self.last_error.clone(),
            current_strategy: self.current.as_ref().map(|a| StrategySummary {
                cycle_id: a.cycle_id,
                token: a.draft.recommended_token.clone(),
                strategy_type: a.draft.strategy_type.clone(),
                orders: a.draft.grid_orders.len(),
                total_usd: a.draft.total_allocation_usd(),
                approved: a.review.approved,
                confidence_score: a.review.confidence_score,
                executed: a.executed,
            }),
            logs: self.log.to_vec(),
        }
    }
}
