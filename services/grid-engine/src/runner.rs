//! Engine runner - the single task that owns the controller
//!
//! Timers and operator commands are multiplexed in one `select!` loop.
//! A cycle runs to completion before the next command is looked at, so
//! commands sent mid-cycle apply once it settles.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{EngineSettings, SettingsUpdate};
use crate::engine::{CycleOutcome, EngineController, EngineSnapshot};
use crate::error::{EngineError, Result};
use crate::executor::ExecutionReport;
use crate::plan::ExecutionPlan;
use crate::state::StateManager;

const COMMAND_BUFFER: usize = 32;

/// Messages accepted by the runner
#[derive(Debug)]
pub enum EngineCommand {
    Enable,
    Disable,
    UpdateSettings(SettingsUpdate, oneshot::Sender<Result<EngineSettings>>),
    RecordPnl(Decimal),
    ResetDailyPnl,
    /// Run a cycle now, outside the timer
    RunCycle(oneshot::Sender<CycleOutcome>),
    ExecuteManually(oneshot::Sender<Result<ExecutionReport>>),
    PreviewPlan(oneshot::Sender<Result<ExecutionPlan>>),
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Shutdown,
}

/// Cloneable handle for talking to a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    async fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| EngineError::EngineStopped)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| EngineError::EngineStopped)
    }

    pub async fn enable(&self) -> Result<()> {
        self.send(EngineCommand::Enable).await
    }

    pub async fn disable(&self) -> Result<()> {
        self.send(EngineCommand::Disable).await
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<EngineSettings> {
        self.request(|reply| EngineCommand::UpdateSettings(update, reply))
            .await?
    }

    pub async fn record_pnl(&self, amount: Decimal) -> Result<()> {
        self.send(EngineCommand::RecordPnl(amount)).await
    }

    pub async fn reset_daily_pnl(&self) -> Result<()> {
        self.send(EngineCommand::ResetDailyPnl).await
    }

    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        self.request(EngineCommand::RunCycle).await
    }

    pub async fn execute_manually(&self) -> Result<ExecutionReport> {
        self.request(EngineCommand::ExecuteManually).await?
    }

    pub async fn preview_plan(&self) -> Result<ExecutionPlan> {
        self.request(EngineCommand::PreviewPlan).await?
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        self.request(EngineCommand::Snapshot).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(EngineCommand::Shutdown).await
    }
}

pub struct EngineRunner {
    controller: EngineController,
    state: Option<StateManager>,
    commands: mpsc::Receiver<EngineCommand>,
    cycle_timer: Option<Interval>,
}

impl EngineRunner {
    /// Spawn the runner; the join handle yields the controller back on shutdown
    pub fn spawn(
        controller: EngineController,
        state: Option<StateManager>,
    ) -> (EngineHandle, JoinHandle<EngineController>) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let runner = Self {
            controller,
            state,
            commands,
            cycle_timer: None,
        };
        let task = tokio::spawn(runner.run());
        (EngineHandle { tx }, task)
    }

    async fn run(mut self) -> EngineController {
        info!("Engine runner started");

        if let Some(state) = &self.state {
            if let Err(e) = state.init().await {
                warn!("Failed to create state directories: {}", e);
            }
        }

        if self.controller.settings().enabled {
            self.arm_timer(Instant::now());
        }

        let daily_reset = sleep_until(Instant::now() + until_next_utc_midnight(Utc::now()));
        tokio::pin!(daily_reset);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },

                () = &mut daily_reset => {
                    self.controller.reset_daily_pnl();
                    daily_reset
                        .as_mut()
                        .reset(Instant::now() + until_next_utc_midnight(Utc::now()));
                    self.persist(None).await;
                }

                _ = next_tick(&mut self.cycle_timer) => {
                    self.run_cycle().await;
                }
            }
        }

        info!("Engine runner stopped");
        self.controller
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Enable => {
                self.controller.enable();
                if self.cycle_timer.is_none() {
                    // first tick fires immediately
                    self.arm_timer(Instant::now());
                }
                self.persist(None).await;
            }
            EngineCommand::Disable => {
                self.controller.disable();
                self.disarm_timer();
                self.persist(None).await;
            }
            EngineCommand::UpdateSettings(update, reply) => {
                let previous = self.controller.settings().check_interval();
                let result = self.controller.update_settings(&update);

                if let Ok(settings) = &result {
                    let period = settings.check_interval();
                    if settings.enabled && period != previous {
                        debug!("Check interval changed to {:?}", period);
                        self.arm_timer(Instant::now() + period);
                    }
                }
                let _ = reply.send(result);
                self.persist(None).await;
            }
            EngineCommand::RecordPnl(amount) => {
                self.controller.record_pnl(amount);
            }
            EngineCommand::ResetDailyPnl => {
                self.controller.reset_daily_pnl();
            }
            EngineCommand::RunCycle(reply) => {
                let outcome = self.run_cycle().await;
                let _ = reply.send(outcome);
            }
            EngineCommand::ExecuteManually(reply) => {
                let result = self.controller.execute_manually().await;
                self.persist(None).await;
                if let (Ok(_), Some(state), Some(active)) =
                    (&result, &self.state, self.controller.current())
                {
                    if let Err(e) = state.write_decision(active).await {
                        warn!("Failed to journal execution: {}", e);
                    }
                }
                let _ = reply.send(result);
            }
            EngineCommand::PreviewPlan(reply) => {
                let _ = reply.send(self.controller.preview_plan());
            }
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
            EngineCommand::Shutdown => {}
        }
    }

    async fn run_cycle(&mut self) -> CycleOutcome {
        let outcome = self.controller.run_cycle().await;
        debug!("Cycle finished: {:?}", outcome);

        if self.controller.settings().enabled {
            // the interval runs from cycle start, not completion
            let started = self.controller.last_check().unwrap_or_else(Utc::now);
            let next = started
                + chrono::Duration::minutes(i64::from(self.controller.settings().check_interval_minutes));
            self.controller.set_next_check(Some(next));
        } else {
            // disabled by the circuit breaker or before the tick fired
            self.disarm_timer();
        }

        self.persist(Some(&outcome)).await;
        outcome
    }

    fn arm_timer(&mut self, start: Instant) {
        let period = self.controller.settings().check_interval();
        let mut timer = interval_at(start, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.cycle_timer = Some(timer);

        let until_start = start.saturating_duration_since(Instant::now());
        let next = chrono::Duration::from_std(until_start)
            .map(|d| Utc::now() + d)
            .ok();
        self.controller.set_next_check(next);
    }

    fn disarm_timer(&mut self) {
        self.cycle_timer = None;
        self.controller.set_next_check(None);
    }

    /// Write now.json and journal the analysed pair; failures only warn
    async fn persist(&self, outcome: Option<&CycleOutcome>) {
        let Some(state) = &self.state else {
            return;
        };

        if let Err(e) = state.write_now(&self.controller.snapshot()).await {
            warn!("Failed to write state: {}", e);
        }

        let decision = match outcome {
            Some(CycleOutcome::Rejected(active)) => Some(&**active),
            Some(
                CycleOutcome::Executed(_)
                | CycleOutcome::ExecutionBlocked(_)
                | CycleOutcome::ExecutionFailed(_)
                | CycleOutcome::AwaitingConfirmation,
            ) => self.controller.current(),
            _ => None,
        };

        if let Some(active) = decision {
            if let Err(e) = state.write_decision(active).await {
                warn!("Failed to journal decision: {}", e);
            }
        }
    }
}

/// Resolves on the next cycle tick, or never while disarmed
async fn next_tick(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

/// Time left until the next 00:00 UTC
pub fn until_next_utc_midnight(now: DateTime<Utc>) -> Duration {
    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    now.date_naive()
        .succ_opt()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .and_then(|midnight| (midnight - now).to_std().ok())
        .unwrap_or(DAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_until_next_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 30).unwrap();
        assert_eq!(until_next_utc_midnight(now), Duration::from_secs(30));

        let now = Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap();
        assert_eq!(until_next_utc_midnight(now), Duration::from_secs(24 * 60 * 60));

        // month rollover
        let now = Utc.with_ymd_and_hms(2026, 2, 28, 12, 0, 0).unwrap();
        assert_eq!(until_next_utc_midnight(now), Duration::from_secs(12 * 60 * 60));
    }
}
