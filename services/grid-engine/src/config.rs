//! Engine configuration
//!
//! `EngineSettings` is the user-facing knob set owned by the controller.
//! `AppConfig` is the process configuration read once at startup.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::exchange::ARBITRUM_ONE_CHAIN_ID;
use crate::portfolio::is_valid_wallet_address;
use crate::types::MarketCondition;

/// Check intervals the engine accepts, in minutes
pub const ALLOWED_CHECK_INTERVALS: [u32; 5] = [5, 15, 30, 60, 240];

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    #[default]
    Conservative,
    Moderate,
    Aggressive,
}

/// Engine settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineSettings {
    pub enabled: bool,
    pub risk_tolerance: RiskTolerance,
    /// Max % of portfolio committed by one strategy (1 - 50)
    pub max_allocation_percent: Decimal,
    /// Daily loss that trips the circuit breaker (1 - 20)
    pub max_daily_loss_percent: Decimal,
    pub check_interval_minutes: u32,
    /// If false, approved strategies wait for manual confirmation
    pub auto_execute: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            risk_tolerance: RiskTolerance::Conservative,
            max_allocation_percent: Decimal::from(10),
            max_daily_loss_percent: Decimal::from(5),
            check_interval_minutes: 15,
            auto_execute: false,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_allocation_percent < Decimal::ONE
            || self.max_allocation_percent > Decimal::from(50)
        {
            return Err(EngineError::InvalidSettings(format!(
                "max_allocation_percent must be within 1..=50, got {}",
                self.max_allocation_percent
            )));
        }

        if self.max_daily_loss_percent < Decimal::ONE
            || self.max_daily_loss_percent > Decimal::from(20)
        {
            return Err(EngineError::InvalidSettings(format!(
                "max_daily_loss_percent must be within 1..=20, got {}",
                self.max_daily_loss_percent
            )));
        }

        if !ALLOWED_CHECK_INTERVALS.contains(&self.check_interval_minutes) {
            return Err(EngineError::InvalidSettings(format!(
                "check_interval_minutes must be one of {:?}, got {}",
                ALLOWED_CHECK_INTERVALS, self.check_interval_minutes
            )));
        }

        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.check_interval_minutes) * 60)
    }
}

/// Partial settings change requested by an operator
///
/// `enabled` is deliberately absent: starting and stopping go through
/// dedicated commands.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct SettingsUpdate {
    pub risk_tolerance: Option<RiskTolerance>,
    pub max_allocation_percent: Option<Decimal>,
    pub max_daily_loss_percent: Option<Decimal>,
    pub check_interval_minutes: Option<u32>,
    pub auto_execute: Option<bool>,
}

impl SettingsUpdate {
    /// Produce the updated settings without touching `current`
    pub fn apply(&self, current: &EngineSettings) -> EngineSettings {
        EngineSettings {
            enabled: current.enabled,
            risk_tolerance: self.risk_tolerance.unwrap_or(current.risk_tolerance),
            max_allocation_percent: self
                .max_allocation_percent
                .unwrap_or(current.max_allocation_percent),
            max_daily_loss_percent: self
                .max_daily_loss_percent
                .unwrap_or(current.max_daily_loss_percent),
            check_interval_minutes: self
                .check_interval_minutes
                .unwrap_or(current.check_interval_minutes),
            auto_execute: self.auto_execute.unwrap_or(current.auto_execute),
        }
    }
}

/// Minimum review confidence per execution path
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct ConfidenceGates {
    /// Required for automatic execution inside a cycle
    pub auto_execute_min: f64,
    /// Required for operator-triggered execution
    pub manual_execute_min: f64,
    /// Required for an execution plan to be marked ready
    pub plan_acceptance_min: f64,
}

impl Default for ConfidenceGates {
    fn default() -> Self {
        Self {
            auto_execute_min: default_auto_execute_min(),
            manual_execute_min: default_manual_execute_min(),
            plan_acceptance_min: default_plan_acceptance_min(),
        }
    }
}

impl ConfidenceGates {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("auto_execute_min", self.auto_execute_min),
            ("manual_execute_min", self.manual_execute_min),
            ("plan_acceptance_min", self.plan_acceptance_min),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(EngineError::Configuration(format!(
                    "{} must be within 0..=100, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// How orders reach the exchange
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignerMode {
    /// Simulated fills, nothing leaves the process
    #[default]
    Paper,
    /// Host wallet bridge signs and submits
    Bridge,
}

/// Process configuration loaded from `GRID_*` environment variables
#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub wallet_address: String,

    pub advisory_api_key: Option<String>,
    #[serde(default = "default_advisory_base_url")]
    pub advisory_base_url: String,
    #[serde(default = "default_model")]
    pub generator_model: String,
    #[serde(default = "default_model")]
    pub reviewer_model: String,

    pub portfolio_api_key: Option<String>,
    #[serde(default = "default_portfolio_base_url")]
    pub portfolio_base_url: String,

    #[serde(default)]
    pub signer_mode: SignerMode,
    pub signer_url: Option<String>,
    #[serde(default = "default_expected_chain_id")]
    pub expected_chain_id: u64,
    #[serde(default = "default_order_delay_ms")]
    pub order_delay_ms: u64,

    #[serde(default)]
    pub market_condition: MarketCondition,
    pub preferred_token: Option<String>,
    /// Balance used for the circuit breaker before the first portfolio fetch
    pub reference_balance_usd: Option<Decimal>,

    #[serde(default)]
    pub start_enabled: bool,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
    #[serde(default = "default_max_allocation_percent")]
    pub max_allocation_percent: Decimal,
    #[serde(default = "default_max_daily_loss_percent")]
    pub max_daily_loss_percent: Decimal,
    #[serde(default = "default_check_interval_minutes")]
    pub check_interval_minutes: u32,
    #[serde(default)]
    pub auto_execute: bool,

    #[serde(default = "default_auto_execute_min")]
    pub auto_execute_min_confidence: f64,
    #[serde(default = "default_manual_execute_min")]
    pub manual_execute_min_confidence: f64,
    #[serde(default = "default_plan_acceptance_min")]
    pub plan_acceptance_min_confidence: f64,

    pub state_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl std::fmt::Debug for AppConfig {
    // Credentials never reach logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("wallet_address", &self.wallet_address)
            .field("advisory_api_key", &self.advisory_api_key.as_ref().map(|_| "<set>"))
            .field("advisory_base_url", &self.advisory_base_url)
            .field("generator_model", &self.generator_model)
            .field("reviewer_model", &self.reviewer_model)
            .field("portfolio_api_key", &self.portfolio_api_key.as_ref().map(|_| "<set>"))
            .field("portfolio_base_url", &self.portfolio_base_url)
            .field("signer_mode", &self.signer_mode)
            .field("signer_url", &self.signer_url)
            .field("expected_chain_id", &self.expected_chain_id)
            .field("market_condition", &self.market_condition)
            .field("check_interval_minutes", &self.check_interval_minutes)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Load from the environment (and an optional `.env`), then validate
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config: AppConfig = config::Config::builder()
            .add_source(config::Environment::with_prefix("GRID").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Every missing credential is reported at once
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if !is_valid_wallet_address(&self.wallet_address) {
            problems.push(format!("GRID_WALLET_ADDRESS is not a valid address: {}", self.wallet_address));
        }
        if self.advisory_api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            problems.push("GRID_ADVISORY_API_KEY is required".to_string());
        }
        if self.portfolio_api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            problems.push("GRID_PORTFOLIO_API_KEY is required".to_string());
        }
        if self.signer_mode == SignerMode::Bridge && self.signer_url.is_none() {
            problems.push("GRID_SIGNER_URL is required when GRID_SIGNER_MODE=bridge".to_string());
        }

        if !problems.is_empty() {
            return Err(EngineError::Configuration(problems.join("; ")));
        }

        self.engine_settings()
            .validate()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        self.confidence_gates().validate()
    }

    /// Initial engine settings; the engine always starts disabled
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            enabled: false,
            risk_tolerance: self.risk_tolerance,
            max_allocation_percent: self.max_allocation_percent,
            max_daily_loss_percent: self.max_daily_loss_percent,
            check_interval_minutes: self.check_interval_minutes,
            auto_execute: self.auto_execute,
        }
    }

    pub fn confidence_gates(&self) -> ConfidenceGates {
        ConfidenceGates {
            auto_execute_min: self.auto_execute_min_confidence,
            manual_execute_min: self.manual_execute_min_confidence,
            plan_acceptance_min: self.plan_acceptance_min_confidence,
        }
    }

    pub fn order_delay(&self) -> Duration {
        Duration::from_millis(self.order_delay_ms)
    }

    /// State directory, defaulting to ~/.grid-engine
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".grid-engine")
        })
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn default_advisory_base_url() -> String { "https://api.anthropic.com".to_string() }
fn default_model() -> String { "claude-3-haiku-20240307".to_string() }
fn default_portfolio_base_url() -> String { "https://api.octav.fi".to_string() }
fn default_expected_chain_id() -> u64 { ARBITRUM_ONE_CHAIN_ID }
fn default_order_delay_ms() -> u64 { 1000 }
fn default_max_allocation_percent() -> Decimal { Decimal::from(10) }
fn default_max_daily_loss_percent() -> Decimal { Decimal::from(5) }
fn default_check_interval_minutes() -> u32 { 15 }
fn default_auto_execute_min() -> f64 { 70.0 }
fn default_manual_execute_min() -> f64 { 0.0 }
fn default_plan_acceptance_min() -> f64 { 60.0 }
fn default_log_level() -> String { "info".to_string() }

#[cfg(test)]
mod tests {
    use super::*;

    fn app_config() -> AppConfig {
        serde_json::from_value(serde_json::json!({
            "wallet_address": "0x1111111111111111111111111111111111111111",
            "advisory_api_key": "sk-test",
            "portfolio_api_key": "octav-test",
        }))
        .unwrap()
    }

    #[test]
    fn test_settings_defaults_are_valid() {
        let settings = EngineSettings::default();
        assert!(!settings.enabled);
        assert!(!settings.auto_execute);
        assert_eq!(settings.check_interval(), Duration::from_secs(15 * 60));
        settings.validate().unwrap();
    }

    #[test]
    fn test_settings_bounds() {
        let mut settings = EngineSettings::default();
        settings.max_allocation_percent = Decimal::from(51);
        assert!(settings.validate().is_err());

        let mut settings = EngineSettings::default();
        settings.max_daily_loss_percent = Decimal::ZERO;
        assert!(settings.validate().is_err());

        let mut settings = EngineSettings::default();
        settings.check_interval_minutes = 10;
        assert!(settings.validate().is_err());

        for minutes in ALLOWED_CHECK_INTERVALS {
            let settings = EngineSettings {
                check_interval_minutes: minutes,
                ..EngineSettings::default()
            };
            settings.validate().unwrap();
        }
    }

    #[test]
    fn test_update_keeps_enabled_flag() {
        let current = EngineSettings {
            enabled: true,
            ..EngineSettings::default()
        };
        let update = SettingsUpdate {
            auto_execute: Some(true),
            check_interval_minutes: Some(60),
            ..SettingsUpdate::default()
        };
        let next = update.apply(&current);
        assert!(next.enabled);
        assert!(next.auto_execute);
        assert_eq!(next.check_interval_minutes, 60);
        assert_eq!(next.max_allocation_percent, current.max_allocation_percent);
    }

    #[test]
    fn test_app_config_defaults() {
        let config = app_config();
        config.validate().unwrap();
        assert_eq!(config.expected_chain_id, 42161);
        assert_eq!(config.order_delay(), Duration::from_millis(1000));
        assert_eq!(config.signer_mode, SignerMode::Paper);

        let gates = config.confidence_gates();
        assert_eq!(gates.auto_execute_min, 70.0);
        assert_eq!(gates.manual_execute_min, 0.0);
        assert_eq!(gates.plan_acceptance_min, 60.0);
        assert!(!config.engine_settings().enabled);
    }

    #[test]
    fn test_missing_credentials_reported_together() {
        let mut config = app_config();
        config.advisory_api_key = None;
        config.portfolio_api_key = Some("  ".to_string());
        config.signer_mode = SignerMode::Bridge;

        match config.validate() {
            Err(EngineError::Configuration(msg)) => {
                assert!(msg.contains("GRID_ADVISORY_API_KEY"));
                assert!(msg.contains("GRID_PORTFOLIO_API_KEY"));
                assert!(msg.contains("GRID_SIGNER_URL"));
            }
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_redacts_keys() {
        let rendered = format!("{:?}", app_config());
        assert!(!rendered.contains("sk-test"));
        assert!(rendered.contains("<set>"));
    }
}
