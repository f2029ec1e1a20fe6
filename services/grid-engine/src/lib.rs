//! Grid Engine Library
//!
//! Autonomous grid strategy lifecycle: a periodic cycle fetches the
//! portfolio, asks one advisory service for a grid strategy and a second
//! one to review it, passes the result through deterministic risk guards
//! and submits approved orders through an exchange signer.

pub mod advisor;
pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod executor;
pub mod generator;
pub mod guard;
pub mod plan;
pub mod portfolio;
pub mod reviewer;
pub mod runner;
pub mod state;
pub mod stats;
pub mod translator;
pub mod types;


// Re-export main types for convenience
pub use config::{AppConfig, ConfidenceGates, EngineSettings, RiskTolerance, SettingsUpdate, SignerMode};
pub use engine::{
    ActiveStrategy, CycleOutcome, EngineController, EngineOptions, EngineServices, EngineSnapshot,
    SkipReason,
};
pub use error::{EngineError, Result};
pub use exchange::{OrderSigner, PaperSigner, SignerBridgeClient, ARBITRUM_ONE_CHAIN_ID};
pub use executor::{ExecutionReport, ExecutionSubmitter};
pub use generator::{AdvisoryGenerator, GenerationRequest, StrategyGenerator};
pub use guard::{ExecutionPath, GuardRejection};
pub use plan::ExecutionPlan;
pub use portfolio::{OctavPortfolioClient, PortfolioSource};
pub use reviewer::{AdvisoryReviewer, ReviewRequest, StrategyReviewer};
pub use runner::{EngineCommand, EngineHandle, EngineRunner};
pub use state::StateManager;
pub use stats::{ActivityLog, LogEntry, LogSeverity, TradingStats};
pub use types::{
    EngineStatus, ExecutionOutcome, GridOrder, MarketCondition, OrderParams, OrderSide,
    PortfolioSnapshot, PortfolioToken, ReviewResult, RiskLevel, StrategyDraft,
};
