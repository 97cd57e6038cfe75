//! Error types for the simulation engine and its price collaborator.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid goal ratios or a stock/ratio mismatch. The portfolio is never built.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No observation for a symbol on a date.
    #[error("No price for {symbol} on {date}")]
    DataUnavailable { symbol: String, date: NaiveDate },

    /// A rebalance could not change the share count of a holding.
    #[error("Not enough money to buy a complete share of {symbol} on {date}")]
    InsufficientFunds { symbol: String, date: NaiveDate },

    #[error("Start {start} lies after the evaluation date {as_of}")]
    StartInFuture { start: NaiveDate, as_of: NaiveDate },

    #[error("Fetching {symbol} failed: {message}")]
    Fetch { symbol: String, message: String },

    #[error("Price cache error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("Price cache format error: {0}")]
    CacheFormat(#[from] serde_json::Error),

    #[error("Simulation dates of {name} do not agree with the other runs")]
    DateMismatch { name: String },

    #[error("Simulation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Report error: {0}")]
    Report(#[from] polars::prelude::PolarsError),
}

impl SimError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn data_unavailable(symbol: impl Into<String>, date: NaiveDate) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            date,
        }
    }

    /// Whether a strategy tick may swallow this error and retry on a later day.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. } | Self::InsufficientFunds { .. }
        )
    }
}
