//! Runtime configuration, read from `invest_sim.toml` and `INVEST_SIM__*`
//! environment variables.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::irr::SearchRange;
use crate::portfolio::FeeSchedule;
use crate::scenario::{NamedStrategy, Scenario, StrategySet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default)]
    pub wkn: Option<String>,
    #[serde(default)]
    pub isin: Option<String>,
    /// Defaults to the first full month of available data.
    #[serde(default)]
    pub start: Option<NaiveDate>,
    /// Defaults to today.
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    #[serde(default = "default_monthly_income")]
    pub monthly_income: f64,
    #[serde(default)]
    pub initial_cash: f64,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default)]
    pub irr_range: SearchRange,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_request_interval")]
    pub request_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Compared when `strategies` is empty.
    #[serde(default)]
    pub preset: StrategySet,
    #[serde(default)]
    pub strategies: Vec<NamedStrategy>,
}

fn default_symbol() -> String {
    "SPY".to_string()
}

fn default_monthly_income() -> f64 {
    1000.0
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".price_cache.json")
}

fn default_request_interval() -> u64 {
    13
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            wkn: None,
            isin: None,
            start: None,
            as_of: None,
            monthly_income: default_monthly_income(),
            initial_cash: 0.0,
            fees: FeeSchedule::default(),
            irr_range: SearchRange::default(),
            cache_path: default_cache_path(),
            request_interval_secs: default_request_interval(),
            request_timeout_secs: default_request_timeout(),
            preset: StrategySet::default(),
            strategies: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads `.env`, then the optional config file, then the environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_sources(config::File::with_name("invest_sim").required(false))
    }

    pub fn from_sources<S>(file: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("INVEST_SIM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_secs(self.request_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Explicitly listed strategies, or the preset set.
    pub fn strategy_list(&self) -> Vec<NamedStrategy> {
        if self.strategies.is_empty() {
            self.preset.strategies()
        } else {
            self.strategies.clone()
        }
    }

    pub fn scenario(&self, start: NaiveDate, as_of: NaiveDate) -> Scenario {
        Scenario {
            symbol: self.symbol.clone(),
            wkn: self.wkn.clone(),
            isin: self.isin.clone(),
            start,
            as_of,
            monthly_income: self.monthly_income,
            initial_cash: self.initial_cash,
            fees: self.fees,
            irr_range: self.irr_range,
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invest_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
