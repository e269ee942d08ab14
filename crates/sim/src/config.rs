//! Simulation configuration loading and representation.
//!
//! Everything comes from `VENDSTOCK_*` environment variables; anything unset
//! falls back to the reference scenario (three machines at 10 units, ten
//! random events, then the `testlowevent` threshold check).

use core::fmt::Display;
use core::str::FromStr;

use thiserror::Error;

use vendstock_core::MachineId;
use vendstock_events::FaultPolicy;
use vendstock_inventory::{DEFAULT_INITIAL_STOCK, LowStockThreshold, StockPolicy};
use vendstock_observability::LogFormat;

pub const ENV_MACHINES: &str = "VENDSTOCK_MACHINES";
pub const ENV_INITIAL_STOCK: &str = "VENDSTOCK_INITIAL_STOCK";
pub const ENV_EVENT_COUNT: &str = "VENDSTOCK_EVENT_COUNT";
pub const ENV_SALE_RATIO: &str = "VENDSTOCK_SALE_RATIO";
pub const ENV_SEED: &str = "VENDSTOCK_SEED";
pub const ENV_LOW_STOCK_THRESHOLD: &str = "VENDSTOCK_LOW_STOCK_THRESHOLD";
pub const ENV_STOCK_POLICY: &str = "VENDSTOCK_STOCK_POLICY";
pub const ENV_FAULT_POLICY: &str = "VENDSTOCK_FAULT_POLICY";
pub const ENV_CHECK_MACHINE: &str = "VENDSTOCK_CHECK_MACHINE";
pub const ENV_LOG_FORMAT: &str = "VENDSTOCK_LOG_FORMAT";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("machine roster is empty")]
    EmptyRoster,
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl Display) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Machines the random generator picks from.
    pub machines: Vec<MachineId>,
    pub initial_stock: i64,
    /// Random events published before the check.
    pub event_count: usize,
    /// Probability that a generated event is a sale (otherwise a refill).
    pub sale_ratio: f64,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
    pub low_stock_threshold: LowStockThreshold,
    pub stock_policy: StockPolicy,
    pub fault_policy: FaultPolicy,
    /// Machine driven across the threshold and back after the random phase.
    pub check_machine: Option<MachineId>,
    pub log_format: LogFormat,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            machines: ["001", "002", "003"]
                .into_iter()
                .filter_map(|id| MachineId::new(id).ok())
                .collect(),
            initial_stock: DEFAULT_INITIAL_STOCK,
            event_count: 10,
            sale_ratio: 0.5,
            seed: None,
            low_stock_threshold: LowStockThreshold::DEFAULT,
            stock_policy: StockPolicy::default(),
            fault_policy: FaultPolicy::default(),
            check_machine: MachineId::new("testlowevent").ok(),
            log_format: LogFormat::default(),
        }
    }
}

impl SimulationConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable source (tests pass a map here).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let machines = match lookup(ENV_MACHINES) {
            Some(raw) => parse_roster(&raw)?,
            None => defaults.machines,
        };

        let check_machine = match lookup(ENV_CHECK_MACHINE) {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(
                MachineId::new(&raw).map_err(|e| ConfigError::invalid(ENV_CHECK_MACHINE, &raw, e))?,
            ),
            None => defaults.check_machine,
        };

        let config = Self {
            machines,
            initial_stock: parse(&lookup, ENV_INITIAL_STOCK)?.unwrap_or(defaults.initial_stock),
            event_count: parse(&lookup, ENV_EVENT_COUNT)?.unwrap_or(defaults.event_count),
            sale_ratio: parse(&lookup, ENV_SALE_RATIO)?.unwrap_or(defaults.sale_ratio),
            seed: parse(&lookup, ENV_SEED)?.or(defaults.seed),
            low_stock_threshold: parse::<i64>(&lookup, ENV_LOW_STOCK_THRESHOLD)?
                .map(LowStockThreshold::new)
                .unwrap_or(defaults.low_stock_threshold),
            stock_policy: parse(&lookup, ENV_STOCK_POLICY)?.unwrap_or(defaults.stock_policy),
            fault_policy: match lookup(ENV_FAULT_POLICY) {
                Some(raw) => parse_fault_policy(&raw)?,
                None => defaults.fault_policy,
            },
            check_machine,
            log_format: parse(&lookup, ENV_LOG_FORMAT)?.unwrap_or(defaults.log_format),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machines.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        if !(0.0..=1.0).contains(&self.sale_ratio) {
            return Err(ConfigError::invalid(
                ENV_SALE_RATIO,
                &self.sale_ratio.to_string(),
                "must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(var)
        .map(|raw| raw.trim().parse::<T>().map_err(|e| ConfigError::invalid(var, &raw, e)))
        .transpose()
}

fn parse_roster(raw: &str) -> Result<Vec<MachineId>, ConfigError> {
    let mut machines: Vec<MachineId> = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let id = MachineId::new(part).map_err(|e| ConfigError::invalid(ENV_MACHINES, raw, e))?;
        if !machines.contains(&id) {
            machines.push(id);
        }
    }
    if machines.is_empty() {
        return Err(ConfigError::EmptyRoster);
    }
    Ok(machines)
}

fn parse_fault_policy(raw: &str) -> Result<FaultPolicy, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "isolate" => Ok(FaultPolicy::Isolate),
        "abort" => Ok(FaultPolicy::Abort),
        _ => Err(ConfigError::invalid(ENV_FAULT_POLICY, raw, "expected 'isolate' or 'abort'")),
    }
}
