use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vendstock_core::{DomainError, DomainResult, MachineId};
use vendstock_events::Event;

/// Routing key for [`StockEvent`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockEventKind {
    Sale,
    Refill,
    LowStock,
    StockOk,
}

/// Event: MachineSold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSold {
    pub machine_id: MachineId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MachineRefilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRefilled {
    pub machine_id: MachineId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LowStockWarning (stock crossed below the threshold).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockWarning {
    pub machine_id: MachineId,
    /// Level right after the crossing.
    pub level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockLevelOk (stock crossed back to or above the threshold).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevelOk {
    pub machine_id: MachineId,
    /// Level right after the crossing.
    pub level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    Sale(MachineSold),
    Refill(MachineRefilled),
    LowStock(LowStockWarning),
    StockOk(StockLevelOk),
}

impl StockEvent {
    /// A sale of `quantity` units (must be positive).
    pub fn sale(machine_id: MachineId, quantity: u32) -> DomainResult<Self> {
        ensure_positive(quantity)?;
        Ok(StockEvent::Sale(MachineSold {
            machine_id,
            quantity,
            occurred_at: Utc::now(),
        }))
    }

    /// A refill of `quantity` units (must be positive).
    pub fn refill(machine_id: MachineId, quantity: u32) -> DomainResult<Self> {
        ensure_positive(quantity)?;
        Ok(StockEvent::Refill(MachineRefilled {
            machine_id,
            quantity,
            occurred_at: Utc::now(),
        }))
    }

    pub fn low_stock(machine_id: MachineId, level: i64) -> Self {
        StockEvent::LowStock(LowStockWarning {
            machine_id,
            level,
            occurred_at: Utc::now(),
        })
    }

    pub fn stock_ok(machine_id: MachineId, level: i64) -> Self {
        StockEvent::StockOk(StockLevelOk {
            machine_id,
            level,
            occurred_at: Utc::now(),
        })
    }

    pub fn machine_id(&self) -> &MachineId {
        match self {
            StockEvent::Sale(e) => &e.machine_id,
            StockEvent::Refill(e) => &e.machine_id,
            StockEvent::LowStock(e) => &e.machine_id,
            StockEvent::StockOk(e) => &e.machine_id,
        }
    }
}

fn ensure_positive(quantity: u32) -> DomainResult<()> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

impl Event for StockEvent {
    type Kind = StockEventKind;

    fn kind(&self) -> StockEventKind {
        match self {
            StockEvent::Sale(_) => StockEventKind::Sale,
            StockEvent::Refill(_) => StockEventKind::Refill,
            StockEvent::LowStock(_) => StockEventKind::LowStock,
            StockEvent::StockOk(_) => StockEventKind::StockOk,
        }
    }

    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::Sale(_) => "vending.machine.sale",
            StockEvent::Refill(_) => "vending.machine.refill",
            StockEvent::LowStock(_) => "vending.machine.low_stock",
            StockEvent::StockOk(_) => "vending.machine.stock_ok",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::Sale(e) => e.occurred_at,
            StockEvent::Refill(e) => e.occurred_at,
            StockEvent::LowStock(e) => e.occurred_at,
            StockEvent::StockOk(e) => e.occurred_at,
        }
    }
}
