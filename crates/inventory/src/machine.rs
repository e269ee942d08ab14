use serde::{Deserialize, Serialize};

use vendstock_core::{Entity, MachineId, ValueObject};

/// Stock level every machine starts with unless configured otherwise.
pub const DEFAULT_INITIAL_STOCK: i64 = 10;

/// A vending machine and its current stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    id: MachineId,
    stock_level: i64,
}

impl Machine {
    pub fn new(id: MachineId) -> Self {
        Self::with_stock(id, DEFAULT_INITIAL_STOCK)
    }

    pub fn with_stock(id: MachineId, stock_level: i64) -> Self {
        Self { id, stock_level }
    }

    pub fn stock_level(&self) -> i64 {
        self.stock_level
    }

    pub(crate) fn set_stock_level(&mut self, level: i64) {
        self.stock_level = level;
    }
}

impl Entity for Machine {
    type Id = MachineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Before/after levels of one stock update.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub old_level: i64,
    pub new_level: i64,
}

impl ValueObject for StockChange {}

impl StockChange {
    /// Moved from at-or-above the threshold to below it.
    pub fn crossed_below(&self, threshold: LowStockThreshold) -> bool {
        self.old_level >= threshold.get() && self.new_level < threshold.get()
    }

    /// Moved from below the threshold to at-or-above it.
    pub fn crossed_above(&self, threshold: LowStockThreshold) -> bool {
        self.old_level < threshold.get() && self.new_level >= threshold.get()
    }
}

/// Level under which a machine counts as low on stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LowStockThreshold(i64);

impl ValueObject for LowStockThreshold {}

impl LowStockThreshold {
    pub const DEFAULT: Self = Self(3);

    pub fn new(units: i64) -> Self {
        Self(units)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl Default for LowStockThreshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(old_level: i64, new_level: i64) -> StockChange {
        StockChange { old_level, new_level }
    }

    #[test]
    fn crossing_is_about_the_boundary_not_the_level() {
        let t = LowStockThreshold::DEFAULT;

        assert!(!change(4, 3).crossed_below(t));
        assert!(change(3, 2).crossed_below(t));
        assert!(!change(2, 1).crossed_below(t));
        assert!(change(10, 1).crossed_below(t));

        assert!(change(2, 5).crossed_above(t));
        assert!(change(2, 3).crossed_above(t));
        assert!(!change(5, 4).crossed_above(t));
        assert!(!change(5, 4).crossed_below(t));
    }

    #[test]
    fn new_machine_starts_at_default_stock() {
        let machine = Machine::new(MachineId::new("001").unwrap());
        assert_eq!(machine.stock_level(), DEFAULT_INITIAL_STOCK);
        assert_eq!(machine.id().as_str(), "001");
    }

    #[test]
    fn identity_survives_stock_changes() {
        let before = Machine::new(MachineId::new("001").unwrap());
        let mut after = before.clone();
        after.set_stock_level(1);

        assert_ne!(before, after);
        assert!(before.same_identity(&after));
        assert!(!before.same_identity(&Machine::new(MachineId::new("002").unwrap())));
    }
}
