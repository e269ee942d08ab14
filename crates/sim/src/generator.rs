//! Random stock event source for the simulation.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use vendstock_core::{DomainError, DomainResult, MachineId};
use vendstock_inventory::StockEvent;

/// Units a generated sale removes.
pub const SALE_QUANTITIES: [u32; 2] = [1, 2];

/// Units a generated refill adds.
pub const REFILL_QUANTITIES: [u32; 2] = [3, 5];

/// Endless stream of random sales and refills over a fixed roster.
///
/// With a seed the stream is reproducible; without one it draws from OS entropy.
#[derive(Debug)]
pub struct EventGenerator {
    rng: StdRng,
    machines: Vec<MachineId>,
    sale_ratio: f64,
}

impl EventGenerator {
    pub fn new(machines: Vec<MachineId>, sale_ratio: f64, seed: Option<u64>) -> DomainResult<Self> {
        if machines.is_empty() {
            return Err(DomainError::validation("event generator needs at least one machine"));
        }
        if !(0.0..=1.0).contains(&sale_ratio) {
            return Err(DomainError::validation("sale ratio must be between 0 and 1"));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            rng,
            machines,
            sale_ratio,
        })
    }

    pub fn machines(&self) -> &[MachineId] {
        &self.machines
    }
}

impl Iterator for EventGenerator {
    type Item = StockEvent;

    fn next(&mut self) -> Option<StockEvent> {
        let machine_id = self.machines.choose(&mut self.rng)?.clone();

        if self.rng.gen_bool(self.sale_ratio) {
            let quantity = *SALE_QUANTITIES.choose(&mut self.rng)?;
            StockEvent::sale(machine_id, quantity).ok()
        } else {
            let quantity = *REFILL_QUANTITIES.choose(&mut self.rng)?;
            StockEvent::refill(machine_id, quantity).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vendstock_events::Event;
    use vendstock_inventory::StockEventKind;

    fn roster() -> Vec<MachineId> {
        ["001", "002", "003"]
            .into_iter()
            .map(|id| MachineId::new(id).unwrap())
            .collect()
    }

    /// Comparable view of a generated event (timestamps differ between runs).
    fn shape(event: &StockEvent) -> (StockEventKind, String, u32) {
        match event {
            StockEvent::Sale(e) => (StockEventKind::Sale, e.machine_id.to_string(), e.quantity),
            StockEvent::Refill(e) => (StockEventKind::Refill, e.machine_id.to_string(), e.quantity),
            other => panic!("generator produced {other:?}"),
        }
    }

    #[test]
    fn same_seed_same_stream() {
        let a: Vec<_> = EventGenerator::new(roster(), 0.5, Some(7))
            .unwrap()
            .take(50)
            .map(|e| shape(&e))
            .collect();
        let b: Vec<_> = EventGenerator::new(roster(), 0.5, Some(7))
            .unwrap()
            .take(50)
            .map(|e| shape(&e))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn quantities_and_machines_come_from_fixed_sets() {
        let generator = EventGenerator::new(roster(), 0.5, Some(1)).unwrap();
        for event in generator.take(200) {
            let (kind, machine, quantity) = shape(&event);
            assert!(roster().iter().any(|m| m.as_str() == machine));
            match kind {
                StockEventKind::Sale => assert!(SALE_QUANTITIES.contains(&quantity)),
                StockEventKind::Refill => assert!(REFILL_QUANTITIES.contains(&quantity)),
                other => panic!("unexpected kind {other:?}"),
            }
        }
    }

    #[test]
    fn ratio_extremes_pick_one_kind() {
        let sales = EventGenerator::new(roster(), 1.0, Some(3)).unwrap();
        assert!(sales.take(20).all(|e| e.kind() == StockEventKind::Sale));

        let refills = EventGenerator::new(roster(), 0.0, Some(3)).unwrap();
        assert!(refills.take(20).all(|e| e.kind() == StockEventKind::Refill));
    }

    #[test]
    fn empty_roster_is_rejected() {
        assert!(EventGenerator::new(Vec::new(), 0.5, None).is_err());
        assert!(EventGenerator::new(roster(), -0.1, None).is_err());
    }
}
