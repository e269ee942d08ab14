use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use vendstock_core::{DomainError, DomainResult, Entity, MachineId};

use crate::machine::{Machine, StockChange};

/// How the store treats an update that would leave a machine below zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPolicy {
    /// Apply the delta as-is; levels may go negative.
    #[default]
    Unchecked,
    /// Floor the new level at zero.
    Clamp,
    /// Refuse the update and leave the level untouched.
    Reject,
}

impl core::str::FromStr for StockPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unchecked" => Ok(Self::Unchecked),
            "clamp" => Ok(Self::Clamp),
            "reject" => Ok(Self::Reject),
            other => Err(DomainError::validation(format!("unknown stock policy '{other}'"))),
        }
    }
}

/// Stock levels keyed by machine.
///
/// The store is a pure data component: it never publishes events. Detecting
/// threshold crossings is up to the caller, using the returned [`StockChange`].
pub trait MachineRepository: Send + Sync {
    fn find_machine(&self, id: &MachineId) -> Option<Machine>;

    /// Apply `delta` to a machine's level.
    ///
    /// - `Ok(None)`: unknown machine (not a fault; callers no-op)
    /// - `Ok(Some(change))`: old and new level, read and written under one lock
    /// - `Err(_)`: the configured [`StockPolicy`] refused the update
    fn update_stock(&self, id: &MachineId, delta: i64) -> DomainResult<Option<StockChange>>;

    /// All machines, ordered by id.
    fn list_machines(&self) -> Vec<Machine>;
}

impl<R> MachineRepository for Arc<R>
where
    R: MachineRepository + ?Sized,
{
    fn find_machine(&self, id: &MachineId) -> Option<Machine> {
        (**self).find_machine(id)
    }

    fn update_stock(&self, id: &MachineId, delta: i64) -> DomainResult<Option<StockChange>> {
        (**self).update_stock(id, delta)
    }

    fn list_machines(&self) -> Vec<Machine> {
        (**self).list_machines()
    }
}

/// In-memory machine store.
#[derive(Debug, Default)]
pub struct InMemoryMachineRepository {
    machines: RwLock<HashMap<MachineId, Machine>>,
    policy: StockPolicy,
}

impl InMemoryMachineRepository {
    pub fn new(policy: StockPolicy) -> Self {
        Self {
            machines: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Build a store from a roster. Later duplicates replace earlier ones.
    pub fn with_machines(policy: StockPolicy, machines: impl IntoIterator<Item = Machine>) -> Self {
        let repo = Self::new(policy);
        for machine in machines {
            repo.register(machine);
        }
        repo
    }

    /// Add (or replace) a machine.
    pub fn register(&self, machine: Machine) {
        self.machines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(machine.id().clone(), machine);
    }

    pub fn policy(&self) -> StockPolicy {
        self.policy
    }

    fn next_level(&self, id: &MachineId, old_level: i64, delta: i64) -> DomainResult<i64> {
        let raw = old_level.saturating_add(delta);
        match self.policy {
            StockPolicy::Unchecked => Ok(raw),
            StockPolicy::Clamp => Ok(raw.max(0)),
            StockPolicy::Reject if raw < 0 => Err(DomainError::invariant(format!(
                "stock for machine {id} cannot go negative ({old_level} {delta:+})"
            ))),
            StockPolicy::Reject => Ok(raw),
        }
    }
}

impl MachineRepository for InMemoryMachineRepository {
    fn find_machine(&self, id: &MachineId) -> Option<Machine> {
        self.machines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn update_stock(&self, id: &MachineId, delta: i64) -> DomainResult<Option<StockChange>> {
        let mut machines = self.machines.write().unwrap_or_else(PoisonError::into_inner);

        let Some(machine) = machines.get_mut(id) else {
            return Ok(None);
        };

        let old_level = machine.stock_level();
        let new_level = self.next_level(id, old_level, delta)?;
        machine.set_stock_level(new_level);

        Ok(Some(StockChange { old_level, new_level }))
    }

    fn list_machines(&self) -> Vec<Machine> {
        let mut all: Vec<Machine> = self
            .machines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(raw: &str) -> MachineId {
        MachineId::new(raw).unwrap()
    }

    fn repo(policy: StockPolicy) -> InMemoryMachineRepository {
        InMemoryMachineRepository::with_machines(
            policy,
            [Machine::new(id("001")), Machine::with_stock(id("002"), 1)],
        )
    }

    #[test]
    fn update_returns_old_and_new_levels() {
        let repo = repo(StockPolicy::Unchecked);

        let change = repo.update_stock(&id("001"), -2).unwrap().unwrap();
        assert_eq!(change, StockChange { old_level: 10, new_level: 8 });

        let change = repo.update_stock(&id("001"), 5).unwrap().unwrap();
        assert_eq!(change, StockChange { old_level: 8, new_level: 13 });
        assert_eq!(repo.find_machine(&id("001")).unwrap().stock_level(), 13);
    }

    #[test]
    fn unknown_machine_is_absent_not_an_error() {
        let repo = repo(StockPolicy::Reject);
        assert_eq!(repo.update_stock(&id("nonexistent"), -1), Ok(None));
        assert!(repo.find_machine(&id("nonexistent")).is_none());
    }

    #[test]
    fn unchecked_policy_allows_negative_levels() {
        let repo = repo(StockPolicy::Unchecked);
        let change = repo.update_stock(&id("002"), -3).unwrap().unwrap();
        assert_eq!(change.new_level, -2);
    }

    #[test]
    fn clamp_policy_floors_at_zero() {
        let repo = repo(StockPolicy::Clamp);
        let change = repo.update_stock(&id("002"), -3).unwrap().unwrap();
        assert_eq!(change, StockChange { old_level: 1, new_level: 0 });
    }

    #[test]
    fn reject_policy_leaves_level_untouched() {
        let repo = repo(StockPolicy::Reject);
        let err = repo.update_stock(&id("002"), -3).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(repo.find_machine(&id("002")).unwrap().stock_level(), 1);

        // Exactly zero is fine.
        let change = repo.update_stock(&id("002"), -1).unwrap().unwrap();
        assert_eq!(change.new_level, 0);
    }

    #[test]
    fn list_is_sorted_by_id() {
        let repo = InMemoryMachineRepository::with_machines(
            StockPolicy::default(),
            [Machine::new(id("003")), Machine::new(id("001")), Machine::new(id("002"))],
        );
        let ids: Vec<String> = repo.list_machines().iter().map(|m| m.id().to_string()).collect();
        assert_eq!(ids, vec!["001", "002", "003"]);
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Clamp".parse::<StockPolicy>().unwrap(), StockPolicy::Clamp);
        assert_eq!(" reject ".parse::<StockPolicy>().unwrap(), StockPolicy::Reject);
        assert!("lenient".parse::<StockPolicy>().is_err());
    }

    proptest! {
        /// Property: whatever the deltas, a clamping store never reports a negative level
        /// and every change starts where the previous one ended.
        #[test]
        fn clamp_keeps_levels_non_negative(deltas in prop::collection::vec(-6i64..6, 1..40)) {
            let repo = repo(StockPolicy::Clamp);
            let mut last = 10;
            for delta in deltas {
                let change = repo.update_stock(&id("001"), delta).unwrap().unwrap();
                prop_assert_eq!(change.old_level, last);
                prop_assert!(change.new_level >= 0);
                last = change.new_level;
            }
        }

        /// Property: an unchecked store is plain addition.
        #[test]
        fn unchecked_is_sum_of_deltas(deltas in prop::collection::vec(-6i64..6, 1..40)) {
            let repo = repo(StockPolicy::Unchecked);
            let total: i64 = deltas.iter().sum();
            for delta in &deltas {
                repo.update_stock(&id("001"), *delta).unwrap();
            }
            prop_assert_eq!(repo.find_machine(&id("001")).unwrap().stock_level(), 10 + total);
        }
    }
}
