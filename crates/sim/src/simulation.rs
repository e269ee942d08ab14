//! Simulation runner: wires store, dispatcher and handlers, then replays a
//! random event mix followed by the threshold check.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use vendstock_core::{DomainError, Entity, MachineId};
use vendstock_events::{DispatchError, DispatchStats, Dispatcher, DispatcherConfig, EventEnvelope, Subscription};
use vendstock_inventory::{
    InMemoryMachineRepository, Machine, MachineRepository, StockEvent, StockEventKind, wire_default_handlers,
};

use crate::config::{ConfigError, SimulationConfig};
use crate::generator::EventGenerator;

/// Units the check refills after draining the check machine.
const CHECK_REFILL: u32 = 5;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Deliveries observed per event kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeliveryCounts {
    pub sale: usize,
    pub refill: usize,
    pub low_stock: usize,
    pub stock_ok: usize,
}

impl DeliveryCounts {
    fn add(&mut self, kind: StockEventKind, n: usize) {
        match kind {
            StockEventKind::Sale => self.sale += n,
            StockEventKind::Refill => self.refill += n,
            StockEventKind::LowStock => self.low_stock += n,
            StockEventKind::StockOk => self.stock_ok += n,
        }
    }

    fn merge(&mut self, other: DeliveryCounts) {
        self.sale += other.sale;
        self.refill += other.refill;
        self.low_stock += other.low_stock;
        self.stock_ok += other.stock_ok;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineReport {
    pub machine_id: MachineId,
    pub stock_level: i64,
}

/// What happened while driving the check machine across the threshold and back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdCheck {
    pub machine_id: MachineId,
    pub sale_quantity: u32,
    pub refill_quantity: u32,
    /// Low-stock deliveries caused by the check sale.
    pub low_stock_events: usize,
    /// Stock-ok deliveries caused by the check refill.
    pub stock_ok_events: usize,
    pub final_level: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub machines: Vec<MachineReport>,
    pub deliveries: DeliveryCounts,
    pub threshold_check: Option<ThresholdCheck>,
    pub stats: DispatchStats,
}

/// One simulation run.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    repository: Arc<InMemoryMachineRepository>,
    dispatcher: Dispatcher<StockEvent>,
    generator: EventGenerator,
    taps: Vec<(StockEventKind, Subscription<EventEnvelope<StockEvent>>)>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;

        let roster = config
            .machines
            .iter()
            .chain(config.check_machine.iter())
            .map(|id| Machine::with_stock(id.clone(), config.initial_stock));
        let repository = Arc::new(InMemoryMachineRepository::with_machines(config.stock_policy, roster));

        let dispatcher = Dispatcher::with_config(DispatcherConfig {
            fault_policy: config.fault_policy,
        });
        wire_default_handlers(&dispatcher, repository.clone(), config.low_stock_threshold);

        // Taps go in after the handlers so they observe completed deliveries.
        let taps = [
            StockEventKind::Sale,
            StockEventKind::Refill,
            StockEventKind::LowStock,
            StockEventKind::StockOk,
        ]
        .into_iter()
        .map(|kind| (kind, dispatcher.tap(kind)))
        .collect();

        let generator = EventGenerator::new(config.machines.clone(), config.sale_ratio, config.seed)?;

        Ok(Self {
            config,
            repository,
            dispatcher,
            generator,
            taps,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher<StockEvent> {
        &self.dispatcher
    }

    pub fn repository(&self) -> &Arc<InMemoryMachineRepository> {
        &self.repository
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Publish the random events, then run the threshold check (if configured).
    pub fn run(&mut self) -> Result<SimulationReport, SimulationError> {
        tracing::info!(
            machines = self.config.machines.len(),
            events = self.config.event_count,
            seed = ?self.config.seed,
            "--Start Simulation--"
        );

        let mut deliveries = self.run_random_events()?;

        let threshold_check = match self.config.check_machine.clone() {
            Some(machine_id) => {
                tracing::info!(machine_id = %machine_id, "--Test Low stock and Stock OK event--");
                let (outcome, counts) = self.run_threshold_check(machine_id)?;
                deliveries.merge(counts);
                Some(outcome)
            }
            None => None,
        };

        Ok(SimulationReport {
            machines: self
                .repository
                .list_machines()
                .into_iter()
                .map(|m| MachineReport {
                    machine_id: m.id().clone(),
                    stock_level: m.stock_level(),
                })
                .collect(),
            deliveries,
            threshold_check,
            stats: self.dispatcher.stats(),
        })
    }

    fn run_random_events(&mut self) -> Result<DeliveryCounts, SimulationError> {
        for event in self.generator.by_ref().take(self.config.event_count) {
            self.dispatcher.publish(event)?;
        }
        Ok(self.pending_deliveries())
    }

    /// Sell the check machine down to one unit, then refill it.
    ///
    /// Starting from a level at or above the threshold this crosses it in both
    /// directions, so exactly one low-stock and one stock-ok event are expected.
    fn run_threshold_check(&self, machine_id: MachineId) -> Result<(ThresholdCheck, DeliveryCounts), SimulationError> {
        let level = self
            .repository
            .find_machine(&machine_id)
            .map(|m| m.stock_level())
            .ok_or_else(DomainError::not_found)?;
        let sale_quantity = u32::try_from(level.saturating_sub(1)).unwrap_or(0).max(1);

        self.dispatcher
            .publish(StockEvent::sale(machine_id.clone(), sale_quantity)?)?;
        let after_sale = self.pending_deliveries();

        self.dispatcher
            .publish(StockEvent::refill(machine_id.clone(), CHECK_REFILL)?)?;
        let after_refill = self.pending_deliveries();

        let final_level = self
            .repository
            .find_machine(&machine_id)
            .map_or(level, |m| m.stock_level());

        tracing::info!(
            machine_id = %machine_id,
            low_stock_events = after_sale.low_stock,
            stock_ok_events = after_refill.stock_ok,
            final_level,
            "threshold check finished"
        );

        let outcome = ThresholdCheck {
            machine_id,
            sale_quantity,
            refill_quantity: CHECK_REFILL,
            low_stock_events: after_sale.low_stock,
            stock_ok_events: after_refill.stock_ok,
            final_level,
        };

        let mut counts = after_sale;
        counts.merge(after_refill);
        Ok((outcome, counts))
    }

    /// Drain every tap, counting what was delivered since the last call.
    fn pending_deliveries(&self) -> DeliveryCounts {
        let mut counts = DeliveryCounts::default();
        for (kind, tap) in &self.taps {
            counts.add(*kind, tap.drain().len());
        }
        counts
    }
}
