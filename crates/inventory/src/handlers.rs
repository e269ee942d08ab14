//! Stock handlers: apply sales/refills to the store and announce threshold crossings.
//!
//! Sale and refill handlers publish derived events only on a **crossing**
//! (see [`StockChange::crossed_below`] / [`StockChange::crossed_above`]), so a
//! machine that keeps selling while already low does not warn again.

use std::sync::Arc;

use vendstock_events::{Dispatcher, EventEnvelope, EventHandler, HandlerError};

use crate::event::{StockEvent, StockEventKind};
use crate::machine::LowStockThreshold;
use crate::store::MachineRepository;

/// Decrements stock on `Sale` and publishes `LowStock` when the level drops below the threshold.
#[derive(Debug)]
pub struct SaleHandler<R> {
    repository: R,
    threshold: LowStockThreshold,
}

impl<R: MachineRepository> SaleHandler<R> {
    pub fn new(repository: R, threshold: LowStockThreshold) -> Self {
        Self { repository, threshold }
    }
}

impl<R: MachineRepository> EventHandler<StockEvent> for SaleHandler<R> {
    fn handle(&self, envelope: &EventEnvelope<StockEvent>, dispatcher: &Dispatcher<StockEvent>) -> Result<(), HandlerError> {
        let StockEvent::Sale(sale) = envelope.payload() else {
            return Ok(());
        };

        let Some(change) = self
            .repository
            .update_stock(&sale.machine_id, -i64::from(sale.quantity))?
        else {
            return Ok(());
        };

        tracing::info!(
            machine_id = %sale.machine_id,
            quantity = sale.quantity,
            old_level = change.old_level,
            new_level = change.new_level,
            "[Sale] Machine {} sold {}. Stock: {} -> {}",
            sale.machine_id,
            sale.quantity,
            change.old_level,
            change.new_level
        );

        if change.crossed_below(self.threshold) {
            dispatcher.publish(StockEvent::low_stock(sale.machine_id.clone(), change.new_level))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "sale"
    }
}

/// Increments stock on `Refill` and publishes `StockOk` when the level climbs back to the threshold.
#[derive(Debug)]
pub struct RefillHandler<R> {
    repository: R,
    threshold: LowStockThreshold,
}

impl<R: MachineRepository> RefillHandler<R> {
    pub fn new(repository: R, threshold: LowStockThreshold) -> Self {
        Self { repository, threshold }
    }
}

impl<R: MachineRepository> EventHandler<StockEvent> for RefillHandler<R> {
    fn handle(&self, envelope: &EventEnvelope<StockEvent>, dispatcher: &Dispatcher<StockEvent>) -> Result<(), HandlerError> {
        let StockEvent::Refill(refill) = envelope.payload() else {
            return Ok(());
        };

        let Some(change) = self
            .repository
            .update_stock(&refill.machine_id, i64::from(refill.quantity))?
        else {
            return Ok(());
        };

        tracing::info!(
            machine_id = %refill.machine_id,
            quantity = refill.quantity,
            old_level = change.old_level,
            new_level = change.new_level,
            "[Refill] Machine {} refilled {}. Stock: {} -> {}",
            refill.machine_id,
            refill.quantity,
            change.old_level,
            change.new_level
        );

        if change.crossed_above(self.threshold) {
            dispatcher.publish(StockEvent::stock_ok(refill.machine_id.clone(), change.new_level))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "refill"
    }
}

#[derive(Debug, Default)]
pub struct LowStockHandler;

impl EventHandler<StockEvent> for LowStockHandler {
    fn handle(&self, envelope: &EventEnvelope<StockEvent>, _: &Dispatcher<StockEvent>) -> Result<(), HandlerError> {
        if let StockEvent::LowStock(warning) = envelope.payload() {
            tracing::warn!(
                machine_id = %warning.machine_id,
                level = warning.level,
                "Warning: Machine {} is low on stock!",
                warning.machine_id
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "low_stock"
    }
}

#[derive(Debug, Default)]
pub struct StockOkHandler;

impl EventHandler<StockEvent> for StockOkHandler {
    fn handle(&self, envelope: &EventEnvelope<StockEvent>, _: &Dispatcher<StockEvent>) -> Result<(), HandlerError> {
        if let StockEvent::StockOk(ok) = envelope.payload() {
            tracing::info!(
                machine_id = %ok.machine_id,
                level = ok.level,
                "Status OK: Machine {}'s stock is back to normal",
                ok.machine_id
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stock_ok"
    }
}

/// Subscribe the four stock handlers to their kinds.
pub fn wire_default_handlers<R>(dispatcher: &Dispatcher<StockEvent>, repository: Arc<R>, threshold: LowStockThreshold)
where
    R: MachineRepository + 'static,
{
    dispatcher.subscribe(
        StockEventKind::Sale,
        Arc::new(SaleHandler::new(repository.clone(), threshold)),
    );
    dispatcher.subscribe(
        StockEventKind::Refill,
        Arc::new(RefillHandler::new(repository, threshold)),
    );
    dispatcher.subscribe(StockEventKind::LowStock, Arc::new(LowStockHandler));
    dispatcher.subscribe(StockEventKind::StockOk, Arc::new(StockOkHandler));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Machine;
    use crate::store::{InMemoryMachineRepository, StockPolicy};
    use vendstock_core::{DomainError, MachineId};
    use vendstock_events::{DispatchError, DispatcherConfig, FaultPolicy, Subscription};

    fn id(raw: &str) -> MachineId {
        MachineId::new(raw).unwrap()
    }

    struct Harness {
        dispatcher: Dispatcher<StockEvent>,
        repository: Arc<InMemoryMachineRepository>,
        low: Subscription<EventEnvelope<StockEvent>>,
        ok: Subscription<EventEnvelope<StockEvent>>,
    }

    impl Harness {
        fn new(policy: StockPolicy, fault_policy: FaultPolicy, machines: Vec<Machine>) -> Self {
            let dispatcher: Dispatcher<StockEvent> = Dispatcher::with_config(DispatcherConfig { fault_policy });
            let repository = Arc::new(InMemoryMachineRepository::with_machines(policy, machines));
            wire_default_handlers(&dispatcher, repository.clone(), LowStockThreshold::DEFAULT);
            let low = dispatcher.tap(StockEventKind::LowStock);
            let ok = dispatcher.tap(StockEventKind::StockOk);
            Self {
                dispatcher,
                repository,
                low,
                ok,
            }
        }

        fn level(&self, raw: &str) -> i64 {
            self.repository.find_machine(&id(raw)).unwrap().stock_level()
        }

        fn sell(&self, raw: &str, quantity: u32) -> Result<(), DispatchError> {
            self.dispatcher.publish(StockEvent::sale(id(raw), quantity).unwrap())
        }

        fn refill(&self, raw: &str, quantity: u32) -> Result<(), DispatchError> {
            self.dispatcher.publish(StockEvent::refill(id(raw), quantity).unwrap())
        }
    }

    #[test]
    fn warnings_fire_on_crossings_only() {
        let h = Harness::new(
            StockPolicy::Unchecked,
            FaultPolicy::Isolate,
            vec![Machine::with_stock(id("001"), 4)],
        );

        h.sell("001", 1).unwrap(); // 4 -> 3
        assert_eq!(h.level("001"), 3);
        assert!(h.low.drain().is_empty());

        h.sell("001", 1).unwrap(); // 3 -> 2
        let low = h.low.drain();
        assert_eq!(low.len(), 1);
        match low[0].payload() {
            StockEvent::LowStock(w) => {
                assert_eq!(w.machine_id, id("001"));
                assert_eq!(w.level, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }

        h.sell("001", 1).unwrap(); // 2 -> 1, already low
        assert!(h.low.drain().is_empty());

        h.refill("001", 4).unwrap(); // 1 -> 5
        assert_eq!(h.ok.drain().len(), 1);

        h.sell("001", 1).unwrap(); // 5 -> 4
        assert!(h.low.drain().is_empty());
        assert!(h.ok.drain().is_empty());
        assert_eq!(h.level("001"), 4);
    }

    #[test]
    fn unknown_machine_is_a_silent_no_op() {
        let h = Harness::new(
            StockPolicy::Unchecked,
            FaultPolicy::Abort,
            vec![Machine::new(id("001"))],
        );

        h.sell("nonexistent", 1).unwrap();
        h.refill("nonexistent", 5).unwrap();

        assert!(h.low.drain().is_empty());
        assert!(h.ok.drain().is_empty());
        assert_eq!(h.level("001"), 10);
        assert!(h.repository.find_machine(&id("nonexistent")).is_none());
        assert_eq!(h.dispatcher.stats().handler_faults, 0);
    }

    #[test]
    fn derived_event_is_delivered_before_publish_returns() {
        let h = Harness::new(
            StockPolicy::Unchecked,
            FaultPolicy::Isolate,
            vec![Machine::new(id("testlowevent"))],
        );

        h.sell("testlowevent", 9).unwrap();
        assert_eq!(h.level("testlowevent"), 1);
        assert_eq!(h.low.drain().len(), 1);
        assert_eq!(h.dispatcher.pending(), 0);

        h.refill("testlowevent", 5).unwrap();
        assert_eq!(h.level("testlowevent"), 6);
        assert_eq!(h.ok.drain().len(), 1);
        assert!(h.low.drain().is_empty());
    }

    #[test]
    fn rejected_sale_surfaces_as_handler_fault_under_abort() {
        let h = Harness::new(
            StockPolicy::Reject,
            FaultPolicy::Abort,
            vec![Machine::with_stock(id("001"), 1)],
        );

        let err = h.sell("001", 2).unwrap_err();
        match err {
            DispatchError::HandlerFailed { handler, source, .. } => {
                assert_eq!(handler, "sale");
                assert!(matches!(
                    source,
                    HandlerError::Domain(DomainError::InvariantViolation(_))
                ));
            }
        }
        assert_eq!(h.level("001"), 1);
    }

    #[test]
    fn clamped_sale_still_reports_crossing() {
        let h = Harness::new(
            StockPolicy::Clamp,
            FaultPolicy::Isolate,
            vec![Machine::with_stock(id("001"), 3)],
        );

        h.sell("001", 5).unwrap();
        assert_eq!(h.level("001"), 0);
        assert_eq!(h.low.drain().len(), 1);
    }
}
