//! Vending machine inventory domain.
//!
//! Stock events, the machine store and the handlers that connect them to the
//! dispatcher. The store holds no event logic; handlers hold no storage.

pub mod event;
pub mod handlers;
pub mod machine;
pub mod store;

pub use event::{LowStockWarning, MachineRefilled, MachineSold, StockEvent, StockEventKind, StockLevelOk};
pub use handlers::{LowStockHandler, RefillHandler, SaleHandler, StockOkHandler, wire_default_handlers};
pub use machine::{DEFAULT_INITIAL_STOCK, LowStockThreshold, Machine, StockChange};
pub use store::{InMemoryMachineRepository, MachineRepository, StockPolicy};
