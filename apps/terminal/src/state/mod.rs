//! # State Module
//!
//! Terminal-side state around the controller link.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  OrderStateMachine                                              │   │
//! │  │  pump ──► StateId (tokio Mutex, transitions serialized)         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                              │ &Services                                │
//! │          ┌──────────────────┼──────────────────┬──────────────────┐    │
//! │          ▼                  ▼                  ▼                  ▼     │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────┐  │
//! │  │ Connection   │  │ OrderManager │  │  PumpBoard   │  │ Terminal   │  │
//! │  │ Manager      │  │              │  │              │  │ Settings   │  │
//! │  │ (pts-link)   │  │ Mutex<book>  │  │ Mutex<items> │  │ read-only  │  │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └────────────┘  │
//! │                                                                         │
//! │  LOCK ORDER: transition lock ─► board ─► order book                    │
//! │  Board and order book are std mutexes, never held across an await.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod board;
mod config;
mod machine;
mod orders;

pub use board::PumpBoard;
pub use config::{AppConfig, TerminalSettings};
pub use machine::{
    AuthorizingState, CurrencySelectedState, FuelingState, IdleState, NozzleSelectedState,
    OrderState, OrderStateMachine, PumpNotSelectedState, PumpSelectedState,
    QuantitySelectedState, Services, StateData, StateId, StoppingState,
};
pub use orders::{OrderManager, FULL_TANK_LABEL};
