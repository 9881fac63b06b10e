//! Stimulus scheduling engine.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Timers/Input │────►│  Event Bus   │────►│  Scheduler   │
//! │ spawn/sweep  │     │  (ordered)   │     │  (reducer)   │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                                                  │
//!                                                  ▼
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │   Commands   │◄────│ Core: state, │
//!                      │ show/clear.. │     │ ledger, deck │
//!                      └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod classifier;
pub mod events;
pub mod scheduler;
pub mod state;
