//! biaslab: stimulus scheduling, response classification and bias metrics for a
//! shooter-bias reaction time experiment.

pub mod assets;
pub mod clock;
pub mod config;
pub mod deck;
pub mod engine;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod participant;
pub mod report;
pub mod retry;
pub mod session;
pub mod stimulus;
