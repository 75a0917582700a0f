//! Long-lived background loops
//!
//! Each worker is a `run` function taking its options, its dependencies and
//! a shutdown signal; the app layer spawns them and joins the handles on
//! shutdown.

pub mod deployer;
pub mod events;
pub mod metrics;
pub mod reconciler;
