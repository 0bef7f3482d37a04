//! Route handlers, one module per resource:
//! - health: liveness
//! - stake: stake intent creation
//! - webhook: observed deposit delivery
//! - unstake: two-phase withdrawal
//! - status: intent status, history, vault and operator views

pub mod health;
pub mod stake;
pub mod status;
pub mod unstake;
pub mod webhook;
