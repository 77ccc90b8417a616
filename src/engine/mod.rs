//! Orchestration layer: the per-table state machine, the per-branch
//! bounded-concurrency pool, the per-cycle bounded-concurrency pool
//! over branches, and cooperative shutdown (C7-C10).

pub mod branch;
pub mod cycle;
pub mod shutdown;
pub mod table_sync;
