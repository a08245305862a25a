//! Common orchestration abstractions for SONiC.
//!
//! This crate provides the core traits and types used by the orchestration
//! and configuration-manager daemons in the SONiC control plane:
//!
//! - [`Orch`]: Base trait for orchestration agents
//! - [`Consumer`]: Per-table event queue with deduplication and retry
//! - [`TaskStatus`]: Result type for task processing
//!
//! # Architecture
//!
//! The orchestration architecture follows an event-driven model:
//!
//! 1. Configuration changes are written to Redis (CONFIG_DB, APPL_DB)
//! 2. Managers subscribe to relevant tables via Consumers
//! 3. The event loop dispatches drained entries to per-table handlers
//! 4. Handlers return a [`TaskStatus`]; `NeedRetry` items are re-queued in
//!    order and re-attempted on the next timer tick
//!
//! # Example
//!
//! ```ignore
//! use sonic_orch_common::{Orch, Consumer, TaskStatus};
//!
//! struct MyMgr {
//!     pool_consumer: Consumer,
//!     // ... state
//! }
//!
//! #[async_trait]
//! impl Orch for MyMgr {
//!     fn name(&self) -> &str { "MyMgr" }
//!
//!     async fn do_task(&mut self) {
//!         let mut kept = Vec::new();
//!         for entry in self.pool_consumer.drain() {
//!             match self.handle_pool(&entry) {
//!                 TaskStatus::NeedRetry => kept.push(entry),
//!                 status => status.log(&entry.key),
//!             }
//!         }
//!         self.pool_consumer.requeue(kept);
//!     }
//! }
//! ```

mod consumer;
mod orch;
mod task;

pub use consumer::{Consumer, ConsumerConfig, FieldValue, KeyOpFieldsValues, Operation};
pub use orch::Orch;
pub use task::TaskStatus;
