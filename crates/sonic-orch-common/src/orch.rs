//! Base Orch trait.

use async_trait::async_trait;

/// Base trait for orchestration agents and manager daemons.
///
/// Each manager implements this trait to participate in the daemon event
/// loop. The loop calls [`do_task`](Orch::do_task) when table data is
/// available and [`on_timer`](Orch::on_timer) on every periodic tick.
///
/// # Lifecycle
///
/// 1. Construction: the manager is created with injected store clients
/// 2. Event loop: `do_task()` drains consumers and dispatches entries
/// 3. Timer: `on_timer()` drives deferred convergence and reconciliation
///
/// All state mutation happens synchronously inside these two entry points;
/// the model is single-threaded and cooperative.
#[async_trait]
pub trait Orch: Send {
    /// Returns the name of this manager (for logging and debugging).
    fn name(&self) -> &str;

    /// Processes pending entries from all consumers.
    async fn do_task(&mut self);

    /// Called on every periodic tick of the daemon's timer.
    fn on_timer(&mut self) {
        // Default: no-op
    }

    /// Returns true if this manager has pending work.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps pending tasks for debugging.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }
}
