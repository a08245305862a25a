//! Task processing status.

/// Result of processing a single table entry.
///
/// Handlers never propagate errors across the dispatcher boundary; every
/// call site receives one of these and decides locally whether to keep,
/// drop, or retry the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Entry fully applied; drop it.
    Success,
    /// A dependency (pool, profile, port info) is not available yet;
    /// keep the entry queued and re-attempt on the next tick.
    NeedRetry,
    /// The operation violates an invariant (e.g. admission-control
    /// rejection); drop the entry and log loudly.
    Failed,
    /// Malformed configuration; drop the entry, never retry.
    InvalidEntry,
    /// Entry is a no-op for this manager (duplicate, irrelevant field set).
    Ignore,
}

impl TaskStatus {
    /// Returns true if the entry is considered consumed.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Ignore)
    }

    /// Returns true if the entry should stay queued for the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskStatus::NeedRetry)
    }

    /// Returns true if the entry is dropped as a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::InvalidEntry)
    }

    /// Short name for logs and counters.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::NeedRetry => "need_retry",
            TaskStatus::Failed => "failed",
            TaskStatus::InvalidEntry => "invalid_entry",
            TaskStatus::Ignore => "ignore",
        }
    }
}
