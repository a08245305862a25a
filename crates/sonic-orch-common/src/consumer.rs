//! Consumer: per-table event queue for Redis table consumption.

use std::collections::VecDeque;

/// Operation type from Redis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Set operation (add or update)
    Set,
    /// Delete operation
    Del,
}

impl Operation {
    /// Returns true if this is a Set operation.
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    /// Returns true if this is a Del operation.
    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

/// A field-value pair from a Redis hash entry.
pub type FieldValue = (String, String);

/// Key, operation, and field-values tuple from Redis.
///
/// This is the fundamental unit of data consumed from configuration tables.
#[derive(Debug, Clone)]
pub struct KeyOpFieldsValues {
    /// The key (e.g., "Ethernet0", "Ethernet0|3-4")
    pub key: String,
    /// The operation (Set or Del)
    pub op: Operation,
    /// Field-value pairs (empty for Del operations)
    pub fvs: Vec<FieldValue>,
}

impl KeyOpFieldsValues {
    /// Creates a new entry.
    pub fn new(key: impl Into<String>, op: Operation, fvs: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            op,
            fvs,
        }
    }

    /// Creates a Set entry.
    pub fn set(key: impl Into<String>, fvs: Vec<FieldValue>) -> Self {
        Self::new(key, Operation::Set, fvs)
    }

    /// Creates a Del entry.
    pub fn del(key: impl Into<String>) -> Self {
        Self::new(key, Operation::Del, vec![])
    }

    /// Returns the value for a field, if present.
    pub fn get_field(&self, field: &str) -> Option<&str> {
        self.fvs
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if this entry has the given field.
    pub fn has_field(&self, field: &str) -> bool {
        self.fvs.iter().any(|(f, _)| f == field)
    }
}

/// Configuration for a Consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Table name (e.g., "BUFFER_POOL", "PORT")
    pub table_name: String,
    /// Priority (lower = higher priority)
    pub priority: i32,
}

impl ConsumerConfig {
    /// Creates a new consumer config.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            priority: 0,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Consumer for Redis table entries.
///
/// A Consumer buffers entries from one table and hands them to a manager
/// for processing. It handles:
///
/// - Deduplication of operations on the same key
/// - An order-preserving retry queue for `NeedRetry` items
///
/// # Deduplication
///
/// When multiple operations arrive for the same key:
/// - SET after pending SET: field-values merge, newer overwrites older
/// - DEL: clears any pending operations for the key, then queues the DEL
/// - SET after pending DEL: both kept, in order
///
/// # Ordering
///
/// [`drain`](Consumer::drain) hands back every pending entry in arrival
/// order. A handler that gets `NeedRetry` keeps the entry aside and calls
/// [`requeue`](Consumer::requeue) once the pass is over; retried entries go
/// to the head of the queue in their original relative order, ahead of
/// anything that arrived mid-pass. A stuck head therefore delays its own
/// key only; later entries are still attempted once per tick.
pub struct Consumer {
    config: ConsumerConfig,
    to_sync: VecDeque<KeyOpFieldsValues>,
}

impl Consumer {
    /// Creates a new consumer with the given configuration.
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            to_sync: VecDeque::new(),
        }
    }

    /// Returns the table name.
    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    /// Returns the priority.
    pub fn priority(&self) -> i32 {
        self.config.priority
    }

    /// Returns true if there are pending entries.
    pub fn has_pending(&self) -> bool {
        !self.to_sync.is_empty()
    }

    /// Returns the number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.to_sync.len()
    }

    /// Adds entries to the sync queue with deduplication.
    pub fn add_to_sync(&mut self, entries: Vec<KeyOpFieldsValues>) {
        for entry in entries {
            self.add_single_entry(entry);
        }
    }

    fn add_single_entry(&mut self, entry: KeyOpFieldsValues) {
        match entry.op {
            Operation::Del => {
                // DEL supersedes everything pending for the key.
                self.to_sync.retain(|e| e.key != entry.key);
                self.to_sync.push_back(entry);
            }
            Operation::Set => {
                // Merge into the newest pending SET for the key, if any.
                if let Some(last) = self
                    .to_sync
                    .iter_mut()
                    .rev()
                    .find(|e| e.key == entry.key)
                {
                    if last.op == Operation::Set {
                        for (field, value) in entry.fvs {
                            if let Some(existing) =
                                last.fvs.iter_mut().find(|(f, _)| *f == field)
                            {
                                existing.1 = value;
                            } else {
                                last.fvs.push((field, value));
                            }
                        }
                        return;
                    }
                }
                self.to_sync.push_back(entry);
            }
        }
    }

    /// Drains all pending entries in arrival order.
    pub fn drain(&mut self) -> Vec<KeyOpFieldsValues> {
        self.to_sync.drain(..).collect()
    }

    /// Puts entries back at the head of the queue, preserving their order.
    ///
    /// Use this for entries that returned `NeedRetry` during a drain pass.
    pub fn requeue(&mut self, entries: Vec<KeyOpFieldsValues>) {
        for entry in entries.into_iter().rev() {
            self.to_sync.push_front(entry);
        }
    }

    /// Clears all pending entries.
    pub fn clear(&mut self) {
        self.to_sync.clear();
    }

    /// Dumps pending entries for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.to_sync
            .iter()
            .map(|e| {
                format!(
                    "{}: {} {:?}",
                    e.key,
                    if e.op.is_set() { "SET" } else { "DEL" },
                    e.fvs
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_op_fields_values() {
        let entry = KeyOpFieldsValues::set(
            "Ethernet0",
            vec![("speed".to_string(), "100000".to_string())],
        );

        assert_eq!(entry.key, "Ethernet0");
        assert!(entry.op.is_set());
        assert_eq!(entry.get_field("speed"), Some("100000"));
        assert!(entry.has_field("speed"));
        assert!(!entry.has_field("mtu"));
    }

    #[test]
    fn test_consumer_set_merge() {
        let mut consumer = Consumer::new(ConsumerConfig::new("BUFFER_POOL"));

        consumer.add_to_sync(vec![KeyOpFieldsValues::set(
            "ingress_lossless_pool",
            vec![("mode".to_string(), "dynamic".to_string())],
        )]);
        consumer.add_to_sync(vec![KeyOpFieldsValues::set(
            "ingress_lossless_pool",
            vec![
                ("mode".to_string(), "static".to_string()),
                ("type".to_string(), "ingress".to_string()),
            ],
        )]);

        assert_eq!(consumer.pending_count(), 1);

        let entries = consumer.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get_field("mode"), Some("static"));
        assert_eq!(entries[0].get_field("type"), Some("ingress"));
    }

    #[test]
    fn test_consumer_del_supersedes_set() {
        let mut consumer = Consumer::new(ConsumerConfig::new("BUFFER_PG"));

        consumer.add_to_sync(vec![
            KeyOpFieldsValues::set("Ethernet0|3-4", vec![]),
            KeyOpFieldsValues::del("Ethernet0|3-4"),
        ]);

        let entries = consumer.drain();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].op.is_del());
    }

    #[test]
    fn test_consumer_del_then_set_kept_in_order() {
        let mut consumer = Consumer::new(ConsumerConfig::new("BUFFER_PG"));

        consumer.add_to_sync(vec![
            KeyOpFieldsValues::del("Ethernet0|3-4"),
            KeyOpFieldsValues::set("Ethernet0|3-4", vec![]),
        ]);

        let entries = consumer.drain();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].op.is_del());
        assert!(entries[1].op.is_set());
    }

    #[test]
    fn test_consumer_preserves_cross_key_order() {
        let mut consumer = Consumer::new(ConsumerConfig::new("PORT"));

        consumer.add_to_sync(vec![
            KeyOpFieldsValues::set("Ethernet4", vec![]),
            KeyOpFieldsValues::set("Ethernet0", vec![]),
        ]);

        let entries = consumer.drain();
        assert_eq!(entries[0].key, "Ethernet4");
        assert_eq!(entries[1].key, "Ethernet0");
    }

    #[test]
    fn test_consumer_requeue_goes_to_head_in_order() {
        let mut consumer = Consumer::new(ConsumerConfig::new("PORT"));

        consumer.add_to_sync(vec![KeyOpFieldsValues::set("Ethernet8", vec![])]);

        let retried = vec![
            KeyOpFieldsValues::set("Ethernet0", vec![]),
            KeyOpFieldsValues::set("Ethernet4", vec![]),
        ];
        consumer.requeue(retried);

        let entries = consumer.drain();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].key, "Ethernet0");
        assert_eq!(entries[1].key, "Ethernet4");
        assert_eq!(entries[2].key, "Ethernet8");
    }
}
