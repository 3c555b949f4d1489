// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process meter registry and events logger.

use super::{Counter, EventLevel, EventsLogger, MeterRegistry, Tags};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Counter storing its value as the bits of an `f64`
#[derive(Debug, Default)]
pub struct InMemoryCounter {
    bits: AtomicU64,
}

impl Counter for InMemoryCounter {
    fn increment(&self, amount: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + amount).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn count(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MeterId {
    scope: String,
    name: String,
    tags: Tags,
}

#[derive(Debug, Default)]
pub struct InMemoryMeterRegistry {
    counters: DashMap<MeterId, Arc<InMemoryCounter>>,
}

impl InMemoryMeterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of one counter, if it was ever created
    pub fn counter_value(&self, scope: &str, name: &str, tags: &Tags) -> Option<f64> {
        let id = MeterId {
            scope: scope.to_string(),
            name: name.to_string(),
            tags: tags.clone(),
        };
        self.counters.get(&id).map(|counter| counter.count())
    }

    /// Sum of every counter with this name, across scopes and tags
    pub fn total(&self, name: &str) -> f64 {
        self.counters
            .iter()
            .filter(|entry| entry.key().name == name)
            .map(|entry| entry.value().count())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl MeterRegistry for InMemoryMeterRegistry {
    fn counter(&self, scope: &str, name: &str, tags: &Tags) -> Arc<dyn Counter> {
        let id = MeterId {
            scope: scope.to_string(),
            name: name.to_string(),
            tags: tags.clone(),
        };
        self.counters.entry(id).or_default().clone()
    }
}

/// Event captured by [`InMemoryEventsLogger`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub level: EventLevel,
    pub name: String,
    pub value: f64,
    pub tags: Tags,
}

/// Keeps every event in emission order
#[derive(Debug, Default)]
pub struct InMemoryEventsLogger {
    events: Mutex<Vec<RecordedEvent>>,
}

impl InMemoryEventsLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events_named(&self, name: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.name == name)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventsLogger for InMemoryEventsLogger {
    fn log(&self, level: EventLevel, name: &str, value: f64, tags: &Tags) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                level,
                name: name.to_string(),
                value,
                tags: tags.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_identity_includes_tags() {
        let registry = InMemoryMeterRegistry::new();
        let mut tags = Tags::new();
        tags.insert("stage".to_string(), "consume".to_string());

        registry.counter("s", "records", &tags).increment(1.0);
        registry.counter("s", "records", &tags).increment(2.0);
        registry.counter("s", "records", &Tags::new()).increment(4.0);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.counter_value("s", "records", &tags), Some(3.0));
        assert_eq!(registry.total("records"), 7.0);
        assert_eq!(registry.counter_value("s", "missing", &tags), None);
    }

    #[test]
    fn test_concurrent_increments() {
        let registry = Arc::new(InMemoryMeterRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let counter = registry.counter("s", "bytes", &Tags::new());
                    for _ in 0..1000 {
                        counter.increment(1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.total("bytes"), 4000.0);
    }

    #[test]
    fn test_events_keep_order() {
        let logger = InMemoryEventsLogger::new();
        logger.debug("a", 1.0, &Tags::new());
        logger.info("b", 2.0, &Tags::new());

        let names: Vec<_> = logger.events().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        logger.clear();
        assert!(logger.events().is_empty());
    }
}
