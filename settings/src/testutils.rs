use crate::memory_store::MemoryStore;
use crate::store::{EnvSnapshot, EnvStore, Scope, StoreError};
use async_trait::async_trait;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wraps a `MemoryStore`, counts every call and fails variable writes once
/// `successful_writes` writes went through.
pub struct FlakyStore {
    inner: MemoryStore,
    successful_writes: Option<usize>,
    calls: AtomicUsize,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn reliable(inner: MemoryStore) -> Self {
        FlakyStore {
            inner,
            successful_writes: None,
            calls: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn failing_after(successful_writes: usize) -> Self {
        FlakyStore {
            successful_writes: Some(successful_writes),
            ..Self::reliable(MemoryStore::new())
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_write(&self) -> Result<(), StoreError> {
        let previous = self.writes.fetch_add(1, Ordering::SeqCst);
        match self.successful_writes {
            Some(limit) if previous >= limit => Err(StoreError::Status {
                operation: "write",
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl EnvStore for FlakyStore {
    async fn list_variables(&self, scope: &Scope) -> Result<EnvSnapshot, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_variables(scope).await
    }

    async fn create_or_update_variable(
        &self,
        scope: &Scope,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        self.inner.create_or_update_variable(scope, key, value).await
    }

    async fn delete_variable(&self, scope: &Scope, key: &str) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        self.inner.delete_variable(scope, key).await
    }

    async fn get_configuration(
        &self,
        scope: &Scope,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_configuration(scope).await
    }

    async fn upsert_configuration(
        &self,
        scope: &Scope,
        configuration: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_configuration(scope, configuration).await
    }
}

/// Remembers the name and labels of every counter registered through it.
#[derive(Default)]
pub struct CounterRecorder {
    counters: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl CounterRecorder {
    /// Values of `label` on the registered counters named `name`, in order.
    pub fn label_values(&self, name: &str, label: &str) -> Vec<String> {
        self.counters
            .lock()
            .unwrap()
            .iter()
            .filter(|(counter, _)| counter == name)
            .filter_map(|(_, labels)| {
                labels
                    .iter()
                    .find(|(key, _)| key == label)
                    .map(|(_, value)| value.clone())
            })
            .collect()
    }
}

impl Recorder for CounterRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let labels = key
            .labels()
            .map(|label| (label.key().to_string(), label.value().to_string()))
            .collect();
        self.counters
            .lock()
            .unwrap()
            .push((key.name().to_string(), labels));
        Counter::noop()
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
