//! Process-wide hub registry.
//!
//! Many consumers (panels, views, embedders) share one hub; the
//! registry hands out that single instance, fans events out to every
//! registered consumer, and disposes the hub when the last consumer
//! leaves. The hub slot doubles as an in-flight guard so concurrent
//! first calls collapse onto one initialization.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use mcphub_core::{HubConsumer, HubError, HubEvent, HubEventEmitter, TransportFactory};

use crate::hub::McpHub;
use crate::settings::McpSettingsStore;
use crate::transport::StdioTransportFactory;

type ConsumerMap = Arc<RwLock<HashMap<String, Arc<dyn HubConsumer>>>>;

/// Emitter that fans one event out to every registered consumer.
///
/// Delivery failures are logged and skipped; one broken consumer never
/// starves the rest.
#[derive(Clone)]
pub struct BroadcastEmitter {
    consumers: ConsumerMap,
}

impl HubEventEmitter for BroadcastEmitter {
    fn emit(&self, event: HubEvent) {
        let Ok(consumers) = self.consumers.read() else {
            return;
        };
        for consumer in consumers.values() {
            if let Err(e) = consumer.deliver(&event) {
                tracing::warn!(
                    consumer_id = consumer.id(),
                    event = event.event_name(),
                    error = %e,
                    "Failed to deliver hub event to consumer"
                );
            }
        }
    }

    fn clone_box(&self) -> Box<dyn HubEventEmitter> {
        Box::new(self.clone())
    }
}

/// Registry owning the process-wide [`McpHub`] and its consumers.
pub struct HubRegistry {
    consumers: ConsumerMap,
    /// The shared hub. Held locked across construction, so concurrent
    /// cold starts wait and then observe the same instance.
    hub: Mutex<Option<Arc<McpHub>>>,
    store: McpSettingsStore,
    transports: Arc<dyn TransportFactory>,
}

impl HubRegistry {
    /// Registry backed by the platform default settings location and
    /// stdio transports.
    pub fn new() -> Result<Self, HubError> {
        Ok(Self::with_parts(
            McpSettingsStore::at_default_location()?,
            Arc::new(StdioTransportFactory),
        ))
    }

    /// Registry with an explicit store and transport factory.
    pub fn with_parts(store: McpSettingsStore, transports: Arc<dyn TransportFactory>) -> Self {
        Self {
            consumers: Arc::new(RwLock::new(HashMap::new())),
            hub: Mutex::new(None),
            store,
            transports,
        }
    }

    /// Register a consumer and return the shared hub, initializing it
    /// on first use.
    ///
    /// A failed initialization leaves the slot empty; the next call
    /// retries from scratch.
    pub async fn instance(
        &self,
        consumer: Arc<dyn HubConsumer>,
    ) -> Result<Arc<McpHub>, HubError> {
        self.register(consumer);

        let mut slot = self.hub.lock().await;
        if let Some(hub) = slot.as_ref() {
            return Ok(hub.clone());
        }

        let emitter = Arc::new(BroadcastEmitter {
            consumers: self.consumers.clone(),
        });
        let hub = Arc::new(McpHub::new(
            self.store.clone(),
            self.transports.clone(),
            emitter,
        ));
        hub.initialize().await?;

        tracing::info!("MCP hub initialized");
        *slot = Some(hub.clone());
        Ok(hub)
    }

    fn register(&self, consumer: Arc<dyn HubConsumer>) {
        if let Ok(mut consumers) = self.consumers.write() {
            consumers.insert(consumer.id().to_string(), consumer);
        }
    }

    /// Remove a consumer; disposes the hub when none remain.
    pub async fn unregister(&self, id: &str) {
        let empty = self
            .consumers
            .write()
            .map(|mut consumers| {
                consumers.remove(id);
                consumers.is_empty()
            })
            .unwrap_or(false);

        if empty {
            self.dispose().await;
        }
    }

    /// Fan an event out to every registered consumer.
    pub fn broadcast(&self, event: HubEvent) {
        BroadcastEmitter {
            consumers: self.consumers.clone(),
        }
        .emit(event);
    }

    /// Ids of currently registered consumers.
    #[must_use]
    pub fn consumer_ids(&self) -> Vec<String> {
        self.consumers
            .read()
            .map(|consumers| consumers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Full reset: tear down the shared hub, if one exists, and drop
    /// every registered consumer so nothing stale receives fan-out.
    pub async fn dispose(&self) {
        if let Ok(mut consumers) = self.consumers.write() {
            consumers.clear();
        }

        let hub = self.hub.lock().await.take();
        if let Some(hub) = hub {
            hub.dispose().await;
            tracing::info!("MCP hub disposed by registry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use crate::settings::SETTINGS_FILE_NAME;

    struct RecordingConsumer {
        id: String,
        events: Arc<StdMutex<Vec<HubEvent>>>,
    }

    impl RecordingConsumer {
        fn new(id: &str) -> (Arc<Self>, Arc<StdMutex<Vec<HubEvent>>>) {
            let events = Arc::new(StdMutex::new(Vec::new()));
            (
                Arc::new(Self {
                    id: id.to_string(),
                    events: events.clone(),
                }),
                events,
            )
        }
    }

    impl HubConsumer for RecordingConsumer {
        fn id(&self) -> &str {
            &self.id
        }

        fn deliver(&self, event: &HubEvent) -> anyhow::Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingConsumer;

    impl HubConsumer for FailingConsumer {
        fn id(&self) -> &str {
            "failing"
        }

        fn deliver(&self, _event: &HubEvent) -> anyhow::Result<()> {
            anyhow::bail!("consumer gone")
        }
    }

    fn registry_in(dir: &tempfile::TempDir) -> Arc<HubRegistry> {
        let store = McpSettingsStore::new(dir.path().join(SETTINGS_FILE_NAME));
        Arc::new(HubRegistry::with_parts(
            store,
            Arc::new(StdioTransportFactory),
        ))
    }

    #[tokio::test]
    async fn test_concurrent_instance_calls_share_one_hub() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let (consumer, _) = RecordingConsumer::new(&format!("consumer-{i}"));
                registry.instance(consumer).await.unwrap()
            }));
        }

        let mut hubs = Vec::new();
        for handle in handles {
            hubs.push(handle.await.unwrap());
        }
        assert!(hubs.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(registry.consumer_ids().len(), 8);
    }

    #[tokio::test]
    async fn test_broadcast_skips_failing_consumer() {
        let consumers: ConsumerMap = Arc::new(RwLock::new(HashMap::new()));
        let (recording, events) = RecordingConsumer::new("recording");
        consumers
            .write()
            .unwrap()
            .insert("failing".to_string(), Arc::new(FailingConsumer));
        consumers
            .write()
            .unwrap()
            .insert("recording".to_string(), recording);

        let emitter = BroadcastEmitter { consumers };
        emitter.emit(HubEvent::servers_updated(vec![]));

        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_registry_broadcast_reaches_consumers() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        let (consumer, events) = RecordingConsumer::new("panel");
        registry.instance(consumer).await.unwrap();
        let seen_before = events.lock().unwrap().len();

        registry.broadcast(HubEvent::servers_updated(vec![]));
        assert_eq!(events.lock().unwrap().len(), seen_before + 1);
        registry.dispose().await;
    }

    #[tokio::test]
    async fn test_dispose_clears_consumers() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        let (consumer, events) = RecordingConsumer::new("panel");
        registry.instance(consumer).await.unwrap();
        registry.dispose().await;

        assert!(registry.consumer_ids().is_empty());

        // A dropped consumer no longer receives fan-out
        let seen = events.lock().unwrap().len();
        registry.broadcast(HubEvent::servers_updated(vec![]));
        assert_eq!(events.lock().unwrap().len(), seen);
    }

    #[tokio::test]
    async fn test_last_unregister_disposes_hub() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        let (first, _) = RecordingConsumer::new("first");
        let (second, _) = RecordingConsumer::new("second");
        let hub = registry.instance(first).await.unwrap();
        registry.instance(second).await.unwrap();

        registry.unregister("first").await;
        // One consumer left, hub survives
        let (third, _) = RecordingConsumer::new("third");
        let same = registry.instance(third).await.unwrap();
        assert!(Arc::ptr_eq(&hub, &same));

        registry.unregister("second").await;
        registry.unregister("third").await;

        // All gone: next instance builds a fresh hub
        let (fourth, _) = RecordingConsumer::new("fourth");
        let fresh = registry.instance(fourth).await.unwrap();
        assert!(!Arc::ptr_eq(&hub, &fresh));
        registry.dispose().await;
    }

    #[tokio::test]
    async fn test_instance_seeds_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        let (consumer, _) = RecordingConsumer::new("only");
        let hub = registry.instance(consumer).await.unwrap();

        let path = hub.settings_file_path().await.unwrap();
        assert!(path.exists());
        assert!(hub.get_all_servers().await.is_empty());
        registry.dispose().await;
    }
}
