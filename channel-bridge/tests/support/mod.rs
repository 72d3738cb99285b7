use channel_bridge::config::BridgeConfig;
use channel_bridge::{Bridge, MemoryCheckpointTables, StaticConfigSource};
use integration_test_utils::{RecordingPublisherFactory, ScriptedTransport};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct Harness {
    pub(crate) bridge: Bridge,
    pub(crate) config: Arc<StaticConfigSource>,
    pub(crate) transport: ScriptedTransport,
    pub(crate) publishers: Arc<RecordingPublisherFactory>,
    pub(crate) checkpoints: Arc<MemoryCheckpointTables>,
}

pub(crate) fn parse_config(json: &str) -> BridgeConfig {
    serde_json::from_str(json).expect("test configuration should parse")
}

pub(crate) fn make_harness(json: &str) -> Harness {
    integration_test_utils::init_logging();

    let config = Arc::new(StaticConfigSource::new(parse_config(json)));
    let transport = ScriptedTransport::new();
    let publishers = Arc::new(RecordingPublisherFactory::new());
    let checkpoints = Arc::new(MemoryCheckpointTables::new());
    let bridge = Bridge::new(
        config.clone(),
        Arc::new(transport.clone()),
        publishers.clone(),
        checkpoints.clone(),
    );

    Harness {
        bridge,
        config,
        transport,
        publishers,
        checkpoints,
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub(crate) async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {description}");
}
