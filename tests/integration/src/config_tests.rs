//! Configuration documents through to running pipelines

use crate::test_utils::init_tracing;
use meshflow_core::{NodeConfig, Role};
use meshflow_mesh::{build_pipeline, ExportError, ExportPipeline, RecordingTransport};

const AGGREGATOR_TOML: &str = r#"
    [node]
    address = "fd00::1"
    role = "aggregator"

    [export]
    interval_secs = 15
    flow_capacity = 32
    export_stats = true

    [transport]
    upstream = "fd00::ff"
"#;

const GATEWAY_TOML: &str = r#"
    [node]
    address = "fd00::ff"
    role = "gateway"

    [transport]
    collector = "2001:db8::10"
"#;

#[test]
fn test_documents_build_matching_pipelines() {
    init_tracing();

    for (document, role) in [(AGGREGATOR_TOML, Role::Aggregator), (GATEWAY_TOML, Role::Gateway)] {
        let config = NodeConfig::from_toml_str(document).unwrap();
        let pipeline = build_pipeline(&config, RecordingTransport::new()).unwrap();
        assert_eq!(pipeline.role(), role);
        assert_eq!(pipeline.next_sequence(), 1);
    }
}

#[test]
fn test_missing_next_hop_rejected() {
    let document = GATEWAY_TOML.replace("collector = \"2001:db8::10\"", "");
    assert!(NodeConfig::from_toml_str(&document).is_err());
}

#[test]
fn test_table_larger_than_message_rejected_at_build() {
    let mut config = NodeConfig::from_toml_str(AGGREGATOR_TOML).unwrap();
    config.export.flow_capacity = 200;
    config.export.max_message_size = 512;
    assert!(config.validate().is_ok());

    let result = build_pipeline(&config, RecordingTransport::new());
    assert!(matches!(result, Err(ExportError::BufferOverflow { .. })));
}

#[test]
fn test_stats_travel_through_aggregator() {
    let config = NodeConfig::from_toml_str(AGGREGATOR_TOML).unwrap();
    let mut pipeline = build_pipeline(&config, RecordingTransport::new()).unwrap();
    pipeline.on_datagram(b"not ipfix", "fd00::9".parse().unwrap());
    pipeline.on_tick(0);

    let stats = pipeline.stats();
    assert_eq!(stats.dropped_payloads, 1);
    // Template message plus the data message carrying the stats record.
    assert_eq!(stats.messages_sent, 2);
}
