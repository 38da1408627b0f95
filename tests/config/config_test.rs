//! Coverage for TOML tunables and their validation.

use std::path::PathBuf;

use apphash_relay::config::{load_relay_config, RelayConfig, SourceKind};
use apphash_relay::ingest::Severity;

fn file_source(mut config: RelayConfig) -> RelayConfig {
    config.source.kind = SourceKind::File;
    config.source.path = Some(PathBuf::from("/var/log/export.jsonl"));
    config
}

#[test]
fn defaults_match_reference_deployment() {
    let config = RelayConfig::default();
    assert_eq!(config.reconcile.progress_interval, 1000);
    assert_eq!(config.reconcile.retain_heights, None);
    assert!(!config.reconcile.dedupe_sources);
    assert_eq!(config.filter.cluster, "testnet");
    assert_eq!(config.filter.commit_container, "tm");
    assert_eq!(config.filter.error_container, "pd");
    assert_eq!(config.filter.pod_prefix, "penumbra-");
    assert_eq!(config.filter.source_label, "pod_name");
    assert_eq!(config.filter.min_severity, Severity::Error);
    assert_eq!(config.notifier.timeout_secs, 10);
    assert_eq!(config.notifier.alert_mention, "@here");
    assert_eq!(config.health.port, 8080);
    assert_eq!(config.source.kind, SourceKind::Http);
    assert_eq!(config.source.channel_capacity, 16);
}

#[test]
fn empty_toml_is_all_defaults() {
    let config = RelayConfig::from_toml("").expect("empty config parses");
    assert_eq!(config.reconcile.progress_interval, 1000);
    assert_eq!(config.logging.level, "info");
    assert!(config.logging.dir.is_none());
}

#[test]
fn partial_sections_keep_other_defaults() {
    let toml_str = r#"
[reconcile]
retain_heights = 5000
dedupe_sources = true

[filter]
cluster = "mainnet"
min_severity = "critical"

[source]
kind = "file"
path = "/data/logs"
poll_interval_ms = 250
"#;
    let config = RelayConfig::from_toml(toml_str).expect("config parses");
    assert_eq!(config.reconcile.progress_interval, 1000);
    assert_eq!(config.reconcile.retain_heights, Some(5000));
    assert!(config.reconcile.dedupe_sources);
    assert_eq!(config.filter.cluster, "mainnet");
    assert_eq!(config.filter.commit_container, "tm");
    assert_eq!(config.filter.min_severity, Severity::Critical);
    assert_eq!(config.source.kind, SourceKind::File);
    assert_eq!(config.source.path, Some(PathBuf::from("/data/logs")));
    assert_eq!(config.source.poll_interval().as_millis(), 250);
    config.validate().expect("valid config");
}

#[test]
fn http_endpoint_parses_as_url() {
    let toml_str = r#"
[source]
endpoint = "https://logging.example.com/v2/entries:tail"
"#;
    let config = RelayConfig::from_toml(toml_str).expect("config parses");
    let endpoint = config.source.endpoint.as_ref().expect("endpoint set");
    assert_eq!(endpoint.host_str(), Some("logging.example.com"));
    config.validate().expect("http source with endpoint is valid");
}

#[test]
fn malformed_values_fail_to_parse() {
    assert!(RelayConfig::from_toml("[source]\nkind = \"carrier-pigeon\"").is_err());
    assert!(RelayConfig::from_toml("[filter]\nmin_severity = \"loud\"").is_err());
    assert!(RelayConfig::from_toml("[source]\nendpoint = \"not a url\"").is_err());
}

#[test]
fn default_http_source_needs_endpoint() {
    let err = RelayConfig::default()
        .validate()
        .expect_err("endpoint missing");
    assert!(err.to_string().contains("source.endpoint"));
}

#[test]
fn file_source_needs_path() {
    let mut config = RelayConfig::default();
    config.source.kind = SourceKind::File;
    let err = config.validate().expect_err("path missing");
    assert!(err.to_string().contains("source.path"));
}

#[test]
fn validate_rejects_out_of_range_values() {
    let cases: [(&str, fn(&mut RelayConfig)); 7] = [
        ("progress_interval", |c| c.reconcile.progress_interval = 0),
        ("retain_heights", |c| c.reconcile.retain_heights = Some(0)),
        ("timeout_secs", |c| c.notifier.timeout_secs = 0),
        ("timeout_secs", |c| c.notifier.timeout_secs = 600),
        ("max_message_len", |c| c.notifier.max_message_len = 10),
        ("channel_capacity", |c| c.source.channel_capacity = 0),
        ("source_label", |c| c.filter.source_label = " ".to_owned()),
    ];

    for (field, mutate) in cases {
        let mut config = file_source(RelayConfig::default());
        mutate(&mut config);
        let err = config.validate().expect_err(field);
        assert!(
            err.to_string().contains(field),
            "error for {field} should name it: {err}"
        );
    }
}

#[test]
fn load_without_path_returns_defaults() {
    let config = load_relay_config(None).expect("defaults");
    assert_eq!(config.health.port, 8080);
}

#[test]
fn load_reads_file_from_disk() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("relay.toml");
    std::fs::write(&path, "[health]\nport = 0\n").expect("write config");

    let config = load_relay_config(Some(&path)).expect("load");
    assert_eq!(config.health.port, 0);
}

#[test]
fn load_reports_missing_file() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let err = load_relay_config(Some(&tmp.path().join("absent.toml"))).expect_err("missing");
    assert!(format!("{err:#}").contains("absent.toml"));
}
