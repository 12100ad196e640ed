#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use slo_sample_app::config;
use slo_sample_app::error::AppError;
use slo_sample_app::metrics::RequestClass;

#[test]
fn unknown_fields_are_rejected() {
    let bad = r#"
slo:
  latency_threshold_secs: 0.2 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn full_config_round_trips_into_schema() {
    let ok = r#"
server:
  listen: "127.0.0.1:9000"
slo:
  latency_threshold_seconds: 0.25
  default_class: LOW
  rules:
    - path_prefix: "/metrics"
      class: NO_SLO
    - path_prefix: "/api"
      method: POST
      class: HIGH_SLOW
metrics:
  buckets: [0.1, 0.5, 1]
  percentiles: [0.5, 0.99]
  summary_max_age_secs: 600
  process_metrics: false
delay:
  probability: 0.5
  duration_ms: 250
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.server.listen_addr().unwrap().port(), 9000);
    assert_eq!(cfg.slo.latency_threshold_seconds, 0.25);
    assert_eq!(cfg.slo.default_class, RequestClass::Low);
    assert_eq!(cfg.slo.rules.len(), 2);
    assert_eq!(cfg.slo.rules[1].method.as_deref(), Some("POST"));
    assert_eq!(cfg.slo.rules[1].class, RequestClass::HighSlow);
    assert_eq!(cfg.metrics.buckets, vec![0.1, 0.5, 1.0]);
    assert_eq!(cfg.metrics.summary_max_age_secs, Some(600));
    assert!(!cfg.metrics.process_metrics);
    assert_eq!(cfg.delay.duration_ms, 250);
}

#[test]
fn rule_paths_must_be_absolute() {
    let bad = r#"
slo:
  rules:
    - path_prefix: "api"
      class: LOW
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn zero_threshold_is_rejected() {
    assert!(config::load_from_str("slo:\n  latency_threshold_seconds: 0\n").is_err());
}

#[test]
fn bundled_sample_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/sample-app.yaml");
    let cfg = config::load_from_file(path).expect("sample config must load");
    assert_eq!(cfg.server.listen, "0.0.0.0:4000");
}
