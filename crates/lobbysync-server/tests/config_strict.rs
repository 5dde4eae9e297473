#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use lobbysync_server::app_state::AppState;
use lobbysync_server::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
server:
  listen: "0.0.0.0:8080"
lobbies:
  - key: "main"
    kee: "typo" # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
lobbies:
  - key: "main"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.server.path, "/ws");
    assert_eq!(cfg.server.listen, "0.0.0.0:8080");
    assert_eq!(cfg.session_settings().ping_interval, Duration::from_secs(10));
    assert_eq!(cfg.lobbies[0].key, "main");
}

#[test]
fn wrong_version_is_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn ping_interval_range_is_checked() {
    let bad = r#"
version: 1
server:
  ping_interval_ms: 50
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("ping_interval_ms"));
}

#[test]
fn path_must_be_rooted() {
    let bad = r#"
version: 1
server:
  path: "ws/"
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn duplicate_lobby_keys_are_rejected() {
    let bad = r#"
version: 1
lobbies:
  - key: "main"
  - key: "main"
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("duplicate lobby key"));
}

#[test]
fn app_state_opens_configured_lobbies() {
    let cfg = config::load_from_str(
        r#"
version: 1
lobbies:
  - key: "a"
  - key: "b"
"#,
    )
    .unwrap();
    let state = AppState::new(cfg).unwrap();
    assert!(state.sessions().get_lobby("a").is_some());
    assert!(state.sessions().get_lobby("b").is_some());
    assert_eq!(state.sessions().lobbies().len(), 2);
}
