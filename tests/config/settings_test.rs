//! Coverage for required environment settings.

use std::collections::HashMap;

use apphash_relay::config::{
    ConfigError, Settings, CREDENTIALS_FILE_VAR, CREDENTIALS_VAR, NETWORK_VAR, PROJECT_ID_VAR,
    WEBHOOK_URL_VAR,
};

fn full_env() -> HashMap<&'static str, String> {
    HashMap::from([
        (PROJECT_ID_VAR, "penumbra-sl-testnet".to_owned()),
        (
            WEBHOOK_URL_VAR,
            "https://discord.com/api/webhooks/1/abc".to_owned(),
        ),
        (NETWORK_VAR, "testnet".to_owned()),
        (CREDENTIALS_VAR, "{\"type\":\"service_account\"}".to_owned()),
    ])
}

fn load(env: &HashMap<&'static str, String>) -> Result<Settings, ConfigError> {
    Settings::from_lookup(|key| env.get(key).cloned())
}

#[test]
fn complete_environment_loads() {
    let settings = load(&full_env()).expect("settings load");
    assert_eq!(settings.project_id, "penumbra-sl-testnet");
    assert_eq!(settings.network, "testnet");
    assert_eq!(settings.webhook_url.host_str(), Some("discord.com"));
    assert_eq!(
        settings.credentials.expose(),
        "{\"type\":\"service_account\"}"
    );
}

#[test]
fn missing_vars_reported_in_fixed_order() {
    let mut env = full_env();
    env.remove(PROJECT_ID_VAR);
    env.remove(NETWORK_VAR);
    assert!(matches!(
        load(&env),
        Err(ConfigError::MissingVar(var)) if var == PROJECT_ID_VAR
    ));

    let mut env = full_env();
    env.remove(NETWORK_VAR);
    env.remove(CREDENTIALS_VAR);
    assert!(matches!(
        load(&env),
        Err(ConfigError::MissingVar(var)) if var == NETWORK_VAR
    ));
}

#[test]
fn blank_value_counts_as_missing() {
    let mut env = full_env();
    env.insert(PROJECT_ID_VAR, "   ".to_owned());
    let err = load(&env).expect_err("blank project");
    assert_eq!(err.to_string(), "GCP_PROJECT_ID is unset or empty");
}

#[test]
fn webhook_must_be_http_url() {
    for bad in ["not a url", "ftp://example.com/hook"] {
        let mut env = full_env();
        env.insert(WEBHOOK_URL_VAR, bad.to_owned());
        assert!(
            matches!(load(&env), Err(ConfigError::InvalidUrl { .. })),
            "{bad} should be rejected"
        );
    }
}

#[test]
fn credentials_fall_back_to_file() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("sa.json");
    std::fs::write(&path, "{\"from\":\"file\"}\n").expect("write credentials");

    let mut env = full_env();
    env.remove(CREDENTIALS_VAR);
    env.insert(CREDENTIALS_FILE_VAR, path.display().to_string());

    let settings = load(&env).expect("settings load");
    assert_eq!(settings.credentials.expose(), "{\"from\":\"file\"}");
}

#[test]
fn inline_credentials_win_over_file() {
    let mut env = full_env();
    env.insert(CREDENTIALS_FILE_VAR, "/nonexistent/sa.json".to_owned());
    let settings = load(&env).expect("inline credentials used");
    assert!(settings.credentials.expose().contains("service_account"));
}

#[test]
fn unreadable_credentials_file_is_reported() {
    let mut env = full_env();
    env.remove(CREDENTIALS_VAR);
    env.insert(CREDENTIALS_FILE_VAR, "/nonexistent/sa.json".to_owned());
    assert!(matches!(
        load(&env),
        Err(ConfigError::CredentialsFile { .. })
    ));
}

#[test]
fn no_credentials_names_inline_var() {
    let mut env = full_env();
    env.remove(CREDENTIALS_VAR);
    assert!(matches!(
        load(&env),
        Err(ConfigError::MissingVar(var)) if var == CREDENTIALS_VAR
    ));
}

#[test]
fn credentials_debug_is_redacted() {
    let settings = load(&full_env()).expect("settings load");
    let debug = format!("{settings:?}");
    assert!(!debug.contains("service_account"));
    assert!(debug.contains("REDACTED"));
}
