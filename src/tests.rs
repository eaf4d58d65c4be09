use crate::config::{BridgeSettings, CLIENT_ARG, EXECUTABLE_NAME, UPDATE_URL_BASE};
use crate::platform;
use crate::types::AutocompleteResult;

#[test]
fn test_platform_info() {
    let info = platform::get_system_info();
    assert!(!info.os.is_empty());
    assert!(!info.arch.is_empty());
    let triple = platform::PlatformTriple::current();
    assert!(triple.to_string().contains('-'));
}

#[test]
fn test_settings_default() {
    let settings = BridgeSettings::default();
    assert_eq!(settings.update_url, UPDATE_URL_BASE);
    assert_eq!(settings.executable_name, EXECUTABLE_NAME);
    assert_eq!(settings.engine_args(), vec![CLIENT_ARG.to_string()]);
    assert_eq!(settings.port, 9999);
    assert!(settings.request_timeout_ms.is_none());
}

#[test]
fn test_empty_envelope_encoding() {
    let encoded = serde_json::to_string(&AutocompleteResult::default()).unwrap();
    assert_eq!(encoded, r#"{"old_prefix":"","results":[],"user_message":[]}"#);
}
