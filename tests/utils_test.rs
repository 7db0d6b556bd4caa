use panelmail::utils::{generate_message_id, kb, ms, percent, truncate_message, validate_basic_auth};
use std::collections::HashSet;
use std::time::Duration;

// ===========================================================================================
// truncate_message Tests
// ===========================================================================================

#[test]
fn test_truncate_message_no_truncation_needed() {
    assert_eq!(truncate_message("Short", 10), "Short");
}

#[test]
fn test_truncate_message_with_truncation() {
    let result = truncate_message("node-exporter panel 12", 10);
    assert_eq!(result, "node-expo…");
}

#[test]
fn test_truncate_message_unicode_handling() {
    let message = "こんにちは世界";
    let result = truncate_message(message, 6);
    assert_eq!(result, "こんにちは…");
}

#[test]
#[should_panic(expected = "max_width must be at least 2 to accommodate the ellipsis")]
fn test_truncate_message_max_width_one() {
    truncate_message("Something", 1);
}

// ===========================================================================================
// validate_basic_auth Tests
// ===========================================================================================

#[test]
fn test_valid_basic_auth() {
    assert!(validate_basic_auth("user:pass").is_ok());
    assert!(validate_basic_auth("admin@grafana:secret").is_ok());
    assert!(validate_basic_auth("user:pass:with:colon").is_ok());
}

#[test]
fn test_invalid_basic_auth() {
    assert!(validate_basic_auth("invalid").is_err());
    assert!(validate_basic_auth("").is_err());
    assert!(validate_basic_auth(":").is_err());
    assert!(validate_basic_auth("user:").is_err());
    assert!(validate_basic_auth(":pass").is_err());
}

// ===========================================================================================
// generate_message_id Tests
// ===========================================================================================

#[test]
fn test_generate_message_id_format() {
    let id = generate_message_id("example.com");
    let hex = id
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix("@example.com>"))
        .expect("Message-ID should look like <hex@domain>");
    assert_eq!(hex.len(), 30);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_generate_message_id_uniqueness() {
    let ids: HashSet<String> = (0..1000).map(|_| generate_message_id("example.com")).collect();
    assert_eq!(ids.len(), 1000);
}

// ===========================================================================================
// Formatting Tests
// ===========================================================================================

#[test]
fn test_formatting_helpers() {
    assert_eq!(kb(2048), "2.00kb");
    assert_eq!(percent(66.6), "67%");
    assert_eq!(ms(Duration::from_millis(1500)), "1500.00ms");
}
