// Unit tests for probe error conversion and serialization.

use crate::error::ProbeError;

use bridge_core::{BridgeError, ConfigError, TransportError};

use common::ErrorLocation;

/// **VALUE**: Verifies errors serialize with a type tag for structured output.
///
/// **BUG THIS CATCHES**: Dropping `#[serde(tag, content)]` and emitting an
/// externally tagged shape consumers cannot switch on.
#[test]
fn given_probe_error_when_serialized_then_tagged_with_type() {
    // GIVEN: A connect error
    let error = ProbeError::from(TransportError::not_connected());

    // WHEN: Serializing
    let json = serde_json::to_value(&error).unwrap();

    // THEN: Tag and content
    assert_eq!(json["type"], "Connect");
    assert!(json["data"]["message"].as_str().unwrap().contains("Not Connected"));
    assert!(json["data"]["location"].is_object());
}

/// **VALUE**: Verifies bridge errors keep their category.
#[test]
fn given_bridge_error_when_converted_then_category_preserved() {
    let error = ProbeError::from(BridgeError::timeout("getFields", 3));

    match error {
        ProbeError::Call { category, message, .. } => {
            assert_eq!(category, "timeout");
            assert!(message.contains("getFields"));
        }
        other => panic!("Expected Call, got {other:?}"),
    }
}

/// **VALUE**: Verifies config errors map to the Config variant.
#[test]
fn given_config_error_when_converted_then_config_variant() {
    let error = ProbeError::from(ConfigError::ValidationError {
        location: ErrorLocation::here(),
        reason: "queue.capacity must be greater than 0".to_string(),
    });

    assert!(matches!(error, ProbeError::Config { .. }));
    assert!(error.to_string().contains("queue.capacity"));
}
