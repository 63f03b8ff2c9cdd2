//! Typed ID definitions.

use crate::define_id;

// =============================================================================
// Connector Instances
// =============================================================================

define_id!(InstanceId);
define_id!(QrCodeId);

// =============================================================================
// Requests
// =============================================================================

define_id!(RequestId);

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_instance_id_roundtrip() {
        let id = InstanceId::new();
        let s = id.to_string();
        let parsed: InstanceId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_instance_id_has_no_prefix() {
        let id = InstanceId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 36);
        assert_eq!(s, id.uuid().hyphenated().to_string());
    }

    #[test]
    fn test_instance_ids_are_distinct() {
        let a = InstanceId::new();
        let b = InstanceId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_instance_id_empty() {
        let result: Result<InstanceId, _> = "".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::Empty));
    }

    #[test]
    fn test_instance_id_invalid_uuid() {
        let result: Result<InstanceId, _> = "not-a-uuid".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::InvalidUuid(_)
        ));
    }

    #[test]
    fn test_instance_id_rejects_simple_form() {
        let result: Result<InstanceId, _> = "0b8f6c1e6a0e4d559a432f1f3b1f8c7e".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::NotHyphenated(_)
        ));
    }

    #[test]
    fn test_instance_id_json_is_bare_string() {
        let id: InstanceId = "0b8f6c1e-6a0e-4d55-9a43-2f1f3b1f8c7e".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0b8f6c1e-6a0e-4d55-9a43-2f1f3b1f8c7e\"");
        let parsed: InstanceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_instance_id_json_rejects_garbage() {
        let result: Result<InstanceId, _> = serde_json::from_str("\"inst_123\"");
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn prop_display_parses_back(bytes in any::<[u8; 16]>()) {
            let id = QrCodeId::from_uuid(crate::Uuid::from_bytes(bytes));
            let parsed = QrCodeId::parse(&id.to_string()).unwrap();
            prop_assert_eq!(id, parsed);
        }
    }
}
