//! Stream metadata.
//!
//! Raw metadata is a UTF-8 JSON object. The only field interpreted here is
//! `$tb` (truncate-before); everything else is opaque and preserved verbatim
//! when the object is rewritten.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::version::EventNumber;

/// JSON key holding the truncate-before event number.
pub const TRUNCATE_BEFORE_KEY: &str = "$tb";

/// The interpreted subset of a stream's metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(
        rename = "$tb",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub truncate_before: Option<i64>,
}

impl StreamMetadata {
    /// Metadata with no fields set.
    pub const EMPTY: Self = Self {
        truncate_before: None,
    };

    /// Parse raw metadata bytes. Unknown fields are ignored.
    pub fn from_json_bytes(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }

    /// Soft-deleted streams carry the deleted sentinel as truncate-before.
    #[must_use]
    pub fn is_soft_deleted(&self) -> bool {
        self.truncate_before == Some(EventNumber::DELETED_STREAM)
    }
}

/// Rewrite the truncate-before field of `raw`, keeping every other field and
/// its position in the object.
pub fn rewrite_truncate_before(raw: &[u8], truncate_before: i64) -> serde_json::Result<Vec<u8>> {
    let mut value: Value = serde_json::from_slice(raw)?;
    let Some(object) = value.as_object_mut() else {
        return Err(serde_json::Error::custom(
            "stream metadata must be a JSON object",
        ));
    };
    object.insert(TRUNCATE_BEFORE_KEY.to_owned(), Value::from(truncate_before));
    serde_json::to_vec(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_truncate_before_and_ignores_rest() {
        let raw = br#"{"$maxAge":3600,"$tb":12,"custom":{"a":1}}"#;
        let meta = StreamMetadata::from_json_bytes(raw).expect("parse");
        assert_eq!(meta.truncate_before, Some(12));
        assert!(!meta.is_soft_deleted());
    }

    #[test]
    fn soft_delete_marker() {
        let raw = format!(r#"{{"$tb":{}}}"#, i64::MAX);
        let meta = StreamMetadata::from_json_bytes(raw.as_bytes()).expect("parse");
        assert!(meta.is_soft_deleted());
        assert!(!StreamMetadata::EMPTY.is_soft_deleted());
    }

    #[test]
    fn rewrite_preserves_other_fields_in_order() {
        let raw = br#"{"$maxCount":10,"$tb":9223372036854775807,"owner":"ops"}"#;
        let rewritten = rewrite_truncate_before(raw, 42).expect("rewrite");
        assert_eq!(
            std::str::from_utf8(&rewritten).expect("utf8"),
            r#"{"$maxCount":10,"$tb":42,"owner":"ops"}"#
        );
    }

    #[test]
    fn rewrite_adds_missing_field() {
        let rewritten = rewrite_truncate_before(br#"{"owner":"ops"}"#, 3).expect("rewrite");
        let meta = StreamMetadata::from_json_bytes(&rewritten).expect("parse");
        assert_eq!(meta.truncate_before, Some(3));
    }

    #[test]
    fn rewrite_rejects_non_objects() {
        assert!(rewrite_truncate_before(b"[1,2]", 3).is_err());
        assert!(rewrite_truncate_before(b"not json", 3).is_err());
    }

    proptest! {
        #[test]
        fn prop_rewrite_sets_field_and_keeps_owner(tb in any::<i64>(), owner in "[a-z]{0,12}") {
            let raw = serde_json::to_vec(&serde_json::json!({ "owner": owner, "$tb": 1 }))
                .expect("serialize");
            let rewritten = rewrite_truncate_before(&raw, tb).expect("rewrite");
            let value: Value = serde_json::from_slice(&rewritten).expect("parse");
            prop_assert_eq!(value["$tb"].as_i64(), Some(tb));
            prop_assert_eq!(value["owner"].as_str(), Some(owner.as_str()));
        }
    }
}
