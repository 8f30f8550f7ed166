//! System stream naming.
//!
//! Every stream `s` has a metadata stream `$$s`; the index writer caches raw
//! metadata under the id of the stream it describes.

const METASTREAM_PREFIX: &str = "$$";

/// Whether `stream_id` names a metadata stream.
#[inline]
#[must_use]
pub fn is_metastream(stream_id: &str) -> bool {
    stream_id.starts_with(METASTREAM_PREFIX)
}

/// The metadata stream describing `stream_id`.
#[must_use]
pub fn metastream_of(stream_id: &str) -> String {
    format!("{METASTREAM_PREFIX}{stream_id}")
}

/// The stream a metadata stream describes, or `stream_id` itself when it is
/// not a metadata stream.
#[must_use]
pub fn original_stream_of(stream_id: &str) -> &str {
    stream_id
        .strip_prefix(METASTREAM_PREFIX)
        .unwrap_or(stream_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metastream_round_trip() {
        let meta = metastream_of("orders-7");
        assert_eq!(meta, "$$orders-7");
        assert!(is_metastream(&meta));
        assert_eq!(original_stream_of(&meta), "orders-7");
    }

    #[test]
    fn plain_and_system_streams_are_not_metastreams() {
        assert!(!is_metastream("orders-7"));
        assert!(!is_metastream("$stats"));
        assert_eq!(original_stream_of("$stats"), "$stats");
    }

    #[test]
    fn metastream_of_metastream_strips_one_level() {
        let meta_meta = metastream_of("$$orders");
        assert_eq!(original_stream_of(&meta_meta), "$$orders");
    }
}
