//! Identifier and key sanitization for the destination store.
//!
//! The destination treats `.` as a path separator inside stored keys, so every
//! `.` in a record id or mapping key is rewritten to `_` on the way in.
//!
//! The substitution is not a bijection: an identifier that already contains
//! `_` cannot be told apart from one whose `.` was rewritten. `unsanitize` is
//! only an inverse for identifiers free of the substitute character.

use crate::core::document::Document;

/// Character the destination reserves as a key separator.
pub const RESERVED_SEPARATOR: char = '.';
/// Replacement written in its place.
pub const SUBSTITUTE: char = '_';

pub fn sanitize(id: &str) -> String {
    id.replace(RESERVED_SEPARATOR, &SUBSTITUTE.to_string())
}

pub fn unsanitize(id: &str) -> String {
    id.replace(SUBSTITUTE, &RESERVED_SEPARATOR.to_string())
}

/// Rewrite every mapping key in the tree with [`sanitize`].
///
/// Sequences are opaque: mappings nested inside an array keep their keys.
/// Non-mapping input is returned unchanged.
pub fn sanitize_object(doc: Document) -> Document {
    match doc {
        Document::Mapping(map) => Document::Mapping(
            map.into_iter()
                .map(|(key, value)| (sanitize(&key), sanitize_object(value)))
                .collect(),
        ),
        other => other,
    }
}

/// True when `sanitize` would lose information for this identifier.
pub fn is_ambiguous(id: &str) -> bool {
    id.contains(SUBSTITUTE)
}
