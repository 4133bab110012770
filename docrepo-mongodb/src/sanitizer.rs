//! Field name sanitization for MongoDB compatibility.
//!
//! MongoDB restricts field names (keys) from containing certain characters like dots and
//! dollar signs, which are used in its query syntax. Keys are escaped on the way in and
//! restored on the way out; values are never touched.

use bson::{Bson, Document};


/// Sanitizes and restores document keys to handle MongoDB field name restrictions.
///
/// MongoDB does not allow field names (document keys) to contain:
/// - Dots (`.`) - used for nested field access in queries
/// - Dollar signs (`$`) - used for operators in queries
/// - Null bytes (`\0`) - field name terminators
pub(crate) struct KeySanitizer;

impl KeySanitizer {
    /// Character replacements for sanitization
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Recursively sanitizes every key of a document, including keys of nested documents.
    pub(crate) fn sanitize_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(k, v)| (Self::sanitize_key(&k), Self::sanitize_value(v)))
            .collect()
    }

    fn sanitize_value(value: Bson) -> Bson {
        match value {
            Bson::Document(doc) => Bson::Document(Self::sanitize_document(doc)),
            Bson::Array(arr) => Bson::Array(
                arr
                    .into_iter()
                    .map(Self::sanitize_value)
                    .collect(),
            ),
            other => other,
        }
    }

    /// Escapes the characters MongoDB reserves in a single key.
    pub(crate) fn sanitize_key(input: &str) -> String {
        let mut sanitized = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, *replacement);
        }
        sanitized
    }

    /// Recursively restores every key of a document read back from MongoDB.
    ///
    /// This is the inverse of [`KeySanitizer::sanitize_document`].
    pub(crate) fn restore_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(k, v)| (Self::restore_key(&k), Self::restore_value(v)))
            .collect()
    }

    fn restore_value(value: Bson) -> Bson {
        match value {
            Bson::Document(doc) => Bson::Document(Self::restore_document(doc)),
            Bson::Array(arr) => Bson::Array(
                arr
                    .into_iter()
                    .map(Self::restore_value)
                    .collect(),
            ),
            other => other,
        }
    }

    /// Restores a key by reverting sanitization escapes.
    pub(crate) fn restore_key(input: &str) -> String {
        let mut restored = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, *target);
        }
        restored
    }
}
