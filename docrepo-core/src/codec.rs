//! Field-level conversion between entity values and wire documents.
//!
//! Entities are first serialized with serde into their *value form*: a BSON document holding
//! whatever serde produced for each field (a `chrono::DateTime<Utc>` becomes an RFC 3339
//! string, a [`bson::DateTime`] stays native, a [`bson::Uuid`] becomes a UUID binary). The
//! codec converts that value form into the *wire form* the storage engine expects and back
//! again, one [`FieldKind`] at a time.
//!
//! # Round trips
//!
//! Datetimes are stored at millisecond precision. For a native datetime,
//! `decode(encode(v)) == v`, and `encode(decode(encode(v))) == encode(v)` for any accepted
//! input, so a value read back from the store can be fed into a filter and match the stored
//! encoding. Entities that keep datetimes as RFC 3339 strings are served by
//! [`datetimes_as_rfc3339`], which renders decoded datetimes in that shape.

use bson::{Binary, Bson, DateTime, Document, Uuid, spec::BinarySubtype};
use chrono::{SecondsFormat, Utc};
use std::fmt;

use crate::{
    descriptor::EntityDescriptor,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Wire name of the primary-key field.
pub const ID_FIELD: &str = "_id";

/// The declared kind of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Binary identifier, stored as a 16 byte UUID binary.
    Id,
    /// UTF-8 string.
    String,
    /// 32 or 64 bit integer.
    Integer,
    /// Floating point number.
    Float,
    /// Boolean flag.
    Boolean,
    /// UTC instant, stored as the engine's native millisecond datetime.
    DateTime,
    /// Nested or opaque value, passed through without interpretation.
    Any,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Id => "id",
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::DateTime => "datetime",
            FieldKind::Any => "any",
        };

        f.write_str(name)
    }
}

impl FieldKind {
    /// Converts a value-form value into its wire encoding.
    ///
    /// `Null` is preserved for every kind. Scalar kinds are passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::TypeMismatch`] when an `Id` or `DateTime` value cannot be
    /// interpreted as such.
    pub fn encode(&self, field: &str, value: Bson) -> DocumentStoreResult<Bson> {
        match (self, value) {
            (_, Bson::Null) => Ok(Bson::Null),
            (FieldKind::Id, Bson::Binary(binary)) if is_uuid_binary(&binary) => {
                Ok(Bson::Binary(Binary { subtype: BinarySubtype::Uuid, bytes: binary.bytes }))
            }
            (FieldKind::Id, Bson::String(value)) => Uuid::parse_str(&value)
                .map(Bson::from)
                .map_err(|_| mismatch(field, *self, &Bson::String(value))),
            (FieldKind::Id, other) => Err(mismatch(field, *self, &other)),
            (FieldKind::DateTime, Bson::DateTime(value)) => Ok(Bson::DateTime(value)),
            (FieldKind::DateTime, Bson::String(value)) => {
                chrono::DateTime::parse_from_rfc3339(&value)
                    .map(|parsed| Bson::DateTime(DateTime::from_chrono(parsed.with_timezone(&Utc))))
                    .map_err(|_| mismatch(field, *self, &Bson::String(value)))
            }
            (FieldKind::DateTime, other) => Err(mismatch(field, *self, &other)),
            (_, other) => Ok(other),
        }
    }

    /// Converts a wire-encoded value back into the value form serde reads entities from.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::TypeMismatch`] when the stored value does not have the
    /// shape the kind requires.
    pub fn decode(&self, field: &str, value: Bson) -> DocumentStoreResult<Bson> {
        match (self, value) {
            (_, Bson::Null) => Ok(Bson::Null),
            (FieldKind::Any, other) => Ok(other),
            (FieldKind::Id, Bson::Binary(binary)) if is_uuid_binary(&binary) => {
                Ok(Bson::Binary(Binary { subtype: BinarySubtype::Uuid, bytes: binary.bytes }))
            }
            (FieldKind::DateTime, value @ Bson::DateTime(_)) => Ok(value),
            (FieldKind::String, value @ Bson::String(_)) => Ok(value),
            (FieldKind::Integer, value @ (Bson::Int32(_) | Bson::Int64(_))) => Ok(value),
            (FieldKind::Float, value @ (Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_))) => {
                Ok(value)
            }
            (FieldKind::Boolean, value @ Bson::Boolean(_)) => Ok(value),
            (_, other) => Err(mismatch(field, *self, &other)),
        }
    }
}

fn is_uuid_binary(binary: &Binary) -> bool {
    binary.bytes.len() == 16
        && matches!(binary.subtype, BinarySubtype::Uuid | BinarySubtype::UuidOld | BinarySubtype::Generic)
}

fn mismatch(field: &str, expected: FieldKind, found: &Bson) -> DocumentStoreError {
    DocumentStoreError::TypeMismatch {
        field: field.to_string(),
        expected,
        found: format!("{:?}", found.element_type()),
    }
}

/// Encodes a value-form record into a wire document.
///
/// Every key must be a declared field. The primary key is written under [`ID_FIELD`].
pub fn encode_document(
    descriptor: &EntityDescriptor,
    values: Document,
) -> DocumentStoreResult<Document> {
    let mut encoded = Document::new();

    for (name, value) in values {
        let kind = descriptor
            .kind_of(&name)
            .ok_or_else(|| {
                DocumentStoreError::UnknownField(name.clone(), descriptor.collection().to_string())
            })?;

        encoded.insert(descriptor.wire_name(&name), kind.encode(&name, value)?);
    }

    Ok(encoded)
}

/// Renders every decoded datetime field of `values` as an RFC 3339 string with millisecond
/// precision, the shape `chrono::DateTime<Utc>`'s serde impl reads.
///
/// Returns `None` when `values` holds no native datetime, so there is nothing to render.
pub fn datetimes_as_rfc3339(descriptor: &EntityDescriptor, values: &Document) -> Option<Document> {
    let mut rendered = values.clone();
    let mut changed = false;

    for field in descriptor.fields() {
        if field.kind != FieldKind::DateTime {
            continue;
        }

        if let Some(Bson::DateTime(value)) = values.get(&field.name) {
            let text = value
                .to_chrono()
                .to_rfc3339_opts(SecondsFormat::Millis, true);
            rendered.insert(field.name.clone(), Bson::String(text));
            changed = true;
        }
    }

    changed.then_some(rendered)
}

/// Decodes a wire document into the value form of the descriptor's entity type.
///
/// Declared fields are emitted in declaration order. Fields the descriptor does not know
/// about, such as a driver-assigned `_id` on an entity without a primary key, are dropped.
pub fn decode_document(
    descriptor: &EntityDescriptor,
    mut wire: Document,
) -> DocumentStoreResult<Document> {
    let mut decoded = Document::new();

    for field in descriptor.fields() {
        if let Some(value) = wire.remove(descriptor.wire_name(&field.name)) {
            decoded.insert(field.name.clone(), field.kind.decode(&field.name, value)?);
        }
    }

    Ok(decoded)
}
