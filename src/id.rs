//! Identifier codec over BSON ObjectIds.
//!
//! External identifiers are 24-character hex strings; the internal form is
//! the 12-byte [`ObjectId`]. The all-zero id marks a document that has not
//! been persisted yet.

use bson::oid::ObjectId;

use crate::error::OrmResult;

/// Parse an external hex identifier into an [`ObjectId`].
///
/// Fails with [`OrmError::InvalidId`](crate::OrmError::InvalidId) when the
/// text is not a well-formed 24-character hex string. Never panics.
pub fn parse_object_id(text: &str) -> OrmResult<ObjectId> {
    Ok(ObjectId::parse_str(text)?)
}

/// Encode an [`ObjectId`] into its external hex form.
pub fn encode(id: &ObjectId) -> String {
    id.to_hex()
}

/// The unassigned identifier.
pub fn zero() -> ObjectId {
    ObjectId::from_bytes([0u8; 12])
}

/// Check whether an identifier is unassigned.
///
/// Used to reject save/update operations on documents lacking a persisted
/// identity.
pub fn is_zero(id: &ObjectId) -> bool {
    id.bytes() == [0u8; 12]
}
