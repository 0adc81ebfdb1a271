//! Document base fields and BSON conversion helpers.

use bson::oid::ObjectId;
use bson::{DateTime, Document};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::OrmResult;

/// Base fields carried by every persisted entity.
///
/// Embed into a model with `#[serde(flatten)]`:
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Customer {
///     #[serde(flatten)]
///     meta: DocumentMeta,
///     name: String,
/// }
/// ```
///
/// The identifier is absent until first insert and never changes once
/// assigned. Timestamps are monotonically non-decreasing across lifecycle
/// events for the same document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Unique identifier, assigned by the store on first insert.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Creation timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
    /// Last-updated timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
    /// Soft-deletion timestamp, absent unless soft-deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,
}

impl DocumentMeta {
    /// Create empty metadata for a not-yet-persisted document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the document has a persisted identity.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some_and(|id| !crate::id::is_zero(&id))
    }

    /// Stamp creation: sets creation and update timestamps to now.
    pub fn stamp_created(&mut self) {
        let now = DateTime::now();
        self.created_at = Some(now);
        self.updated_at = Some(now);
    }

    /// Stamp an update: sets the update timestamp to now.
    pub fn stamp_updated(&mut self) {
        self.updated_at = Some(DateTime::now());
    }

    /// Stamp a deletion: sets the soft-deletion timestamp to now.
    pub fn stamp_deleted(&mut self) {
        self.deleted_at = Some(DateTime::now());
    }
}

/// Convert a structure to a BSON document.
pub fn to_document<T: Serialize>(value: &T) -> OrmResult<Document> {
    Ok(bson::to_document(value)?)
}

/// Convert a BSON document to a structure.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> OrmResult<T> {
    Ok(bson::from_document(doc)?)
}
