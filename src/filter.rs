//! Filter building utilities and the query-expression mini-language.

use bson::{Bson, Document, doc, oid::ObjectId};

use crate::config::Strictness;
use crate::error::{OrmError, OrmResult};
use crate::id;

/// Builder for MongoDB filter documents.
///
/// # Example
///
/// ```rust,ignore
/// use documap::FilterBuilder;
///
/// let filter = FilterBuilder::new()
///     .eq("status", "active")
///     .eq("region", "eu")
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    doc: Document,
}

impl FilterBuilder {
    /// Create a new empty filter builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter builder from an existing document.
    pub fn from_doc(doc: Document) -> Self {
        Self { doc }
    }

    /// Add an equality condition.
    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.doc.insert(field, value.into());
        self
    }

    /// Add an ObjectId filter on the `_id` field.
    pub fn by_id(mut self, id: ObjectId) -> Self {
        self.doc.insert("_id", id);
        self
    }

    /// Add an ObjectId filter from an external hex identifier.
    pub fn by_id_str(self, id: &str) -> OrmResult<Self> {
        let oid = id::parse_object_id(id)?;
        Ok(self.by_id(oid))
    }

    /// Combine with AND ($and).
    pub fn and(mut self, conditions: Vec<Document>) -> Self {
        self.doc.insert("$and", conditions);
        self
    }

    /// Combine with OR ($or).
    pub fn or(mut self, conditions: Vec<Document>) -> Self {
        self.doc.insert("$or", conditions);
        self
    }

    /// Merge another filter into this one.
    pub fn merge(mut self, other: Document) -> Self {
        for (k, v) in other {
            self.doc.insert(k, v);
        }
        self
    }

    /// Build the filter document.
    pub fn build(self) -> Document {
        self.doc
    }

    /// Check if the filter is empty.
    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }
}

/// Create an empty filter (matches all documents).
pub fn all() -> Document {
    doc! {}
}

/// Build a single-key identifier-equality filter from an external hex id.
pub fn filter_from_id(text: &str) -> OrmResult<Document> {
    let oid = id::parse_object_id(text)?;
    Ok(doc! { "_id": oid })
}

/// Parse a query expression into a filter document.
///
/// Two forms are understood:
///
/// - the literal `"id = ?"` with one string argument, producing an `_id`
///   equality filter;
/// - a `{`-prefixed JSON object, parsed as a raw filter document.
///
/// Any other expression is a known gap: under [`Strictness::Lenient`] it
/// yields `Ok(None)` and leaves the pending filter unchanged; under
/// [`Strictness::Strict`] it is a validation error.
pub fn parse_expr(
    expr: &str,
    args: &[Bson],
    strictness: Strictness,
) -> OrmResult<Option<Document>> {
    let expr = expr.trim();

    if expr == "id = ?" {
        let Some(Bson::String(text)) = args.first() else {
            return Err(OrmError::validation("id argument must be a string"));
        };
        return filter_from_id(text).map(Some);
    }

    if expr.starts_with('{') {
        let filter: Document = serde_json::from_str(expr)
            .map_err(|e| OrmError::validation(format!("invalid filter JSON: {}", e)))?;
        return Ok(Some(filter));
    }

    if strictness.is_strict() {
        return Err(OrmError::validation(format!(
            "unsupported filter expression: {}",
            expr
        )));
    }

    Ok(None)
}
