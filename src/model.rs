//! The persistence capability trait.
//!
//! Instead of inspecting field names and tags at runtime, every persisted
//! type declares its capabilities once: the collection it maps to, access to
//! its base fields and the relations it can preload. Lifecycle hooks come
//! with default implementations that maintain the audit timestamps; a model
//! overrides them only when it needs extra behavior.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::document::DocumentMeta;
use crate::relations::Relation;
use bson::oid::ObjectId;

/// Capability contract for a persisted entity type.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    /// Type name used to derive the default collection name.
    const MODEL_NAME: &'static str;

    /// Explicit collection name override.
    ///
    /// The default naming below pluralizes naively; irregular nouns should
    /// set this instead.
    const COLLECTION: Option<&'static str> = None;

    /// Access the embedded base fields.
    fn meta(&self) -> &DocumentMeta;

    /// Mutably access the embedded base fields.
    fn meta_mut(&mut self) -> &mut DocumentMeta;

    /// The collection this type maps to.
    ///
    /// Defaults to the lower-cased model name with an "s" suffix. This is a
    /// deliberate simplification, not a linguistic pluralizer; override via
    /// [`Model::COLLECTION`] where it produces the wrong name.
    fn collection_name() -> String {
        match Self::COLLECTION {
            Some(name) => name.to_string(),
            None => format!("{}s", Self::MODEL_NAME.to_lowercase()),
        }
    }

    /// The document's identifier, if assigned.
    fn id(&self) -> Option<ObjectId> {
        self.meta().id
    }

    /// Assign the identifier. Called once by the layer after first insert.
    fn set_id(&mut self, id: ObjectId) {
        self.meta_mut().id = Some(id);
    }

    /// Pre-create hook: stamps creation and update timestamps.
    fn before_create(&mut self) {
        self.meta_mut().stamp_created();
    }

    /// Pre-save hook: stamps the update timestamp.
    fn before_save(&mut self) {
        self.meta_mut().stamp_updated();
    }

    /// Pre-delete hook: stamps the soft-deletion timestamp.
    fn before_delete(&mut self) {
        self.meta_mut().stamp_deleted();
    }

    /// Relations this type can preload. Descriptors are rebuilt per call;
    /// they are not cached.
    fn relations() -> Vec<Relation<Self>> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Invoice {
        #[serde(flatten)]
        meta: DocumentMeta,
        total: i64,
    }

    impl Model for Invoice {
        const MODEL_NAME: &'static str = "Invoice";

        fn meta(&self) -> &DocumentMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut DocumentMeta {
            &mut self.meta
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Person {
        #[serde(flatten)]
        meta: DocumentMeta,
    }

    impl Model for Person {
        const MODEL_NAME: &'static str = "Person";
        const COLLECTION: Option<&'static str> = Some("people");

        fn meta(&self) -> &DocumentMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut DocumentMeta {
            &mut self.meta
        }
    }

    #[test]
    fn test_default_collection_name() {
        assert_eq!(Invoice::collection_name(), "invoices");
    }

    #[test]
    fn test_collection_name_override() {
        assert_eq!(Person::collection_name(), "people");
    }

    #[test]
    fn test_create_hook_stamps_both_timestamps() {
        let mut invoice = Invoice::default();
        invoice.before_create();

        assert!(invoice.meta().created_at.is_some());
        assert_eq!(invoice.meta().created_at, invoice.meta().updated_at);
        assert!(invoice.meta().deleted_at.is_none());
    }

    #[test]
    fn test_save_hook_advances_update_only() {
        let mut invoice = Invoice::default();
        invoice.before_create();
        let created = invoice.meta().created_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        invoice.before_save();

        assert_eq!(invoice.meta().created_at, created);
        assert!(invoice.meta().updated_at > created);
    }

    #[test]
    fn test_delete_hook_stamps_deletion() {
        let mut invoice = Invoice::default();
        invoice.before_delete();
        assert!(invoice.meta().deleted_at.is_some());
    }

    #[test]
    fn test_id_accessors() {
        let mut invoice = Invoice::default();
        assert!(invoice.id().is_none());

        let id = ObjectId::new();
        invoice.set_id(id);
        assert_eq!(invoice.id(), Some(id));
    }

    #[test]
    fn test_relations_default_empty() {
        assert!(Invoice::relations().is_empty());
    }
}
