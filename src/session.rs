//! The session accumulator: chainable filters, CRUD execution and
//! transaction control.
//!
//! A [`Session`] represents one logical request. Chainable calls mutate it
//! in place and return `&mut Self`; terminal calls execute against the
//! store and deposit their outcome (error, affected count, update result)
//! on the session for the caller to inspect. Filter/query calls and
//! terminal operations check the session's existing error first and
//! short-circuit without side effects, so a chain behaves as a fail-fast,
//! first-error-wins pipeline. [`Session::with_timeout`] and the transaction
//! finalizers [`Session::commit`] and [`Session::rollback`] are exempt:
//! cleanup must run even after a failed operation.
//!
//! A session is single-owner by design: it is `Send` but holds mutable
//! request state, so concurrent callers must each open their own via
//! [`OrmClient::session`].
//!
//! ```rust,ignore
//! let mut session = client.session();
//! session.preload("customer");
//! session.first(&mut order, Some(&id_hex)).await;
//! session.result()?;
//! ```

use std::future::Future;
use std::time::Duration;

use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::ClientSession;
use mongodb::results::UpdateResult;
use tracing::{debug, warn};

use crate::client::OrmClient;
use crate::document;
use crate::error::{OrmError, OrmResult};
use crate::filter;
use crate::id;
use crate::model::Model;
use crate::relations::{self, RelationContext};

/// A mutable accumulator for one logical request against the store.
pub struct Session {
    client: OrmClient,
    filter: Option<Document>,
    projection: Option<Vec<String>>,
    preloads: Vec<String>,
    collection: Option<String>,
    op_timeout: Duration,
    error: Option<OrmError>,
    rows_affected: u64,
    update_result: Option<UpdateResult>,
    tx: Option<ClientSession>,
    in_tx: bool,
}

impl Session {
    /// Create a session bound to the client's database.
    pub fn new(client: OrmClient) -> Self {
        let op_timeout = client.config().op_timeout;
        Self {
            client,
            filter: None,
            projection: None,
            preloads: Vec::new(),
            collection: None,
            op_timeout,
            error: None,
            rows_affected: 0,
            update_result: None,
            tx: None,
            in_tx: false,
        }
    }

    // ----- observables -----

    /// The first error recorded by the chain, if any.
    pub fn error(&self) -> Option<&OrmError> {
        self.error.as_ref()
    }

    /// Take the recorded error, resetting the session's error state.
    pub fn take_error(&mut self) -> Option<OrmError> {
        self.error.take()
    }

    /// Convert the session's error state into a `Result`, taking the error.
    pub fn result(&mut self) -> OrmResult<()> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of documents affected by the last delete/replace.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Outcome of the last partial update.
    pub fn update_result(&self) -> Option<&UpdateResult> {
        self.update_result.as_ref()
    }

    /// Whether a transaction is currently active.
    pub fn in_transaction(&self) -> bool {
        self.in_tx
    }

    // ----- chainables -----

    /// Set the pending filter from a query expression.
    ///
    /// Understands the literal `"id = ?"` with one string argument and
    /// `{`-prefixed JSON filter objects; see [`filter::parse_expr`] for the
    /// strictness behavior of other expressions.
    pub fn where_expr(&mut self, expr: &str, args: &[Bson]) -> &mut Self {
        if self.has_error() {
            return self;
        }
        match filter::parse_expr(expr, args, self.client.config().strictness) {
            Ok(Some(parsed)) => self.filter = Some(parsed),
            Ok(None) => {}
            Err(err) => self.set_error(err),
        }
        self
    }

    /// Set the pending filter from a pre-built filter document.
    pub fn filter(&mut self, filter: Document) -> &mut Self {
        if self.has_error() {
            return self;
        }
        self.filter = Some(filter);
        self
    }

    /// Pre-bind the collection `T` maps to; consulted by [`Session::updates`].
    pub fn model<T: Model>(&mut self) -> &mut Self {
        if self.has_error() {
            return self;
        }
        self.collection = Some(T::collection_name());
        self
    }

    /// Restrict the next [`Session::updates`] to the given persisted field
    /// names.
    pub fn select(&mut self, fields: &[&str]) -> &mut Self {
        if self.has_error() {
            return self;
        }
        self.projection = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Request a relation to be resolved after the next fetch. Names
    /// accumulate and are cleared once applied.
    pub fn preload(&mut self, name: &str) -> &mut Self {
        if self.has_error() {
            return self;
        }
        self.preloads.push(name.to_string());
        self
    }

    /// Override the per-operation deadline for this session.
    pub fn with_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.op_timeout = timeout;
        self
    }

    // ----- transaction controller -----

    /// Begin a store-level session and transaction. Failure is recorded as
    /// the session error; beginning while one is active is a no-op.
    pub async fn begin(&mut self) -> &mut Self {
        if self.has_error() || self.in_tx {
            return self;
        }

        let started = async {
            let mut tx = self.client.start_session().await?;
            tx.start_transaction(None)
                .await
                .map_err(OrmError::from_store)?;
            Ok::<_, OrmError>(tx)
        }
        .await;

        match started {
            Ok(tx) => {
                debug!("transaction started");
                self.tx = Some(tx);
                self.in_tx = true;
            }
            Err(err) => self.set_error(err),
        }
        self
    }

    /// Commit the active transaction and end the underlying session.
    /// Calling without an active transaction is a safe no-op.
    pub async fn commit(&mut self) -> &mut Self {
        if let Some(mut tx) = self.tx.take() {
            if self.in_tx {
                if let Err(err) = tx.commit_transaction().await {
                    self.set_error(OrmError::from_store(err));
                }
            }
            self.in_tx = false;
        }
        self
    }

    /// Abort the active transaction and end the underlying session.
    /// Calling without an active transaction is a safe no-op.
    pub async fn rollback(&mut self) -> &mut Self {
        if let Some(mut tx) = self.tx.take() {
            if self.in_tx {
                if let Err(err) = tx.abort_transaction().await {
                    self.set_error(OrmError::from_store(err));
                }
            }
            self.in_tx = false;
        }
        self
    }

    // ----- terminal operations -----

    /// Fetch a single document into `out`, filtered by the explicit `id`
    /// when given, else by the pending filter.
    ///
    /// Zero matches record [`OrmError::NotFound`]. Requested preloads are
    /// resolved into the fetched document.
    pub async fn first<T: Model>(&mut self, out: &mut T, id: Option<&str>) -> &mut Self {
        if self.has_error() {
            self.preloads.clear();
            return self;
        }

        let query = match self.resolve_filter(id) {
            Ok(query) => query,
            Err(err) => {
                self.set_error(err);
                self.preloads.clear();
                return self;
            }
        };

        debug!(collection = %T::collection_name(), "find one");
        let collection = self.client.collection_for::<T>();
        let fetched = self
            .bounded(async {
                collection
                    .find_one(query, None)
                    .await
                    .map_err(OrmError::from_store)
            })
            .await;

        match fetched {
            Ok(Some(value)) => {
                *out = value;
                self.apply_preloads(std::slice::from_mut(out)).await;
            }
            Ok(None) => {
                self.set_error(OrmError::not_found(T::MODEL_NAME));
                self.preloads.clear();
            }
            Err(err) => {
                self.set_error(err);
                self.preloads.clear();
            }
        }
        self
    }

    /// Fetch all documents matching `query` (or the pending filter, or
    /// everything) into `out`.
    ///
    /// `out` is always set; zero matches leave it empty rather than absent.
    /// Requested preloads are resolved per returned document.
    pub async fn find<T: Model>(&mut self, out: &mut Vec<T>, query: Option<Document>) -> &mut Self {
        if self.has_error() {
            self.preloads.clear();
            return self;
        }

        let query = match query {
            Some(supplied) => {
                self.filter = None;
                supplied
            }
            None => self.filter.take().unwrap_or_default(),
        };

        debug!(collection = %T::collection_name(), "find many");
        let collection = self.client.collection_for::<T>();
        let fetched = self
            .bounded(async {
                let cursor = collection
                    .find(query, None)
                    .await
                    .map_err(OrmError::from_store)?;
                cursor.try_collect().await.map_err(OrmError::from_store)
            })
            .await;

        match fetched {
            Ok(values) => {
                *out = values;
                self.apply_preloads(out.as_mut_slice()).await;
            }
            Err(err) => {
                out.clear();
                self.set_error(err);
                self.preloads.clear();
            }
        }
        self
    }

    /// Insert `doc`, then re-fetch it by its generated identifier so
    /// server-assigned fields are visible to the caller.
    pub async fn create<T: Model>(&mut self, doc: &mut T) -> &mut Self {
        if self.has_error() {
            return self;
        }

        doc.before_create();

        debug!(collection = %T::collection_name(), "insert one");
        let collection = self.client.collection_for::<T>();
        let created = self
            .bounded(async {
                let inserted = collection
                    .insert_one(&*doc, None)
                    .await
                    .map_err(OrmError::from_store)?;

                let oid = match inserted.inserted_id {
                    Bson::ObjectId(oid) => oid,
                    other => {
                        return Err(OrmError::cast(format!(
                            "inserted id is not an ObjectId: {:?}",
                            other
                        )));
                    }
                };

                collection
                    .find_one(doc! { "_id": oid }, None)
                    .await
                    .map_err(OrmError::from_store)?
                    .ok_or_else(|| OrmError::not_found(T::MODEL_NAME))
            })
            .await;

        self.filter = None;
        match created {
            Ok(value) => *doc = value,
            Err(err) => self.set_error(err),
        }
        self
    }

    /// Replace the stored document keyed by `doc`'s identifier.
    ///
    /// Fails with a validation error, without touching the store, when the
    /// identifier is absent or zero.
    pub async fn save<T: Model>(&mut self, doc: &mut T) -> &mut Self {
        if self.has_error() {
            return self;
        }

        let oid = match doc.id().filter(|oid| !id::is_zero(oid)) {
            Some(oid) => oid,
            None => {
                self.set_error(OrmError::validation(
                    "document must carry a valid, non-zero id to be saved",
                ));
                return self;
            }
        };

        doc.before_save();

        debug!(collection = %T::collection_name(), id = %oid, "replace one");
        let collection = self.client.collection_for::<T>();
        let replaced = self
            .bounded(async {
                collection
                    .replace_one(doc! { "_id": oid }, &*doc, None)
                    .await
                    .map_err(OrmError::from_store)
            })
            .await;

        match replaced {
            Ok(result) => self.rows_affected = result.modified_count,
            Err(err) => self.set_error(err),
        }
        self
    }

    /// Delete one document, keyed by the explicit `id`, the pending filter
    /// or `doc`'s own identifier, in that order.
    ///
    /// The soft-deletion timestamp is stamped on `doc`, then a physical
    /// delete is issued; deleting a non-existent document records a zero
    /// affected count and no error.
    pub async fn delete<T: Model>(&mut self, doc: &mut T, id: Option<&str>) -> &mut Self {
        if self.has_error() {
            return self;
        }

        let query = match self.resolve_delete_filter(doc, id) {
            Ok(query) => query,
            Err(err) => {
                self.set_error(err);
                return self;
            }
        };

        doc.before_delete();

        debug!(collection = %T::collection_name(), "delete one");
        let collection = self.client.collection_for::<T>();
        let deleted = self
            .bounded(async {
                collection
                    .delete_one(query, None)
                    .await
                    .map_err(OrmError::from_store)
            })
            .await;

        match deleted {
            Ok(result) => self.rows_affected = result.deleted_count,
            Err(err) => self.set_error(err),
        }
        self
    }

    /// Apply a field-level `$set` update keyed by `doc`'s identifier.
    ///
    /// With a prior [`Session::select`], only the selected persisted field
    /// names are written; otherwise the whole document is serialized and
    /// overwritten field by field (not a replace). The identifier is never
    /// part of the update document.
    pub async fn updates<T: Model>(&mut self, doc: &mut T) -> &mut Self {
        if self.has_error() {
            return self;
        }

        let oid = match doc.id().filter(|oid| !id::is_zero(oid)) {
            Some(oid) => oid,
            None => {
                self.set_error(OrmError::validation(
                    "document must carry a valid, non-zero id to be updated",
                ));
                self.projection = None;
                return self;
            }
        };

        doc.before_save();

        let full = match document::to_document(doc) {
            Ok(full) => full,
            Err(err) => {
                self.set_error(err);
                self.projection = None;
                return self;
            }
        };

        let mut set_doc = match self.projection.take() {
            Some(fields) => {
                let mut selected = Document::new();
                for field in fields {
                    match full.get(&field) {
                        Some(value) => {
                            selected.insert(field, value.clone());
                        }
                        None if self.client.config().strictness.is_strict() => {
                            self.set_error(OrmError::validation(format!(
                                "selected field '{}' is not present on {}",
                                field,
                                T::MODEL_NAME
                            )));
                            return self;
                        }
                        None => {
                            warn!(field = %field, "selected field absent from document, skipping");
                        }
                    }
                }
                selected
            }
            None => full,
        };

        set_doc.remove("_id");

        let name = self
            .collection
            .take()
            .unwrap_or_else(T::collection_name);
        debug!(collection = %name, id = %oid, "update one");
        let collection = self.client.collection_doc(&name);
        let updated = self
            .bounded(async {
                collection
                    .update_one(doc! { "_id": oid }, doc! { "$set": set_doc }, None)
                    .await
                    .map_err(OrmError::from_store)
            })
            .await;

        match updated {
            Ok(result) => self.update_result = Some(result),
            Err(err) => self.set_error(err),
        }
        self
    }

    // ----- internals -----

    fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// First error wins.
    fn set_error(&mut self, err: OrmError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Resolve the query for a fetch: explicit id beats the pending filter,
    /// which is consumed either way.
    fn resolve_filter(&mut self, id: Option<&str>) -> OrmResult<Document> {
        let pending = self.filter.take();
        match id.filter(|text| !text.is_empty()) {
            Some(text) => filter::filter_from_id(text),
            None => Ok(pending.unwrap_or_default()),
        }
    }

    /// Resolve the query for a delete: explicit id, else pending filter,
    /// else the document's own identifier.
    fn resolve_delete_filter<T: Model>(
        &mut self,
        doc: &T,
        id: Option<&str>,
    ) -> OrmResult<Document> {
        let pending = self.filter.take();
        if let Some(text) = id.filter(|text| !text.is_empty()) {
            return filter::filter_from_id(text);
        }
        if let Some(query) = pending {
            return Ok(query);
        }
        match doc.id().filter(|oid| !id::is_zero(oid)) {
            Some(oid) => Ok(doc! { "_id": oid }),
            None => Err(OrmError::validation(
                "document must carry a valid, non-zero id for deletion",
            )),
        }
    }

    /// Bound a store operation by the session's deadline.
    async fn bounded<T>(&self, fut: impl Future<Output = OrmResult<T>>) -> OrmResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(OrmError::timed_out(self.op_timeout)),
        }
    }

    /// Resolve pending preloads into each fetched document, then clear the
    /// pending list. A failure stops processing but leaves documents that
    /// were already fully preloaded intact.
    async fn apply_preloads<T: Model>(&mut self, docs: &mut [T]) {
        if self.preloads.is_empty() || self.has_error() {
            self.preloads.clear();
            return;
        }

        let names = std::mem::take(&mut self.preloads);
        let client = self.client.clone();
        let ctx = RelationContext {
            database: client.database(),
            timeout: client.config().preload_timeout,
            strictness: client.config().strictness,
        };

        for doc in docs.iter_mut() {
            if let Err(err) = relations::resolve(doc, &names, &ctx).await {
                self.set_error(err);
                break;
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("filter", &self.filter)
            .field("projection", &self.projection)
            .field("preloads", &self.preloads)
            .field("error", &self.error)
            .field("rows_affected", &self.rows_affected)
            .field("in_tx", &self.in_tx)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentMeta;
    use bson::oid::ObjectId;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Widget {
        #[serde(flatten)]
        meta: DocumentMeta,
        name: String,
    }

    impl Model for Widget {
        const MODEL_NAME: &'static str = "Widget";

        fn meta(&self) -> &DocumentMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut DocumentMeta {
            &mut self.meta
        }
    }

    /// Builds a client without contacting any server; tests below only
    /// exercise paths that never reach the store.
    async fn test_client() -> OrmClient {
        OrmClient::builder()
            .uri("mongodb://localhost:27017")
            .database("documap_test")
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_where_expr_sets_id_filter() {
        let client = test_client().await;
        let mut session = client.session();

        let oid = ObjectId::new();
        session.where_expr("id = ?", &[Bson::String(oid.to_hex())]);

        assert!(session.error().is_none());
        assert_eq!(
            session.filter.as_ref().unwrap().get_object_id("_id").unwrap(),
            oid
        );
    }

    #[tokio::test]
    async fn test_where_expr_records_invalid_id() {
        let client = test_client().await;
        let mut session = client.session();

        session.where_expr("id = ?", &[Bson::String("garbage".into())]);
        assert!(session.error().unwrap().is_invalid_id());
    }

    #[tokio::test]
    async fn test_where_expr_unknown_is_noop_when_lenient() {
        let client = test_client().await;
        let mut session = client.session();

        session.where_expr("name LIKE ?", &[Bson::String("x".into())]);
        assert!(session.error().is_none());
        assert!(session.filter.is_none());
    }

    #[tokio::test]
    async fn test_chain_preserves_first_error() {
        let client = test_client().await;
        let mut session = client.session();

        // Call 1 fails; later chained calls must not touch the store and
        // must not replace the error.
        session.where_expr("id = ?", &[Bson::String("garbage".into())]);
        assert!(session.error().unwrap().is_invalid_id());

        let mut widget = Widget::default();
        widget.set_id(ObjectId::new());

        session.select(&["name"]);
        session.preload("anything");
        session.save(&mut widget).await;
        session.updates(&mut widget).await;
        session.delete(&mut widget, None).await;

        assert!(session.error().unwrap().is_invalid_id());
        assert_eq!(session.rows_affected(), 0);
        // The failing chain never stamped the document.
        assert!(widget.meta.updated_at.is_none());
        assert!(widget.meta.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_save_requires_non_zero_id() {
        let client = test_client().await;
        let mut session = client.session();

        let mut widget = Widget::default();
        session.save(&mut widget).await;
        assert!(session.error().unwrap().is_validation());
        // No hook ran, no store mutation was attempted.
        assert!(widget.meta.updated_at.is_none());

        let mut session = client.session();
        let mut widget = Widget::default();
        widget.set_id(crate::id::zero());
        session.save(&mut widget).await;
        assert!(session.error().unwrap().is_validation());
    }

    #[tokio::test]
    async fn test_updates_requires_non_zero_id() {
        let client = test_client().await;
        let mut session = client.session();

        let mut widget = Widget::default();
        session.select(&["name"]).updates(&mut widget).await;
        assert!(session.error().unwrap().is_validation());
        // The projection is consumed even on failure.
        assert!(session.projection.is_none());
    }

    #[tokio::test]
    async fn test_delete_requires_some_identity() {
        let client = test_client().await;
        let mut session = client.session();

        let mut widget = Widget::default();
        session.delete(&mut widget, None).await;
        assert!(session.error().unwrap().is_validation());
    }

    #[tokio::test]
    async fn test_delete_rejects_malformed_explicit_id() {
        let client = test_client().await;
        let mut session = client.session();

        let mut widget = Widget::default();
        session.delete(&mut widget, Some("nope")).await;
        assert!(session.error().unwrap().is_invalid_id());
    }

    #[tokio::test]
    async fn test_commit_and_rollback_are_idempotent_without_tx() {
        let client = test_client().await;
        let mut session = client.session();

        session.commit().await;
        session.rollback().await;
        assert!(session.error().is_none());
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn test_result_takes_error() {
        let client = test_client().await;
        let mut session = client.session();

        session.where_expr("id = ?", &[Bson::String("garbage".into())]);
        assert!(session.result().is_err());
        assert!(session.result().is_ok());
    }

    #[tokio::test]
    async fn test_chainables_accumulate_state() {
        let client = test_client().await;
        let mut session = client.session();

        session
            .filter(doc! { "name": "gear" })
            .select(&["name"])
            .preload("parts")
            .preload("owner")
            .with_timeout(Duration::from_secs(3));

        assert_eq!(session.preloads, vec!["parts", "owner"]);
        assert_eq!(session.projection.as_deref(), Some(&["name".to_string()][..]));
        assert_eq!(session.op_timeout, Duration::from_secs(3));
        assert!(session.filter.is_some());
    }

    #[tokio::test]
    async fn test_model_binds_collection() {
        let client = test_client().await;
        let mut session = client.session();

        session.model::<Widget>();
        assert_eq!(session.collection.as_deref(), Some("widgets"));
    }
}
