//! Relation descriptors and the preload engine.
//!
//! A relation is declared once per model as a typed descriptor naming the
//! relation, its kind and how to read/assign the involved fields. The
//! session resolves requested relation names against these descriptors
//! after a fetch, issuing one bounded secondary query per relation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::Database;
use tokio::time::timeout;
use tracing::debug;

use crate::config::Strictness;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;

/// Kind of relation between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// The owning document is referenced by many related documents through
    /// a foreign-key field on the related collection.
    HasMany,
    /// The owning document holds the identifier of one related document.
    BelongsTo,
}

/// Execution context handed to relation loaders.
pub struct RelationContext<'a> {
    /// Database the secondary query runs against.
    pub database: &'a Database,
    /// Deadline for this relation's secondary fetch.
    pub timeout: Duration,
    /// Misuse handling mode.
    pub strictness: Strictness,
}

#[async_trait]
trait RelationLoader<T: Model>: Send + Sync {
    async fn load(&self, owner: &mut T, ctx: &RelationContext<'_>) -> OrmResult<()>;
}

/// A typed relation descriptor for an owning model `T`.
///
/// Built by [`Relation::has_many`] and [`Relation::belongs_to`] inside
/// [`Model::relations`].
pub struct Relation<T> {
    name: &'static str,
    kind: RelationKind,
    loader: Arc<dyn RelationLoader<T>>,
}

impl<T: Model> Relation<T> {
    /// Declare a has-many relation: fetch every `R` whose `foreign_key`
    /// field equals the owning document's identifier and assign the
    /// resulting vector.
    ///
    /// # Panics
    ///
    /// Panics at declaration time when `name` or `foreign_key` is empty, so
    /// a misconfigured relation fails where it is declared rather than
    /// silently at query time.
    pub fn has_many<R: Model>(
        name: &'static str,
        foreign_key: &'static str,
        assign: fn(&mut T, Vec<R>),
    ) -> Self {
        assert!(!name.is_empty(), "relation name must not be empty");
        assert!(!foreign_key.is_empty(), "foreign key must not be empty");

        Self {
            name,
            kind: RelationKind::HasMany,
            loader: Arc::new(HasManyLoader {
                foreign_key,
                assign,
            }),
        }
    }

    /// Declare a belongs-to relation: read the related identifier from the
    /// owning document via `local_key`, fetch the single related document
    /// by id and assign it.
    ///
    /// # Panics
    ///
    /// Panics at declaration time when `name` is empty.
    pub fn belongs_to<R: Model>(
        name: &'static str,
        local_key: fn(&T) -> Option<ObjectId>,
        assign: fn(&mut T, R),
    ) -> Self {
        assert!(!name.is_empty(), "relation name must not be empty");

        Self {
            name,
            kind: RelationKind::BelongsTo,
            loader: Arc::new(BelongsToLoader { local_key, assign }),
        }
    }

    /// Name of the relation, matched against `preload(..)` requests.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Kind of the relation.
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Resolve this relation into the owning document.
    pub async fn load(&self, owner: &mut T, ctx: &RelationContext<'_>) -> OrmResult<()> {
        self.loader.load(owner, ctx).await
    }
}

impl<T> std::fmt::Debug for Relation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

struct HasManyLoader<T, R> {
    foreign_key: &'static str,
    assign: fn(&mut T, Vec<R>),
}

#[async_trait]
impl<T: Model, R: Model> RelationLoader<T> for HasManyLoader<T, R> {
    async fn load(&self, owner: &mut T, ctx: &RelationContext<'_>) -> OrmResult<()> {
        let Some(owner_id) = owner.id() else {
            if ctx.strictness.is_strict() {
                return Err(OrmError::validation(format!(
                    "cannot preload {}: owning {} has no id",
                    R::collection_name(),
                    T::MODEL_NAME
                )));
            }
            return Ok(());
        };

        let collection = ctx.database.collection::<R>(&R::collection_name());
        let mut query = Document::new();
        query.insert(self.foreign_key, owner_id);

        debug!(
            collection = %R::collection_name(),
            foreign_key = self.foreign_key,
            "loading has-many relation"
        );

        let fetch = async {
            let cursor = collection
                .find(query, None)
                .await
                .map_err(OrmError::from_store)?;
            let related: Vec<R> = cursor.try_collect().await.map_err(OrmError::from_store)?;
            Ok::<_, OrmError>(related)
        };

        let related = timeout(ctx.timeout, fetch)
            .await
            .map_err(|_| OrmError::timed_out(ctx.timeout))??;

        (self.assign)(owner, related);
        Ok(())
    }
}

struct BelongsToLoader<T, R> {
    local_key: fn(&T) -> Option<ObjectId>,
    assign: fn(&mut T, R),
}

#[async_trait]
impl<T: Model, R: Model> RelationLoader<T> for BelongsToLoader<T, R> {
    async fn load(&self, owner: &mut T, ctx: &RelationContext<'_>) -> OrmResult<()> {
        let Some(related_id) = (self.local_key)(owner) else {
            if ctx.strictness.is_strict() {
                return Err(OrmError::validation(format!(
                    "cannot preload {}: {} holds no related id",
                    R::MODEL_NAME,
                    T::MODEL_NAME
                )));
            }
            return Ok(());
        };

        let collection = ctx.database.collection::<R>(&R::collection_name());

        debug!(
            collection = %R::collection_name(),
            related_id = %related_id,
            "loading belongs-to relation"
        );

        let fetch = async {
            collection
                .find_one(doc! { "_id": related_id }, None)
                .await
                .map_err(OrmError::from_store)
        };

        let found = timeout(ctx.timeout, fetch)
            .await
            .map_err(|_| OrmError::timed_out(ctx.timeout))??;

        let related = found.ok_or_else(|| OrmError::not_found(R::MODEL_NAME))?;
        (self.assign)(owner, related);
        Ok(())
    }
}

/// Resolve the requested relation names into a fetched document.
///
/// Unknown names are skipped under [`Strictness::Lenient`] and reported as
/// validation errors under [`Strictness::Strict`]. A loader failure aborts
/// the remaining names for this document.
pub(crate) async fn resolve<T: Model>(
    doc: &mut T,
    names: &[String],
    ctx: &RelationContext<'_>,
) -> OrmResult<()> {
    if names.is_empty() {
        return Ok(());
    }

    let relations = T::relations();
    for name in names {
        let Some(relation) = relations.iter().find(|r| r.name() == name.as_str()) else {
            if ctx.strictness.is_strict() {
                return Err(OrmError::validation(format!(
                    "unknown relation '{}' on {}",
                    name,
                    T::MODEL_NAME
                )));
            }
            debug!(model = T::MODEL_NAME, relation = %name, "skipping unknown relation");
            continue;
        };
        relation.load(doc, ctx).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentMeta;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Author {
        #[serde(flatten)]
        meta: DocumentMeta,
        name: String,
        #[serde(skip)]
        books: Vec<Book>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Book {
        #[serde(flatten)]
        meta: DocumentMeta,
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        author_id: Option<ObjectId>,
        #[serde(skip)]
        author: Option<Author>,
    }

    impl Model for Author {
        const MODEL_NAME: &'static str = "Author";

        fn meta(&self) -> &DocumentMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut DocumentMeta {
            &mut self.meta
        }

        fn relations() -> Vec<Relation<Self>> {
            vec![Relation::has_many::<Book>("books", "author_id", |a, books| {
                a.books = books;
            })]
        }
    }

    impl Model for Book {
        const MODEL_NAME: &'static str = "Book";

        fn meta(&self) -> &DocumentMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut DocumentMeta {
            &mut self.meta
        }

        fn relations() -> Vec<Relation<Self>> {
            vec![Relation::belongs_to::<Author>(
                "author",
                |b| b.author_id,
                |b, a| b.author = Some(a),
            )]
        }
    }

    async fn test_database() -> Database {
        let options = mongodb::options::ClientOptions::parse("mongodb://localhost:27017")
            .await
            .unwrap();
        mongodb::Client::with_options(options)
            .unwrap()
            .database("documap_test")
    }

    #[test]
    fn test_descriptor_shape() {
        let relations = Author::relations();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].name(), "books");
        assert_eq!(relations[0].kind(), RelationKind::HasMany);

        let relations = Book::relations();
        assert_eq!(relations[0].name(), "author");
        assert_eq!(relations[0].kind(), RelationKind::BelongsTo);
    }

    #[test]
    #[should_panic(expected = "foreign key must not be empty")]
    fn test_empty_foreign_key_rejected_at_declaration() {
        let _ = Relation::<Author>::has_many::<Book>("books", "", |a, books| {
            a.books = books;
        });
    }

    #[tokio::test]
    async fn test_unknown_relation_is_noop_when_lenient() {
        let database = test_database().await;
        let ctx = RelationContext {
            database: &database,
            timeout: Duration::from_secs(1),
            strictness: Strictness::Lenient,
        };

        // Never touches the store: the name does not resolve.
        let mut author = Author::default();
        let names = vec!["publisher".to_string()];
        resolve(&mut author, &names, &ctx).await.unwrap();
        assert!(author.books.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_relation_errors_when_strict() {
        let database = test_database().await;
        let ctx = RelationContext {
            database: &database,
            timeout: Duration::from_secs(1),
            strictness: Strictness::Strict,
        };

        let mut author = Author::default();
        let names = vec!["publisher".to_string()];
        let err = resolve(&mut author, &names, &ctx).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_has_many_skips_unsaved_owner_when_lenient() {
        let database = test_database().await;
        let ctx = RelationContext {
            database: &database,
            timeout: Duration::from_secs(1),
            strictness: Strictness::Lenient,
        };

        // No id on the owner, so the loader returns before querying.
        let mut author = Author::default();
        let names = vec!["books".to_string()];
        resolve(&mut author, &names, &ctx).await.unwrap();
        assert!(author.books.is_empty());
    }
}
