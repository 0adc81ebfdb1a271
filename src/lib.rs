//! # documap
//!
//! A typed document-mapping layer for MongoDB: application code manipulates
//! documents through typed structures and a chainable session instead of
//! raw BSON trees.
//!
//! This crate provides:
//! - A [`Model`] capability trait mapping a type to its collection, base
//!   fields and lifecycle hooks
//! - A chainable [`Session`] accumulator for filters, projections and
//!   preloads, terminated by CRUD operations
//! - Typed relation descriptors with single-hop eager loading ("preload")
//! - Per-operation deadlines and session-scoped transactions
//!
//! ## Example
//!
//! ```rust,ignore
//! use documap::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Order {
//!     #[serde(flatten)]
//!     meta: DocumentMeta,
//!     item: String,
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     customer_id: Option<ObjectId>,
//!     #[serde(skip)]
//!     customer: Option<Customer>,
//! }
//!
//! impl Model for Order {
//!     const MODEL_NAME: &'static str = "Order";
//!
//!     fn meta(&self) -> &DocumentMeta { &self.meta }
//!     fn meta_mut(&mut self) -> &mut DocumentMeta { &mut self.meta }
//!
//!     fn relations() -> Vec<Relation<Self>> {
//!         vec![Relation::belongs_to::<Customer>(
//!             "customer",
//!             |o| o.customer_id,
//!             |o, c| o.customer = Some(c),
//!         )]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), documap::OrmError> {
//!     let client = OrmClient::builder()
//!         .uri("mongodb://localhost:27017")
//!         .database("shop")
//!         .build()
//!         .await?;
//!
//!     let mut order = Order::default();
//!     let mut session = client.session();
//!     session.preload("customer");
//!     session.first(&mut order, Some("65f0a1b2c3d4e5f6a7b8c9d0")).await;
//!     session.result()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Known limitations
//!
//! - Default collection naming appends a plain `"s"`; override
//!   [`Model::COLLECTION`] for irregular nouns.
//! - The `where_expr` mini-language understands only `"id = ?"` and JSON
//!   filter objects; other expressions are skipped under
//!   [`Strictness::Lenient`] (the default) and rejected under
//!   [`Strictness::Strict`].

pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod id;
pub mod model;
pub mod relations;
pub mod session;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};
pub use client::{OrmClient, OrmClientBuilder};
pub use config::{OrmConfig, OrmConfigBuilder, Strictness};
pub use document::DocumentMeta;
pub use error::{OrmError, OrmResult};
pub use filter::FilterBuilder;
pub use model::Model;
pub use relations::{Relation, RelationKind};
pub use session::Session;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{OrmClient, OrmClientBuilder};
    pub use crate::config::{OrmConfig, OrmConfigBuilder, Strictness};
    pub use crate::document::DocumentMeta;
    pub use crate::error::{OrmError, OrmResult};
    pub use crate::filter::FilterBuilder;
    pub use crate::model::Model;
    pub use crate::relations::{Relation, RelationKind};
    pub use crate::session::Session;
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
