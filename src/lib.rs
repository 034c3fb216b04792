//! # kyrostore - a normalized, relationship-aware record store
//!
//! kyrostore keeps records of several declared types in memory, in a flat
//! normalized form where relationships are stored as ids. Every relationship
//! that names an inverse is kept consistent from both ends: setting
//! `user.posts` points each post's `author` back at the user, deleting the
//! user clears it again.
//!
//! ## Core Concepts
//!
//! - **Schema**: per-type attributes, relationship descriptors and an optional
//!   pre-normalization hook
//! - **Normalized record**: every declared field present; relationships as ids
//! - **Denormalized view**: relationships expanded into nested records, depth-capped
//! - **Background mutation**: a mutation that does not notify subscribers
//! - **Batch**: queued mutations that notify once on commit
//!
//! ## Usage
//!
//! ```rust
//! use kyrostore::{Model, Schema, Store};
//! use serde_json::json;
//!
//! let schema = Schema::new()
//!     .with_model("user", Model::new().attribute("name").has_many("posts", "post", Some("author")))
//!     .with_model("post", Model::new().attribute("message").belongs_to("author", "user", Some("posts")));
//! let store = Store::new(schema)?;
//!
//! store.set("user", &[json!({ "id": "u1", "name": "Ada", "posts": ["p1"] })])?;
//! assert_eq!(store.peek("post", "p1")?.unwrap()["author"], "u1");
//! # Ok::<(), kyrostore::StoreError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod error;
pub mod normalizer;
pub mod record;
pub mod relationship;
pub mod schema;
pub mod store;

pub use batch::{Batch, BatchOperation};
pub use error::{BoxError, ExecutionError, StoreError, StoreResult, ValidationError};
pub use normalizer::{denormalize, normalize, RecordSource, DEFAULT_MAX_DEPTH};
pub use relationship::{cardinality, Cardinality};
pub use schema::{Model, NormalizeHook, RawRecord, Relationship, RelationshipKind, Schema};
pub use store::{
    MutationOptions, Operation, Store, StoreConfig, StoreEvent, StoreStream, Subscription, SubscriptionId,
};
