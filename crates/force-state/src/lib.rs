//! force-state — the catalog store connector for FOrcE.
//!
//! Backed by [redb](https://docs.rs/redb), holds jobs, descriptors, entity
//! and FDU instance records, and the durable FIM/Cloud bindings of every
//! tenant.
//!
//! # Architecture
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{system}/{tenant}/{id}`, `{system}/{tenant}/{parent}/{id}`)
//! enable prefix scans scoped to one tenant or one parent record.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. A [`TenantStore`] is the handle a
//! tenant owns; it can be closed independently of the database.

pub mod error;
pub mod events;
pub mod store;
pub mod tables;
pub mod tenant;

pub use error::{StateError, StateResult};
pub use events::{StoreEvent, StoreEventKind};
pub use store::StateStore;
pub use tenant::TenantStore;
