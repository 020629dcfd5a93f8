//! Infrastructure layer: user/track stores and the bookmark page resolver built on them.

pub mod resolver;
pub mod store;

pub use resolver::{BookmarkResolver, ResolveError};
pub use store::{StoreError, TrackStore, UserStore};
