//! # dog-tus: Resumable upload protocol engine
//!
//! `dog-tus` implements the server side of the tus resumable upload protocol
//! (1.0.0) for DogRS applications. It decides what a request asks for,
//! serializes writes per upload, bounds how many bytes a request may push,
//! and drives a pluggable store. It has no HTTP server of its own; hosts hand
//! it a [`TusRequest`] and send back the [`TusResponse`] it fills in.
//!
//! ## Key Features
//!
//! - **Core protocol**: `OPTIONS`, `HEAD`, `PATCH` with offset checks
//! - **Extensions**: creation, creation-with-upload, creation-defer-length,
//!   termination, concatenation and expiration, advertised from the store
//! - **Fail-fast locking**: concurrent writes to one upload get a 409
//! - **Read budgets**: bodies larger than the declared length are cut off with a 413
//! - **tus2**: a storage facade for the token based draft protocol
//!
//! ## Quick Start
//!
//! ```rust
//! use dog_tus::prelude::*;
//! use dog_tus::headers::{TUS_RESUMABLE, UPLOAD_LENGTH};
//! use http::{HeaderValue, Method, StatusCode};
//!
//! # #[tokio::main]
//! # async fn main() -> TusResult<()> {
//! let handler = TusProtocolHandler::new(MemoryStore::new(), TusConfig::default());
//!
//! let request = TusRequest::new(Method::POST, "/files")
//!     .with_header(TUS_RESUMABLE, HeaderValue::from_static("1.0.0"))
//!     .with_header(UPLOAD_LENGTH, HeaderValue::from_static("11"));
//!
//! let mut ctx = handler.context(request);
//! handler.invoke(&mut ctx).await?;
//!
//! assert_eq!(ctx.response.status, StatusCode::CREATED);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │  Host (axum, ...)  │  ← transport, routing, cancellation
//! ├────────────────────┤
//! │ TusProtocolHandler │  ← intents, execution, response merging
//! ├────────────────────┤
//! │      TusStore      │  ← storage primitives
//! └────────────────────┘
//! ```

mod config;
mod context;
mod error;
pub mod events;
pub mod executor;
mod guard;
mod handler;
pub mod headers;
pub mod intent;
mod lock;
mod memory;
mod metadata;
pub mod operations;
mod reader;
mod store;
mod types;
pub mod v2;

pub use config::{Expiration, TusConfig};
pub use context::{TusContext, TusRequest, TusResponse};
pub use error::{TusError, TusResult};
pub use events::TusEvents;
pub use guard::MaxReadSizeGuardedReader;
pub use handler::{merge_responses, TusProtocolHandler};
pub use lock::{FileLock, FileLockProvider, InMemoryFileLock, InMemoryFileLockProvider};
pub use memory::MemoryStore;
pub use metadata::{
    parse_metadata, Metadata, MetadataMap, MetadataValidator, RequiredKeysValidator,
};
pub use reader::{BodyReader, ReadResult, StreamBodyReader};
pub use store::{StoreExtensions, TusStore};
pub use types::{ByteStream, FileConcat, IntentType, LockMode, Outcome, ResourceId};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BodyReader, MemoryStore, Outcome, ResourceId, StoreExtensions, StreamBodyReader,
        TusConfig, TusContext, TusError, TusEvents, TusProtocolHandler, TusRequest, TusResponse,
        TusResult, TusStore,
    };
}
