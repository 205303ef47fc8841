//! dog-tus-axum: Axum adapter for dog-tus.
//!
//! Mounts a [`dog_tus::TusProtocolHandler`] on an axum router. The request
//! body is streamed into the engine, and a client that hangs up mid-upload
//! cancels the running write.
//!
//! ```rust,no_run
//! use dog_tus::prelude::*;
//! use dog_tus_axum::TusEndpoint;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let handler = TusProtocolHandler::new(MemoryStore::new(), TusConfig::from_env("DOGTUS")?);
//! TusEndpoint::new(handler).listen("0.0.0.0:3030").await?;
//! # Ok(())
//! # }
//! ```

mod endpoint;
mod error;

pub use endpoint::{Tus2Endpoint, TusEndpoint};
pub use error::TusAxumError;

pub use axum;
