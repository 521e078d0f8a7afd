//! REST service layer for ReStorage.
//!
//! This crate adapts an [`restorage_core::ObjectStore`] to HTTP/1.1 and
//! HTTP/2 through a hyper [`Service`](hyper::service::Service). Requests are
//! routed by path shape:
//!
//! ```text
//! /buckets/{bucket}              POST | GET | HEAD | DELETE
//! /objects/{bucket}/{key}        PUT | POST | GET | HEAD | DELETE
//! /objects/{bucket}/{key}/meta   GET
//! /objects/{bucket}/{key}/hash   GET
//! /_health                       GET
//! ```
//!
//! The engine is synchronous, so every call runs on tokio's blocking pool.
//! Upload bodies are fed to the engine chunk by chunk through a bounded
//! channel and downloads flow back the same way, so neither side is ever
//! buffered in full.

pub mod body;
pub mod codec;
pub mod dispatch;
pub mod response;
pub mod router;
pub mod service;

pub use body::{ChannelReader, RestorageBody};
pub use response::ApiError;
pub use router::{Route, resolve_route};
pub use service::{RestorageHttpConfig, RestorageHttpService, handle_request};
