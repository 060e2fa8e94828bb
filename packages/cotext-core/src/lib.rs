#![forbid(unsafe_code)]
//! Operational-transformation core for collaborative plain-text editing.
//!
//! Implements the Jupiter control algorithm: one [`Jupiter`] engine per (document, peer)
//! pair, exchanging [`Request`]s stamped with a two-counter [`VectorTime`], plus the hub
//! relays built on it. The crate does no I/O and no locking; the session layer owns
//! delivery and synchronization.

pub mod checksum;
pub mod client;
pub mod error;
pub mod ids;
pub mod jupiter;
pub mod operation;
pub mod request;
pub mod server;
pub mod text;
pub mod transform;
pub mod vector_time;

pub use checksum::DocumentChecksum;
pub use client::ConcurrentDocumentClient;
pub use error::{Error, PreconditionViolation, Result};
pub use ids::{DocumentId, SiteId};
pub use jupiter::{Jupiter, SiteRole};
pub use operation::Operation;
pub use request::Request;
pub use server::{ConcurrentDocumentServer, Outgoing, Relay};
pub use text::TextDocument;
pub use transform::{GotoTransformation, InclusionTransformation};
pub use vector_time::{Causality, VectorTime};
