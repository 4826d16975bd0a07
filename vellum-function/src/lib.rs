//! Building blocks for Vellum composition functions.
//!
//! A function receives the desired state accumulated by a composition
//! pipeline, changes it, and answers with a [`schema::v1::RunFunctionResponse`].
//! Logical failures are reported inside the response (see [`response::fatal`]),
//! never as transport errors.

pub mod error;
pub mod framework;
pub mod request;
pub mod resource;
pub mod response;
pub mod rpc;
pub mod schema;

pub use error::{DocumentError, Error};
