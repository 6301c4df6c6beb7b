//! VirtualServer CRD Definitions
//!
//! The `VirtualServer` custom resource, the validated spec builder and the
//! status condition engine. Nothing in this crate performs I/O; the
//! `virtual-server-client` crate persists records.

pub mod conditions;
pub mod error;
pub mod mutation;
pub mod quantity;
pub mod spec_builder;
pub mod validation;
pub mod virtual_server;

pub use conditions::*;
pub use error::*;
pub use mutation::*;
pub use quantity::*;
pub use spec_builder::*;
pub use virtual_server::*;
