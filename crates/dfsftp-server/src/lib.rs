//! # dfsftp-server
//!
//! Everything around the jailed view that a deployment needs: server
//! configuration, the user definition file and a line-oriented shell that
//! drives one session the way a protocol engine would.

pub mod config;
pub mod constants;
pub mod shell;
pub mod users;

pub use config::{ConnectionLimits, Overrides, ServerConfig, StoreConfig, StoreKind};
pub use shell::{Reply, Shell};
pub use users::{UserFile, UserFileError, UserRecord};
