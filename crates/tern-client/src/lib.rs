//! tern-client: read, write, delete and list files on a tern server.

pub mod client;
pub mod config;
pub mod error;
pub mod store;

pub use client::{Client, Outcome};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use store::{LISTING_FILE, LocalStore};
