//! Find and get FITS metadata and images from the Astro Data Archive.

pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::cli::LocalStorage;
pub use core::client::{ArchiveClient, ClientOptions};
pub use utils::error::{AstrogetError, Result};
