pub mod batch;
pub mod bounds;
pub mod client;
pub mod fits;

pub use crate::domain::ports::{Archive, ConfigProvider, Storage};
pub use crate::utils::error::Result;
