pub mod baseline;
pub mod config;
pub mod error;
pub mod feedback;
pub mod overlay;
pub mod pose;
pub mod protocol;
pub mod scoring;
pub mod server;
pub mod stream;

pub use error::{FormError, Result};
