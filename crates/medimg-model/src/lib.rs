pub mod records;
pub mod license;
pub mod size;
pub mod table;

pub use records::*;
pub use license::*;
pub use size::*;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("invalid image size '{0}', expected WIDTHxHEIGHT")]
    InvalidSize(String),

    #[error("unknown download size '{0}', expected small, medium, or large")]
    UnknownDownloadSize(String),
}
