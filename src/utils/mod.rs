//! Utility modules: developer trace sink, JSON conversion, logger, numeric conversions.
pub mod devlog;
pub mod json;
pub mod logger;
pub mod num;
