//! Miscellaneous blocks.
pub mod conv_norm;
