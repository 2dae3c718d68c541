//! Writing sampler output to disk.

#[cfg(feature = "csv")]
pub mod csv;
