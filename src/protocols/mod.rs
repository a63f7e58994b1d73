//! Protocol implementations.
//!
//! Each protocol has a parser module used by the runtime event loops.
//!
//! - `echo`: line-delimited text echo with sentinel-driven close

pub mod echo;
