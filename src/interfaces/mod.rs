//! Presentation adapters used by the binary.

pub mod csv;
