//! Domain layer: pure types and policy tables, no I/O.

pub mod freshness;
pub mod keys;
pub mod traffic;
