//! Hashing primitives shared by the Tessera crates

pub mod hash;
