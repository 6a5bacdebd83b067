//! Intent-driven transaction building
//!
//! Callers describe what a transaction should do as a list of [`TxIntent`]s
//! and hand in the UTxOs they know about. The [`Finalizer`] turns that into a
//! balanced, fee-correct [`Tx`](tessera_primitives::Tx): it selects inputs,
//! pays change back, asks a [`ScriptEvaluator`] for execution costs and
//! iterates until the fee stops moving. Signing and script execution are left
//! to the caller through the [`Signer`] and [`ScriptEvaluator`] traits.

mod evaluator;
mod fee;
mod finalize;
mod intent;
mod params;
mod scriptdata;
mod selection;
mod state;
mod wallet;

pub mod prelude;

pub use evaluator::*;
pub use finalize::*;
pub use intent::*;
pub use params::*;
pub use scriptdata::*;
pub use selection::*;
pub use state::*;
pub use wallet::*;
