//! Rust-native building blocks for constructing Cardano transactions
//!
//! Tessera is a collection of modules that model the Cardano ledger types a
//! transaction needs and turn declarative intents into balanced, fee-correct
//! transactions. It doesn't talk to the network or run Plutus scripts: those
//! are left to the caller through small traits.

#![warn(missing_docs)]

#[doc(inline)]
pub use tessera_codec as codec;

#[doc(inline)]
pub use tessera_crypto as crypto;

pub mod ledger {
    //! Ledger primitives and cbor codecs for Conway-era transactions

    #[doc(inline)]
    pub use tessera_primitives as primitives;

    #[doc(inline)]
    pub use tessera_addresses as addresses;
}

#[doc(inline)]
pub use tessera_txbuilder as txbuilder;
