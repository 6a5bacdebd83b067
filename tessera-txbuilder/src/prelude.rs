pub use crate::{
    apply_transaction, sign_transaction, CoinSelection, Config, FinalizationError, FinalizedTx,
    Finalizer, NoScripts, ProtocolParameters, ScriptEvaluator, ScriptWitness, SelectionAlgorithm,
    Signer, SpendSource, TxIntent,
};
pub use tessera_codec::minicbor::{Decode, Encode};
pub use tessera_primitives::Fragment;
