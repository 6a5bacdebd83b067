use tessera_primitives::{
    AddrKeyhash, Address, AssetName, Coin, Metadatum, MetadatumLabel, NativeScript,
    PlutusData, PolicyId, PoolKeyhash, RewardAccount, Script, StakeCredential, TransactionInput,
    TransactionOutput, Value,
};

/// Where the code of a Plutus script comes from
#[derive(Debug, Clone, PartialEq)]
pub enum PlutusSource {
    /// The script is attached to the witness set
    Inline(Script),

    /// The script is read from the `script_ref` of a UTxO, which becomes a
    /// reference input
    Reference(TransactionInput),
}

/// How a script-controlled action is authorized
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptWitness {
    Native(NativeScript),
    Plutus {
        source: PlutusSource,
        redeemer: PlutusData,
    },
}

impl ScriptWitness {
    pub fn plutus_inline(script: Script, redeemer: PlutusData) -> Self {
        ScriptWitness::Plutus {
            source: PlutusSource::Inline(script),
            redeemer,
        }
    }

    pub fn plutus_reference(input: TransactionInput, redeemer: PlutusData) -> Self {
        ScriptWitness::Plutus {
            source: PlutusSource::Reference(input),
            redeemer,
        }
    }

    pub fn is_plutus(&self) -> bool {
        matches!(self, ScriptWitness::Plutus { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpendSource {
    /// A wallet address whose UTxOs may be selected to fund the transaction
    ///
    /// The first wallet address receives the change of the transaction.
    FromAddress(Address),

    /// A key-locked UTxO that must be spent
    FromUtxo(TransactionInput),

    /// A script-locked UTxO that must be spent
    ///
    /// `datum` is only needed when the UTxO carries a datum hash instead of
    /// an inline datum.
    FromScript {
        input: TransactionInput,
        witness: ScriptWitness,
        datum: Option<PlutusData>,
    },
}

/// A declarative piece of what a transaction should do
#[derive(Debug, Clone, PartialEq)]
pub enum TxIntent {
    Spend(SpendSource),

    /// Pays a value to an address
    SendTo(Address, Value),

    /// Adds an output as-is, datum and reference script included
    SendToOutput(TransactionOutput),

    /// Mints (positive) or burns (negative) assets of a policy
    MintBurn {
        policy: PolicyId,
        assets: Vec<(AssetName, i64)>,
        witness: ScriptWitness,
    },

    RegisterStake {
        credential: StakeCredential,
    },

    DeregisterStake {
        credential: StakeCredential,
        witness: Option<ScriptWitness>,
    },

    DelegateStake {
        credential: StakeCredential,
        pool: PoolKeyhash,
        witness: Option<ScriptWitness>,
    },

    Withdraw {
        reward_account: RewardAccount,
        amount: Coin,
        witness: Option<ScriptWitness>,
    },

    Metadata {
        label: MetadatumLabel,
        metadatum: Metadatum,
    },

    /// Slots bounding when the transaction may be included
    ValidityInterval {
        valid_from: Option<u64>,
        valid_until: Option<u64>,
    },

    RequireSigner(AddrKeyhash),

    ReferenceInput(TransactionInput),
}

impl TxIntent {
    pub fn spend_from_address(address: Address) -> Self {
        TxIntent::Spend(SpendSource::FromAddress(address))
    }

    pub fn spend_utxo(input: TransactionInput) -> Self {
        TxIntent::Spend(SpendSource::FromUtxo(input))
    }

    pub fn spend_script(
        input: TransactionInput,
        witness: ScriptWitness,
        datum: Option<PlutusData>,
    ) -> Self {
        TxIntent::Spend(SpendSource::FromScript {
            input,
            witness,
            datum,
        })
    }

    pub fn send_lovelace(address: Address, lovelace: Coin) -> Self {
        TxIntent::SendTo(address, Value::only_lovelace(lovelace))
    }

    /// The UTxOs this intent refers to, which must all be resolvable
    pub fn references(&self) -> Vec<&TransactionInput> {
        fn witness_ref(witness: &ScriptWitness) -> Option<&TransactionInput> {
            match witness {
                ScriptWitness::Plutus {
                    source: PlutusSource::Reference(input),
                    ..
                } => Some(input),
                _ => None,
            }
        }

        match self {
            TxIntent::Spend(SpendSource::FromUtxo(input)) => vec![input],
            TxIntent::Spend(SpendSource::FromScript { input, witness, .. }) => {
                std::iter::once(input).chain(witness_ref(witness)).collect()
            }
            TxIntent::MintBurn { witness, .. } => witness_ref(witness).into_iter().collect(),
            TxIntent::DeregisterStake { witness, .. }
            | TxIntent::DelegateStake { witness, .. }
            | TxIntent::Withdraw { witness, .. } => {
                witness.iter().filter_map(witness_ref).collect()
            }
            TxIntent::ReferenceInput(input) => vec![input],
            _ => vec![],
        }
    }
}
