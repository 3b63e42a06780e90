//! Minimal coinbase/coinstake transaction skeleton.
//!
//! Block assembly and validation live with an external collaborator; this
//! subsystem only needs to inspect and edit the output list of the reward
//! transaction, so that is all this type models.

use crate::amount::Amount;
use crate::script::PayeeScript;
use serde::{Deserialize, Serialize};

/// One output of the block reward transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Amount,
    pub script: PayeeScript,
}

/// The reward transaction of a candidate block (outputs only).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTransaction {
    pub outputs: Vec<TxOutput>,
}

impl BlockTransaction {
    pub fn new(outputs: Vec<TxOutput>) -> Self {
        Self { outputs }
    }

    /// Whether any output pays `script` at least `amount`.
    pub fn pays_at_least(&self, script: &PayeeScript, amount: Amount) -> bool {
        self.outputs
            .iter()
            .any(|out| out.script == *script && out.value >= amount)
    }
}
