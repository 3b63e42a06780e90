use obol_types::params::SIGNATURES_REQUIRED;
use obol_types::{Amount, BlockTransaction, PayeeScript};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-block vote counts by payee.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockPayeeTally {
    payees: Vec<(PayeeScript, u32)>,
}

impl BlockPayeeTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vote(&mut self, payee: &PayeeScript) {
        for (existing, votes) in &mut self.payees {
            if existing == payee {
                *votes += 1;
                return;
            }
        }
        self.payees.push((payee.clone(), 1));
    }

    pub fn is_empty(&self) -> bool {
        self.payees.is_empty()
    }

    /// Payee with the most votes. Ties break on script bytes so every peer
    /// picks the same one.
    pub fn top_payee(&self) -> Option<&PayeeScript> {
        self.payees
            .iter()
            .max_by(|(pa, va), (pb, vb)| va.cmp(vb).then_with(|| pb.0.cmp(&pa.0)))
            .map(|(payee, _)| payee)
    }

    pub fn votes_for(&self, payee: &PayeeScript) -> u32 {
        self.payees
            .iter()
            .find(|(p, _)| p == payee)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    pub fn has_payee_with_votes(&self, payee: &PayeeScript, min_votes: u32) -> bool {
        self.votes_for(payee) >= min_votes
    }

    /// Consensus gate for a block's payment outputs.
    ///
    /// With no payee at the signature threshold there is no consensus and
    /// any transaction passes. Otherwise the transaction must pay one of the
    /// threshold payees at least `required`.
    pub fn is_transaction_valid(&self, tx: &BlockTransaction, required: Amount) -> bool {
        let threshold_payees: Vec<&PayeeScript> = self
            .payees
            .iter()
            .filter(|(_, votes)| *votes >= SIGNATURES_REQUIRED)
            .map(|(payee, _)| payee)
            .collect();
        if threshold_payees.is_empty() {
            return true;
        }
        for payee in &threshold_payees {
            if tx.pays_at_least(payee, required) {
                return true;
            }
        }
        if let Some(expected) = self.top_payee() {
            warn!(
                payee = %expected.to_short_string(),
                required = %required,
                "block does not pay the elected service node"
            );
        }
        false
    }

    /// Human-readable vote summary for RPC and logs.
    pub fn required_payments_string(&self) -> String {
        if self.payees.is_empty() {
            return "Unknown".to_owned();
        }
        self.payees
            .iter()
            .map(|(payee, votes)| format!("{}:{}", payee.to_short_string(), votes))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Insert the service-node payment into a block's payment transaction.
///
/// Proof-of-work blocks split the coinbase: the miner output is reduced and
/// a second output pays the node. Proof-of-stake blocks append the node
/// output and debit the final stake output.
pub fn fill_block_payee(
    tx: &mut BlockTransaction,
    payee: PayeeScript,
    node_payment: Amount,
    proof_of_stake: bool,
) {
    if proof_of_stake {
        if let Some(last) = tx.outputs.last_mut() {
            last.value = last.value.saturating_sub(node_payment);
        }
        tx.outputs.push(obol_types::TxOutput { value: node_payment, script: payee });
    } else if let Some(first) = tx.outputs.first_mut() {
        first.value = first.value.saturating_sub(node_payment);
        tx.outputs.push(obol_types::TxOutput { value: node_payment, script: payee });
    }
}
