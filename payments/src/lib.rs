//! Payment-vote consensus: who each block must pay, decided by the votes of
//! the top-ranked service nodes and enforced once a payee reaches the
//! signature threshold.

mod ledger;
mod tally;

pub use ledger::{PaymentLedger, VOTE_TARGET_OFFSET};
pub use tally::{fill_block_payee, BlockPayeeTally};
