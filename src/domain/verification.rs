use super::transaction::Transaction;
use tracing::warn;

/// Result of the storefront's own signature check on a record.
#[derive(Debug, PartialEq, Clone)]
pub enum SignatureStatus {
    Valid,
    Invalid(String),
}

/// A raw record as delivered by the storefront: the signed payload, the
/// decoded transaction and the outcome of the storefront's signature check.
#[derive(Debug, PartialEq, Clone)]
pub struct SignedTransaction {
    pub payload: String,
    pub transaction: Transaction,
    pub signature: SignatureStatus,
}

impl SignedTransaction {
    pub fn valid(transaction: Transaction) -> Self {
        Self {
            payload: format!("signed:{}", transaction.id),
            transaction,
            signature: SignatureStatus::Valid,
        }
    }

    pub fn invalid(transaction: Transaction, reason: impl Into<String>) -> Self {
        Self {
            payload: format!("unsigned:{}", transaction.id),
            transaction,
            signature: SignatureStatus::Invalid(reason.into()),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum VerificationOutcome {
    Verified(Transaction),
    Unverified { payload: String, reason: String },
}

impl VerificationOutcome {
    pub fn verified(self) -> Option<Transaction> {
        match self {
            VerificationOutcome::Verified(tx) => Some(tx),
            VerificationOutcome::Unverified { .. } => None,
        }
    }
}

/// Classifies a storefront record exactly once, at the boundary where it is
/// received. Never retried: a failed signature check is not transient.
pub fn verify(record: SignedTransaction) -> VerificationOutcome {
    match record.signature {
        SignatureStatus::Valid => VerificationOutcome::Verified(record.transaction),
        SignatureStatus::Invalid(reason) => {
            warn!(
                transaction_id = record.transaction.id,
                product_id = %record.transaction.product_id,
                %reason,
                "Unverified transaction"
            );
            VerificationOutcome::Unverified {
                payload: record.payload,
                reason,
            }
        }
    }
}

/// Verifies a batch, keeping only the verified transactions.
pub fn verified_only(records: Vec<SignedTransaction>) -> Vec<Transaction> {
    records
        .into_iter()
        .filter_map(|record| verify(record).verified())
        .collect()
}
