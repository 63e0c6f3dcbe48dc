use super::transaction::Transaction;

/// Verified, non-revoked transactions from a single entitlement query.
///
/// Always rebuilt from a fresh query, never cached across calls.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct EntitlementSet {
    transactions: Vec<Transaction>,
}

impl EntitlementSet {
    /// Builds the set from verified transactions, dropping revoked ones.
    pub fn from_verified(transactions: Vec<Transaction>) -> Self {
        Self {
            transactions: transactions
                .into_iter()
                .filter(|tx| !tx.is_revoked())
                .collect(),
        }
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.product_id == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::ProductKind;
    use chrono::Utc;

    #[test]
    fn test_revoked_transactions_are_excluded() {
        let active = Transaction::new(1, "lifetime", ProductKind::NonConsumable, Utc::now());
        let mut refunded = Transaction::new(2, "pro.monthly", ProductKind::Subscription, Utc::now());
        refunded.revocation_date = Some(Utc::now());

        let set = EntitlementSet::from_verified(vec![active, refunded]);

        assert_eq!(set.len(), 1);
        assert!(set.contains("lifetime"));
        assert!(!set.contains("pro.monthly"));
    }

    #[test]
    fn test_empty_set() {
        let set = EntitlementSet::from_verified(Vec::new());
        assert!(set.is_empty());
        assert!(!set.contains("lifetime"));
    }
}
