use crate::domain::transaction::TransactionId;
use crate::error::{Result, StoreError};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptOp {
    Stock,
    Load,
    Respond,
    Purchase,
    Deliver,
    Revoke,
    Expire,
    Promote,
    BuyPromoted,
    Restore,
    Sync,
    Outage,
    Finish,
    Unfinished,
    Entitlements,
    ClearUnfinished,
    CanPay,
}

/// One row of a scenario script. Which columns matter depends on `op`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ScriptStep {
    pub op: ScriptOp,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub transaction: Option<TransactionId>,
    #[serde(default)]
    pub value: Option<String>,
}

impl ScriptStep {
    pub fn require_product(&self) -> Result<&str> {
        self.product.as_deref().ok_or_else(|| {
            StoreError::DeveloperError(format!("'{:?}' step needs a product", self.op))
        })
    }

    pub fn require_transaction(&self) -> Result<TransactionId> {
        self.transaction.ok_or_else(|| {
            StoreError::DeveloperError(format!("'{:?}' step needs a transaction id", self.op))
        })
    }
}

/// Reads scenario steps from a CSV source with the header
/// `op, product, transaction, value`.
///
/// Whitespace is trimmed and short rows are accepted, so trailing columns can
/// be left out.
pub struct ScriptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScriptReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes steps; a malformed row yields an error and reading
    /// continues with the next one.
    pub fn steps(self) -> impl Iterator<Item = Result<ScriptStep>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(StoreError::from))
    }
}
