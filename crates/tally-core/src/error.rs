use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{field} {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("journal entry must have at least one line")]
    EmptyEntry,
    #[error("line {line}: debit and credit amounts must be non-negative")]
    NegativeAmount { line: usize },
    #[error("line {line}: amounts allow at most 4 decimal places")]
    ExcessPrecision { line: usize },
    #[error("line {line}: amount is outside the supported range")]
    AmountOutOfRange { line: usize },
    #[error("unbalanced entry: total debit {debit} does not equal total credit {credit}")]
    Unbalanced { debit: Decimal, credit: Decimal },
    #[error("journal entry {0} not found")]
    EntryNotFound(i64),
    #[error("journal entry {0} is already posted")]
    AlreadyPosted(i64),
    #[error("account {0} not found")]
    AccountNotFound(i64),
    #[error("entry number {0} already exists for this company")]
    DuplicateEntryNumber(String),
    #[error("account code {0} already exists for this company")]
    DuplicateAccountCode(String),
    #[error("account {0} is referenced by journal lines")]
    AccountInUse(i64),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
