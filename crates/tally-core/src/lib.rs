pub mod amount;
pub mod error;
pub mod ledger;
pub mod models;
pub mod standards;
pub mod storage;

pub use amount::{AMOUNT_SCALE, AmountIssue, amount_limit, check_amount};
pub use error::LedgerError;
pub use ledger::{
    AccountFilter, AccountPatch, AccountType, ChartOfAccount, JournalEntry, JournalEntryLine,
    JournalEntrySummary, JournalEntryWithLines, NewAccount, NewJournalEntry, NewJournalLine,
    PostingStatus,
};
pub use models::{
    Company, EInvoiceStatus, Inventory, Invoice, InvoiceItem, InvoiceStatus, InvoiceType,
    Product, ProductType, Role, User, Warehouse,
};
pub use standards::{DefaultAccount, SmeProfile, StandardsProfile};
pub use storage::LedgerStore;
