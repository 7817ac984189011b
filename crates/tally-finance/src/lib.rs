pub mod invoice;
pub mod journal;

pub use invoice::{
    InvoiceError, InvoiceTotals, ItemAmounts, ItemInput, compute_item, summarize_items,
};
pub use journal::{Ledger, Totals, check_balance};
