use std::sync::Arc;

use rust_decimal::Decimal;
use tally_core::{
    AccountFilter, AccountPatch, AmountIssue, ChartOfAccount, JournalEntrySummary,
    JournalEntryWithLines, LedgerError, LedgerStore, NewAccount, NewJournalEntry, check_amount,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Checks the double-entry invariant over `(debit, credit)` pairs: at least
/// one line, no negative amount, and equal totals. Every amount must be
/// storable without rounding so the stored entry balances too.
pub fn check_balance<I>(amounts: I) -> Result<Totals, LedgerError>
where
    I: IntoIterator<Item = (Decimal, Decimal)>,
{
    let mut debit = Decimal::ZERO;
    let mut credit = Decimal::ZERO;
    let mut count = 0usize;

    for (debit_amount, credit_amount) in amounts {
        count += 1;
        if debit_amount < Decimal::ZERO || credit_amount < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount { line: count });
        }
        for amount in [debit_amount, credit_amount] {
            check_amount(amount).map_err(|issue| match issue {
                AmountIssue::TooPrecise => LedgerError::ExcessPrecision { line: count },
                AmountIssue::OutOfRange => LedgerError::AmountOutOfRange { line: count },
            })?;
        }
        debit = debit
            .checked_add(debit_amount)
            .ok_or(LedgerError::AmountOutOfRange { line: count })?;
        credit = credit
            .checked_add(credit_amount)
            .ok_or(LedgerError::AmountOutOfRange { line: count })?;
    }

    if count == 0 {
        return Err(LedgerError::EmptyEntry);
    }
    if debit != credit {
        return Err(LedgerError::Unbalanced { debit, credit });
    }

    Ok(Totals { debit, credit })
}

/// Chart-of-accounts and journal operations scoped to one company at a time.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn accounts(
        &self,
        company_id: i64,
        filter: AccountFilter,
    ) -> Result<Vec<ChartOfAccount>, LedgerError> {
        self.store.list_accounts(company_id, filter).await
    }

    pub async fn account(
        &self,
        company_id: i64,
        id: i64,
    ) -> Result<Option<ChartOfAccount>, LedgerError> {
        Ok(self
            .store
            .account_by_id(id)
            .await?
            .filter(|account| account.company_id == company_id))
    }

    pub async fn account_by_code(
        &self,
        company_id: i64,
        account_code: &str,
    ) -> Result<Option<ChartOfAccount>, LedgerError> {
        self.store
            .account_by_code(company_id, account_code.trim())
            .await
    }

    pub async fn create_account(&self, mut account: NewAccount) -> Result<i64, LedgerError> {
        account.account_code = required(&account.account_code, "accountCode")?;
        account.account_name = required(&account.account_name, "accountName")?;
        self.store.create_account(account).await
    }

    pub async fn update_account(
        &self,
        company_id: i64,
        id: i64,
        mut patch: AccountPatch,
    ) -> Result<bool, LedgerError> {
        if patch.is_empty() {
            return Err(LedgerError::InvalidField {
                field: "body",
                reason: "must contain at least one field to update",
            });
        }
        if let Some(code) = patch.account_code.as_deref() {
            patch.account_code = Some(required(code, "accountCode")?);
        }
        if let Some(name) = patch.account_name.as_deref() {
            patch.account_name = Some(required(name, "accountName")?);
        }
        if self.account(company_id, id).await?.is_none() {
            return Ok(false);
        }
        self.store.update_account(id, patch).await
    }

    pub async fn delete_account(&self, company_id: i64, id: i64) -> Result<bool, LedgerError> {
        if self.account(company_id, id).await?.is_none() {
            return Ok(false);
        }
        self.store.delete_account(id).await
    }

    /// Validates the entry and persists header and lines atomically.
    pub async fn create_journal_entry(&self, mut entry: NewJournalEntry) -> Result<i64, LedgerError> {
        entry.entry_number = required(&entry.entry_number, "entryNumber")?;
        check_balance(
            entry
                .lines
                .iter()
                .map(|line| (line.debit_amount, line.credit_amount)),
        )?;

        self.store.insert_journal_entry(&entry).await
    }

    pub async fn journal_entries(
        &self,
        company_id: i64,
    ) -> Result<Vec<JournalEntrySummary>, LedgerError> {
        self.store.list_journal_entries(company_id).await
    }

    pub async fn journal_entry(
        &self,
        company_id: i64,
        id: i64,
    ) -> Result<Option<JournalEntryWithLines>, LedgerError> {
        Ok(self
            .store
            .journal_entry_with_lines(id)
            .await?
            .filter(|found| found.entry.company_id == company_id))
    }

    /// Re-validates the balance before flipping the posted flag.
    pub async fn post_journal_entry(
        &self,
        company_id: i64,
        id: i64,
    ) -> Result<JournalEntryWithLines, LedgerError> {
        let entry = self
            .journal_entry(company_id, id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))?;
        if entry.entry.posting.is_posted() {
            return Err(LedgerError::AlreadyPosted(id));
        }
        check_balance(
            entry
                .lines
                .iter()
                .map(|line| (line.debit_amount, line.credit_amount)),
        )?;

        if !self.store.mark_posted(id).await? {
            // lost a race with another post or a delete
            return match self.journal_entry(company_id, id).await? {
                Some(_) => Err(LedgerError::AlreadyPosted(id)),
                None => Err(LedgerError::EntryNotFound(id)),
            };
        }

        self.journal_entry(company_id, id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))
    }

    /// Posted entries are immutable; only drafts can be deleted.
    pub async fn delete_journal_entry(&self, company_id: i64, id: i64) -> Result<(), LedgerError> {
        let entry = self
            .journal_entry(company_id, id)
            .await?
            .ok_or(LedgerError::EntryNotFound(id))?;
        if entry.entry.posting.is_posted() {
            return Err(LedgerError::AlreadyPosted(id));
        }
        if !self.store.delete_draft_entry(id).await? {
            return Err(LedgerError::AlreadyPosted(id));
        }
        Ok(())
    }
}

fn required(value: &str, field: &'static str) -> Result<String, LedgerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidField {
            field,
            reason: "is required",
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tally_core::{AccountType, NewJournalLine, PostingStatus};
    use tally_memstore::InMemoryLedgerStore;

    use super::*;

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    fn line(account_id: i64, debit: i64, credit: i64) -> NewJournalLine {
        NewJournalLine {
            account_id,
            description: None,
            debit_amount: dec(debit),
            credit_amount: dec(credit),
        }
    }

    fn entry(company_id: i64, number: &str, lines: Vec<NewJournalLine>) -> NewJournalEntry {
        NewJournalEntry {
            company_id,
            entry_number: number.to_string(),
            entry_date: NaiveDate::from_ymd_opt(2025, 4, 15).unwrap(),
            description: "Owner capital injection".to_string(),
            reference: Some("BANK-REF-1".to_string()),
            created_by: 10,
            lines,
        }
    }

    async fn seeded() -> (Arc<InMemoryLedgerStore>, Ledger, i64, i64) {
        let store = Arc::new(InMemoryLedgerStore::default());
        store.add_user(10, 1, "Amal", "Saeed").await;
        store.add_user(20, 2, "Omar", "Haddad").await;
        let ledger = Ledger::new(store.clone());

        let cash = ledger
            .create_account(NewAccount {
                company_id: 1,
                account_code: "1000".to_string(),
                account_name: "Cash".to_string(),
                account_type: AccountType::Asset,
                account_category: "current_asset".to_string(),
                is_active: true,
                description: None,
            })
            .await
            .unwrap();
        let equity = ledger
            .create_account(NewAccount {
                company_id: 1,
                account_code: "3000".to_string(),
                account_name: "Owner's Equity".to_string(),
                account_type: AccountType::Equity,
                account_category: "equity".to_string(),
                is_active: true,
                description: None,
            })
            .await
            .unwrap();

        (store, ledger, cash, equity)
    }

    #[test]
    fn check_balance_accepts_equal_totals() {
        let totals = check_balance([(dec(100), dec(0)), (dec(0), Decimal::new(10000, 2))]).unwrap();
        assert_eq!(totals.debit, dec(100));
        assert_eq!(totals.credit, dec(100));
    }

    #[test]
    fn check_balance_rejects_single_sided_entry() {
        let err = check_balance([(dec(100), dec(0))]).unwrap_err();
        assert!(matches!(err, LedgerError::Unbalanced { debit, credit } if debit == dec(100) && credit.is_zero()));
    }

    #[test]
    fn check_balance_rejects_empty_and_negative() {
        assert!(matches!(
            check_balance(std::iter::empty()),
            Err(LedgerError::EmptyEntry)
        ));
        assert!(matches!(
            check_balance([(dec(50), dec(0)), (dec(-50), dec(0))]),
            Err(LedgerError::NegativeAmount { line: 2 })
        ));
    }

    #[test]
    fn amounts_finer_than_the_stored_scale_are_rejected() {
        let fine = |value: &str| value.parse::<Decimal>().unwrap();

        // balances exactly, but would round to 100.0001 / 100.0000 when stored
        let err = check_balance([
            (fine("100.00005"), Decimal::ZERO),
            (Decimal::ZERO, fine("50.000025")),
            (Decimal::ZERO, fine("50.000025")),
        ])
        .unwrap_err();
        assert!(matches!(err, LedgerError::ExcessPrecision { line: 1 }));

        let totals = check_balance([
            (fine("100.12340"), Decimal::ZERO),
            (Decimal::ZERO, fine("100.1234")),
        ])
        .unwrap();
        assert_eq!(totals.debit, fine("100.1234"));
    }

    #[test]
    fn oversized_amounts_are_rejected_without_panicking() {
        assert!(matches!(
            check_balance([(Decimal::MAX, dec(0)), (Decimal::MAX, dec(0))]),
            Err(LedgerError::AmountOutOfRange { line: 1 })
        ));
        let too_big = Decimal::new(1_000_000_000_000_000, 0);
        assert!(matches!(
            check_balance([(too_big, dec(0)), (dec(0), too_big)]),
            Err(LedgerError::AmountOutOfRange { line: 1 })
        ));
    }

    #[tokio::test]
    async fn unstorable_entry_is_rejected_before_any_write() {
        let (store, ledger, cash, equity) = seeded().await;
        let mut lines = vec![line(cash, 100, 0), line(equity, 0, 100)];
        lines[0].debit_amount = "100.00001".parse().unwrap();
        lines[1].credit_amount = "100.00001".parse().unwrap();

        let err = ledger
            .create_journal_entry(entry(1, "JE-0001", lines))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::ExcessPrecision { line: 1 }));
        assert!(store.list_journal_entries(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_entry_reads_back_as_draft_with_lines() {
        let (_, ledger, cash, equity) = seeded().await;

        let id = ledger
            .create_journal_entry(entry(
                1,
                "JE-0001",
                vec![line(cash, 100, 0), line(equity, 0, 100)],
            ))
            .await
            .unwrap();
        assert!(id > 0);

        let found = ledger.journal_entry(1, id).await.unwrap().unwrap();
        assert_eq!(found.entry.posting, PostingStatus::Draft);
        assert_eq!(found.entry.created_by_name, "Amal Saeed");
        assert_eq!(found.lines.len(), 2);
        assert_eq!(found.lines[0].account_code, "1000");
        assert_eq!(found.total_debit(), dec(100));
        assert_eq!(found.total_credit(), dec(100));
    }

    #[tokio::test]
    async fn unbalanced_entry_is_rejected_before_any_write() {
        let (store, ledger, cash, _) = seeded().await;

        let err = ledger
            .create_journal_entry(entry(1, "JE-0002", vec![line(cash, 100, 0)]))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Unbalanced { .. }));
        assert!(store.list_journal_entries(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_last_line_leaves_no_header() {
        let (store, ledger, cash, _) = seeded().await;

        // account 999 does not exist, so the second insert fails
        let err = ledger
            .create_journal_entry(entry(
                1,
                "JE-0003",
                vec![line(cash, 100, 0), line(999, 0, 100)],
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::AccountNotFound(999)));
        assert!(store.list_journal_entries(1).await.unwrap().is_empty());
        assert_eq!(store.line_count().await, 0);

        // the entry number is still free afterwards
        let id = ledger
            .create_journal_entry(entry(1, "JE-0003", vec![line(cash, 5, 5)]))
            .await
            .unwrap();
        assert!(ledger.journal_entry(1, id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn posting_flips_only_the_flag() {
        let (_, ledger, cash, equity) = seeded().await;
        let id = ledger
            .create_journal_entry(entry(
                1,
                "JE-0004",
                vec![line(cash, 250, 0), line(equity, 0, 250)],
            ))
            .await
            .unwrap();
        let before = ledger.journal_entry(1, id).await.unwrap().unwrap();

        let after = ledger.post_journal_entry(1, id).await.unwrap();

        assert_eq!(after.entry.posting, PostingStatus::Posted);
        assert_eq!(after.entry.entry_number, before.entry.entry_number);
        assert_eq!(after.entry.entry_date, before.entry.entry_date);
        assert_eq!(after.entry.description, before.entry.description);
        assert_eq!(after.entry.reference, before.entry.reference);
        assert_eq!(after.entry.created_by, before.entry.created_by);
        assert_eq!(after.lines, before.lines);

        let again = ledger.post_journal_entry(1, id).await.unwrap_err();
        assert!(matches!(again, LedgerError::AlreadyPosted(posted) if posted == id));
    }

    #[tokio::test]
    async fn posted_entries_cannot_be_deleted() {
        let (_, ledger, cash, equity) = seeded().await;
        let draft = ledger
            .create_journal_entry(entry(1, "JE-0005", vec![line(cash, 1, 0), line(equity, 0, 1)]))
            .await
            .unwrap();
        let posted = ledger
            .create_journal_entry(entry(1, "JE-0006", vec![line(cash, 2, 0), line(equity, 0, 2)]))
            .await
            .unwrap();
        ledger.post_journal_entry(1, posted).await.unwrap();

        ledger.delete_journal_entry(1, draft).await.unwrap();
        assert!(ledger.journal_entry(1, draft).await.unwrap().is_none());

        let err = ledger.delete_journal_entry(1, posted).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyPosted(_)));
    }

    #[tokio::test]
    async fn entries_are_isolated_per_company() {
        let (store, ledger, cash, equity) = seeded().await;
        let id = ledger
            .create_journal_entry(entry(1, "JE-0007", vec![line(cash, 9, 0), line(equity, 0, 9)]))
            .await
            .unwrap();

        // company 2 cannot see, post, or reuse company 1's accounts
        assert!(ledger.journal_entries(2).await.unwrap().is_empty());
        assert!(ledger.journal_entry(2, id).await.unwrap().is_none());
        assert!(matches!(
            ledger.post_journal_entry(2, id).await,
            Err(LedgerError::EntryNotFound(_))
        ));

        let mut foreign = entry(2, "JE-0007", vec![line(cash, 9, 0), line(equity, 0, 9)]);
        foreign.created_by = 20;
        let err = ledger.create_journal_entry(foreign).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountNotFound(_)));
        assert!(store.list_journal_entries(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn entry_numbers_are_unique_per_company() {
        let (_, ledger, cash, equity) = seeded().await;
        ledger
            .create_journal_entry(entry(1, "JE-0008", vec![line(cash, 3, 0), line(equity, 0, 3)]))
            .await
            .unwrap();

        let err = ledger
            .create_journal_entry(entry(1, " JE-0008 ", vec![line(cash, 3, 0), line(equity, 0, 3)]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateEntryNumber(number) if number == "JE-0008"));
    }

    #[tokio::test]
    async fn listing_orders_newest_date_then_newest_id() {
        let (_, ledger, cash, equity) = seeded().await;
        let mut older = entry(1, "JE-0010", vec![line(cash, 1, 0), line(equity, 0, 1)]);
        older.entry_date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let older = ledger.create_journal_entry(older).await.unwrap();
        let first = ledger
            .create_journal_entry(entry(1, "JE-0011", vec![line(cash, 2, 0), line(equity, 0, 2)]))
            .await
            .unwrap();
        let second = ledger
            .create_journal_entry(entry(1, "JE-0012", vec![line(cash, 3, 0), line(equity, 0, 3)]))
            .await
            .unwrap();

        let listed: Vec<i64> = ledger
            .journal_entries(1)
            .await
            .unwrap()
            .iter()
            .map(|summary| summary.entry.id)
            .collect();
        assert_eq!(listed, vec![second, first, older]);

        let summary = &ledger.journal_entries(1).await.unwrap()[0];
        assert_eq!(summary.total_debit, dec(3));
        assert_eq!(summary.total_credit, dec(3));
    }

    #[tokio::test]
    async fn missing_entry_is_none_not_error() {
        let (_, ledger, _, _) = seeded().await;
        assert!(ledger.journal_entry(1, 4242).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn accounts_in_use_cannot_be_deleted() {
        let (_, ledger, cash, equity) = seeded().await;
        ledger
            .create_journal_entry(entry(1, "JE-0020", vec![line(cash, 4, 0), line(equity, 0, 4)]))
            .await
            .unwrap();

        let err = ledger.delete_account(1, cash).await.unwrap_err();
        assert!(matches!(err, LedgerError::AccountInUse(id) if id == cash));
        assert!(!ledger.delete_account(2, cash).await.unwrap());
    }

    #[tokio::test]
    async fn empty_account_patch_is_invalid() {
        let (_, ledger, cash, _) = seeded().await;
        let err = ledger
            .update_account(1, cash, AccountPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidField { field: "body", .. }));

        let renamed = ledger
            .update_account(
                1,
                cash,
                AccountPatch {
                    account_name: Some("Cash on Hand".to_string()),
                    ..AccountPatch::default()
                },
            )
            .await
            .unwrap();
        assert!(renamed);
        let account = ledger.account(1, cash).await.unwrap().unwrap();
        assert_eq!(account.account_name, "Cash on Hand");
    }
}
