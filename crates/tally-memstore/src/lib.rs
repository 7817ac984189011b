use std::collections::{BTreeMap, HashMap};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tally_core::{
    AccountFilter, AccountPatch, ChartOfAccount, JournalEntry, JournalEntryLine,
    JournalEntrySummary, JournalEntryWithLines, LedgerError, LedgerStore, NewAccount,
    NewJournalEntry, PostingStatus,
};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct UserName {
    company_id: i64,
    first_name: String,
    last_name: String,
}

#[derive(Debug, Clone)]
struct StoredLine {
    id: i64,
    journal_entry_id: i64,
    account_id: i64,
    description: Option<String>,
    debit_amount: Decimal,
    credit_amount: Decimal,
}

#[derive(Default)]
struct LedgerTables {
    users: HashMap<i64, UserName>,
    accounts: BTreeMap<i64, ChartOfAccount>,
    entries: BTreeMap<i64, JournalEntry>,
    lines: BTreeMap<i64, StoredLine>,
    next_account_id: i64,
    next_entry_id: i64,
    next_line_id: i64,
}

impl LedgerTables {
    fn code_taken(&self, company_id: i64, code: &str, except: Option<i64>) -> bool {
        self.accounts.values().any(|account| {
            account.company_id == company_id
                && account.account_code == code
                && Some(account.id) != except
        })
    }

    fn lines_of(&self, entry_id: i64) -> impl Iterator<Item = &StoredLine> {
        self.lines
            .values()
            .filter(move |line| line.journal_entry_id == entry_id)
    }

    fn joined_line(&self, line: &StoredLine) -> JournalEntryLine {
        let account = self.accounts.get(&line.account_id);
        JournalEntryLine {
            id: line.id,
            journal_entry_id: line.journal_entry_id,
            account_id: line.account_id,
            account_code: account
                .map(|account| account.account_code.clone())
                .unwrap_or_default(),
            account_name: account
                .map(|account| account.account_name.clone())
                .unwrap_or_default(),
            description: line.description.clone(),
            debit_amount: line.debit_amount,
            credit_amount: line.credit_amount,
        }
    }
}

/// Process-local `LedgerStore` used by tests and local tooling.
///
/// All tables sit behind a single lock, so a journal insert stages its header
/// and lines and only applies them once every line has been checked.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<LedgerTables>,
}

impl InMemoryLedgerStore {
    /// Registers the user that journal entries may reference as their creator.
    pub async fn add_user(&self, id: i64, company_id: i64, first_name: &str, last_name: &str) {
        let mut tables = self.tables.write().await;
        tables.users.insert(
            id,
            UserName {
                company_id,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            },
        );
    }

    pub async fn line_count(&self) -> usize {
        self.tables.read().await.lines.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn list_accounts(
        &self,
        company_id: i64,
        filter: AccountFilter,
    ) -> Result<Vec<ChartOfAccount>, LedgerError> {
        let tables = self.tables.read().await;
        let mut accounts: Vec<_> = tables
            .accounts
            .values()
            .filter(|account| account.company_id == company_id && filter.matches(account))
            .cloned()
            .collect();
        accounts.sort_by(|left, right| left.account_code.cmp(&right.account_code));
        Ok(accounts)
    }

    async fn account_by_id(&self, id: i64) -> Result<Option<ChartOfAccount>, LedgerError> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn account_by_code(
        &self,
        company_id: i64,
        account_code: &str,
    ) -> Result<Option<ChartOfAccount>, LedgerError> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|account| account.company_id == company_id && account.account_code == account_code)
            .cloned())
    }

    async fn create_account(&self, account: NewAccount) -> Result<i64, LedgerError> {
        let mut tables = self.tables.write().await;
        if tables.code_taken(account.company_id, &account.account_code, None) {
            return Err(LedgerError::DuplicateAccountCode(account.account_code));
        }

        tables.next_account_id += 1;
        let id = tables.next_account_id;
        tables.accounts.insert(
            id,
            ChartOfAccount {
                id,
                company_id: account.company_id,
                account_code: account.account_code,
                account_name: account.account_name,
                account_type: account.account_type,
                account_category: account.account_category,
                is_active: account.is_active,
                description: account.description,
            },
        );
        Ok(id)
    }

    async fn update_account(&self, id: i64, patch: AccountPatch) -> Result<bool, LedgerError> {
        let mut tables = self.tables.write().await;
        let Some(company_id) = tables.accounts.get(&id).map(|account| account.company_id) else {
            return Ok(false);
        };
        if let Some(code) = &patch.account_code
            && tables.code_taken(company_id, code, Some(id))
        {
            return Err(LedgerError::DuplicateAccountCode(code.clone()));
        }

        let Some(account) = tables.accounts.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(code) = patch.account_code {
            account.account_code = code;
        }
        if let Some(name) = patch.account_name {
            account.account_name = name;
        }
        if let Some(account_type) = patch.account_type {
            account.account_type = account_type;
        }
        if let Some(category) = patch.account_category {
            account.account_category = category;
        }
        if let Some(is_active) = patch.is_active {
            account.is_active = is_active;
        }
        if let Some(description) = patch.description {
            account.description = (!description.is_empty()).then_some(description);
        }
        Ok(true)
    }

    async fn delete_account(&self, id: i64) -> Result<bool, LedgerError> {
        let mut tables = self.tables.write().await;
        if tables.lines.values().any(|line| line.account_id == id) {
            return Err(LedgerError::AccountInUse(id));
        }
        Ok(tables.accounts.remove(&id).is_some())
    }

    async fn insert_journal_entry(&self, entry: &NewJournalEntry) -> Result<i64, LedgerError> {
        let mut tables = self.tables.write().await;

        let Some(creator) = tables.users.get(&entry.created_by) else {
            return Err(anyhow!("user {} does not exist", entry.created_by).into());
        };
        if creator.company_id != entry.company_id {
            return Err(anyhow!(
                "user {} does not belong to company {}",
                entry.created_by,
                entry.company_id
            )
            .into());
        }
        let created_by_name = format!("{} {}", creator.first_name, creator.last_name);

        let duplicate = tables.entries.values().any(|existing| {
            existing.company_id == entry.company_id && existing.entry_number == entry.entry_number
        });
        if duplicate {
            return Err(LedgerError::DuplicateEntryNumber(entry.entry_number.clone()));
        }

        for line in &entry.lines {
            let owned = tables
                .accounts
                .get(&line.account_id)
                .is_some_and(|account| account.company_id == entry.company_id);
            if !owned {
                return Err(LedgerError::AccountNotFound(line.account_id));
            }
        }

        // every check passed; apply header and lines together
        tables.next_entry_id += 1;
        let entry_id = tables.next_entry_id;
        let now = Utc::now();
        tables.entries.insert(
            entry_id,
            JournalEntry {
                id: entry_id,
                company_id: entry.company_id,
                entry_number: entry.entry_number.clone(),
                entry_date: entry.entry_date,
                description: entry.description.clone(),
                reference: entry.reference.clone(),
                posting: PostingStatus::Draft,
                created_by: entry.created_by,
                created_by_name,
                created_at: now,
                updated_at: now,
            },
        );

        for line in &entry.lines {
            tables.next_line_id += 1;
            let line_id = tables.next_line_id;
            tables.lines.insert(
                line_id,
                StoredLine {
                    id: line_id,
                    journal_entry_id: entry_id,
                    account_id: line.account_id,
                    description: line.description.clone(),
                    debit_amount: line.debit_amount,
                    credit_amount: line.credit_amount,
                },
            );
        }

        Ok(entry_id)
    }

    async fn mark_posted(&self, id: i64) -> Result<bool, LedgerError> {
        let mut tables = self.tables.write().await;
        match tables.entries.get_mut(&id) {
            Some(entry) if !entry.posting.is_posted() => {
                entry.posting = PostingStatus::Posted;
                entry.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_journal_entries(
        &self,
        company_id: i64,
    ) -> Result<Vec<JournalEntrySummary>, LedgerError> {
        let tables = self.tables.read().await;
        let mut summaries: Vec<_> = tables
            .entries
            .values()
            .filter(|entry| entry.company_id == company_id)
            .map(|entry| {
                let (total_debit, total_credit) = tables.lines_of(entry.id).fold(
                    (Decimal::ZERO, Decimal::ZERO),
                    |(debit, credit), line| (debit + line.debit_amount, credit + line.credit_amount),
                );
                JournalEntrySummary {
                    entry: entry.clone(),
                    total_debit,
                    total_credit,
                }
            })
            .collect();

        summaries.sort_by(|left, right| {
            right
                .entry
                .entry_date
                .cmp(&left.entry.entry_date)
                .then(right.entry.id.cmp(&left.entry.id))
        });
        Ok(summaries)
    }

    async fn journal_entry_with_lines(
        &self,
        id: i64,
    ) -> Result<Option<JournalEntryWithLines>, LedgerError> {
        let tables = self.tables.read().await;
        let Some(entry) = tables.entries.get(&id) else {
            return Ok(None);
        };
        let lines = tables
            .lines_of(id)
            .map(|line| tables.joined_line(line))
            .collect();
        Ok(Some(JournalEntryWithLines {
            entry: entry.clone(),
            lines,
        }))
    }

    async fn delete_draft_entry(&self, id: i64) -> Result<bool, LedgerError> {
        let mut tables = self.tables.write().await;
        match tables.entries.get(&id) {
            Some(entry) if !entry.posting.is_posted() => {}
            _ => return Ok(false),
        }
        tables.entries.remove(&id);
        tables.lines.retain(|_, line| line.journal_entry_id != id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tally_core::{AccountType, NewJournalLine};

    use super::*;

    fn account(company_id: i64, code: &str) -> NewAccount {
        NewAccount {
            company_id,
            account_code: code.to_string(),
            account_name: format!("Account {code}"),
            account_type: AccountType::Asset,
            account_category: "current_asset".to_string(),
            is_active: true,
            description: Some("seeded".to_string()),
        }
    }

    fn entry(account_ids: &[i64]) -> NewJournalEntry {
        NewJournalEntry {
            company_id: 1,
            entry_number: "JE-1".to_string(),
            entry_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            description: "Accrual".to_string(),
            reference: None,
            created_by: 5,
            lines: account_ids
                .iter()
                .map(|account_id| NewJournalLine {
                    account_id: *account_id,
                    description: None,
                    debit_amount: Decimal::ONE,
                    credit_amount: Decimal::ONE,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn account_codes_are_unique_per_company() {
        let store = InMemoryLedgerStore::default();
        store.create_account(account(1, "1000")).await.unwrap();
        store.create_account(account(2, "1000")).await.unwrap();

        let err = store.create_account(account(1, "1000")).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateAccountCode(code) if code == "1000"));
    }

    #[tokio::test]
    async fn empty_description_patch_clears_it() {
        let store = InMemoryLedgerStore::default();
        let id = store.create_account(account(1, "1000")).await.unwrap();

        let updated = store
            .update_account(
                id,
                AccountPatch {
                    description: Some(String::new()),
                    ..AccountPatch::default()
                },
            )
            .await
            .unwrap();

        assert!(updated);
        let stored = store.account_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.description, None);
        assert!(!store.update_account(99, AccountPatch::default()).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_creator_is_a_storage_error() {
        let store = InMemoryLedgerStore::default();
        let cash = store.create_account(account(1, "1000")).await.unwrap();

        let err = store.insert_journal_entry(&entry(&[cash])).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(store.line_count().await, 0);
    }

    #[tokio::test]
    async fn creator_from_another_company_is_a_storage_error() {
        let store = InMemoryLedgerStore::default();
        store.add_user(5, 2, "Omar", "Haddad").await;
        let cash = store.create_account(account(1, "1000")).await.unwrap();

        let err = store.insert_journal_entry(&entry(&[cash])).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert!(store.list_journal_entries(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_draft_removes_its_lines() {
        let store = InMemoryLedgerStore::default();
        store.add_user(5, 1, "Sara", "Nasser").await;
        let cash = store.create_account(account(1, "1000")).await.unwrap();
        let id = store.insert_journal_entry(&entry(&[cash, cash])).await.unwrap();
        assert_eq!(store.line_count().await, 2);

        assert!(store.delete_draft_entry(id).await.unwrap());
        assert_eq!(store.line_count().await, 0);
        assert!(store.journal_entry_with_lines(id).await.unwrap().is_none());
        assert!(!store.delete_draft_entry(id).await.unwrap());
    }

    #[tokio::test]
    async fn mark_posted_is_one_way() {
        let store = InMemoryLedgerStore::default();
        store.add_user(5, 1, "Sara", "Nasser").await;
        let cash = store.create_account(account(1, "1000")).await.unwrap();
        let id = store.insert_journal_entry(&entry(&[cash])).await.unwrap();

        assert!(store.mark_posted(id).await.unwrap());
        assert!(!store.mark_posted(id).await.unwrap());
        assert!(!store.delete_draft_entry(id).await.unwrap());
        assert!(!store.mark_posted(id + 1).await.unwrap());
    }
}
