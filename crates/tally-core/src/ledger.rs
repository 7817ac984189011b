use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Revenue => "revenue",
            Self::Expense => "expense",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asset" => Some(Self::Asset),
            "liability" => Some(Self::Liability),
            "equity" => Some(Self::Equity),
            "revenue" => Some(Self::Revenue),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }
}

/// Posting state of a journal entry.
///
/// Stored as a `BOOLEAN` (`is_posted`) and exposed on the wire as the
/// `isPosted` flag; `from_flag`/`as_flag` are the only crossing points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostingStatus {
    #[default]
    Draft,
    Posted,
}

impl PostingStatus {
    pub fn from_flag(is_posted: bool) -> Self {
        if is_posted { Self::Posted } else { Self::Draft }
    }

    pub fn as_flag(self) -> bool {
        matches!(self, Self::Posted)
    }

    pub fn is_posted(self) -> bool {
        self.as_flag()
    }
}

impl Serialize for PostingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.as_flag())
    }
}

impl<'de> Deserialize<'de> for PostingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bool::deserialize(deserializer).map(Self::from_flag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartOfAccount {
    pub id: i64,
    pub company_id: i64,
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub account_category: String,
    pub is_active: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub company_id: i64,
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub account_category: String,
    pub is_active: bool,
    pub description: Option<String>,
}

/// Fields left as `None` are not touched. An empty `description` clears it.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub account_code: Option<String>,
    pub account_name: Option<String>,
    pub account_type: Option<AccountType>,
    pub account_category: Option<String>,
    pub is_active: Option<bool>,
    pub description: Option<String>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.account_code.is_none()
            && self.account_name.is_none()
            && self.account_type.is_none()
            && self.account_category.is_none()
            && self.is_active.is_none()
            && self.description.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccountFilter {
    pub account_type: Option<AccountType>,
    pub active_only: bool,
}

impl AccountFilter {
    pub fn matches(&self, account: &ChartOfAccount) -> bool {
        self.account_type
            .is_none_or(|account_type| account.account_type == account_type)
            && (!self.active_only || account.is_active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: i64,
    pub company_id: i64,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    #[serde(rename = "isPosted")]
    pub posting: PostingStatus,
    pub created_by: i64,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntryLine {
    pub id: i64,
    pub journal_entry_id: i64,
    pub account_id: i64,
    pub account_code: String,
    pub account_name: String,
    pub description: Option<String>,
    pub debit_amount: Decimal,
    pub credit_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntrySummary {
    #[serde(flatten)]
    pub entry: JournalEntry,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntryWithLines {
    #[serde(flatten)]
    pub entry: JournalEntry,
    pub lines: Vec<JournalEntryLine>,
}

impl JournalEntryWithLines {
    pub fn total_debit(&self) -> Decimal {
        self.lines.iter().map(|line| line.debit_amount).sum()
    }

    pub fn total_credit(&self) -> Decimal {
        self.lines.iter().map(|line| line.credit_amount).sum()
    }
}

#[derive(Debug, Clone)]
pub struct NewJournalLine {
    pub account_id: i64,
    pub description: Option<String>,
    pub debit_amount: Decimal,
    pub credit_amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewJournalEntry {
    pub company_id: i64,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub created_by: i64,
    pub lines: Vec<NewJournalLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posting_status_round_trips_through_flag() {
        assert_eq!(PostingStatus::from_flag(false), PostingStatus::Draft);
        assert_eq!(PostingStatus::from_flag(true), PostingStatus::Posted);
        assert!(PostingStatus::Posted.as_flag());
        assert!(!PostingStatus::default().is_posted());
    }

    #[test]
    fn posting_status_serializes_as_is_posted_flag() {
        let entry = JournalEntry {
            id: 7,
            company_id: 1,
            entry_number: "JE-0007".to_string(),
            entry_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            description: "Opening balance".to_string(),
            reference: None,
            posting: PostingStatus::Draft,
            created_by: 3,
            created_by_name: "Amal Saeed".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["isPosted"], serde_json::json!(false));
        assert_eq!(value["entryNumber"], serde_json::json!("JE-0007"));
        assert!(value.get("posting").is_none());
    }

    #[test]
    fn account_type_parse_is_case_insensitive() {
        assert_eq!(AccountType::parse(" Asset "), Some(AccountType::Asset));
        assert_eq!(AccountType::parse("EXPENSE"), Some(AccountType::Expense));
        assert_eq!(AccountType::parse("contra"), None);
        assert_eq!(AccountType::Liability.as_str(), "liability");
    }

    #[test]
    fn account_filter_applies_type_and_active() {
        let account = ChartOfAccount {
            id: 1,
            company_id: 1,
            account_code: "1000".to_string(),
            account_name: "Cash".to_string(),
            account_type: AccountType::Asset,
            account_category: "current_asset".to_string(),
            is_active: false,
            description: None,
        };

        assert!(AccountFilter::default().matches(&account));
        assert!(!AccountFilter { account_type: None, active_only: true }.matches(&account));
        assert!(
            !AccountFilter {
                account_type: Some(AccountType::Revenue),
                active_only: false
            }
            .matches(&account)
        );
    }
}
