use crate::ledger::AccountType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultAccount {
    pub code: &'static str,
    pub name: &'static str,
    pub account_type: AccountType,
    pub category: &'static str,
}

/// Starting chart of accounts and defaults applied to a newly created company.
pub trait StandardsProfile {
    fn name(&self) -> &'static str;
    fn chart_of_accounts(&self) -> Vec<DefaultAccount>;
    fn base_currency(&self) -> &'static str;
}

#[derive(Debug, Clone, Default)]
pub struct SmeProfile;

impl StandardsProfile for SmeProfile {
    fn name(&self) -> &'static str {
        "SME-basic"
    }

    fn chart_of_accounts(&self) -> Vec<DefaultAccount> {
        vec![
            DefaultAccount {
                code: "1000",
                name: "Cash",
                account_type: AccountType::Asset,
                category: "current_asset",
            },
            DefaultAccount {
                code: "1100",
                name: "Accounts Receivable",
                account_type: AccountType::Asset,
                category: "current_asset",
            },
            DefaultAccount {
                code: "1300",
                name: "Inventory",
                account_type: AccountType::Asset,
                category: "current_asset",
            },
            DefaultAccount {
                code: "2100",
                name: "Accounts Payable",
                account_type: AccountType::Liability,
                category: "current_liability",
            },
            DefaultAccount {
                code: "2200",
                name: "VAT Payable",
                account_type: AccountType::Liability,
                category: "current_liability",
            },
            DefaultAccount {
                code: "3000",
                name: "Owner's Equity",
                account_type: AccountType::Equity,
                category: "equity",
            },
            DefaultAccount {
                code: "4000",
                name: "Sales Revenue",
                account_type: AccountType::Revenue,
                category: "operating_revenue",
            },
            DefaultAccount {
                code: "5000",
                name: "Cost of Goods Sold",
                account_type: AccountType::Expense,
                category: "cost_of_sales",
            },
            DefaultAccount {
                code: "5100",
                name: "Operating Expenses",
                account_type: AccountType::Expense,
                category: "operating_expense",
            },
        ]
    }

    fn base_currency(&self) -> &'static str {
        "AED"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn default_chart_has_unique_codes_and_every_type() {
        let chart = SmeProfile.chart_of_accounts();
        let codes: HashSet<_> = chart.iter().map(|account| account.code).collect();
        assert_eq!(codes.len(), chart.len());

        let types: HashSet<_> = chart.iter().map(|account| account.account_type).collect();
        assert_eq!(types.len(), 5);
    }
}
