use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::{Inventory, Invoice, InvoiceItem, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdResponse {
    pub id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub user: User,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: String,
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompanyRequest {
    #[serde(default)]
    pub name: String,
    pub trade_license_number: Option<String>,
    pub tax_registration_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub fiscal_year_start: Option<NaiveDate>,
    pub base_currency: Option<String>,
    pub logo_url: Option<String>,
    pub seed_chart_of_accounts: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub trade_license_number: Option<String>,
    pub tax_registration_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub fiscal_year_start: Option<NaiveDate>,
    pub base_currency: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub category: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub product_type: Option<String>,
    pub purchase_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub product_type: Option<String>,
    pub purchase_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuery {
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub account_code: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub account_type: String,
    pub account_category: Option<String>,
    pub is_active: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub account_code: Option<String>,
    pub account_name: Option<String>,
    pub account_type: Option<String>,
    pub account_category: Option<String>,
    pub is_active: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalLineRequest {
    pub account_id: i64,
    pub description: Option<String>,
    #[serde(default)]
    pub debit_amount: Decimal,
    #[serde(default)]
    pub credit_amount: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJournalEntryRequest {
    #[serde(default)]
    pub entry_number: String,
    pub entry_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
    pub reference: Option<String>,
    #[serde(default)]
    pub lines: Vec<JournalLineRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWarehouseRequest {
    #[serde(default)]
    pub name: String,
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWarehouseRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryQuery {
    pub product_id: Option<i64>,
    pub warehouse_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInventoryRequest {
    pub product_id: i64,
    pub warehouse_id: i64,
    #[serde(default)]
    pub quantity_on_hand: Decimal,
    pub reorder_level: Option<Decimal>,
    pub reorder_quantity: Option<Decimal>,
    pub last_stock_take_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInventoryRequest {
    pub quantity_on_hand: Option<Decimal>,
    pub reorder_level: Option<Decimal>,
    pub reorder_quantity: Option<Decimal>,
    pub last_stock_take_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustInventoryRequest {
    pub product_id: i64,
    pub warehouse_id: i64,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseStock {
    #[serde(flatten)]
    pub inventory: Inventory,
    pub warehouse_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockItem {
    pub id: i64,
    pub product_id: i64,
    pub product_code: String,
    pub product_name: String,
    pub warehouse_id: i64,
    pub warehouse_name: String,
    pub quantity_on_hand: Decimal,
    pub reorder_level: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceQuery {
    #[serde(rename = "type")]
    pub invoice_type: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItemRequest {
    pub product_id: i64,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceItemRequest {
    pub product_id: Option<i64>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    #[serde(default)]
    pub invoice_number: String,
    #[serde(default)]
    pub invoice_type: String,
    pub customer_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub is_recurring: Option<bool>,
    pub recurrence_pattern: Option<String>,
    pub next_recurrence_date: Option<NaiveDate>,
    pub e_invoice_status: Option<String>,
    pub e_invoice_reference: Option<String>,
    #[serde(default)]
    pub items: Vec<InvoiceItemRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    pub invoice_number: Option<String>,
    pub invoice_type: Option<String>,
    pub customer_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub is_recurring: Option<bool>,
    pub recurrence_pattern: Option<String>,
    pub next_recurrence_date: Option<NaiveDate>,
    pub e_invoice_status: Option<String>,
    pub e_invoice_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_request_accepts_numbers_and_strings_for_amounts() {
        let request: CreateJournalEntryRequest = serde_json::from_value(serde_json::json!({
            "entryNumber": "JE-0001",
            "entryDate": "2025-04-15",
            "description": "Capital",
            "lines": [
                { "accountId": 1, "debitAmount": 100 },
                { "accountId": 2, "creditAmount": "100.00" }
            ]
        }))
        .unwrap();

        assert_eq!(request.lines.len(), 2);
        assert_eq!(request.lines[0].debit_amount, Decimal::new(100, 0));
        assert!(request.lines[0].credit_amount.is_zero());
        assert_eq!(request.lines[1].credit_amount, Decimal::new(10000, 2));
    }

    #[test]
    fn type_fields_use_wire_name() {
        let query: InvoiceQuery =
            serde_json::from_value(serde_json::json!({ "type": "sales", "status": "sent" }))
                .unwrap();
        assert_eq!(query.invoice_type.as_deref(), Some("sales"));

        let product: CreateProductRequest = serde_json::from_value(serde_json::json!({
            "code": "SVC-1",
            "name": "Consulting hour",
            "type": "service",
            "salePrice": 350
        }))
        .unwrap();
        assert_eq!(product.product_type.as_deref(), Some("service"));
    }
}
