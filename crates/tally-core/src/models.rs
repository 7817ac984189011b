use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub trade_license_number: Option<String>,
    pub tax_registration_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub fiscal_year_start: Option<NaiveDate>,
    pub base_currency: String,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Accountant,
    #[default]
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Accountant => "accountant",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "accountant" => Some(Self::Accountant),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub company_id: i64,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Inventory,
    Service,
}

impl ProductType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Service => "service",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inventory" => Some(Self::Inventory),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub company_id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub purchase_price: Option<Decimal>,
    pub sale_price: Decimal,
    pub tax_rate: Option<Decimal>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub location: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: i64,
    pub product_id: i64,
    pub warehouse_id: i64,
    pub quantity_on_hand: Decimal,
    pub reorder_level: Option<Decimal>,
    pub reorder_quantity: Option<Decimal>,
    pub last_stock_take_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceType {
    Sales,
    Purchase,
}

impl InvoiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Purchase => "purchase",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sales" => Some(Self::Sales),
            "purchase" => Some(Self::Purchase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            "paid" => Some(Self::Paid),
            "overdue" => Some(Self::Overdue),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Stored alongside invoices for a future e-invoicing integration; never acted on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EInvoiceStatus {
    NotApplicable,
    Pending,
    Sent,
    Failed,
}

impl EInvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotApplicable => "not_applicable",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_applicable" => Some(Self::NotApplicable),
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: i64,
    pub company_id: i64,
    pub invoice_number: String,
    pub invoice_type: InvoiceType,
    pub customer_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
    pub next_recurrence_date: Option<NaiveDate>,
    pub e_invoice_status: Option<EInvoiceStatus>,
    pub e_invoice_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub product_id: i64,
    pub description: Option<String>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub discount_percentage: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub total_amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_text_conversions_agree_with_serde() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
            InvoiceStatus::Cancelled,
        ] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, serde_json::json!(status.as_str()));
            assert_eq!(InvoiceStatus::parse(status.as_str()), Some(status));
        }

        let wire = serde_json::to_value(EInvoiceStatus::NotApplicable).unwrap();
        assert_eq!(wire, serde_json::json!("not_applicable"));
    }

    #[test]
    fn role_defaults_to_user() {
        assert_eq!(Role::default(), Role::User);
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert!(Role::Admin.is_admin());
        assert!(!Role::Accountant.is_admin());
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn product_type_is_serialized_as_type() {
        let product = Product {
            id: 1,
            company_id: 1,
            code: "SKU-001".to_string(),
            name: "Desk".to_string(),
            description: None,
            category: Some("furniture".to_string()),
            product_type: ProductType::Inventory,
            purchase_price: Some(Decimal::new(25000, 2)),
            sale_price: Decimal::new(40000, 2),
            tax_rate: Some(Decimal::new(5, 0)),
            is_active: true,
        };

        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["type"], serde_json::json!("inventory"));
        assert_eq!(value["salePrice"], serde_json::json!("400.00"));
    }
}
