pub mod config;
pub mod contracts;
pub mod db;
pub mod error;
pub mod password;
pub mod schema;
pub mod services;
pub mod token;

pub use config::ServiceConfig;
pub use contracts::{
    AccountQuery, AdjustInventoryRequest, AuthResponse, ChangePasswordRequest,
    CreateAccountRequest, CreateCompanyRequest, CreateInventoryRequest, CreateInvoiceRequest,
    CreateJournalEntryRequest, CreateProductRequest, CreateUserRequest, CreateWarehouseRequest,
    IdResponse, InventoryQuery, InvoiceItemRequest, InvoiceQuery, InvoiceWithItems,
    JournalLineRequest, LoginRequest, LowStockItem, ProductQuery, RegisterRequest,
    ResetPasswordRequest, UpdateAccountRequest, UpdateCompanyRequest, UpdateInventoryRequest,
    UpdateInvoiceItemRequest, UpdateInvoiceRequest, UpdateProductRequest, UpdateUserRequest,
    UpdateWarehouseRequest, VerifyResponse, WarehouseStock,
};
pub use db::{connect_database, connect_database_lazy, run_migrations};
pub use error::{ServiceError, ServiceResult};
pub use schema::verify_schema;
pub use services::auth::AuthService;
pub use services::ledger::PgLedgerStore;
pub use token::{Claims, TokenError, TokenSigner};
