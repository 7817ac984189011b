pub mod accounting;
pub mod auth;
pub mod companies;
pub mod inventory;
pub mod invoices;
pub mod products;
pub mod users;
