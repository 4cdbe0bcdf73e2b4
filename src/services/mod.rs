// Storefront
pub mod cart;
pub mod catalog;
pub mod orders;

// Back office
pub mod inventory;

// Reporting
pub mod reports;
