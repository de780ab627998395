pub mod charges;
pub mod invoices;
pub mod refunds;
pub mod root;
