pub mod adapters;
pub mod api;
pub mod calendar;
pub mod coverage;
pub mod models;
pub mod postgres;
pub mod renewals;
pub mod scheduler;
pub mod service;
pub mod stats;
pub mod store;
pub mod testing;

pub use adapters::{
    HttpInvoiceIssuer, HttpNotifier, InvoiceIssuer, InvoiceLineItem, InvoiceRequest,
    IssuedInvoice, Notification, Notifier, TracingNotifier,
};
pub use models::*;
pub use postgres::PgContractStore;
pub use renewals::RenewalSweepReport;
pub use scheduler::{SweepControl, SweepFailure, SweepReport};
pub use service::ContractService;
pub use store::{ContractCommit, ContractStore};
