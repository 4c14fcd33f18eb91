pub mod config;
pub mod contracts;
pub mod error;
pub mod routes;

pub use contracts::ContractService;
pub use error::{ContractError, ContractResult};
