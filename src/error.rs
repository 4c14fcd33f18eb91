use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use uuid::Uuid;

use crate::contracts::models::ContractStatus;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("contract {contract_id} cannot {action} while {from}")]
    InvalidStateTransition {
        contract_id: Uuid,
        from: ContractStatus,
        action: &'static str,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("collaborator failure: {0}")]
    Collaborator(String),
    #[error("contract {contract_id} was modified concurrently")]
    ConcurrencyConflict { contract_id: Uuid },
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ContractError {
    pub fn validation(message: impl Into<String>) -> Self {
        ContractError::Validation(message.into())
    }

    pub fn contract_not_found(id: Uuid) -> Self {
        ContractError::NotFound {
            entity: "contract",
            id,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ContractError::ConcurrencyConflict { .. })
    }
}

impl IntoResponse for ContractError {
    fn into_response(self) -> Response {
        let status = match self {
            ContractError::Validation(_) => StatusCode::BAD_REQUEST,
            ContractError::NotFound { .. } => StatusCode::NOT_FOUND,
            ContractError::InvalidStateTransition { .. }
            | ContractError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
            ContractError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            ContractError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(?self);
        (status, self.to_string()).into_response()
    }
}

pub type ContractResult<T> = Result<T, ContractError>;
