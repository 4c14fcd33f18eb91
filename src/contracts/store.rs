use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use super::models::{
    Contract, ContractFilters, ContractTemplate, Payment, RenewalRecord, ServiceUsageRecord,
};
use crate::error::ContractResult;

/// Everything a single-contract operation writes, applied atomically.
///
/// `contract.version` must carry the version that was read; the store rejects
/// the commit with `ConcurrencyConflict` when the stored row has moved on.
#[derive(Debug, Clone)]
pub struct ContractCommit {
    pub contract: Contract,
    pub new_payments: Vec<Payment>,
    pub updated_payments: Vec<Payment>,
    pub renewal: Option<RenewalRecord>,
    pub usage: Option<ServiceUsageRecord>,
}

impl ContractCommit {
    pub fn new(contract: Contract) -> Self {
        Self {
            contract,
            new_payments: Vec::new(),
            updated_payments: Vec::new(),
            renewal: None,
            usage: None,
        }
    }

    pub fn with_new_payment(mut self, payment: Payment) -> Self {
        self.new_payments.push(payment);
        self
    }

    pub fn with_updated_payment(mut self, payment: Payment) -> Self {
        self.updated_payments.push(payment);
        self
    }

    pub fn with_renewal(mut self, renewal: RenewalRecord) -> Self {
        self.renewal = Some(renewal);
        self
    }

    pub fn with_usage(mut self, usage: ServiceUsageRecord) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// key: contract-store -> durable state behind the engine
#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn insert_template(&self, template: &ContractTemplate) -> ContractResult<()>;

    async fn get_template(&self, id: Uuid) -> ContractResult<Option<ContractTemplate>>;

    /// Active templates of an organization, newest first.
    async fn list_templates(&self, organization_id: Uuid) -> ContractResult<Vec<ContractTemplate>>;

    /// Atomically hands out the next contract sequence for an organization and year.
    async fn allocate_contract_sequence(&self, organization_id: Uuid, year: i32)
        -> ContractResult<u32>;

    async fn insert_contract(&self, contract: &Contract) -> ContractResult<()>;

    async fn get_contract(&self, id: Uuid) -> ContractResult<Option<Contract>>;

    /// Contracts of an organization matching `filters`, newest first.
    async fn list_contracts(
        &self,
        organization_id: Uuid,
        filters: &ContractFilters,
    ) -> ContractResult<Vec<Contract>>;

    /// Active contracts of a client in creation order (created_at, then contract number).
    async fn active_contracts_for_client(&self, client_id: Uuid) -> ContractResult<Vec<Contract>>;

    /// Active contracts without a renewal notice whose end date falls within their notice window.
    async fn contracts_due_for_notice(&self, today: NaiveDate) -> ContractResult<Vec<Contract>>;

    /// Active contracts whose end date is on or before `today`.
    async fn contracts_past_end(&self, today: NaiveDate) -> ContractResult<Vec<Contract>>;

    /// Pending payments due on or before `today` on active or suspended
    /// contracts, oldest due date first.
    async fn due_payments(&self, today: NaiveDate) -> ContractResult<Vec<Payment>>;

    async fn get_payment(&self, id: Uuid) -> ContractResult<Option<Payment>>;

    /// Payments of a contract, latest due date first.
    async fn payments_for_contract(&self, contract_id: Uuid) -> ContractResult<Vec<Payment>>;

    /// Usage records of a contract, most recent first.
    async fn usage_for_contract(&self, contract_id: Uuid)
        -> ContractResult<Vec<ServiceUsageRecord>>;

    /// Renewal records of a contract, most recent first.
    async fn renewals_for_contract(&self, contract_id: Uuid) -> ContractResult<Vec<RenewalRecord>>;

    /// Applies `commit` atomically and returns the stored contract with its bumped version.
    async fn commit(&self, commit: ContractCommit) -> ContractResult<Contract>;
}
