//! In-memory collaborators for exercising the engine without Postgres or HTTP.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::adapters::{InvoiceIssuer, InvoiceRequest, IssuedInvoice, Notification, Notifier};
use super::models::{
    Contract, ContractFilters, ContractStatus, ContractTemplate, Payment, PaymentStatus,
    RenewalRecord, ServiceUsageRecord,
};
use super::store::{ContractCommit, ContractStore};
use crate::error::{ContractError, ContractResult};

#[derive(Default)]
struct StoreState {
    templates: Vec<ContractTemplate>,
    contracts: Vec<Contract>,
    payments: Vec<Payment>,
    renewals: Vec<RenewalRecord>,
    usage: Vec<ServiceUsageRecord>,
    sequences: HashMap<(Uuid, i32), u32>,
}

#[derive(Default)]
pub struct InMemoryContractStore {
    state: Mutex<StoreState>,
    injected_conflicts: AtomicUsize,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with a version conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    pub async fn all_payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.clone()
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

fn creation_order(contracts: &mut [Contract]) {
    contracts.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.contract_number.cmp(&b.contract_number))
    });
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
    async fn insert_template(&self, template: &ContractTemplate) -> ContractResult<()> {
        self.state.lock().await.templates.push(template.clone());
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> ContractResult<Option<ContractTemplate>> {
        let state = self.state.lock().await;
        Ok(state.templates.iter().find(|t| t.id == id).cloned())
    }

    async fn list_templates(&self, organization_id: Uuid) -> ContractResult<Vec<ContractTemplate>> {
        let state = self.state.lock().await;
        let mut templates: Vec<_> = state
            .templates
            .iter()
            .filter(|t| t.organization_id == organization_id && t.is_active)
            .cloned()
            .collect();
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates)
    }

    async fn allocate_contract_sequence(
        &self,
        organization_id: Uuid,
        year: i32,
    ) -> ContractResult<u32> {
        let mut state = self.state.lock().await;
        let counter = state.sequences.entry((organization_id, year)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_contract(&self, contract: &Contract) -> ContractResult<()> {
        let mut state = self.state.lock().await;
        if state
            .contracts
            .iter()
            .any(|existing| {
                existing.organization_id == contract.organization_id
                    && existing.contract_number == contract.contract_number
            })
        {
            return Err(ContractError::validation(format!(
                "contract number {} already exists",
                contract.contract_number
            )));
        }
        state.contracts.push(contract.clone());
        Ok(())
    }

    async fn get_contract(&self, id: Uuid) -> ContractResult<Option<Contract>> {
        let state = self.state.lock().await;
        Ok(state.contracts.iter().find(|c| c.id == id).cloned())
    }

    async fn list_contracts(
        &self,
        organization_id: Uuid,
        filters: &ContractFilters,
    ) -> ContractResult<Vec<Contract>> {
        let state = self.state.lock().await;
        let mut contracts: Vec<_> = state
            .contracts
            .iter()
            .filter(|c| c.organization_id == organization_id && filters.matches(c))
            .cloned()
            .collect();
        creation_order(&mut contracts);
        contracts.reverse();
        Ok(contracts)
    }

    async fn active_contracts_for_client(&self, client_id: Uuid) -> ContractResult<Vec<Contract>> {
        let state = self.state.lock().await;
        let mut contracts: Vec<_> = state
            .contracts
            .iter()
            .filter(|c| c.client_id == client_id && c.is_active())
            .cloned()
            .collect();
        creation_order(&mut contracts);
        Ok(contracts)
    }

    async fn contracts_due_for_notice(&self, today: NaiveDate) -> ContractResult<Vec<Contract>> {
        let state = self.state.lock().await;
        let mut contracts: Vec<_> = state
            .contracts
            .iter()
            .filter(|c| {
                c.is_active()
                    && !c.renewal_notification_sent
                    && c.end_date <= today + ChronoDuration::days(i64::from(c.renewal_notice_days))
            })
            .cloned()
            .collect();
        contracts.sort_by_key(|c| c.end_date);
        Ok(contracts)
    }

    async fn contracts_past_end(&self, today: NaiveDate) -> ContractResult<Vec<Contract>> {
        let state = self.state.lock().await;
        let mut contracts: Vec<_> = state
            .contracts
            .iter()
            .filter(|c| c.is_active() && c.end_date <= today)
            .cloned()
            .collect();
        contracts.sort_by_key(|c| c.end_date);
        Ok(contracts)
    }

    async fn due_payments(&self, today: NaiveDate) -> ContractResult<Vec<Payment>> {
        let state = self.state.lock().await;
        let mut payments: Vec<_> = state
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Pending && p.due_date <= today)
            .filter(|p| {
                state
                    .contracts
                    .iter()
                    .find(|contract| contract.id == p.contract_id)
                    .map_or(false, |contract| {
                        matches!(
                            contract.status,
                            ContractStatus::Active | ContractStatus::Suspended
                        )
                    })
            })
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(payments)
    }

    async fn get_payment(&self, id: Uuid) -> ContractResult<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn payments_for_contract(&self, contract_id: Uuid) -> ContractResult<Vec<Payment>> {
        let state = self.state.lock().await;
        let mut payments: Vec<_> = state
            .payments
            .iter()
            .filter(|p| p.contract_id == contract_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.due_date.cmp(&a.due_date));
        Ok(payments)
    }

    async fn usage_for_contract(
        &self,
        contract_id: Uuid,
    ) -> ContractResult<Vec<ServiceUsageRecord>> {
        let state = self.state.lock().await;
        let mut usage: Vec<_> = state
            .usage
            .iter()
            .filter(|u| u.contract_id == contract_id)
            .cloned()
            .collect();
        usage.reverse();
        usage.sort_by(|a, b| b.used_at.cmp(&a.used_at));
        Ok(usage)
    }

    async fn renewals_for_contract(&self, contract_id: Uuid) -> ContractResult<Vec<RenewalRecord>> {
        let state = self.state.lock().await;
        let mut renewals: Vec<_> = state
            .renewals
            .iter()
            .filter(|r| r.contract_id == contract_id)
            .cloned()
            .collect();
        renewals.reverse();
        renewals.sort_by(|a, b| b.renewed_at.cmp(&a.renewed_at));
        Ok(renewals)
    }

    async fn commit(&self, commit: ContractCommit) -> ContractResult<Contract> {
        let contract_id = commit.contract.id;
        if self.take_injected_conflict() {
            return Err(ContractError::ConcurrencyConflict { contract_id });
        }

        let mut state = self.state.lock().await;
        let index = state
            .contracts
            .iter()
            .position(|c| c.id == contract_id)
            .ok_or_else(|| ContractError::contract_not_found(contract_id))?;
        if state.contracts[index].version != commit.contract.version {
            return Err(ContractError::ConcurrencyConflict { contract_id });
        }

        // Validate everything before touching state so a rejected commit leaves no trace.
        let mut pending_due: HashSet<NaiveDate> = state
            .payments
            .iter()
            .filter(|p| p.contract_id == contract_id && p.status == PaymentStatus::Pending)
            .filter(|p| !commit.updated_payments.iter().any(|u| u.id == p.id))
            .map(|p| p.due_date)
            .collect();
        for updated in &commit.updated_payments {
            if !state.payments.iter().any(|p| p.id == updated.id) {
                return Err(ContractError::NotFound {
                    entity: "payment",
                    id: updated.id,
                });
            }
            if updated.status == PaymentStatus::Pending && !pending_due.insert(updated.due_date) {
                return Err(ContractError::validation(format!(
                    "a pending payment is already due on {}",
                    updated.due_date
                )));
            }
        }
        for payment in &commit.new_payments {
            if payment.status == PaymentStatus::Pending && !pending_due.insert(payment.due_date) {
                return Err(ContractError::validation(format!(
                    "a pending payment is already due on {}",
                    payment.due_date
                )));
            }
        }

        let mut contract = commit.contract;
        contract.version += 1;
        state.contracts[index] = contract.clone();
        for updated in commit.updated_payments {
            if let Some(existing) = state.payments.iter_mut().find(|p| p.id == updated.id) {
                *existing = updated;
            }
        }
        state.payments.extend(commit.new_payments);
        state.renewals.extend(commit.renewal);
        state.usage.extend(commit.usage);
        Ok(contract)
    }
}

#[derive(Default)]
struct IssuerState {
    requests: Vec<InvoiceRequest>,
    issued: HashMap<Uuid, IssuedInvoice>,
    failing_clients: HashSet<Uuid>,
}

/// Issues sequential invoice ids and remembers every request. Honors the
/// idempotency key: a repeated key returns the invoice issued the first time.
#[derive(Default)]
pub struct RecordingInvoiceIssuer {
    state: Mutex<IssuerState>,
    delay: Option<Duration>,
}

impl RecordingInvoiceIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            state: Mutex::default(),
            delay: Some(delay),
        }
    }

    pub async fn fail_for_client(&self, client_id: Uuid) {
        self.state.lock().await.failing_clients.insert(client_id);
    }

    pub async fn recover_client(&self, client_id: Uuid) {
        self.state.lock().await.failing_clients.remove(&client_id);
    }

    pub async fn requests(&self) -> Vec<InvoiceRequest> {
        self.state.lock().await.requests.clone()
    }

    pub async fn issued_count(&self) -> usize {
        self.state.lock().await.issued.len()
    }
}

#[async_trait]
impl InvoiceIssuer for RecordingInvoiceIssuer {
    async fn issue(&self, request: &InvoiceRequest) -> Result<IssuedInvoice> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().await;
        state.requests.push(request.clone());
        if state.failing_clients.contains(&request.client_id) {
            return Err(anyhow!("invoice service unavailable"));
        }
        if let Some(existing) = state.issued.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }
        let invoice = IssuedInvoice {
            id: format!("INV-{:04}", state.issued.len() + 1),
        };
        state
            .issued
            .insert(request.idempotency_key, invoice.clone());
        Ok(invoice)
    }
}

#[derive(Default)]
struct NotifierState {
    sent: Vec<Notification>,
    failing_recipients: HashSet<Uuid>,
}

#[derive(Default)]
pub struct RecordingNotifier {
    state: Mutex<NotifierState>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_for_recipient(&self, recipient_id: Uuid) {
        self.state
            .lock()
            .await
            .failing_recipients
            .insert(recipient_id);
    }

    pub async fn recover_recipient(&self, recipient_id: Uuid) {
        self.state
            .lock()
            .await
            .failing_recipients
            .remove(&recipient_id);
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let mut state = self.state.lock().await;
        if state
            .failing_recipients
            .contains(&notification.recipient_id)
        {
            return Err(anyhow!("notification channel unavailable"));
        }
        state.sent.push(notification.clone());
        Ok(())
    }
}
