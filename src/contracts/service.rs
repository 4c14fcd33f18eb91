use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::adapters::{InvoiceIssuer, Notifier};
use super::calendar::{self, add_months};
use super::models::{
    Contract, ContractFilters, ContractStatus, ContractTemplate, CreateContractInput,
    CreateTemplateInput, Payment, PaymentStatus, RenewalOptions, RenewalRecord, RenewalType,
    ServiceUsageRecord, SignatureEvidence, UpdateContractInput, DEFAULT_DURATION_MONTHS,
    DEFAULT_RENEWAL_NOTICE_DAYS,
};
use super::store::{ContractCommit, ContractStore};
use crate::config::EngineSettings;
use crate::error::{ContractError, ContractResult};

/// A contract as read for a mutation, together with all of its payments.
#[derive(Debug, Clone)]
pub struct ContractSnapshot {
    pub contract: Contract,
    pub payments: Vec<Payment>,
}

impl ContractSnapshot {
    /// True when a pending payment other than `payment_id` is outstanding.
    pub fn has_other_pending(&self, payment_id: Uuid) -> bool {
        self.payments
            .iter()
            .any(|payment| payment.id != payment_id && payment.status == PaymentStatus::Pending)
    }

    pub fn payment(&self, payment_id: Uuid) -> Option<&Payment> {
        self.payments.iter().find(|payment| payment.id == payment_id)
    }
}

/// Outcome of a mutation closure.
pub enum Mutation<T> {
    Commit(ContractCommit, T),
    Unchanged(T),
}

/// key: contract-engine -> lifecycle, coverage, billing, renewals
#[derive(Clone)]
pub struct ContractService {
    pub(crate) store: Arc<dyn ContractStore>,
    pub(crate) invoices: Arc<dyn InvoiceIssuer>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) settings: EngineSettings,
}

impl ContractService {
    pub fn new(
        store: Arc<dyn ContractStore>,
        invoices: Arc<dyn InvoiceIssuer>,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            invoices,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn create_template(
        &self,
        organization_id: Uuid,
        input: CreateTemplateInput,
        now: DateTime<Utc>,
    ) -> ContractResult<ContractTemplate> {
        input.validate()?;
        let template = ContractTemplate {
            id: Uuid::new_v4(),
            organization_id,
            name: input.name.trim().to_string(),
            description: input.description,
            contract_type: input.contract_type,
            included_services: input.included_services,
            additional_services_discount: input.additional_services_discount.unwrap_or_default(),
            base_price: input.base_price,
            billing_frequency: input.billing_frequency.unwrap_or_default(),
            duration_months: input.duration_months.unwrap_or(DEFAULT_DURATION_MONTHS),
            auto_renew: input.auto_renew.unwrap_or(true),
            renewal_notice_days: input
                .renewal_notice_days
                .unwrap_or(DEFAULT_RENEWAL_NOTICE_DAYS),
            terms_and_conditions: input.terms_and_conditions,
            cancellation_policy: input.cancellation_policy,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_template(&template).await?;
        info!(template = %template.id, organization = %organization_id, "contract template created");
        Ok(template)
    }

    pub async fn list_templates(&self, organization_id: Uuid) -> ContractResult<Vec<ContractTemplate>> {
        self.store.list_templates(organization_id).await
    }

    /// key: contract-lifecycle -> create draft
    pub async fn create_contract(
        &self,
        organization_id: Uuid,
        input: CreateContractInput,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> ContractResult<Contract> {
        input.validate()?;
        if created_by.trim().is_empty() {
            return Err(ContractError::validation("created_by is required"));
        }
        if let Some(template_id) = input.template_id {
            let template = self.store.get_template(template_id).await?;
            if !template.map_or(false, |t| t.organization_id == organization_id) {
                return Err(ContractError::NotFound {
                    entity: "template",
                    id: template_id,
                });
            }
        }

        let year = now.year();
        let sequence = self
            .store
            .allocate_contract_sequence(organization_id, year)
            .await?;
        let duration = input.duration_months.unwrap_or(DEFAULT_DURATION_MONTHS);

        let contract = Contract {
            id: Uuid::new_v4(),
            organization_id,
            contract_number: format!("CTR-{year}-{sequence:04}"),
            client_id: input.client_id,
            piano_id: input.piano_id,
            template_id: input.template_id,
            name: input.name.trim().to_string(),
            description: input.description,
            contract_type: input.contract_type,
            status: ContractStatus::Draft,
            included_services: input.included_services,
            services_used: Vec::new(),
            additional_services_discount: input.additional_services_discount.unwrap_or_default(),
            base_price: input.base_price,
            billing_frequency: input.billing_frequency.unwrap_or_default(),
            next_billing_date: input.start_date,
            start_date: input.start_date,
            end_date: add_months(input.start_date, duration),
            auto_renew: input.auto_renew.unwrap_or(true),
            renewal_notice_days: input
                .renewal_notice_days
                .unwrap_or(DEFAULT_RENEWAL_NOTICE_DAYS),
            renewal_notification_sent: false,
            terms_and_conditions: input.terms_and_conditions,
            cancellation_policy: input.cancellation_policy,
            notes: input.notes,
            signed_at: None,
            signature: None,
            suspended_at: None,
            suspension_reason: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        self.store.insert_contract(&contract).await?;
        info!(
            contract = %contract.id,
            number = %contract.contract_number,
            client = %contract.client_id,
            "maintenance contract drafted"
        );
        Ok(contract)
    }

    pub async fn get_contract(&self, contract_id: Uuid) -> ContractResult<Contract> {
        self.store
            .get_contract(contract_id)
            .await?
            .ok_or_else(|| ContractError::contract_not_found(contract_id))
    }

    pub async fn list_contracts(
        &self,
        organization_id: Uuid,
        filters: &ContractFilters,
    ) -> ContractResult<Vec<Contract>> {
        self.store.list_contracts(organization_id, filters).await
    }

    pub async fn client_active_contracts(&self, client_id: Uuid) -> ContractResult<Vec<Contract>> {
        self.store.active_contracts_for_client(client_id).await
    }

    pub async fn update_contract(
        &self,
        contract_id: Uuid,
        input: UpdateContractInput,
        now: DateTime<Utc>,
    ) -> ContractResult<Contract> {
        input.validate()?;
        let (contract, ()) = self
            .mutate(contract_id, |snapshot| {
                let mut contract = snapshot.contract;
                if contract.status.is_terminal() {
                    return Err(ContractError::InvalidStateTransition {
                        contract_id,
                        from: contract.status,
                        action: "update",
                    });
                }
                input.clone().apply(&mut contract);
                contract.updated_at = now;
                Ok(Mutation::Commit(ContractCommit::new(contract), ()))
            })
            .await?;
        Ok(contract)
    }

    /// key: contract-lifecycle -> activate and schedule first payment
    pub async fn activate_contract(
        &self,
        contract_id: Uuid,
        signature: Option<SignatureEvidence>,
        now: DateTime<Utc>,
    ) -> ContractResult<Contract> {
        let currency = self.settings.currency.clone();
        let (contract, payment) = self
            .mutate(contract_id, |snapshot| {
                let mut contract = snapshot.contract;
                if contract.status != ContractStatus::Draft {
                    return Err(ContractError::InvalidStateTransition {
                        contract_id,
                        from: contract.status,
                        action: "activate",
                    });
                }
                contract.status = ContractStatus::Active;
                contract.signed_at = Some(now);
                contract.signature = signature.clone();
                contract.updated_at = now;
                let payment = schedule_payment(&mut contract, &currency, now);
                let commit = ContractCommit::new(contract).with_new_payment(payment.clone());
                Ok(Mutation::Commit(commit, payment))
            })
            .await?;
        info!(
            contract = %contract_id,
            payment = %payment.id,
            due = %payment.due_date,
            amount = %payment.amount,
            "maintenance contract activated"
        );
        Ok(contract)
    }

    pub async fn suspend_contract(
        &self,
        contract_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ContractResult<Contract> {
        let (contract, ()) = self
            .mutate(contract_id, |snapshot| {
                let mut contract = snapshot.contract;
                if contract.status != ContractStatus::Active {
                    return Err(ContractError::InvalidStateTransition {
                        contract_id,
                        from: contract.status,
                        action: "suspend",
                    });
                }
                contract.status = ContractStatus::Suspended;
                contract.suspended_at = Some(now);
                contract.suspension_reason = reason.clone();
                contract.updated_at = now;
                Ok(Mutation::Commit(ContractCommit::new(contract), ()))
            })
            .await?;
        info!(contract = %contract_id, "maintenance contract suspended");
        Ok(contract)
    }

    pub async fn resume_contract(
        &self,
        contract_id: Uuid,
        now: DateTime<Utc>,
    ) -> ContractResult<Contract> {
        let (contract, ()) = self
            .mutate(contract_id, |snapshot| {
                let mut contract = snapshot.contract;
                if contract.status != ContractStatus::Suspended {
                    return Err(ContractError::InvalidStateTransition {
                        contract_id,
                        from: contract.status,
                        action: "resume",
                    });
                }
                contract.status = ContractStatus::Active;
                contract.updated_at = now;
                Ok(Mutation::Commit(ContractCommit::new(contract), ()))
            })
            .await?;
        info!(contract = %contract_id, "maintenance contract resumed");
        Ok(contract)
    }

    pub async fn cancel_contract(
        &self,
        contract_id: Uuid,
        reason: String,
        now: DateTime<Utc>,
    ) -> ContractResult<Contract> {
        if reason.trim().is_empty() {
            return Err(ContractError::validation("cancellation reason is required"));
        }
        let (contract, ()) = self
            .mutate(contract_id, |snapshot| {
                let mut contract = snapshot.contract;
                if !matches!(
                    contract.status,
                    ContractStatus::Active | ContractStatus::Suspended
                ) {
                    return Err(ContractError::InvalidStateTransition {
                        contract_id,
                        from: contract.status,
                        action: "cancel",
                    });
                }
                contract.status = ContractStatus::Cancelled;
                contract.cancelled_at = Some(now);
                contract.cancellation_reason = Some(reason.clone());
                contract.updated_at = now;
                Ok(Mutation::Commit(ContractCommit::new(contract), ()))
            })
            .await?;
        info!(contract = %contract_id, "maintenance contract cancelled");
        Ok(contract)
    }

    /// key: contract-lifecycle -> manual renewal
    ///
    /// Works from any status, so an expired or cancelled contract can be brought back.
    pub async fn renew_contract(
        &self,
        contract_id: Uuid,
        options: RenewalOptions,
        now: DateTime<Utc>,
    ) -> ContractResult<Contract> {
        options.validate()?;
        let currency = self.settings.currency.clone();
        let (contract, renewal) = self
            .mutate(contract_id, |snapshot| {
                let (commit, renewal) =
                    apply_renewal(snapshot, &options, RenewalType::Manual, &currency, now);
                Ok(Mutation::Commit(commit, renewal))
            })
            .await?;
        info!(
            contract = %contract_id,
            previous_end = %renewal.previous_end_date,
            new_end = %renewal.new_end_date,
            "maintenance contract renewed"
        );
        Ok(contract)
    }

    /// Records settlement of an invoiced payment.
    pub async fn mark_payment_paid(
        &self,
        payment_id: Uuid,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> ContractResult<Payment> {
        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or(ContractError::NotFound {
                entity: "payment",
                id: payment_id,
            })?;
        let (_, paid) = self
            .mutate(payment.contract_id, |snapshot| {
                let mut payment = snapshot
                    .payment(payment_id)
                    .cloned()
                    .ok_or(ContractError::NotFound {
                        entity: "payment",
                        id: payment_id,
                    })?;
                if payment.status != PaymentStatus::Invoiced {
                    return Err(ContractError::validation(format!(
                        "payment {payment_id} is {} and cannot be marked paid",
                        payment.status.as_str()
                    )));
                }
                payment.status = PaymentStatus::Paid;
                payment.paid_at = Some(now);
                payment.payment_reference = reference.clone();
                let mut contract = snapshot.contract;
                contract.updated_at = now;
                let commit = ContractCommit::new(contract).with_updated_payment(payment.clone());
                Ok(Mutation::Commit(commit, payment))
            })
            .await?;
        info!(payment = %payment_id, contract = %paid.contract_id, "contract payment settled");
        Ok(paid)
    }

    pub async fn get_contract_payments(&self, contract_id: Uuid) -> ContractResult<Vec<Payment>> {
        self.get_contract(contract_id).await?;
        self.store.payments_for_contract(contract_id).await
    }

    pub async fn get_service_usage_history(
        &self,
        contract_id: Uuid,
    ) -> ContractResult<Vec<ServiceUsageRecord>> {
        self.get_contract(contract_id).await?;
        self.store.usage_for_contract(contract_id).await
    }

    pub async fn get_renewal_history(&self, contract_id: Uuid) -> ContractResult<Vec<RenewalRecord>> {
        self.get_contract(contract_id).await?;
        self.store.renewals_for_contract(contract_id).await
    }

    pub(crate) async fn snapshot(&self, contract_id: Uuid) -> ContractResult<ContractSnapshot> {
        let contract = self.get_contract(contract_id).await?;
        let payments = self.store.payments_for_contract(contract_id).await?;
        Ok(ContractSnapshot { contract, payments })
    }

    /// Read-modify-commit against the latest contract version, retried on
    /// version conflicts up to the configured limit.
    pub(crate) async fn mutate<T, F>(&self, contract_id: Uuid, mut apply: F) -> ContractResult<(Contract, T)>
    where
        F: FnMut(ContractSnapshot) -> ContractResult<Mutation<T>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            let snapshot = self.snapshot(contract_id).await?;
            let current = snapshot.contract.clone();
            let (commit, output) = match apply(snapshot)? {
                Mutation::Commit(commit, output) => (commit, output),
                Mutation::Unchanged(output) => return Ok((current, output)),
            };
            match self.store.commit(commit).await {
                Ok(stored) => return Ok((stored, output)),
                Err(err) if err.is_conflict() && attempt < self.settings.conflict_retries => {
                    attempt += 1;
                    debug!(contract = %contract_id, attempt, "contract changed underneath, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Bounds a collaborator call by the configured timeout.
    pub(crate) async fn call_collaborator<T, Fut>(&self, what: &str, call: Fut) -> ContractResult<T>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.settings.collaborator_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ContractError::Collaborator(format!("{what}: {err:#}"))),
            Err(_) => Err(ContractError::Collaborator(format!(
                "{what}: timed out after {}s",
                self.settings.collaborator_timeout.as_secs_f64()
            ))),
        }
    }
}

/// Creates the pending payment for the period starting at `next_billing_date`
/// and advances the pointer by one period.
pub(crate) fn schedule_payment(contract: &mut Contract, currency: &str, now: DateTime<Utc>) -> Payment {
    let period_start = contract.next_billing_date;
    let period_end = calendar::next_billing_date(period_start, contract.billing_frequency);
    contract.next_billing_date = period_end;
    Payment {
        id: Uuid::new_v4(),
        contract_id: contract.id,
        organization_id: contract.organization_id,
        amount: calendar::period_amount(contract.base_price, contract.billing_frequency),
        currency: currency.to_string(),
        status: PaymentStatus::Pending,
        period_start,
        period_end,
        due_date: period_start,
        invoice_id: None,
        paid_at: None,
        payment_reference: None,
        retry_count: 0,
        last_retry_at: None,
        failure_reason: None,
        created_at: now,
    }
}

/// Extends the term from the old end date, resets usage and notice state, and
/// schedules the next pending payment.
pub(crate) fn apply_renewal(
    snapshot: ContractSnapshot,
    options: &RenewalOptions,
    renewal_type: RenewalType,
    currency: &str,
    now: DateTime<Utc>,
) -> (ContractCommit, RenewalRecord) {
    let mut contract = snapshot.contract;

    let previous_end = contract.end_date;
    let previous_price = contract.base_price;
    let new_price = options.new_price.unwrap_or(previous_price);
    let duration = options.duration_months.unwrap_or(DEFAULT_DURATION_MONTHS);
    let new_end = add_months(previous_end, duration);

    contract.start_date = previous_end;
    contract.end_date = new_end;
    contract.base_price = new_price;
    contract.services_used.clear();
    contract.renewal_notification_sent = false;
    contract.status = ContractStatus::Active;
    contract.updated_at = now;
    // Periods skipped while the contract lapsed are not billed retroactively.
    if contract.next_billing_date < contract.start_date {
        contract.next_billing_date = contract.start_date;
    }

    let renewal = RenewalRecord {
        id: Uuid::new_v4(),
        contract_id: contract.id,
        renewed_at: now,
        previous_end_date: previous_end,
        new_end_date: new_end,
        previous_price,
        new_price,
        price_change_reason: options.price_change_reason.clone(),
        renewal_type,
    };

    let payment = schedule_payment(&mut contract, currency, now);
    let commit = ContractCommit::new(contract)
        .with_renewal(renewal.clone())
        .with_new_payment(payment);
    (commit, renewal)
}
