use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::adapters::{InvoiceLineItem, InvoiceRequest};
use super::calendar;
use super::models::{Payment, PaymentStatus};
use super::service::{schedule_payment, ContractService, Mutation};
use super::store::ContractCommit;
use crate::error::{ContractError, ContractResult};

/// Shutdown signal checked by the sweeps between items, never mid-item.
#[derive(Clone, Default)]
pub struct SweepControl {
    shutdown: Option<watch::Receiver<bool>>,
}

impl SweepControl {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            shutdown: Some(shutdown),
        }
    }

    /// A control that never stops; used for on-demand sweeps.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown
            .as_ref()
            .map_or(false, |receiver| *receiver.borrow())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepFailure {
    pub subject_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub error: String,
}

/// Aggregate outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub errors: Vec<SweepFailure>,
    /// Set when a shutdown signal stopped the pass before the last item.
    pub interrupted: bool,
}

impl SweepReport {
    pub(crate) fn record_failure(
        &mut self,
        subject_id: Uuid,
        contract_id: Option<Uuid>,
        err: &ContractError,
    ) {
        self.errors.push(SweepFailure {
            subject_id,
            contract_id,
            error: err.to_string(),
        });
    }
}

enum BillingOutcome {
    Invoiced {
        invoice_id: String,
        next_payment: Option<Payment>,
    },
    Skipped(&'static str),
}

/// key: contract-sweeps -> periodic billing and renewal runs
pub fn spawn(
    service: ContractService,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let control = SweepControl::new(shutdown.clone());
        let mut ticker = time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if control.is_stopping() {
                break;
            }

            let now = Utc::now();
            // Renewals first so a lapsed contract is renewed or expired before its due payment is billed.
            match service.process_renewals(now, &control).await {
                Ok(report) => info!(
                    notices = report.notices_sent,
                    renewed = report.renewed,
                    expired = report.expired,
                    failures = report.notices.errors.len() + report.expirations.errors.len(),
                    "contract renewal sweep finished"
                ),
                Err(err) => warn!(?err, "contract renewal sweep failed"),
            }
            if control.is_stopping() {
                break;
            }
            match service.process_pending_payments(now, &control).await {
                Ok(report) => info!(
                    processed = report.processed,
                    invoiced = report.succeeded,
                    skipped = report.skipped,
                    failures = report.errors.len(),
                    "contract billing sweep finished"
                ),
                Err(err) => warn!(?err, "contract billing sweep failed"),
            }
        }
        info!("contract sweeps stopped");
    })
}

impl ContractService {
    /// key: billing-scheduler -> invoice due payments
    ///
    /// Only fails when the due payments cannot be listed; per-payment failures
    /// are collected in the report.
    pub async fn process_pending_payments(
        &self,
        now: DateTime<Utc>,
        control: &SweepControl,
    ) -> ContractResult<SweepReport> {
        let today = now.date_naive();
        let due = self.store.due_payments(today).await?;
        let mut report = SweepReport::default();

        for payment in due {
            if control.is_stopping() {
                report.interrupted = true;
                break;
            }
            report.processed += 1;
            match self.bill_payment(&payment, now).await {
                Ok(BillingOutcome::Invoiced {
                    invoice_id,
                    next_payment,
                }) => {
                    report.succeeded += 1;
                    info!(
                        payment = %payment.id,
                        contract = %payment.contract_id,
                        invoice = %invoice_id,
                        next_due = ?next_payment.as_ref().map(|next| next.due_date),
                        "contract payment invoiced"
                    );
                }
                Ok(BillingOutcome::Skipped(reason)) => {
                    report.skipped += 1;
                    debug!(payment = %payment.id, contract = %payment.contract_id, reason, "contract payment skipped");
                }
                Err(err) => {
                    warn!(?err, payment = %payment.id, contract = %payment.contract_id, "contract payment billing failed");
                    report.record_failure(payment.id, Some(payment.contract_id), &err);
                }
            }
        }

        Ok(report)
    }

    async fn bill_payment(
        &self,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> ContractResult<BillingOutcome> {
        let contract = self.get_contract(payment.contract_id).await?;
        if !contract.is_active() {
            return Ok(BillingOutcome::Skipped("contract not active"));
        }

        let amount = calendar::period_amount(contract.base_price, contract.billing_frequency);
        let request = InvoiceRequest {
            organization_id: contract.organization_id,
            client_id: contract.client_id,
            idempotency_key: payment.id,
            line_items: vec![InvoiceLineItem {
                description: format!(
                    "{} - {}",
                    contract.name,
                    calendar::format_period(payment.period_start, payment.period_end)
                ),
                quantity: 1,
                unit_price: amount,
                total: amount,
            }],
            notes: Some(format!("Contract {}", contract.contract_number)),
        };

        let issued = match self
            .call_collaborator("invoice issuer", self.invoices.issue(&request))
            .await
        {
            Ok(issued) => issued,
            Err(err) => {
                if let Err(record_err) = self
                    .record_invoice_failure(payment, &err.to_string(), now)
                    .await
                {
                    warn!(?record_err, payment = %payment.id, "failed to record invoice attempt");
                }
                return Err(err);
            }
        };

        let today = now.date_naive();
        let currency = self.settings.currency.clone();
        let invoice_id = issued.id;
        let (_, next_payment) = self
            .mutate(payment.contract_id, |snapshot| {
                let current = snapshot
                    .payment(payment.id)
                    .cloned()
                    .ok_or(ContractError::NotFound {
                        entity: "payment",
                        id: payment.id,
                    })?;
                if current.status != PaymentStatus::Pending {
                    return Ok(Mutation::Unchanged(None));
                }
                let chain_next = !snapshot.has_other_pending(payment.id);

                let mut invoiced = current;
                invoiced.status = PaymentStatus::Invoiced;
                invoiced.invoice_id = Some(invoice_id.clone());
                invoiced.amount = amount;
                invoiced.failure_reason = None;

                let mut contract = snapshot.contract;
                let mut next = None;
                if chain_next && contract.is_active() && contract.end_date > today {
                    next = Some(schedule_payment(&mut contract, &currency, now));
                }
                contract.updated_at = now;

                let mut commit = ContractCommit::new(contract).with_updated_payment(invoiced);
                if let Some(next) = &next {
                    commit = commit.with_new_payment(next.clone());
                }
                Ok(Mutation::Commit(commit, next))
            })
            .await?;

        Ok(BillingOutcome::Invoiced {
            invoice_id,
            next_payment,
        })
    }

    /// Counts a failed issue attempt; the payment turns `failed` once the
    /// configured attempt limit is reached and the next period is scheduled
    /// in its place.
    async fn record_invoice_failure(
        &self,
        payment: &Payment,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ContractResult<()> {
        let max_attempts = self.settings.invoice_max_attempts;
        let today = now.date_naive();
        let currency = self.settings.currency.clone();
        let (_, status) = self
            .mutate(payment.contract_id, |snapshot| {
                let mut current = match snapshot.payment(payment.id) {
                    Some(current) if current.status == PaymentStatus::Pending => current.clone(),
                    Some(current) => return Ok(Mutation::Unchanged(current.status)),
                    None => {
                        return Err(ContractError::NotFound {
                            entity: "payment",
                            id: payment.id,
                        })
                    }
                };
                current.retry_count += 1;
                current.last_retry_at = Some(now);
                current.failure_reason = Some(reason.to_string());
                if current.retry_count >= max_attempts {
                    current.status = PaymentStatus::Failed;
                }
                let status = current.status;
                let chain_next = !snapshot.has_other_pending(payment.id);

                let mut contract = snapshot.contract;
                let mut next = None;
                if status == PaymentStatus::Failed
                    && chain_next
                    && contract.is_active()
                    && contract.end_date > today
                {
                    next = Some(schedule_payment(&mut contract, &currency, now));
                    contract.updated_at = now;
                }

                let mut commit = ContractCommit::new(contract).with_updated_payment(current);
                if let Some(next) = next {
                    commit = commit.with_new_payment(next);
                }
                Ok(Mutation::Commit(commit, status))
            })
            .await?;
        if status == PaymentStatus::Failed {
            warn!(payment = %payment.id, contract = %payment.contract_id, "contract payment gave up after repeated invoice failures");
        }
        Ok(())
    }
}
