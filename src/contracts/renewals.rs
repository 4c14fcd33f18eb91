use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::adapters::Notification;
use super::models::{Contract, ContractStatus, RenewalOptions, RenewalType};
use super::scheduler::{SweepControl, SweepReport};
use super::service::{apply_renewal, ContractService, Mutation};
use super::store::ContractCommit;
use crate::error::ContractResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenewalSweepReport {
    pub notices: SweepReport,
    pub expirations: SweepReport,
    pub notices_sent: usize,
    pub renewed: usize,
    pub expired: usize,
}

enum ExpirationOutcome {
    Renewed(NaiveDate),
    Expired,
    Skipped,
}

fn within_notice_window(contract: &Contract, today: NaiveDate) -> bool {
    contract.is_active()
        && !contract.renewal_notification_sent
        && contract.end_date <= today + Duration::days(i64::from(contract.renewal_notice_days))
}

fn renewal_notice(contract: &Contract) -> Notification {
    let (title, body) = if contract.auto_renew {
        (
            "Your maintenance contract renews soon".to_string(),
            format!(
                "Contract {} ({}) ends on {} and will renew automatically.",
                contract.contract_number, contract.name, contract.end_date
            ),
        )
    } else {
        (
            "Your maintenance contract is about to expire".to_string(),
            format!(
                "Contract {} ({}) ends on {}. Contact us to renew it.",
                contract.contract_number, contract.name, contract.end_date
            ),
        )
    };
    Notification {
        recipient_id: contract.client_id,
        title,
        body,
        metadata: json!({
            "contract_id": contract.id,
            "contract_number": contract.contract_number,
            "end_date": contract.end_date,
            "auto_renew": contract.auto_renew,
        }),
    }
}

impl ContractService {
    /// key: renewal-sweep -> notice and expiration passes
    pub async fn process_renewals(
        &self,
        now: DateTime<Utc>,
        control: &SweepControl,
    ) -> ContractResult<RenewalSweepReport> {
        let mut report = RenewalSweepReport::default();
        self.notice_pass(now, control, &mut report).await?;
        if control.is_stopping() {
            report.expirations.interrupted = true;
            return Ok(report);
        }
        self.expiration_pass(now, control, &mut report).await?;
        Ok(report)
    }

    async fn notice_pass(
        &self,
        now: DateTime<Utc>,
        control: &SweepControl,
        report: &mut RenewalSweepReport,
    ) -> ContractResult<()> {
        let today = now.date_naive();
        let candidates = self.store.contracts_due_for_notice(today).await?;

        for candidate in candidates {
            if control.is_stopping() {
                report.notices.interrupted = true;
                break;
            }
            report.notices.processed += 1;
            match self.send_renewal_notice(candidate.id, now).await {
                Ok(true) => {
                    report.notices.succeeded += 1;
                    report.notices_sent += 1;
                }
                Ok(false) => report.notices.skipped += 1,
                Err(err) => {
                    warn!(?err, contract = %candidate.id, "renewal notice failed");
                    report
                        .notices
                        .record_failure(candidate.id, Some(candidate.id), &err);
                }
            }
        }
        Ok(())
    }

    /// Claims the notice flag before notifying so concurrent sweeps send one
    /// notice at most; the claim is released again when delivery fails.
    async fn send_renewal_notice(&self, contract_id: Uuid, now: DateTime<Utc>) -> ContractResult<bool> {
        let today = now.date_naive();
        let (contract, claimed) = self
            .mutate(contract_id, |snapshot| {
                let mut contract = snapshot.contract;
                if !within_notice_window(&contract, today) {
                    return Ok(Mutation::Unchanged(false));
                }
                contract.renewal_notification_sent = true;
                contract.updated_at = now;
                Ok(Mutation::Commit(ContractCommit::new(contract), true))
            })
            .await?;
        if !claimed {
            return Ok(false);
        }

        let claimed_end = contract.end_date;
        let notification = renewal_notice(&contract);
        if let Err(err) = self
            .call_collaborator("notifier", self.notifier.notify(&notification))
            .await
        {
            let released = self
                .mutate(contract_id, |snapshot| {
                    let mut contract = snapshot.contract;
                    if !contract.renewal_notification_sent || contract.end_date != claimed_end {
                        return Ok(Mutation::Unchanged(()));
                    }
                    contract.renewal_notification_sent = false;
                    contract.updated_at = now;
                    Ok(Mutation::Commit(ContractCommit::new(contract), ()))
                })
                .await;
            if let Err(release_err) = released {
                warn!(?release_err, contract = %contract_id, "failed to release renewal notice claim");
            }
            return Err(err);
        }

        info!(contract = %contract_id, end_date = %contract.end_date, "renewal notice sent");
        Ok(true)
    }

    async fn expiration_pass(
        &self,
        now: DateTime<Utc>,
        control: &SweepControl,
        report: &mut RenewalSweepReport,
    ) -> ContractResult<()> {
        let today = now.date_naive();
        let candidates = self.store.contracts_past_end(today).await?;

        for candidate in candidates {
            if control.is_stopping() {
                report.expirations.interrupted = true;
                break;
            }
            report.expirations.processed += 1;
            match self.expire_or_renew(candidate.id, now).await {
                Ok(ExpirationOutcome::Renewed(new_end)) => {
                    report.expirations.succeeded += 1;
                    report.renewed += 1;
                    info!(contract = %candidate.id, new_end = %new_end, "contract renewed automatically");
                }
                Ok(ExpirationOutcome::Expired) => {
                    report.expirations.succeeded += 1;
                    report.expired += 1;
                    info!(contract = %candidate.id, "contract expired");
                }
                Ok(ExpirationOutcome::Skipped) => report.expirations.skipped += 1,
                Err(err) => {
                    warn!(?err, contract = %candidate.id, "contract expiration handling failed");
                    report
                        .expirations
                        .record_failure(candidate.id, Some(candidate.id), &err);
                }
            }
        }
        Ok(())
    }

    async fn expire_or_renew(
        &self,
        contract_id: Uuid,
        now: DateTime<Utc>,
    ) -> ContractResult<ExpirationOutcome> {
        let today = now.date_naive();
        let currency = self.settings.currency.clone();
        let defaults = RenewalOptions::default();
        let (_, outcome) = self
            .mutate(contract_id, |snapshot| {
                let contract = &snapshot.contract;
                if !contract.is_active() || contract.end_date > today {
                    return Ok(Mutation::Unchanged(ExpirationOutcome::Skipped));
                }
                if contract.auto_renew {
                    let (commit, renewal) =
                        apply_renewal(snapshot, &defaults, RenewalType::Automatic, &currency, now);
                    return Ok(Mutation::Commit(
                        commit,
                        ExpirationOutcome::Renewed(renewal.new_end_date),
                    ));
                }
                let mut contract = snapshot.contract;
                contract.status = ContractStatus::Expired;
                contract.updated_at = now;
                Ok(Mutation::Commit(
                    ContractCommit::new(contract),
                    ExpirationOutcome::Expired,
                ))
            })
            .await?;
        Ok(outcome)
    }
}
