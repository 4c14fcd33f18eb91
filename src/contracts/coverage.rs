use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::calendar::AMOUNT_SCALE;
use super::models::{
    Allowance, Contract, CoverageResult, RecordUsageInput, ServiceType, ServiceUsageRecord,
    UsageOutcome, UNLIMITED_REMAINING,
};
use super::service::{ContractService, Mutation};
use super::store::ContractCommit;
use crate::error::{ContractError, ContractResult};

/// Quota left on one contract for a service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaPosition {
    NotIncluded,
    Unlimited,
    Remaining(i64),
}

impl QuotaPosition {
    pub fn covers(&self) -> bool {
        match self {
            QuotaPosition::Unlimited => true,
            QuotaPosition::Remaining(left) => *left > 0,
            QuotaPosition::NotIncluded => false,
        }
    }

    fn remaining_quantity(&self) -> Option<i64> {
        match self {
            QuotaPosition::Unlimited => Some(UNLIMITED_REMAINING),
            QuotaPosition::Remaining(left) => Some(*left),
            QuotaPosition::NotIncluded => None,
        }
    }
}

pub fn quota_position(contract: &Contract, service_type: ServiceType) -> QuotaPosition {
    match contract.included_service(service_type).map(|s| s.allowance) {
        None => QuotaPosition::NotIncluded,
        Some(Allowance::Unlimited) => QuotaPosition::Unlimited,
        Some(Allowance::Quota(quantity)) => QuotaPosition::Remaining(
            i64::from(quantity) - i64::from(contract.used_count(service_type)),
        ),
    }
}

/// key: coverage-tracker -> contract selection
///
/// `contracts` must already be the client's active contracts in creation order.
/// The first contract with quota left (or an unlimited allowance) wins; failing
/// that, the first contract offering a discount on extra services is reported.
pub fn evaluate_coverage(contracts: &[Contract], service_type: ServiceType) -> CoverageResult {
    for contract in contracts {
        let position = quota_position(contract, service_type);
        if position.covers() {
            return CoverageResult {
                covered: true,
                contract_id: Some(contract.id),
                remaining_quantity: position.remaining_quantity(),
                discount: None,
            };
        }
    }

    contracts
        .iter()
        .find(|contract| contract.additional_services_discount > Decimal::ZERO)
        .map(|contract| CoverageResult {
            covered: false,
            contract_id: Some(contract.id),
            remaining_quantity: None,
            discount: Some(contract.additional_services_discount),
        })
        .unwrap_or_else(CoverageResult::uncovered)
}

/// Price of an uncovered visit after the contract's extra-services discount.
pub fn discounted_charge(list_price: Decimal, discount_percent: Decimal) -> Decimal {
    let factor = (Decimal::ONE_HUNDRED - discount_percent) / Decimal::ONE_HUNDRED;
    (list_price * factor).round_dp(AMOUNT_SCALE)
}

impl ContractService {
    pub async fn check_service_coverage(
        &self,
        client_id: Uuid,
        service_type: ServiceType,
    ) -> ContractResult<CoverageResult> {
        let contracts = self.store.active_contracts_for_client(client_id).await?;
        Ok(evaluate_coverage(&contracts, service_type))
    }

    /// key: coverage-tracker -> usage ledger
    ///
    /// The usage record is written whether or not the visit is covered.
    pub async fn record_service_usage(
        &self,
        contract_id: Uuid,
        input: RecordUsageInput,
        now: DateTime<Utc>,
    ) -> ContractResult<UsageOutcome> {
        if let Some(price) = input.list_price {
            if price < Decimal::ZERO {
                return Err(ContractError::validation("list price must not be negative"));
            }
        }

        let (_, outcome) = self
            .mutate(contract_id, |snapshot| {
                let mut contract = snapshot.contract;
                if !contract.is_active() {
                    return Err(ContractError::InvalidStateTransition {
                        contract_id,
                        from: contract.status,
                        action: "record usage",
                    });
                }

                let covered = quota_position(&contract, input.service_type).covers();
                let additional_charge = match (covered, input.list_price) {
                    (false, Some(price)) => {
                        discounted_charge(price, contract.additional_services_discount)
                    }
                    _ => Decimal::ZERO,
                };

                let usage = ServiceUsageRecord {
                    id: Uuid::new_v4(),
                    contract_id,
                    service_id: input.service_id,
                    service_type: input.service_type,
                    used_at: now,
                    notes: input.notes.clone(),
                    covered_by_contract: covered,
                    additional_charge,
                };
                contract.record_use(input.service_type, now);
                contract.updated_at = now;

                let outcome = UsageOutcome {
                    covered_by_contract: covered,
                    additional_charge,
                    usage: usage.clone(),
                };
                Ok(Mutation::Commit(
                    ContractCommit::new(contract).with_usage(usage),
                    outcome,
                ))
            })
            .await?;

        info!(
            contract = %contract_id,
            service = %input.service_type,
            covered = outcome.covered_by_contract,
            charge = %outcome.additional_charge,
            "contract service usage recorded"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::models::{
        BillingFrequency, ContractStatus, ContractType, IncludedService, ServiceUsageSummary,
    };
    use chrono::{NaiveDate, TimeZone};

    fn contract(services: Vec<IncludedService>, discount: i64) -> Contract {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        Contract {
            id: Uuid::new_v4(),
            organization_id: Uuid::nil(),
            contract_number: "CTR-2025-0001".into(),
            client_id: Uuid::nil(),
            piano_id: None,
            template_id: None,
            name: "Concert grand care".into(),
            description: None,
            contract_type: ContractType::Premium,
            status: ContractStatus::Active,
            included_services: services,
            services_used: Vec::new(),
            additional_services_discount: Decimal::new(discount, 0),
            base_price: Decimal::new(1200, 0),
            billing_frequency: BillingFrequency::Annual,
            next_billing_date: start,
            start_date: start,
            end_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            auto_renew: true,
            renewal_notice_days: 30,
            renewal_notification_sent: false,
            terms_and_conditions: None,
            cancellation_policy: None,
            notes: None,
            signed_at: None,
            signature: None,
            suspended_at: None,
            suspension_reason: None,
            cancelled_at: None,
            cancellation_reason: None,
            created_by: "tests".into(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    fn used(mut contract: Contract, service_type: ServiceType, count: u32) -> Contract {
        contract.services_used.push(ServiceUsageSummary {
            service_type,
            used_count: count,
            last_used: contract.created_at,
        });
        contract
    }

    #[test]
    fn unlimited_allowance_reports_sentinel() {
        let c = used(
            contract(vec![IncludedService::unlimited(ServiceType::Tuning)], 0),
            ServiceType::Tuning,
            40,
        );
        let result = evaluate_coverage(&[c.clone()], ServiceType::Tuning);
        assert!(result.covered);
        assert_eq!(result.contract_id, Some(c.id));
        assert_eq!(result.remaining_quantity, Some(UNLIMITED_REMAINING));
    }

    #[test]
    fn exhausted_contract_falls_through_to_next_one() {
        let first = used(
            contract(vec![IncludedService::quota(ServiceType::Tuning, 2)], 10),
            ServiceType::Tuning,
            2,
        );
        let second = contract(vec![IncludedService::quota(ServiceType::Tuning, 1)], 0);
        let result = evaluate_coverage(&[first, second.clone()], ServiceType::Tuning);
        assert!(result.covered);
        assert_eq!(result.contract_id, Some(second.id));
        assert_eq!(result.remaining_quantity, Some(1));
    }

    #[test]
    fn discount_is_offered_when_nothing_covers() {
        let no_discount = contract(vec![IncludedService::quota(ServiceType::Tuning, 1)], 0);
        let discounted = contract(Vec::new(), 15);
        let result = evaluate_coverage(&[no_discount, discounted.clone()], ServiceType::Repair);
        assert!(!result.covered);
        assert_eq!(result.contract_id, Some(discounted.id));
        assert_eq!(result.discount, Some(Decimal::new(15, 0)));
    }

    #[test]
    fn no_contracts_means_no_coverage() {
        assert_eq!(
            evaluate_coverage(&[], ServiceType::Tuning),
            CoverageResult::uncovered()
        );
    }

    #[test]
    fn discounted_charge_rounds_to_cents() {
        assert_eq!(
            discounted_charge(Decimal::new(9999, 2), Decimal::new(15, 0)),
            Decimal::new(8499, 2)
        );
        assert_eq!(
            discounted_charge(Decimal::new(80, 0), Decimal::ZERO),
            Decimal::new(80, 0)
        );
    }
}
