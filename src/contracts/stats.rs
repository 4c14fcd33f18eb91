use chrono::NaiveDate;
use uuid::Uuid;

use super::calendar::add_months;
use super::models::{Contract, ContractFilters, ContractStats, ContractStatus};
use super::service::ContractService;
use crate::error::ContractResult;

/// Portfolio summary. Revenue is the sum of base prices of active contracts;
/// "expiring this month" counts active contracts ending within a month of `today`.
pub fn summarize(contracts: &[Contract], today: NaiveDate) -> ContractStats {
    let horizon = add_months(today, 1);
    let mut stats = ContractStats {
        total: contracts.len(),
        ..ContractStats::default()
    };
    for contract in contracts {
        match contract.status {
            ContractStatus::Draft => stats.draft += 1,
            ContractStatus::Active => stats.active += 1,
            ContractStatus::Suspended => stats.suspended += 1,
            ContractStatus::Expired => stats.expired += 1,
            ContractStatus::Cancelled => stats.cancelled += 1,
        }
        *stats.by_type.entry(contract.contract_type).or_insert(0) += 1;
        if contract.is_active() {
            stats.total_revenue += contract.base_price;
            if contract.end_date <= horizon {
                stats.expiring_this_month += 1;
            }
        }
    }
    stats
}

impl ContractService {
    pub async fn get_contract_stats(
        &self,
        organization_id: Uuid,
        today: NaiveDate,
    ) -> ContractResult<ContractStats> {
        let contracts = self
            .store
            .list_contracts(organization_id, &ContractFilters::default())
            .await?;
        Ok(summarize(&contracts, today))
    }
}
