use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::models::{
    Contract, ContractFilters, ContractTemplate, IncludedService, Payment, RenewalRecord,
    ServiceUsageRecord, ServiceUsageSummary, SignatureEvidence,
};
use super::store::{ContractCommit, ContractStore};
use crate::error::{ContractError, ContractResult};

/// key: contract-store -> postgres persistence
#[derive(Clone)]
pub struct PgContractStore {
    pool: PgPool,
}

impl PgContractStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_u32(column: &str, value: i32) -> ContractResult<u32> {
    u32::try_from(value).map_err(|err| {
        ContractError::Db(sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(err),
        })
    })
}

fn map_template(row: &PgRow) -> ContractResult<ContractTemplate> {
    let included: Json<Vec<IncludedService>> = row.try_get("included_services")?;
    Ok(ContractTemplate {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        contract_type: row.try_get::<String, _>("contract_type")?.parse()?,
        included_services: included.0,
        additional_services_discount: row.try_get("additional_services_discount")?,
        base_price: row.try_get("base_price")?,
        billing_frequency: row.try_get::<String, _>("billing_frequency")?.parse()?,
        duration_months: to_u32("duration_months", row.try_get("duration_months")?)?,
        auto_renew: row.try_get("auto_renew")?,
        renewal_notice_days: to_u32("renewal_notice_days", row.try_get("renewal_notice_days")?)?,
        terms_and_conditions: row.try_get("terms_and_conditions")?,
        cancellation_policy: row.try_get("cancellation_policy")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_contract(row: &PgRow) -> ContractResult<Contract> {
    let included: Json<Vec<IncludedService>> = row.try_get("included_services")?;
    let used: Json<Vec<ServiceUsageSummary>> = row.try_get("services_used")?;
    let signature_client_id: Option<String> = row.try_get("signature_client_id")?;
    let signature_data: Option<String> = row.try_get("signature_data")?;
    let signature = match (signature_client_id, signature_data) {
        (Some(signature_client_id), Some(signature_data)) => Some(SignatureEvidence {
            signature_client_id,
            signature_data,
            signed_document_url: row.try_get("signed_document_url")?,
        }),
        _ => None,
    };

    Ok(Contract {
        id: row.try_get("id")?,
        organization_id: row.try_get("organization_id")?,
        contract_number: row.try_get("contract_number")?,
        client_id: row.try_get("client_id")?,
        piano_id: row.try_get("piano_id")?,
        template_id: row.try_get("template_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        contract_type: row.try_get::<String, _>("contract_type")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        included_services: included.0,
        services_used: used.0,
        additional_services_discount: row.try_get("additional_services_discount")?,
        base_price: row.try_get("base_price")?,
        billing_frequency: row.try_get::<String, _>("billing_frequency")?.parse()?,
        next_billing_date: row.try_get("next_billing_date")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        auto_renew: row.try_get("auto_renew")?,
        renewal_notice_days: to_u32("renewal_notice_days", row.try_get("renewal_notice_days")?)?,
        renewal_notification_sent: row.try_get("renewal_notification_sent")?,
        terms_and_conditions: row.try_get("terms_and_conditions")?,
        cancellation_policy: row.try_get("cancellation_policy")?,
        notes: row.try_get("notes")?,
        signed_at: row.try_get("signed_at")?,
        signature,
        suspended_at: row.try_get("suspended_at")?,
        suspension_reason: row.try_get("suspension_reason")?,
        cancelled_at: row.try_get("cancelled_at")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn map_payment(row: &PgRow) -> ContractResult<Payment> {
    Ok(Payment {
        id: row.try_get("id")?,
        contract_id: row.try_get("contract_id")?,
        organization_id: row.try_get("organization_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        period_start: row.try_get("period_start")?,
        period_end: row.try_get("period_end")?,
        due_date: row.try_get("due_date")?,
        invoice_id: row.try_get("invoice_id")?,
        paid_at: row.try_get("paid_at")?,
        payment_reference: row.try_get("payment_reference")?,
        retry_count: to_u32("retry_count", row.try_get("retry_count")?)?,
        last_retry_at: row.try_get("last_retry_at")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_usage(row: &PgRow) -> ContractResult<ServiceUsageRecord> {
    Ok(ServiceUsageRecord {
        id: row.try_get("id")?,
        contract_id: row.try_get("contract_id")?,
        service_id: row.try_get("service_id")?,
        service_type: row.try_get::<String, _>("service_type")?.parse()?,
        used_at: row.try_get("used_at")?,
        notes: row.try_get("notes")?,
        covered_by_contract: row.try_get("covered_by_contract")?,
        additional_charge: row.try_get("additional_charge")?,
    })
}

fn map_renewal(row: &PgRow) -> ContractResult<RenewalRecord> {
    Ok(RenewalRecord {
        id: row.try_get("id")?,
        contract_id: row.try_get("contract_id")?,
        renewed_at: row.try_get("renewed_at")?,
        previous_end_date: row.try_get("previous_end_date")?,
        new_end_date: row.try_get("new_end_date")?,
        previous_price: row.try_get("previous_price")?,
        new_price: row.try_get("new_price")?,
        price_change_reason: row.try_get("price_change_reason")?,
        renewal_type: row.try_get::<String, _>("renewal_type")?.parse()?,
    })
}

async fn insert_payment(tx: &mut Transaction<'_, Postgres>, payment: &Payment) -> ContractResult<()> {
    sqlx::query(
        r#"
        INSERT INTO contract_payments (
            id, contract_id, organization_id, amount, currency, status,
            period_start, period_end, due_date, invoice_id, paid_at,
            payment_reference, retry_count, last_retry_at, failure_reason, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        "#,
    )
    .bind(payment.id)
    .bind(payment.contract_id)
    .bind(payment.organization_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(payment.status.as_str())
    .bind(payment.period_start)
    .bind(payment.period_end)
    .bind(payment.due_date)
    .bind(&payment.invoice_id)
    .bind(payment.paid_at)
    .bind(&payment.payment_reference)
    .bind(payment.retry_count as i32)
    .bind(payment.last_retry_at)
    .bind(&payment.failure_reason)
    .bind(payment.created_at)
    .execute(&mut *tx)
    .await?;
    Ok(())
}

async fn update_payment(tx: &mut Transaction<'_, Postgres>, payment: &Payment) -> ContractResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE contract_payments
        SET amount = $2,
            status = $3,
            invoice_id = $4,
            paid_at = $5,
            payment_reference = $6,
            retry_count = $7,
            last_retry_at = $8,
            failure_reason = $9
        WHERE id = $1
        "#,
    )
    .bind(payment.id)
    .bind(payment.amount)
    .bind(payment.status.as_str())
    .bind(&payment.invoice_id)
    .bind(payment.paid_at)
    .bind(&payment.payment_reference)
    .bind(payment.retry_count as i32)
    .bind(payment.last_retry_at)
    .bind(&payment.failure_reason)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ContractError::NotFound {
            entity: "payment",
            id: payment.id,
        });
    }
    Ok(())
}

#[async_trait]
impl ContractStore for PgContractStore {
    async fn insert_template(&self, template: &ContractTemplate) -> ContractResult<()> {
        sqlx::query(
            r#"
            INSERT INTO contract_templates (
                id, organization_id, name, description, contract_type, included_services,
                additional_services_discount, base_price, billing_frequency, duration_months,
                auto_renew, renewal_notice_days, terms_and_conditions, cancellation_policy,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(template.id)
        .bind(template.organization_id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.contract_type.as_str())
        .bind(Json(&template.included_services))
        .bind(template.additional_services_discount)
        .bind(template.base_price)
        .bind(template.billing_frequency.as_str())
        .bind(template.duration_months as i32)
        .bind(template.auto_renew)
        .bind(template.renewal_notice_days as i32)
        .bind(&template.terms_and_conditions)
        .bind(&template.cancellation_policy)
        .bind(template.is_active)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> ContractResult<Option<ContractTemplate>> {
        let row = sqlx::query("SELECT * FROM contract_templates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_template).transpose()
    }

    async fn list_templates(&self, organization_id: Uuid) -> ContractResult<Vec<ContractTemplate>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM contract_templates
            WHERE organization_id = $1 AND is_active
            ORDER BY created_at DESC
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_template).collect()
    }

    async fn allocate_contract_sequence(
        &self,
        organization_id: Uuid,
        year: i32,
    ) -> ContractResult<u32> {
        let value: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO contract_number_sequences (organization_id, year, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (organization_id, year)
            DO UPDATE SET last_value = contract_number_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(organization_id)
        .bind(year)
        .fetch_one(&self.pool)
        .await?;
        to_u32("last_value", value)
    }

    async fn insert_contract(&self, contract: &Contract) -> ContractResult<()> {
        let signature = contract.signature.as_ref();
        sqlx::query(
            r#"
            INSERT INTO maintenance_contracts (
                id, organization_id, contract_number, client_id, piano_id, template_id,
                name, description, contract_type, status, included_services, services_used,
                additional_services_discount, base_price, billing_frequency,
                next_billing_date, start_date, end_date, auto_renew, renewal_notice_days,
                renewal_notification_sent, terms_and_conditions, cancellation_policy, notes,
                signed_at, signature_client_id, signature_data, signed_document_url,
                suspended_at, suspension_reason, cancelled_at, cancellation_reason,
                created_by, created_at, updated_at, version
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34,
                $35, $36
            )
            "#,
        )
        .bind(contract.id)
        .bind(contract.organization_id)
        .bind(&contract.contract_number)
        .bind(contract.client_id)
        .bind(contract.piano_id)
        .bind(contract.template_id)
        .bind(&contract.name)
        .bind(&contract.description)
        .bind(contract.contract_type.as_str())
        .bind(contract.status.as_str())
        .bind(Json(&contract.included_services))
        .bind(Json(&contract.services_used))
        .bind(contract.additional_services_discount)
        .bind(contract.base_price)
        .bind(contract.billing_frequency.as_str())
        .bind(contract.next_billing_date)
        .bind(contract.start_date)
        .bind(contract.end_date)
        .bind(contract.auto_renew)
        .bind(contract.renewal_notice_days as i32)
        .bind(contract.renewal_notification_sent)
        .bind(&contract.terms_and_conditions)
        .bind(&contract.cancellation_policy)
        .bind(&contract.notes)
        .bind(contract.signed_at)
        .bind(signature.map(|s| s.signature_client_id.clone()))
        .bind(signature.map(|s| s.signature_data.clone()))
        .bind(signature.and_then(|s| s.signed_document_url.clone()))
        .bind(contract.suspended_at)
        .bind(&contract.suspension_reason)
        .bind(contract.cancelled_at)
        .bind(&contract.cancellation_reason)
        .bind(&contract.created_by)
        .bind(contract.created_at)
        .bind(contract.updated_at)
        .bind(contract.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_contract(&self, id: Uuid) -> ContractResult<Option<Contract>> {
        let row = sqlx::query("SELECT * FROM maintenance_contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_contract).transpose()
    }

    async fn list_contracts(
        &self,
        organization_id: Uuid,
        filters: &ContractFilters,
    ) -> ContractResult<Vec<Contract>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM maintenance_contracts
            WHERE organization_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR client_id = $3)
              AND ($4::text IS NULL OR contract_type = $4)
            ORDER BY created_at DESC, contract_number DESC
            "#,
        )
        .bind(organization_id)
        .bind(filters.status.map(|status| status.as_str()))
        .bind(filters.client_id)
        .bind(filters.contract_type.map(|kind| kind.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_contract).collect()
    }

    async fn active_contracts_for_client(&self, client_id: Uuid) -> ContractResult<Vec<Contract>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM maintenance_contracts
            WHERE client_id = $1 AND status = 'active'
            ORDER BY created_at ASC, contract_number ASC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_contract).collect()
    }

    async fn contracts_due_for_notice(&self, today: NaiveDate) -> ContractResult<Vec<Contract>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM maintenance_contracts
            WHERE status = 'active'
              AND renewal_notification_sent = FALSE
              AND end_date <= $1::date + renewal_notice_days
            ORDER BY end_date ASC
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_contract).collect()
    }

    async fn contracts_past_end(&self, today: NaiveDate) -> ContractResult<Vec<Contract>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM maintenance_contracts
            WHERE status = 'active' AND end_date <= $1
            ORDER BY end_date ASC
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_contract).collect()
    }

    async fn due_payments(&self, today: NaiveDate) -> ContractResult<Vec<Payment>> {
        let rows = sqlx::query(
            r#"
            SELECT p.* FROM contract_payments p
            JOIN maintenance_contracts c ON c.id = p.contract_id
            WHERE p.status = 'pending' AND p.due_date <= $1
              AND c.status IN ('active', 'suspended')
            ORDER BY p.due_date ASC, p.created_at ASC
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_payment).collect()
    }

    async fn get_payment(&self, id: Uuid) -> ContractResult<Option<Payment>> {
        let row = sqlx::query("SELECT * FROM contract_payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_payment).transpose()
    }

    async fn payments_for_contract(&self, contract_id: Uuid) -> ContractResult<Vec<Payment>> {
        let rows = sqlx::query(
            "SELECT * FROM contract_payments WHERE contract_id = $1 ORDER BY due_date DESC, created_at DESC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_payment).collect()
    }

    async fn usage_for_contract(
        &self,
        contract_id: Uuid,
    ) -> ContractResult<Vec<ServiceUsageRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM contract_service_usage WHERE contract_id = $1 ORDER BY used_at DESC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_usage).collect()
    }

    async fn renewals_for_contract(&self, contract_id: Uuid) -> ContractResult<Vec<RenewalRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM contract_renewals WHERE contract_id = $1 ORDER BY renewed_at DESC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_renewal).collect()
    }

    async fn commit(&self, commit: ContractCommit) -> ContractResult<Contract> {
        let contract = &commit.contract;
        let signature = contract.signature.as_ref();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE maintenance_contracts
            SET name = $3,
                description = $4,
                status = $5,
                included_services = $6,
                services_used = $7,
                additional_services_discount = $8,
                base_price = $9,
                next_billing_date = $10,
                start_date = $11,
                end_date = $12,
                auto_renew = $13,
                renewal_notice_days = $14,
                renewal_notification_sent = $15,
                terms_and_conditions = $16,
                cancellation_policy = $17,
                notes = $18,
                signed_at = $19,
                signature_client_id = $20,
                signature_data = $21,
                signed_document_url = $22,
                suspended_at = $23,
                suspension_reason = $24,
                cancelled_at = $25,
                cancellation_reason = $26,
                updated_at = $27,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(contract.id)
        .bind(contract.version)
        .bind(&contract.name)
        .bind(&contract.description)
        .bind(contract.status.as_str())
        .bind(Json(&contract.included_services))
        .bind(Json(&contract.services_used))
        .bind(contract.additional_services_discount)
        .bind(contract.base_price)
        .bind(contract.next_billing_date)
        .bind(contract.start_date)
        .bind(contract.end_date)
        .bind(contract.auto_renew)
        .bind(contract.renewal_notice_days as i32)
        .bind(contract.renewal_notification_sent)
        .bind(&contract.terms_and_conditions)
        .bind(&contract.cancellation_policy)
        .bind(&contract.notes)
        .bind(contract.signed_at)
        .bind(signature.map(|s| s.signature_client_id.clone()))
        .bind(signature.map(|s| s.signature_data.clone()))
        .bind(signature.and_then(|s| s.signed_document_url.clone()))
        .bind(contract.suspended_at)
        .bind(&contract.suspension_reason)
        .bind(contract.cancelled_at)
        .bind(&contract.cancellation_reason)
        .bind(contract.updated_at)
        .fetch_optional(&mut tx)
        .await?;

        let stored = match row {
            Some(row) => map_contract(&row)?,
            None => {
                let exists: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM maintenance_contracts WHERE id = $1")
                        .bind(contract.id)
                        .fetch_optional(&mut tx)
                        .await?;
                tx.rollback().await?;
                return Err(match exists {
                    Some(_) => ContractError::ConcurrencyConflict {
                        contract_id: contract.id,
                    },
                    None => ContractError::contract_not_found(contract.id),
                });
            }
        };

        for payment in &commit.updated_payments {
            update_payment(&mut tx, payment).await?;
        }
        for payment in &commit.new_payments {
            insert_payment(&mut tx, payment).await?;
        }
        if let Some(renewal) = &commit.renewal {
            sqlx::query(
                r#"
                INSERT INTO contract_renewals (
                    id, contract_id, renewed_at, previous_end_date, new_end_date,
                    previous_price, new_price, price_change_reason, renewal_type
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(renewal.id)
            .bind(renewal.contract_id)
            .bind(renewal.renewed_at)
            .bind(renewal.previous_end_date)
            .bind(renewal.new_end_date)
            .bind(renewal.previous_price)
            .bind(renewal.new_price)
            .bind(&renewal.price_change_reason)
            .bind(renewal.renewal_type.as_str())
            .execute(&mut tx)
            .await?;
        }
        if let Some(usage) = &commit.usage {
            sqlx::query(
                r#"
                INSERT INTO contract_service_usage (
                    id, contract_id, service_id, service_type, used_at, notes,
                    covered_by_contract, additional_charge
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(usage.id)
            .bind(usage.contract_id)
            .bind(usage.service_id)
            .bind(usage.service_type.as_str())
            .bind(usage.used_at)
            .bind(&usage.notes)
            .bind(usage.covered_by_contract)
            .bind(usage.additional_charge)
            .execute(&mut tx)
            .await?;
        }

        tx.commit().await?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_counters_are_decode_errors() {
        assert_eq!(to_u32("retry_count", 3).unwrap(), 3);
        let err = to_u32("retry_count", -1).unwrap_err();
        match err {
            ContractError::Db(sqlx::Error::ColumnDecode { index, .. }) => {
                assert_eq!(index, "retry_count");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
