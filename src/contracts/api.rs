use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::models::{
    Contract, ContractFilters, ContractStats, ContractTemplate, CoverageResult,
    CreateContractInput, CreateTemplateInput, Payment, RecordUsageInput, RenewalOptions,
    RenewalRecord, ServiceType, ServiceUsageRecord, SignatureEvidence, UpdateContractInput,
    UsageOutcome,
};
use super::renewals::RenewalSweepReport;
use super::scheduler::{SweepControl, SweepReport};
use super::service::ContractService;
use crate::error::ContractResult;

#[derive(Debug, Deserialize)]
pub struct CreateContractRequest {
    #[serde(flatten)]
    pub contract: CreateContractInput,
    pub created_by: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivateContractRequest {
    #[serde(default)]
    pub signature: Option<SignatureEvidence>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuspendContractRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelContractRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkPaidRequest {
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CoverageQuery {
    pub service_type: ServiceType,
}

/// key: contract-api -> rest endpoints
pub async fn list_templates(
    Extension(engine): Extension<ContractService>,
    Path(organization_id): Path<Uuid>,
) -> ContractResult<Json<Vec<ContractTemplate>>> {
    Ok(Json(engine.list_templates(organization_id).await?))
}

pub async fn create_template(
    Extension(engine): Extension<ContractService>,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<CreateTemplateInput>,
) -> ContractResult<(StatusCode, Json<ContractTemplate>)> {
    let template = engine
        .create_template(organization_id, payload, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn list_contracts(
    Extension(engine): Extension<ContractService>,
    Path(organization_id): Path<Uuid>,
    Query(filters): Query<ContractFilters>,
) -> ContractResult<Json<Vec<Contract>>> {
    Ok(Json(engine.list_contracts(organization_id, &filters).await?))
}

pub async fn create_contract(
    Extension(engine): Extension<ContractService>,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<CreateContractRequest>,
) -> ContractResult<(StatusCode, Json<Contract>)> {
    let contract = engine
        .create_contract(
            organization_id,
            payload.contract,
            &payload.created_by,
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

pub async fn contract_stats(
    Extension(engine): Extension<ContractService>,
    Path(organization_id): Path<Uuid>,
) -> ContractResult<Json<ContractStats>> {
    let stats = engine
        .get_contract_stats(organization_id, Utc::now().date_naive())
        .await?;
    Ok(Json(stats))
}

pub async fn get_contract(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
) -> ContractResult<Json<Contract>> {
    Ok(Json(engine.get_contract(contract_id).await?))
}

pub async fn update_contract(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<UpdateContractInput>,
) -> ContractResult<Json<Contract>> {
    let contract = engine
        .update_contract(contract_id, payload, Utc::now())
        .await?;
    Ok(Json(contract))
}

pub async fn activate_contract(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<ActivateContractRequest>,
) -> ContractResult<Json<Contract>> {
    let contract = engine
        .activate_contract(contract_id, payload.signature, Utc::now())
        .await?;
    Ok(Json(contract))
}

pub async fn suspend_contract(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<SuspendContractRequest>,
) -> ContractResult<Json<Contract>> {
    let contract = engine
        .suspend_contract(contract_id, payload.reason, Utc::now())
        .await?;
    Ok(Json(contract))
}

pub async fn resume_contract(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
) -> ContractResult<Json<Contract>> {
    Ok(Json(engine.resume_contract(contract_id, Utc::now()).await?))
}

pub async fn cancel_contract(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<CancelContractRequest>,
) -> ContractResult<Json<Contract>> {
    let contract = engine
        .cancel_contract(contract_id, payload.reason, Utc::now())
        .await?;
    Ok(Json(contract))
}

pub async fn renew_contract(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<RenewalOptions>,
) -> ContractResult<Json<Contract>> {
    let contract = engine
        .renew_contract(contract_id, payload, Utc::now())
        .await?;
    Ok(Json(contract))
}

pub async fn usage_history(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
) -> ContractResult<Json<Vec<ServiceUsageRecord>>> {
    Ok(Json(engine.get_service_usage_history(contract_id).await?))
}

pub async fn record_usage(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<RecordUsageInput>,
) -> ContractResult<(StatusCode, Json<UsageOutcome>)> {
    let outcome = engine
        .record_service_usage(contract_id, payload, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn contract_payments(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
) -> ContractResult<Json<Vec<Payment>>> {
    Ok(Json(engine.get_contract_payments(contract_id).await?))
}

pub async fn renewal_history(
    Extension(engine): Extension<ContractService>,
    Path(contract_id): Path<Uuid>,
) -> ContractResult<Json<Vec<RenewalRecord>>> {
    Ok(Json(engine.get_renewal_history(contract_id).await?))
}

pub async fn mark_payment_paid(
    Extension(engine): Extension<ContractService>,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<MarkPaidRequest>,
) -> ContractResult<Json<Payment>> {
    let payment = engine
        .mark_payment_paid(payment_id, payload.reference, Utc::now())
        .await?;
    Ok(Json(payment))
}

pub async fn check_coverage(
    Extension(engine): Extension<ContractService>,
    Path(client_id): Path<Uuid>,
    Query(query): Query<CoverageQuery>,
) -> ContractResult<Json<CoverageResult>> {
    let coverage = engine
        .check_service_coverage(client_id, query.service_type)
        .await?;
    Ok(Json(coverage))
}

pub async fn run_billing_sweep(
    Extension(engine): Extension<ContractService>,
) -> ContractResult<Json<SweepReport>> {
    let report = engine
        .process_pending_payments(Utc::now(), &SweepControl::unbounded())
        .await?;
    Ok(Json(report))
}

pub async fn run_renewal_sweep(
    Extension(engine): Extension<ContractService>,
) -> ContractResult<Json<RenewalSweepReport>> {
    let report = engine
        .process_renewals(Utc::now(), &SweepControl::unbounded())
        .await?;
    Ok(Json(report))
}
