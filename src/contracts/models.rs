use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ContractError, ContractResult};

pub const DEFAULT_DURATION_MONTHS: u32 = 12;
pub const DEFAULT_RENEWAL_NOTICE_DAYS: u32 = 30;
/// Remaining quantity reported for unlimited allowances.
pub const UNLIMITED_REMAINING: i64 = -1;

/// key: contract-status -> lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Active,
    Suspended,
    Cancelled,
    Expired,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Active => "active",
            ContractStatus::Suspended => "suspended",
            ContractStatus::Cancelled => "cancelled",
            ContractStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Cancelled | ContractStatus::Expired)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = ContractError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(ContractStatus::Draft),
            "active" => Ok(ContractStatus::Active),
            "suspended" => Ok(ContractStatus::Suspended),
            "cancelled" => Ok(ContractStatus::Cancelled),
            "expired" => Ok(ContractStatus::Expired),
            other => Err(ContractError::validation(format!(
                "unknown contract status '{other}'"
            ))),
        }
    }
}

/// key: billing-frequency -> period length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BillingFrequency {
    Monthly,
    Quarterly,
    Semiannual,
    #[default]
    Annual,
    OneTime,
}

impl BillingFrequency {
    pub const ALL: [BillingFrequency; 5] = [
        BillingFrequency::Monthly,
        BillingFrequency::Quarterly,
        BillingFrequency::Semiannual,
        BillingFrequency::Annual,
        BillingFrequency::OneTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingFrequency::Monthly => "monthly",
            BillingFrequency::Quarterly => "quarterly",
            BillingFrequency::Semiannual => "semiannual",
            BillingFrequency::Annual => "annual",
            BillingFrequency::OneTime => "one_time",
        }
    }
}

impl fmt::Display for BillingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingFrequency {
    type Err = ContractError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "monthly" => Ok(BillingFrequency::Monthly),
            "quarterly" => Ok(BillingFrequency::Quarterly),
            "semiannual" => Ok(BillingFrequency::Semiannual),
            "annual" => Ok(BillingFrequency::Annual),
            "one_time" => Ok(BillingFrequency::OneTime),
            other => Err(ContractError::validation(format!(
                "unknown billing frequency '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    Basic,
    Standard,
    Premium,
    Professional,
    Institutional,
    Custom,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Basic => "basic",
            ContractType::Standard => "standard",
            ContractType::Premium => "premium",
            ContractType::Professional => "professional",
            ContractType::Institutional => "institutional",
            ContractType::Custom => "custom",
        }
    }
}

impl FromStr for ContractType {
    type Err = ContractError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "basic" => Ok(ContractType::Basic),
            "standard" => Ok(ContractType::Standard),
            "premium" => Ok(ContractType::Premium),
            "professional" => Ok(ContractType::Professional),
            "institutional" => Ok(ContractType::Institutional),
            "custom" => Ok(ContractType::Custom),
            other => Err(ContractError::validation(format!(
                "unknown contract type '{other}'"
            ))),
        }
    }
}

/// Kinds of service visits a contract can include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Tuning,
    Regulation,
    Voicing,
    Repair,
    MinorRepair,
    Maintenance,
    Inspection,
    Cleaning,
    Restoration,
    PrioritySupport,
    Other,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Tuning => "tuning",
            ServiceType::Regulation => "regulation",
            ServiceType::Voicing => "voicing",
            ServiceType::Repair => "repair",
            ServiceType::MinorRepair => "minor_repair",
            ServiceType::Maintenance => "maintenance",
            ServiceType::Inspection => "inspection",
            ServiceType::Cleaning => "cleaning",
            ServiceType::Restoration => "restoration",
            ServiceType::PrioritySupport => "priority_support",
            ServiceType::Other => "other",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = ContractError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tuning" => Ok(ServiceType::Tuning),
            "regulation" => Ok(ServiceType::Regulation),
            "voicing" => Ok(ServiceType::Voicing),
            "repair" => Ok(ServiceType::Repair),
            "minor_repair" => Ok(ServiceType::MinorRepair),
            "maintenance" => Ok(ServiceType::Maintenance),
            "inspection" => Ok(ServiceType::Inspection),
            "cleaning" => Ok(ServiceType::Cleaning),
            "restoration" => Ok(ServiceType::Restoration),
            "priority_support" => Ok(ServiceType::PrioritySupport),
            "other" => Ok(ServiceType::Other),
            other => Err(ContractError::validation(format!(
                "unknown service type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Quota(u32),
    Unlimited,
}

/// An included-service entry. On the wire this is either
/// `{"service_type", "quantity"}` or `{"service_type", "unlimited": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IncludedServiceEntry", into = "IncludedServiceEntry")]
pub struct IncludedService {
    pub service_type: ServiceType,
    pub allowance: Allowance,
    pub description: Option<String>,
}

impl IncludedService {
    pub fn quota(service_type: ServiceType, quantity: u32) -> Self {
        Self {
            service_type,
            allowance: Allowance::Quota(quantity),
            description: None,
        }
    }

    pub fn unlimited(service_type: ServiceType) -> Self {
        Self {
            service_type,
            allowance: Allowance::Unlimited,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncludedServiceEntry {
    pub service_type: ServiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unlimited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TryFrom<IncludedServiceEntry> for IncludedService {
    type Error = String;

    fn try_from(entry: IncludedServiceEntry) -> Result<Self, Self::Error> {
        let allowance = match (entry.unlimited, entry.quantity) {
            (true, _) => Allowance::Unlimited,
            (false, Some(quantity)) => Allowance::Quota(quantity),
            (false, None) => {
                return Err(format!(
                    "included service '{}' needs either quantity or unlimited",
                    entry.service_type
                ))
            }
        };
        Ok(IncludedService {
            service_type: entry.service_type,
            allowance,
            description: entry.description,
        })
    }
}

impl From<IncludedService> for IncludedServiceEntry {
    fn from(service: IncludedService) -> Self {
        let (quantity, unlimited) = match service.allowance {
            Allowance::Quota(quantity) => (Some(quantity), false),
            Allowance::Unlimited => (None, true),
        };
        IncludedServiceEntry {
            service_type: service.service_type,
            quantity,
            unlimited,
            description: service.description,
        }
    }
}

/// Running usage counter for one service type in the current term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUsageSummary {
    pub service_type: ServiceType,
    pub used_count: u32,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEvidence {
    pub signature_client_id: String,
    pub signature_data: String,
    #[serde(default)]
    pub signed_document_url: Option<String>,
}

/// key: contract-model -> maintenance agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub contract_number: String,
    pub client_id: Uuid,
    pub piano_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub contract_type: ContractType,
    pub status: ContractStatus,
    pub included_services: Vec<IncludedService>,
    pub services_used: Vec<ServiceUsageSummary>,
    pub additional_services_discount: Decimal,
    pub base_price: Decimal,
    pub billing_frequency: BillingFrequency,
    pub next_billing_date: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub auto_renew: bool,
    pub renewal_notice_days: u32,
    pub renewal_notification_sent: bool,
    pub terms_and_conditions: Option<String>,
    pub cancellation_policy: Option<String>,
    pub notes: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signature: Option<SignatureEvidence>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub suspension_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-lock counter, bumped by the store on every commit.
    pub version: i64,
}

impl Contract {
    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }

    pub fn included_service(&self, service_type: ServiceType) -> Option<&IncludedService> {
        self.included_services
            .iter()
            .find(|service| service.service_type == service_type)
    }

    pub fn used_count(&self, service_type: ServiceType) -> u32 {
        self.services_used
            .iter()
            .find(|usage| usage.service_type == service_type)
            .map(|usage| usage.used_count)
            .unwrap_or(0)
    }

    pub fn record_use(&mut self, service_type: ServiceType, at: DateTime<Utc>) {
        match self
            .services_used
            .iter_mut()
            .find(|usage| usage.service_type == service_type)
        {
            Some(usage) => {
                usage.used_count += 1;
                usage.last_used = at;
            }
            None => self.services_used.push(ServiceUsageSummary {
                service_type,
                used_count: 1,
                last_used: at,
            }),
        }
    }
}

/// key: payment-status -> billing cycle progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Invoiced,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Invoiced => "invoiced",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ContractError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(PaymentStatus::Pending),
            "invoiced" => Ok(PaymentStatus::Invoiced),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ContractError::validation(format!(
                "unknown payment status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub organization_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub due_date: NaiveDate,
    pub invoice_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalType {
    Automatic,
    Manual,
}

impl RenewalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalType::Automatic => "automatic",
            RenewalType::Manual => "manual",
        }
    }
}

impl FromStr for RenewalType {
    type Err = ContractError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "automatic" => Ok(RenewalType::Automatic),
            "manual" => Ok(RenewalType::Manual),
            other => Err(ContractError::validation(format!(
                "unknown renewal type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalRecord {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub renewed_at: DateTime<Utc>,
    pub previous_end_date: NaiveDate,
    pub new_end_date: NaiveDate,
    pub previous_price: Decimal,
    pub new_price: Decimal,
    pub price_change_reason: Option<String>,
    pub renewal_type: RenewalType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUsageRecord {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub service_id: Uuid,
    pub service_type: ServiceType,
    pub used_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub covered_by_contract: bool,
    pub additional_charge: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractTemplate {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub contract_type: ContractType,
    pub included_services: Vec<IncludedService>,
    pub additional_services_discount: Decimal,
    pub base_price: Decimal,
    pub billing_frequency: BillingFrequency,
    pub duration_months: u32,
    pub auto_renew: bool,
    pub renewal_notice_days: u32,
    pub terms_and_conditions: Option<String>,
    pub cancellation_policy: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub contract_type: ContractType,
    pub included_services: Vec<IncludedService>,
    #[serde(default)]
    pub additional_services_discount: Option<Decimal>,
    pub base_price: Decimal,
    #[serde(default)]
    pub billing_frequency: Option<BillingFrequency>,
    #[serde(default)]
    pub duration_months: Option<u32>,
    #[serde(default)]
    pub auto_renew: Option<bool>,
    #[serde(default)]
    pub renewal_notice_days: Option<u32>,
    #[serde(default)]
    pub terms_and_conditions: Option<String>,
    #[serde(default)]
    pub cancellation_policy: Option<String>,
}

impl CreateTemplateInput {
    pub fn validate(&self) -> ContractResult<()> {
        validate_name(&self.name)?;
        validate_terms(
            self.base_price,
            self.additional_services_discount,
            &self.included_services,
        )?;
        validate_duration(self.duration_months)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContractInput {
    pub client_id: Uuid,
    #[serde(default)]
    pub piano_id: Option<Uuid>,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub contract_type: ContractType,
    pub included_services: Vec<IncludedService>,
    #[serde(default)]
    pub additional_services_discount: Option<Decimal>,
    pub base_price: Decimal,
    #[serde(default)]
    pub billing_frequency: Option<BillingFrequency>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub duration_months: Option<u32>,
    #[serde(default)]
    pub auto_renew: Option<bool>,
    #[serde(default)]
    pub renewal_notice_days: Option<u32>,
    #[serde(default)]
    pub terms_and_conditions: Option<String>,
    #[serde(default)]
    pub cancellation_policy: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateContractInput {
    pub fn validate(&self) -> ContractResult<()> {
        validate_name(&self.name)?;
        validate_terms(
            self.base_price,
            self.additional_services_discount,
            &self.included_services,
        )?;
        validate_duration(self.duration_months)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateContractInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub included_services: Option<Vec<IncludedService>>,
    #[serde(default)]
    pub additional_services_discount: Option<Decimal>,
    #[serde(default)]
    pub base_price: Option<Decimal>,
    #[serde(default)]
    pub auto_renew: Option<bool>,
    #[serde(default)]
    pub renewal_notice_days: Option<u32>,
    #[serde(default)]
    pub terms_and_conditions: Option<String>,
    #[serde(default)]
    pub cancellation_policy: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl UpdateContractInput {
    pub fn validate(&self) -> ContractResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(price) = self.base_price {
            validate_price(price)?;
        }
        if let Some(discount) = self.additional_services_discount {
            validate_discount(discount)?;
        }
        if let Some(services) = &self.included_services {
            validate_included_services(services)?;
        }
        Ok(())
    }

    pub fn apply(self, contract: &mut Contract) {
        if let Some(name) = self.name {
            contract.name = name;
        }
        if let Some(description) = self.description {
            contract.description = Some(description);
        }
        if let Some(services) = self.included_services {
            contract.included_services = services;
        }
        if let Some(discount) = self.additional_services_discount {
            contract.additional_services_discount = discount;
        }
        if let Some(price) = self.base_price {
            contract.base_price = price;
        }
        if let Some(auto_renew) = self.auto_renew {
            contract.auto_renew = auto_renew;
        }
        if let Some(days) = self.renewal_notice_days {
            contract.renewal_notice_days = days;
        }
        if let Some(terms) = self.terms_and_conditions {
            contract.terms_and_conditions = Some(terms);
        }
        if let Some(policy) = self.cancellation_policy {
            contract.cancellation_policy = Some(policy);
        }
        if let Some(notes) = self.notes {
            contract.notes = Some(notes);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractFilters {
    #[serde(default)]
    pub status: Option<ContractStatus>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub contract_type: Option<ContractType>,
}

impl ContractFilters {
    pub fn matches(&self, contract: &Contract) -> bool {
        self.status.map_or(true, |status| contract.status == status)
            && self
                .client_id
                .map_or(true, |client_id| contract.client_id == client_id)
            && self
                .contract_type
                .map_or(true, |kind| contract.contract_type == kind)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenewalOptions {
    #[serde(default)]
    pub new_price: Option<Decimal>,
    #[serde(default)]
    pub price_change_reason: Option<String>,
    #[serde(default)]
    pub duration_months: Option<u32>,
}

impl RenewalOptions {
    pub fn validate(&self) -> ContractResult<()> {
        if let Some(price) = self.new_price {
            validate_price(price)?;
        }
        validate_duration(self.duration_months)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordUsageInput {
    pub service_id: Uuid,
    pub service_type: ServiceType,
    #[serde(default)]
    pub notes: Option<String>,
    /// Undiscounted price of the visit, used to charge out-of-quota usage.
    #[serde(default)]
    pub list_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageResult {
    pub covered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Decimal>,
}

impl CoverageResult {
    pub fn uncovered() -> Self {
        Self {
            covered: false,
            contract_id: None,
            remaining_quantity: None,
            discount: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageOutcome {
    pub covered_by_contract: bool,
    pub additional_charge: Decimal,
    pub usage: ServiceUsageRecord,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ContractStats {
    pub total: usize,
    pub draft: usize,
    pub active: usize,
    pub suspended: usize,
    pub expired: usize,
    pub cancelled: usize,
    pub total_revenue: Decimal,
    pub by_type: BTreeMap<ContractType, usize>,
    pub expiring_this_month: usize,
}

fn validate_name(name: &str) -> ContractResult<()> {
    if name.trim().is_empty() {
        return Err(ContractError::validation("name is required"));
    }
    Ok(())
}

fn validate_price(price: Decimal) -> ContractResult<()> {
    if price < Decimal::ZERO {
        return Err(ContractError::validation("price must not be negative"));
    }
    Ok(())
}

fn validate_discount(discount: Decimal) -> ContractResult<()> {
    if discount < Decimal::ZERO || discount > Decimal::ONE_HUNDRED {
        return Err(ContractError::validation(
            "additional services discount must be between 0 and 100",
        ));
    }
    Ok(())
}

fn validate_duration(duration_months: Option<u32>) -> ContractResult<()> {
    match duration_months {
        Some(0) => Err(ContractError::validation(
            "duration must be at least one month",
        )),
        _ => Ok(()),
    }
}

fn validate_included_services(services: &[IncludedService]) -> ContractResult<()> {
    for (index, service) in services.iter().enumerate() {
        if services[..index]
            .iter()
            .any(|earlier| earlier.service_type == service.service_type)
        {
            return Err(ContractError::validation(format!(
                "service type '{}' is listed more than once",
                service.service_type
            )));
        }
        if service.allowance == Allowance::Quota(0) {
            return Err(ContractError::validation(format!(
                "service type '{}' has a zero quota",
                service.service_type
            )));
        }
    }
    Ok(())
}

fn validate_terms(
    base_price: Decimal,
    discount: Option<Decimal>,
    services: &[IncludedService],
) -> ContractResult<()> {
    validate_price(base_price)?;
    if let Some(discount) = discount {
        validate_discount(discount)?;
    }
    validate_included_services(services)
}
