#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use maintenance_contracts::config::EngineSettings;
use maintenance_contracts::contracts::testing::{
    InMemoryContractStore, RecordingInvoiceIssuer, RecordingNotifier,
};
use maintenance_contracts::contracts::{
    BillingFrequency, Contract, ContractService, ContractType, CreateContractInput,
    IncludedService, ServiceType,
};
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct Harness {
    pub engine: ContractService,
    pub store: Arc<InMemoryContractStore>,
    pub invoices: Arc<RecordingInvoiceIssuer>,
    pub notifier: Arc<RecordingNotifier>,
    pub organization_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(RecordingInvoiceIssuer::new(), EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        Self::build(RecordingInvoiceIssuer::new(), settings)
    }

    pub fn build(issuer: RecordingInvoiceIssuer, settings: EngineSettings) -> Self {
        let store = Arc::new(InMemoryContractStore::new());
        let invoices = Arc::new(issuer);
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = ContractService::new(
            store.clone(),
            invoices.clone(),
            notifier.clone(),
            settings,
        );
        Self {
            engine,
            store,
            invoices,
            notifier,
            organization_id: Uuid::new_v4(),
        }
    }

    pub async fn draft(&self, input: CreateContractInput, now: DateTime<Utc>) -> Contract {
        self.engine
            .create_contract(self.organization_id, input, "office@tuning.example", now)
            .await
            .unwrap()
    }

    pub async fn active(&self, input: CreateContractInput, now: DateTime<Utc>) -> Contract {
        let draft = self.draft(input, now).await;
        self.engine
            .activate_contract(draft.id, None, now)
            .await
            .unwrap()
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0).unwrap()
}

pub fn money(units: i64) -> Decimal {
    Decimal::new(units, 0)
}

pub fn contract_input(
    client_id: Uuid,
    base_price: i64,
    frequency: BillingFrequency,
    start_date: NaiveDate,
) -> CreateContractInput {
    CreateContractInput {
        client_id,
        piano_id: Some(Uuid::new_v4()),
        template_id: None,
        name: "Steinway B yearly care".to_string(),
        description: None,
        contract_type: ContractType::Standard,
        included_services: vec![IncludedService::quota(ServiceType::Tuning, 2)],
        additional_services_discount: None,
        base_price: money(base_price),
        billing_frequency: Some(frequency),
        start_date,
        duration_months: None,
        auto_renew: None,
        renewal_notice_days: None,
        terms_and_conditions: None,
        cancellation_policy: None,
        notes: None,
    }
}

/// Annual contract priced at 1200 starting on 2025-01-01.
pub fn annual_input(client_id: Uuid) -> CreateContractInput {
    contract_input(client_id, 1200, BillingFrequency::Annual, date(2025, 1, 1))
}
