use axum::{
    routing::{get, post},
    Router,
};

use crate::contracts::api;

pub fn api_routes() -> Router {
    Router::new()
        .route(
            "/api/organizations/:organization_id/contract-templates",
            get(api::list_templates).post(api::create_template),
        )
        .route(
            "/api/organizations/:organization_id/contracts",
            get(api::list_contracts).post(api::create_contract),
        )
        .route(
            "/api/organizations/:organization_id/contracts/stats",
            get(api::contract_stats),
        )
        .route(
            "/api/contracts/:id",
            get(api::get_contract).patch(api::update_contract),
        )
        .route("/api/contracts/:id/activate", post(api::activate_contract))
        .route("/api/contracts/:id/suspend", post(api::suspend_contract))
        .route("/api/contracts/:id/resume", post(api::resume_contract))
        .route("/api/contracts/:id/cancel", post(api::cancel_contract))
        .route("/api/contracts/:id/renew", post(api::renew_contract))
        .route(
            "/api/contracts/:id/usage",
            get(api::usage_history).post(api::record_usage),
        )
        .route("/api/contracts/:id/payments", get(api::contract_payments))
        .route("/api/contracts/:id/renewals", get(api::renewal_history))
        .route("/api/payments/:id/paid", post(api::mark_payment_paid))
        .route("/api/clients/:client_id/coverage", get(api::check_coverage))
        .route("/api/sweeps/billing", post(api::run_billing_sweep))
        .route("/api/sweeps/renewals", post(api::run_renewal_sweep))
}
