//! The fixed operation vocabulary exposed to callers
//!
//! Entity lists and reports go through one parameterized path each, keyed by
//! the `Entity` / `Report` tags. The named methods (`invoices()`,
//! `balance_sheet_report()`, ...) and the `OPERATIONS` table keep the
//! per-operation names callers already use. Payloads come back exactly as
//! QuickBooks sent them.

use common::Secret;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::endpoint::{CURRENT_USER_PATH, EndpointResolver, Report, Resource, TIME_BASE_URL};
use crate::error::{OperationError, Result, UnknownName};
use crate::query::Entity;
use crate::session::Session;

/// A parameterless catalog operation.
///
/// Free-form queries are not listed here: they carry a query string and go
/// through `OperationCatalog::execute_query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CompanyInfo,
    CurrentUser,
    Entity(Entity),
    Report(Report),
}

/// Operation names, as exposed by the gateway's `/operations/{name}` route.
pub const OPERATIONS: [(&str, Operation); 20] = [
    ("get_company_info", Operation::CompanyInfo),
    ("get_current_user", Operation::CurrentUser),
    ("get_employees", Operation::Entity(Entity::Employee)),
    ("get_customers", Operation::Entity(Entity::Customer)),
    ("get_invoices", Operation::Entity(Entity::Invoice)),
    ("get_accounts", Operation::Entity(Entity::Account)),
    ("get_items", Operation::Entity(Entity::Item)),
    ("get_payments", Operation::Entity(Entity::Payment)),
    ("get_bills", Operation::Entity(Entity::Bill)),
    ("get_vendors", Operation::Entity(Entity::Vendor)),
    ("get_purchase_orders", Operation::Entity(Entity::PurchaseOrder)),
    ("get_journal_entries", Operation::Entity(Entity::JournalEntry)),
    ("get_profit_and_loss_report", Operation::Report(Report::ProfitAndLoss)),
    ("get_balance_sheet_report", Operation::Report(Report::BalanceSheet)),
    ("get_cash_flow_report", Operation::Report(Report::CashFlow)),
    ("get_trial_balance_report", Operation::Report(Report::TrialBalance)),
    ("get_accounts_receivable_report", Operation::Report(Report::AgedReceivables)),
    ("get_accounts_payable_report", Operation::Report(Report::AgedPayables)),
    ("get_customer_income_report", Operation::Report(Report::CustomerIncome)),
    ("get_vendor_expenses_report", Operation::Report(Report::VendorExpenses)),
];

impl Operation {
    pub fn from_name(name: &str) -> std::result::Result<Self, UnknownName> {
        OPERATIONS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, op)| *op)
            .ok_or_else(|| UnknownName {
                kind: "operation",
                name: name.to_string(),
            })
    }

    pub fn name(&self) -> &'static str {
        OPERATIONS
            .iter()
            .find(|(_, op)| op == self)
            .map(|(n, _)| *n)
            .unwrap_or("unknown")
    }
}

pub struct OperationCatalog {
    session: Session,
    resolver: EndpointResolver,
    time_base_url: String,
    time_token: Option<Secret<String>>,
}

impl OperationCatalog {
    pub fn new(session: Session, resolver: EndpointResolver) -> Self {
        Self {
            session,
            resolver,
            time_base_url: TIME_BASE_URL.to_string(),
            time_token: None,
        }
    }

    /// Configure the QuickBooks Time API used by `current_user()`.
    ///
    /// Its token is separate from the accounting pair and is never refreshed
    /// here.
    pub fn with_time_api(
        mut self,
        base_url: impl Into<String>,
        token: Option<Secret<String>>,
    ) -> Self {
        self.time_base_url = base_url.into().trim_end_matches('/').to_string();
        self.time_token = token;
        self
    }

    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    /// Run a named operation.
    pub async fn run(&self, operation: Operation) -> Result<Value> {
        match operation {
            Operation::CompanyInfo => self.company_info().await,
            Operation::CurrentUser => self.current_user().await,
            Operation::Entity(entity) => self.entity(entity).await,
            Operation::Report(report) => self.report(report).await,
        }
    }

    pub async fn company_info(&self) -> Result<Value> {
        self.call(Method::GET, Resource::CompanyInfo, None).await
    }

    /// Current QuickBooks Time user.
    #[instrument(skip_all)]
    pub async fn current_user(&self) -> Result<Value> {
        let token = self.time_token.as_ref().ok_or_else(|| {
            OperationError::Auth(intuit_auth::Error::MissingCredential(
                "QB_TIME_ACCESS_TOKEN not configured".into(),
            ))
        })?;
        let url = format!("{}{CURRENT_USER_PATH}", self.time_base_url);
        Ok(self
            .session
            .dispatcher()
            .execute(Method::GET, &url, token.expose(), None)
            .await?)
    }

    /// Run a raw query-language string.
    pub async fn execute_query(&self, query: &str) -> Result<Value> {
        let body = json!({ "query": query });
        self.call(Method::POST, Resource::Query, Some(&body)).await
    }

    pub async fn entity(&self, entity: Entity) -> Result<Value> {
        self.execute_query(&entity.query()).await
    }

    pub async fn report(&self, report: Report) -> Result<Value> {
        self.call(Method::GET, Resource::Report(report), None).await
    }

    pub async fn employees(&self) -> Result<Value> {
        self.entity(Entity::Employee).await
    }

    pub async fn customers(&self) -> Result<Value> {
        self.entity(Entity::Customer).await
    }

    pub async fn invoices(&self) -> Result<Value> {
        self.entity(Entity::Invoice).await
    }

    pub async fn accounts(&self) -> Result<Value> {
        self.entity(Entity::Account).await
    }

    pub async fn items(&self) -> Result<Value> {
        self.entity(Entity::Item).await
    }

    pub async fn payments(&self) -> Result<Value> {
        self.entity(Entity::Payment).await
    }

    pub async fn bills(&self) -> Result<Value> {
        self.entity(Entity::Bill).await
    }

    pub async fn vendors(&self) -> Result<Value> {
        self.entity(Entity::Vendor).await
    }

    pub async fn purchase_orders(&self) -> Result<Value> {
        self.entity(Entity::PurchaseOrder).await
    }

    pub async fn journal_entries(&self) -> Result<Value> {
        self.entity(Entity::JournalEntry).await
    }

    pub async fn profit_and_loss_report(&self) -> Result<Value> {
        self.report(Report::ProfitAndLoss).await
    }

    pub async fn balance_sheet_report(&self) -> Result<Value> {
        self.report(Report::BalanceSheet).await
    }

    pub async fn cash_flow_report(&self) -> Result<Value> {
        self.report(Report::CashFlow).await
    }

    pub async fn trial_balance_report(&self) -> Result<Value> {
        self.report(Report::TrialBalance).await
    }

    pub async fn accounts_receivable_report(&self) -> Result<Value> {
        self.report(Report::AgedReceivables).await
    }

    pub async fn accounts_payable_report(&self) -> Result<Value> {
        self.report(Report::AgedPayables).await
    }

    pub async fn customer_income_report(&self) -> Result<Value> {
        self.report(Report::CustomerIncome).await
    }

    pub async fn vendor_expenses_report(&self) -> Result<Value> {
        self.report(Report::VendorExpenses).await
    }

    async fn call(&self, method: Method, resource: Resource, body: Option<&Value>) -> Result<Value> {
        let url = self.resolver.url(resource);
        debug!(%method, %url, "dispatching catalog operation");
        self.session.execute(method, &url, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RequestDispatcher;
    use crate::endpoint::Environment;
    use axum::http::{HeaderMap, StatusCode};
    use intuit_auth::{Credential, CredentialStore, MemoryStore, TokenRefresher};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[derive(Debug, Clone)]
    struct Seen {
        method: String,
        path: String,
        authorization: String,
        body: String,
    }

    /// Mock QuickBooks host recording every request and echoing a canned
    /// payload that names the path it was served for.
    async fn start_api() -> (String, Arc<Mutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let app = axum::Router::new().fallback(
            move |method: axum::http::Method,
                  uri: axum::http::Uri,
                  headers: HeaderMap,
                  body: String| {
                let sink = sink.clone();
                async move {
                    let authorization = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    sink.lock().unwrap().push(Seen {
                        method: method.to_string(),
                        path: uri.path().to_string(),
                        authorization,
                        body,
                    });
                    if uri.path().ends_with("/reports/GeneralLedger") {
                        return (StatusCode::BAD_REQUEST, "unsupported report".to_string());
                    }
                    (
                        StatusCode::OK,
                        json!({ "served": uri.path(), "time": "2025-01-01T00:00:00-08:00" })
                            .to_string(),
                    )
                }
            },
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (url, seen)
    }

    fn catalog(api: &str, company_id: &str) -> OperationCatalog {
        let client = reqwest::Client::new();
        let store: Arc<dyn CredentialStore> =
            Arc::new(MemoryStore::new(Credential::new("A1", "R1")));
        let refresher = TokenRefresher::new(
            client.clone(),
            "client",
            Secret::new("secret".to_string()),
            store,
        )
        .with_token_endpoint(format!("{api}/token"));
        let session = Session::new(
            Arc::new(refresher),
            RequestDispatcher::new(client, Duration::from_secs(5)),
        );
        let resolver =
            EndpointResolver::new(Environment::Production, company_id).with_base_url(api);
        OperationCatalog::new(session, resolver)
    }

    #[tokio::test]
    async fn invoices_posts_select_query_to_company_query_path() {
        let (api, seen) = start_api().await;
        let catalog = catalog(&api, "9991");

        let payload = catalog.invoices().await.unwrap();
        assert_eq!(
            payload,
            json!({ "served": "/v3/company/9991/query", "time": "2025-01-01T00:00:00-08:00" })
        );

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].path, "/v3/company/9991/query");
        assert_eq!(seen[0].authorization, "Bearer A1");
        let body: Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(body, json!({ "query": "SELECT * FROM Invoice" }));
    }

    #[test]
    fn production_resolver_targets_intuit_host() {
        let resolver = EndpointResolver::new(Environment::Production, "9991");
        assert_eq!(
            resolver.url(Resource::Query),
            "https://quickbooks.api.intuit.com/v3/company/9991/query"
        );
    }

    #[tokio::test]
    async fn company_info_is_a_get_without_body() {
        let (api, seen) = start_api().await;

        catalog(&api, "42").company_info().await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0].method, "GET");
        assert_eq!(seen[0].path, "/v3/company/42/companyinfo/42");
        assert!(seen[0].body.is_empty());
    }

    #[tokio::test]
    async fn every_report_alias_hits_its_path() {
        let (api, seen) = start_api().await;
        let catalog = catalog(&api, "7");

        catalog.profit_and_loss_report().await.unwrap();
        catalog.balance_sheet_report().await.unwrap();
        catalog.cash_flow_report().await.unwrap();
        catalog.trial_balance_report().await.unwrap();
        catalog.accounts_receivable_report().await.unwrap();
        catalog.accounts_payable_report().await.unwrap();
        catalog.customer_income_report().await.unwrap();
        catalog.vendor_expenses_report().await.unwrap();

        let paths: Vec<String> = seen.lock().unwrap().iter().map(|s| s.path.clone()).collect();
        let expected: Vec<String> = Report::ALL
            .iter()
            .map(|r| format!("/v3/company/7/reports/{r}"))
            .collect();
        assert_eq!(paths, expected);
    }

    #[tokio::test]
    async fn every_entity_alias_sends_its_query() {
        let (api, seen) = start_api().await;
        let catalog = catalog(&api, "7");

        catalog.employees().await.unwrap();
        catalog.customers().await.unwrap();
        catalog.invoices().await.unwrap();
        catalog.accounts().await.unwrap();
        catalog.items().await.unwrap();
        catalog.payments().await.unwrap();
        catalog.bills().await.unwrap();
        catalog.vendors().await.unwrap();
        catalog.purchase_orders().await.unwrap();
        catalog.journal_entries().await.unwrap();

        let queries: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|s| {
                let body: Value = serde_json::from_str(&s.body).unwrap();
                body["query"].as_str().unwrap().to_string()
            })
            .collect();
        let expected: Vec<String> = Entity::ALL.iter().map(Entity::query).collect();
        assert_eq!(queries, expected);
    }

    #[tokio::test]
    async fn execute_query_passes_string_verbatim() {
        let (api, seen) = start_api().await;

        catalog(&api, "7")
            .execute_query("SELECT Id FROM Vendor WHERE Active = true")
            .await
            .unwrap();

        let body: Value = serde_json::from_str(&seen.lock().unwrap()[0].body).unwrap();
        assert_eq!(
            body,
            json!({ "query": "SELECT Id FROM Vendor WHERE Active = true" })
        );
    }

    #[tokio::test]
    async fn remote_failure_is_returned_as_error_value() {
        let (api, _) = start_api().await;
        let catalog = catalog(&api, "7");

        // Bypass the Report allow-list to reach an unsupported path.
        let err = catalog
            .session
            .execute(
                Method::GET,
                &format!("{api}/v3/company/7/reports/GeneralLedger"),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.to_payload(),
            json!({ "error": "remote API returned 400", "details": "unsupported report" })
        );
    }

    #[tokio::test]
    async fn current_user_uses_time_token() {
        let (api, seen) = start_api().await;
        let catalog = catalog(&api, "7")
            .with_time_api(api.clone(), Some(Secret::new("T1".to_string())));

        catalog.current_user().await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0].path, "/api/v1/current_user");
        assert_eq!(seen[0].authorization, "Bearer T1");
    }

    #[tokio::test]
    async fn current_user_without_token_is_missing_credential() {
        let (api, seen) = start_api().await;

        let err = catalog(&api, "7").current_user().await.unwrap_err();
        assert_eq!(err.kind(), "missing_credential");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_dispatches_by_operation_tag() {
        let (api, seen) = start_api().await;
        let catalog = catalog(&api, "7");

        catalog
            .run(Operation::from_name("get_cash_flow_report").unwrap())
            .await
            .unwrap();

        assert_eq!(
            seen.lock().unwrap()[0].path,
            "/v3/company/7/reports/CashFlow"
        );
    }

    #[test]
    fn operation_names_roundtrip() {
        for (name, op) in OPERATIONS {
            assert_eq!(Operation::from_name(name).unwrap(), op);
            assert_eq!(op.name(), name);
        }
        assert!(Operation::from_name("get_widgets").is_err());
    }

    #[test]
    fn operation_table_covers_every_entity_and_report() {
        for entity in Entity::ALL {
            assert_ne!(Operation::Entity(entity).name(), "unknown");
        }
        for report in Report::ALL {
            assert_ne!(Operation::Report(report).name(), "unknown");
        }
    }
}
