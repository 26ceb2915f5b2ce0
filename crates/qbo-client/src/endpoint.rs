//! Environment-aware endpoint resolution
//!
//! Sandbox and production differ only in host; every resource path is the
//! same in both. Resolution is pure string composition with no I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownName;

/// Production accounting API host
pub const PRODUCTION_BASE_URL: &str = "https://quickbooks.api.intuit.com";

/// Sandbox accounting API host
pub const SANDBOX_BASE_URL: &str = "https://sandbox-quickbooks.api.intuit.com";

/// QuickBooks Time (TSheets) API host, shared by both environments
pub const TIME_BASE_URL: &str = "https://rest.tsheets.com";

/// QuickBooks Time current-user path
pub const CURRENT_USER_PATH: &str = "/api/v1/current_user";

/// Deployment environment, fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => SANDBOX_BASE_URL,
            Environment::Production => PRODUCTION_BASE_URL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Environment::Sandbox),
            "production" => Ok(Environment::Production),
            _ => Err(UnknownName {
                kind: "environment",
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = UnknownName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Environment> for String {
    fn from(env: Environment) -> Self {
        env.as_str().to_string()
    }
}

/// Named reports, consumed verbatim as a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Report {
    ProfitAndLoss,
    BalanceSheet,
    CashFlow,
    TrialBalance,
    AgedReceivables,
    AgedPayables,
    CustomerIncome,
    VendorExpenses,
}

impl Report {
    pub const ALL: [Report; 8] = [
        Report::ProfitAndLoss,
        Report::BalanceSheet,
        Report::CashFlow,
        Report::TrialBalance,
        Report::AgedReceivables,
        Report::AgedPayables,
        Report::CustomerIncome,
        Report::VendorExpenses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Report::ProfitAndLoss => "ProfitAndLoss",
            Report::BalanceSheet => "BalanceSheet",
            Report::CashFlow => "CashFlow",
            Report::TrialBalance => "TrialBalance",
            Report::AgedReceivables => "AgedReceivables",
            Report::AgedPayables => "AgedPayables",
            Report::CustomerIncome => "CustomerIncome",
            Report::VendorExpenses => "VendorExpenses",
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Report {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Report::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownName {
                kind: "report",
                name: s.to_string(),
            })
    }
}

/// Company-scoped resources of the accounting API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    CompanyInfo,
    Query,
    Report(Report),
}

impl Resource {
    /// Path below the host, e.g. `/v3/company/9991/query`.
    pub fn path(&self, company_id: &str) -> String {
        match self {
            Resource::CompanyInfo => {
                format!("/v3/company/{company_id}/companyinfo/{company_id}")
            }
            Resource::Query => format!("/v3/company/{company_id}/query"),
            Resource::Report(report) => format!("/v3/company/{company_id}/reports/{report}"),
        }
    }
}

/// Host for `environment` with `resource_path` appended verbatim.
pub fn resolve(environment: Environment, resource_path: &str) -> String {
    debug_assert!(
        resource_path.starts_with('/'),
        "resource path must be absolute: {resource_path}"
    );
    format!("{}{}", environment.base_url(), resource_path)
}

/// Resolver bound to one environment and company.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    environment: Environment,
    company_id: String,
    base_url_override: Option<String>,
}

impl EndpointResolver {
    pub fn new(environment: Environment, company_id: impl Into<String>) -> Self {
        Self {
            environment,
            company_id: company_id.into(),
            base_url_override: None,
        }
    }

    /// Replace the environment's host (tests, egress proxies). Paths are
    /// unchanged.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn url(&self, resource: Resource) -> String {
        let path = resource.path(&self.company_id);
        match &self.base_url_override {
            Some(base) => format!("{base}{path}"),
            None => resolve(self.environment, &path),
        }
    }
}
