//! Query-language strings for entity list operations
//!
//! The builder is purely syntactic: `entity_query` accepts any name, and the
//! allow-list lives in the `Entity` enum so callers validate before building.

use std::fmt;
use std::str::FromStr;

use crate::error::UnknownName;

/// `SELECT * FROM <entity>`
pub fn entity_query(entity_name: &str) -> String {
    format!("SELECT * FROM {entity_name}")
}

/// Entities that have a list operation in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Employee,
    Customer,
    Invoice,
    Account,
    Item,
    Payment,
    Bill,
    Vendor,
    PurchaseOrder,
    JournalEntry,
}

impl Entity {
    pub const ALL: [Entity; 10] = [
        Entity::Employee,
        Entity::Customer,
        Entity::Invoice,
        Entity::Account,
        Entity::Item,
        Entity::Payment,
        Entity::Bill,
        Entity::Vendor,
        Entity::PurchaseOrder,
        Entity::JournalEntry,
    ];

    /// Name as it appears in the QuickBooks query language.
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Employee => "Employee",
            Entity::Customer => "Customer",
            Entity::Invoice => "Invoice",
            Entity::Account => "Account",
            Entity::Item => "Item",
            Entity::Payment => "Payment",
            Entity::Bill => "Bill",
            Entity::Vendor => "Vendor",
            Entity::PurchaseOrder => "PurchaseOrder",
            Entity::JournalEntry => "JournalEntry",
        }
    }

    pub fn query(&self) -> String {
        entity_query(self.as_str())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Entity {
    type Err = UnknownName;

    /// Exact, case-sensitive match; the query language is case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Entity::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownName {
                kind: "entity",
                name: s.to_string(),
            })
    }
}
