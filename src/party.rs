use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ident;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Customer,
    Vendor,
}

/// A customer or vendor the business trades with. `balance` is the running
/// outstanding amount maintained by the ledger engine; it is never edited
/// directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: String,
    pub name: String,
    pub kind: PartyKind,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub default_rate: f64,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub advance: f64,
    pub created_at: DateTime<Utc>,
}

impl Party {
    pub fn new(name: &str, kind: PartyKind) -> Party {
        Party {
            id: ident::next_id(),
            name: name.to_string(),
            kind,
            email: String::new(),
            phone: String::new(),
            address: String::new(),
            default_rate: 0.0,
            balance: 0.0,
            advance: 0.0,
            created_at: ident::now(),
        }
    }

    pub fn matches_query(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.name.to_lowercase().contains(&q)
            || self.phone.contains(&q)
            || self.email.to_lowercase().contains(&q)
    }
}
