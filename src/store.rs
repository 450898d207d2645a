use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Delivery, Invoice};
use crate::ident;
use crate::ledger::LedgerEntry;
use crate::party::Party;

const BACKUP_FORMAT_VERSION: &str = "1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Income,
    Expense,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayMode {
    Cash,
    Online,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowEntry {
    pub id: String,
    pub date: NaiveDate,
    pub kind: FlowKind,
    pub category: String,
    pub amount: f64,
    pub payment_method: PayMode,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorRate {
    pub vendor_name: String,
    pub rate: f64,
    pub date: NaiveDate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub company_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub tax_id: String,
    pub auto_save_interval_minutes: u64,
    pub default_tax_rate_percent: f64,
    #[serde(default)]
    pub off_days: Vec<String>,
    #[serde(default)]
    pub vendor_rates: Vec<VendorRate>,
    #[serde(default)]
    pub last_backup_at: Option<DateTime<Utc>>,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            company_name: "Your Company".to_string(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            tax_id: String::new(),
            auto_save_interval_minutes: 5,
            default_tax_rate_percent: 18.0,
            off_days: vec!["sunday".to_string()],
            vendor_rates: Vec::new(),
            last_backup_at: None,
        }
    }
}

/// The whole dataset, persisted as one snapshot. Field names serialize to
/// the camelCase keys the snapshot blob is known by.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub delivery_documents: Vec<Delivery>,
    #[serde(default)]
    pub customers: Vec<Party>,
    #[serde(default)]
    pub invoices: Vec<Invoice>,
    #[serde(default)]
    pub ledger_entries: Vec<LedgerEntry>,
    #[serde(default)]
    pub cash_flow: Vec<CashFlowEntry>,
    /// Computed by the out-of-scope dashboards; carried opaquely so the
    /// snapshot blob stays compatible with what they wrote.
    #[serde(default)]
    pub profit_loss: Vec<Value>,
    #[serde(default)]
    pub settings: Settings,
}

impl Dataset {
    pub fn party(&self, id: &str) -> Option<&Party> {
        self.customers.iter().find(|p| p.id == id)
    }

    pub fn party_mut(&mut self, id: &str) -> Option<&mut Party> {
        self.customers.iter_mut().find(|p| p.id == id)
    }

    pub fn party_by_name(&self, name: &str) -> Option<&Party> {
        self.customers
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn delivery(&self, id: &str) -> Option<&Delivery> {
        self.delivery_documents.iter().find(|d| d.id == id)
    }

    pub fn delivery_mut(&mut self, id: &str) -> Option<&mut Delivery> {
        self.delivery_documents.iter_mut().find(|d| d.id == id)
    }

    pub fn invoice(&self, id: &str) -> Option<&Invoice> {
        self.invoices.iter().find(|i| i.id == id)
    }

    pub fn invoice_mut(&mut self, id: &str) -> Option<&mut Invoice> {
        self.invoices.iter_mut().find(|i| i.id == id)
    }

    /// Numbers already issued to this vendor on this calendar date.
    /// Compared by date value, not by timestamp range.
    pub fn delivery_numbers_on(&self, vendor_id: &str, date: NaiveDate) -> Vec<&str> {
        self.delivery_documents
            .iter()
            .filter(|d| d.vendor_id == vendor_id && d.date == date)
            .map(|d| d.number.as_str())
            .collect()
    }

    pub fn invoice_numbers_on(&self, customer_id: &str, date: NaiveDate) -> Vec<&str> {
        self.invoices
            .iter()
            .filter(|i| i.customer_id == customer_id && i.date == date)
            .map(|i| i.number.as_str())
            .collect()
    }
}

/// Where the snapshot blob lives. Injectable so the whole core can run
/// against an in-memory buffer in tests.
pub trait Storage {
    /// `Ok(None)` when no snapshot was ever written.
    fn read(&self) -> Result<Option<String>>;
    fn write(&self, blob: &str) -> Result<()>;
}

/// Snapshot in a single file on disk.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> FileStorage {
        FileStorage {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Storage for FileStorage {
    fn read(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let blob = fs::read_to_string(&self.path)
            .with_context(|| format!("reading snapshot {}", self.path.display()))?;
        Ok(Some(blob))
    }

    fn write(&self, blob: &str) -> Result<()> {
        fs::write(&self.path, blob)
            .with_context(|| format!("writing snapshot {}", self.path.display()))
    }
}

/// Snapshot held in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemStorage(Arc<Mutex<Option<String>>>);

impl MemStorage {
    pub fn new() -> MemStorage {
        Default::default()
    }
}

impl Storage for MemStorage {
    fn read(&self) -> Result<Option<String>> {
        let slot = self.0.lock().map_err(|_| anyhow!("storage lock poisoned"))?;
        Ok(slot.clone())
    }

    fn write(&self, blob: &str) -> Result<()> {
        let mut slot = self.0.lock().map_err(|_| anyhow!("storage lock poisoned"))?;
        *slot = Some(blob.to_string());
        Ok(())
    }
}

/// Loads and persists the dataset. `load` never fails: a missing or
/// unreadable snapshot degrades to the default dataset, with a warning so
/// the condition is at least visible in the log.
pub struct Store<S: Storage> {
    storage: S,
}

impl<S: Storage> Store<S> {
    pub fn new(storage: S) -> Store<S> {
        Store { storage }
    }

    pub fn load(&self) -> Dataset {
        match self.storage.read() {
            Ok(Some(blob)) => match serde_json::from_str(&blob) {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!("snapshot unreadable, starting empty: {err}");
                    Dataset::default()
                }
            },
            Ok(None) => Dataset::default(),
            Err(err) => {
                tracing::warn!("snapshot read failed, starting empty: {err:#}");
                Dataset::default()
            }
        }
    }

    pub fn save(&self, data: &Dataset) -> bool {
        let blob = match serde_json::to_string(data) {
            Ok(blob) => blob,
            Err(err) => {
                tracing::error!("snapshot serialization failed: {err}");
                return false;
            }
        };
        match self.storage.write(&blob) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("snapshot write failed: {err:#}");
                false
            }
        }
    }

    /// The whole snapshot as a portable text blob.
    pub fn export_blob(&self) -> Result<String> {
        let data = self.load();
        Ok(serde_json::to_string_pretty(&data)?)
    }

    /// Replace the stored snapshot with the imported one.
    pub fn import_overwrite(&self, blob: &str) -> bool {
        match serde_json::from_str::<Dataset>(blob) {
            Ok(data) => self.save(&data),
            Err(err) => {
                tracing::warn!("import rejected, not a valid snapshot: {err}");
                false
            }
        }
    }

    /// Shallow merge: top-level collections present in the imported blob
    /// replace the current ones, everything else is kept.
    pub fn import_merge(&self, blob: &str) -> bool {
        let incoming: Value = match serde_json::from_str(blob) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("import rejected, not valid JSON: {err}");
                return false;
            }
        };
        let Value::Object(incoming) = incoming else {
            tracing::warn!("import rejected, snapshot must be a JSON object");
            return false;
        };

        let mut current = match serde_json::to_value(self.load()) {
            Ok(Value::Object(map)) => map,
            _ => return false,
        };
        for (key, value) in incoming {
            current.insert(key, value);
        }

        match serde_json::from_value::<Dataset>(Value::Object(current)) {
            Ok(merged) => self.save(&merged),
            Err(err) => {
                tracing::warn!("merge rejected, result is not a valid snapshot: {err}");
                false
            }
        }
    }

    /// Snapshot wrapped with a timestamp and format version, suitable for
    /// off-device safekeeping.
    pub fn create_backup(&self) -> Result<String> {
        let mut value = serde_json::to_value(self.load())?;
        let map = value
            .as_object_mut()
            .ok_or(anyhow!("snapshot did not serialize to an object"))?;
        map.insert("backupDate".to_string(), serde_json::to_value(ident::now())?);
        map.insert(
            "formatVersion".to_string(),
            Value::String(BACKUP_FORMAT_VERSION.to_string()),
        );
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Restore from a blob produced by `create_backup`. Blobs without the
    /// backup wrapper are rejected rather than guessed at.
    pub fn restore_backup(&self, blob: &str) -> bool {
        let mut value: Value = match serde_json::from_str(blob) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("restore rejected, not valid JSON: {err}");
                return false;
            }
        };
        let Some(map) = value.as_object_mut() else {
            return false;
        };
        if map.remove("backupDate").is_none() || map.remove("formatVersion").is_none() {
            tracing::warn!("restore rejected, blob is not a backup");
            return false;
        }
        match serde_json::from_value::<Dataset>(value) {
            Ok(data) => self.save(&data),
            Err(err) => {
                tracing::warn!("restore rejected, not a valid snapshot: {err}");
                false
            }
        }
    }
}
