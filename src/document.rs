use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ident;

/// One weighed unit of a delivery, a "cage". Cages live and die with the
/// document that owns them; there is no separate cage store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cage {
    pub cage_no: u32,
    pub bird_count: u32,
    pub weight: f64,
    #[serde(default)]
    pub selling_rate: Option<f64>,
    #[serde(default)]
    pub billed: bool,
}

impl Cage {
    pub fn new(cage_no: u32, bird_count: u32, weight: f64) -> Cage {
        Cage {
            cage_no,
            bird_count,
            weight,
            selling_rate: None,
            billed: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bird_count == 0 {
            return Err(anyhow!("cage {}: bird count must be positive", self.cage_no));
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(anyhow!(
                "cage {}: weight must be positive, got {}",
                self.cage_no,
                self.weight
            ));
        }
        if let Some(rate) = self.selling_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(anyhow!(
                    "cage {}: selling rate must be positive, got {}",
                    self.cage_no,
                    rate
                ));
            }
        }
        Ok(())
    }
}

/// Incoming stock record, the delivery challan.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: String,
    pub number: String,
    pub date: NaiveDate,
    pub vendor_id: String,
    pub vendor_name: String,
    pub purchase_rate: f64,
    pub cages: Vec<Cage>,
    pub total_birds: u32,
    pub total_weight: f64,
    #[serde(default)]
    pub manual_weighing: bool,
    #[serde(default)]
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(
        number: String,
        date: NaiveDate,
        vendor_id: &str,
        vendor_name: &str,
        purchase_rate: f64,
        cages: Vec<Cage>,
    ) -> Delivery {
        let ts = ident::now();
        let mut doc = Delivery {
            id: ident::next_id(),
            number,
            date,
            vendor_id: vendor_id.to_string(),
            vendor_name: vendor_name.to_string(),
            purchase_rate,
            cages,
            total_birds: 0,
            total_weight: 0.0,
            manual_weighing: false,
            confirmed: false,
            created_at: ts,
            updated_at: ts,
        };
        doc.recompute();
        doc
    }

    /// Totals are always the pointwise sum over the current cages; this is
    /// the only place they change.
    pub fn recompute(&mut self) {
        self.total_birds = self.cages.iter().map(|c| c.bird_count).sum();
        self.total_weight = self.cages.iter().map(|c| c.weight).sum();
    }

    pub fn amount(&self) -> f64 {
        self.total_weight * self.purchase_rate
    }

    /// Idempotent false-to-true transition. Returns whether this call
    /// actually flipped the flag.
    pub fn confirm(&mut self) -> bool {
        if self.confirmed {
            return false;
        }
        self.confirmed = true;
        self.updated_at = ident::now();
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Confirmed,
    Paid,
    Partial,
    Overdue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub cage_no: u32,
    pub bird_count: u32,
    pub weight: f64,
    pub rate: f64,
    pub amount: f64,
}

impl InvoiceLine {
    pub fn new(cage_no: u32, bird_count: u32, weight: f64, rate: f64) -> InvoiceLine {
        InvoiceLine {
            cage_no,
            bird_count,
            weight,
            rate,
            amount: weight * rate,
        }
    }
}

/// Outgoing document. `revision` only ever increases; every update through
/// the facade bumps it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub number: String,
    pub date: NaiveDate,
    pub customer_id: String,
    pub customer_name: String,
    #[serde(default)]
    pub dc_id: Option<String>,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default)]
    pub due_amount: f64,
    pub status: InvoiceStatus,
    pub revision: u32,
    #[serde(default)]
    pub weight_loss: f64,
    #[serde(default)]
    pub additional_charges: f64,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        number: String,
        date: NaiveDate,
        customer_id: &str,
        customer_name: &str,
        dc_id: Option<String>,
        lines: Vec<InvoiceLine>,
        tax_rate_percent: f64,
        due_date: NaiveDate,
    ) -> Invoice {
        let ts = ident::now();
        let mut invoice = Invoice {
            id: ident::next_id(),
            number,
            date,
            customer_id: customer_id.to_string(),
            customer_name: customer_name.to_string(),
            dc_id,
            lines,
            subtotal: 0.0,
            tax: 0.0,
            total: 0.0,
            paid_amount: 0.0,
            due_amount: 0.0,
            status: InvoiceStatus::Draft,
            revision: 1,
            weight_loss: 0.0,
            additional_charges: 0.0,
            due_date,
            created_at: ts,
            updated_at: ts,
        };
        invoice.recompute(tax_rate_percent);
        invoice
    }

    pub fn recompute(&mut self, tax_rate_percent: f64) {
        for line in &mut self.lines {
            line.amount = line.weight * line.rate;
        }
        self.subtotal = self.lines.iter().map(|l| l.amount).sum();
        self.tax = self.subtotal * tax_rate_percent / 100.0;
        self.total = self.subtotal + self.tax + self.additional_charges;
        self.due_amount = self.total - self.paid_amount;
    }

    /// Derive status from what has been paid so far. Draft stays draft
    /// until confirmation.
    pub fn refresh_status(&mut self) {
        if self.status == InvoiceStatus::Draft {
            return;
        }
        self.status = if self.paid_amount >= self.total {
            InvoiceStatus::Paid
        } else if self.paid_amount > 0.0 {
            InvoiceStatus::Partial
        } else {
            InvoiceStatus::Confirmed
        };
    }
}
