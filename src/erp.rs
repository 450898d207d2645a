use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use crate::autosave::AutoSave;
use crate::bulk::{self, BulkParse};
use crate::document::{Cage, Delivery, Invoice, InvoiceLine, InvoiceStatus};
use crate::ident;
use crate::ledger::{self, EntryDraft, EntryKind, LedgerEntry};
use crate::numbering::{self, CodeMap};
use crate::party::{Party, PartyKind};
use crate::store::{CashFlowEntry, Dataset, FlowKind, PayMode, Storage, Store};

/// The trading desk: one in-memory dataset, one storage backend, and the
/// operations the forms call. A document commit and its ledger entry are
/// two separate persistence steps; the ledger entry is only appended once
/// the document itself is safely stored.
pub struct Erp<S: Storage> {
    store: Store<S>,
    data: Dataset,
    codes: CodeMap,
    /// Staged in-memory edits not yet written to the snapshot.
    dirty: bool,
}

impl<S: Storage> Erp<S> {
    pub fn open(storage: S) -> Erp<S> {
        Self::open_with_codes(storage, CodeMap::with_known_vendors())
    }

    pub fn open_with_codes(storage: S, codes: CodeMap) -> Erp<S> {
        let store = Store::new(storage);
        let data = store.load();
        Erp {
            store,
            data,
            codes,
            dirty: false,
        }
    }

    pub fn data(&self) -> &Dataset {
        &self.data
    }

    pub fn codes_mut(&mut self) -> &mut CodeMap {
        &mut self.codes
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.data.settings.auto_save_interval_minutes * 60)
    }

    fn persist(&mut self) -> Result<()> {
        if self.store.save(&self.data) {
            self.dirty = false;
            Ok(())
        } else {
            Err(anyhow!("failed to persist snapshot"))
        }
    }

    /// Write staged edits to the snapshot. `Ok(false)` means there was
    /// nothing to flush.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    // ---- parties ----

    pub fn add_party(&mut self, name: &str, kind: PartyKind) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("party name must not be empty"));
        }
        let party = Party::new(name, kind);
        let id = party.id.clone();
        self.data.customers.push(party);
        if let Err(err) = self.persist() {
            self.data.customers.pop();
            return Err(err);
        }
        Ok(id)
    }

    /// Find a party by name, creating it when unknown.
    pub fn ensure_party(&mut self, name: &str, kind: PartyKind) -> Result<String> {
        if let Some(party) = self.data.party_by_name(name.trim()) {
            return Ok(party.id.clone());
        }
        self.add_party(name, kind)
    }

    pub fn party_balance(&self, party_id: &str) -> Option<f64> {
        self.data.party(party_id).map(|p| p.balance)
    }

    /// Edit a party's details in place. The running balance is owned by
    /// the ledger engine and survives whatever the closure does to it.
    pub fn update_party<F>(&mut self, id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Party),
    {
        let party = self
            .data
            .party_mut(id)
            .ok_or(anyhow!("unknown party `{}'", id))?;
        let balance = party.balance;
        apply(party);
        party.balance = balance;
        self.persist()
    }

    pub fn search_parties(&self, query: &str) -> Vec<&Party> {
        let query = query.trim();
        if query.is_empty() {
            return self.data.customers.iter().collect();
        }
        self.data
            .customers
            .iter()
            .filter(|p| p.matches_query(query))
            .collect()
    }

    // ---- deliveries ----

    pub fn create_delivery(
        &mut self,
        vendor_id: &str,
        date: NaiveDate,
        purchase_rate: f64,
        cages: Vec<Cage>,
    ) -> Result<String> {
        if !(purchase_rate > 0.0) {
            return Err(anyhow!("purchase rate must be positive"));
        }
        if cages.is_empty() {
            return Err(anyhow!("a delivery needs at least one cage"));
        }
        for cage in &cages {
            cage.validate()?;
        }
        let vendor = self
            .data
            .party(vendor_id)
            .ok_or(anyhow!("unknown vendor `{}'", vendor_id))?;
        let vendor_name = vendor.name.clone();

        let code = numbering::party_code(&vendor_name, &self.codes);
        let base = numbering::base_number(&code, date);
        let number = numbering::next_number(&base, self.data.delivery_numbers_on(vendor_id, date));

        let doc = Delivery::new(number, date, vendor_id, &vendor_name, purchase_rate, cages);
        let id = doc.id.clone();
        self.data.delivery_documents.push(doc);
        if let Err(err) = self.persist() {
            // roll the draft back; no ledger entry was written
            self.data.delivery_documents.pop();
            return Err(err);
        }
        Ok(id)
    }

    pub fn update_delivery<F>(&mut self, id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Delivery),
    {
        let doc = self
            .data
            .delivery_mut(id)
            .ok_or(anyhow!("unknown delivery `{}'", id))?;
        apply(doc);
        doc.recompute();
        doc.updated_at = crate::ident::now();
        self.persist()
    }

    /// Like `update_delivery`, but the change only lives in memory until
    /// `flush` or the autosave timer writes it.
    pub fn stage_delivery<F>(&mut self, id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Delivery),
    {
        let doc = self
            .data
            .delivery_mut(id)
            .ok_or(anyhow!("unknown delivery `{}'", id))?;
        apply(doc);
        doc.recompute();
        doc.updated_at = crate::ident::now();
        self.dirty = true;
        Ok(())
    }

    /// Flip the confirmed flag and append the purchase to the vendor's
    /// ledger. Confirming an already-confirmed delivery changes nothing.
    pub fn confirm_delivery(&mut self, id: &str, paid_now: f64) -> Result<()> {
        let doc = self
            .data
            .delivery(id)
            .ok_or(anyhow!("unknown delivery `{}'", id))?;
        if doc.confirmed {
            return Ok(());
        }
        let amount = doc.amount();
        if !(amount > 0.0) {
            return Err(anyhow!("delivery amount must be positive to confirm"));
        }
        if !paid_now.is_finite() || paid_now < 0.0 || paid_now > amount {
            return Err(anyhow!(
                "paid-now must be between 0 and the delivery amount"
            ));
        }
        let draft = EntryDraft {
            party_id: doc.vendor_id.clone(),
            kind: EntryKind::Purchase,
            amount,
            paid_now,
            reference_id: Some(doc.id.clone()),
            date: doc.date,
            description: format!(
                "DC {} - {} birds, {}kg",
                doc.number, doc.total_birds, doc.total_weight
            ),
        };

        if let Some(doc) = self.data.delivery_mut(id) {
            doc.confirm();
        }
        if let Err(err) = self.persist() {
            if let Some(doc) = self.data.delivery_mut(id) {
                doc.confirmed = false;
            }
            return Err(err);
        }

        if let Err(err) = self.record_and_persist(draft) {
            // the document went out confirmed but its entry did not; undo
            // the flag so a retry runs the whole commit again
            if let Some(doc) = self.data.delivery_mut(id) {
                doc.confirmed = false;
            }
            if !self.store.save(&self.data) {
                tracing::warn!(delivery = id, "could not persist confirmation rollback");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Removes the document without touching the ledger. Any purchase
    /// already recorded against it stays on the statement.
    pub fn delete_delivery(&mut self, id: &str) -> Result<bool> {
        let before = self.data.delivery_documents.len();
        self.data.delivery_documents.retain(|d| d.id != id);
        if self.data.delivery_documents.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    // ---- invoices ----

    pub fn create_invoice(
        &mut self,
        customer_id: &str,
        date: NaiveDate,
        dc_id: Option<String>,
        lines: Vec<InvoiceLine>,
        due_date: NaiveDate,
    ) -> Result<String> {
        if lines.is_empty() {
            return Err(anyhow!("an invoice needs at least one line"));
        }
        for line in &lines {
            if !(line.rate > 0.0) {
                return Err(anyhow!("cage {}: rate must be positive", line.cage_no));
            }
            if !line.weight.is_finite() || line.weight <= 0.0 {
                return Err(anyhow!("cage {}: weight must be positive", line.cage_no));
            }
        }
        let customer = self
            .data
            .party(customer_id)
            .ok_or(anyhow!("unknown customer `{}'", customer_id))?;
        let customer_name = customer.name.clone();

        let code = numbering::party_code(&customer_name, &self.codes);
        let base = numbering::base_number(&code, date);
        let number = numbering::next_number(&base, self.data.invoice_numbers_on(customer_id, date));

        let invoice = Invoice::new(
            number,
            date,
            customer_id,
            &customer_name,
            dc_id,
            lines,
            self.data.settings.default_tax_rate_percent,
            due_date,
        );
        let id = invoice.id.clone();
        self.data.invoices.push(invoice);
        if let Err(err) = self.persist() {
            self.data.invoices.pop();
            return Err(err);
        }
        Ok(id)
    }

    pub fn update_invoice<F>(&mut self, id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Invoice),
    {
        let tax_rate = self.data.settings.default_tax_rate_percent;
        let invoice = self
            .data
            .invoice_mut(id)
            .ok_or(anyhow!("unknown invoice `{}'", id))?;
        apply(invoice);
        invoice.recompute(tax_rate);
        invoice.refresh_status();
        invoice.revision += 1;
        invoice.updated_at = crate::ident::now();
        self.persist()
    }

    /// In-memory invoice edit; written out by `flush` or the autosave
    /// timer. Bumps the revision like `update_invoice` does.
    pub fn stage_invoice<F>(&mut self, id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Invoice),
    {
        let tax_rate = self.data.settings.default_tax_rate_percent;
        let invoice = self
            .data
            .invoice_mut(id)
            .ok_or(anyhow!("unknown invoice `{}'", id))?;
        apply(invoice);
        invoice.recompute(tax_rate);
        invoice.refresh_status();
        invoice.revision += 1;
        invoice.updated_at = crate::ident::now();
        self.dirty = true;
        Ok(())
    }

    /// Confirm a draft invoice and append the sale to the customer's
    /// ledger. Idempotent: a non-draft invoice is left untouched.
    pub fn confirm_invoice(&mut self, id: &str, paid_now: f64) -> Result<()> {
        let invoice = self
            .data
            .invoice(id)
            .ok_or(anyhow!("unknown invoice `{}'", id))?;
        if invoice.status != InvoiceStatus::Draft {
            return Ok(());
        }
        if !invoice.total.is_finite() || invoice.total <= 0.0 {
            return Err(anyhow!("invoice total must be positive to confirm"));
        }
        if paid_now < 0.0 || paid_now > invoice.total {
            return Err(anyhow!(
                "paid-now must be between 0 and the invoice total"
            ));
        }
        let draft = EntryDraft {
            party_id: invoice.customer_id.clone(),
            kind: EntryKind::Sale,
            amount: invoice.total,
            paid_now,
            reference_id: Some(invoice.id.clone()),
            date: invoice.date,
            description: format!("Invoice {}", invoice.number),
        };
        let tax_rate = self.data.settings.default_tax_rate_percent;

        if let Some(invoice) = self.data.invoice_mut(id) {
            invoice.status = InvoiceStatus::Confirmed;
            invoice.paid_amount = paid_now;
            invoice.recompute(tax_rate);
            invoice.refresh_status();
            invoice.updated_at = crate::ident::now();
        }
        if let Err(err) = self.persist() {
            if let Some(invoice) = self.data.invoice_mut(id) {
                invoice.status = InvoiceStatus::Draft;
                invoice.paid_amount = 0.0;
                invoice.recompute(tax_rate);
            }
            return Err(err);
        }

        if let Err(err) = self.record_and_persist(draft) {
            if let Some(invoice) = self.data.invoice_mut(id) {
                invoice.status = InvoiceStatus::Draft;
                invoice.paid_amount = 0.0;
                invoice.recompute(tax_rate);
            }
            if !self.store.save(&self.data) {
                tracing::warn!(invoice = id, "could not persist confirmation rollback");
            }
            return Err(err);
        }
        Ok(())
    }

    // ---- ledger ----

    pub fn record_payment(
        &mut self,
        party_id: &str,
        amount: f64,
        date: NaiveDate,
        description: &str,
    ) -> Result<String> {
        self.record_and_persist(EntryDraft {
            party_id: party_id.to_string(),
            kind: EntryKind::Payment,
            amount,
            paid_now: 0.0,
            reference_id: None,
            date,
            description: description.to_string(),
        })
    }

    pub fn amend_entry(&mut self, entry_id: &str, additional_payment: f64) -> Result<String> {
        let prev_balance = self
            .data
            .ledger_entries
            .iter()
            .find(|e| e.id == entry_id)
            .and_then(|e| self.data.party(&e.party_id))
            .map(|p| (p.id.clone(), p.balance));
        let id = ledger::amend(&mut self.data, entry_id, additional_payment)?;
        if let Err(err) = self.persist() {
            self.data.ledger_entries.pop();
            if let Some((party_id, balance)) = prev_balance {
                if let Some(party) = self.data.party_mut(&party_id) {
                    party.balance = balance;
                }
            }
            return Err(err);
        }
        Ok(id)
    }

    /// Removes an entry without re-projecting balances; a deliberate
    /// escape hatch that leaves the statement inconsistent.
    pub fn delete_ledger_entry(&mut self, id: &str) -> Result<bool> {
        let before = self.data.ledger_entries.len();
        self.data.ledger_entries.retain(|e| e.id != id);
        if self.data.ledger_entries.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn statement(&self, party_id: &str) -> Vec<&LedgerEntry> {
        ledger::statement(&self.data, party_id)
    }

    fn record_and_persist(&mut self, draft: EntryDraft) -> Result<String> {
        let prev_balance = self.data.party(&draft.party_id).map(|p| p.balance);
        let party_id = draft.party_id.clone();
        let id = ledger::record(&mut self.data, draft)?;
        if let Err(err) = self.persist() {
            self.data.ledger_entries.pop();
            if let (Some(balance), Some(party)) = (prev_balance, self.data.party_mut(&party_id)) {
                party.balance = balance;
            }
            return Err(err);
        }
        Ok(id)
    }

    // ---- cash flow ----

    pub fn add_cash_flow_entry(
        &mut self,
        date: NaiveDate,
        kind: FlowKind,
        category: &str,
        amount: f64,
        payment_method: PayMode,
        description: &str,
    ) -> Result<String> {
        if !(amount > 0.0) {
            return Err(anyhow!("cash flow amount must be positive"));
        }
        let entry = CashFlowEntry {
            id: ident::next_id(),
            date,
            kind,
            category: category.trim().to_string(),
            amount,
            payment_method,
            description: description.to_string(),
            created_at: ident::now(),
        };
        let id = entry.id.clone();
        self.data.cash_flow.push(entry);
        if let Err(err) = self.persist() {
            self.data.cash_flow.pop();
            return Err(err);
        }
        Ok(id)
    }

    // ---- bulk intake ----

    pub fn parse_bulk(&self, text: &str) -> Result<BulkParse> {
        bulk::parse(text)
    }

    /// Turn pasted text into one draft delivery per group. Returns the new
    /// document ids and the number of lines the parser had to skip.
    pub fn deliveries_from_bulk(
        &mut self,
        text: &str,
        date: NaiveDate,
        purchase_rate: f64,
    ) -> Result<(Vec<String>, usize)> {
        let parsed = bulk::parse(text)?;
        let mut ids = Vec::new();
        for group in &parsed.groups {
            if group.rows.is_empty() {
                continue;
            }
            let vendor_id = self.ensure_party(&group.party_name, PartyKind::Vendor)?;
            let cages = group
                .rows
                .iter()
                .map(|row| {
                    let mut cage = Cage::new(row.cage_no, row.bird_count, row.weight);
                    cage.selling_rate = row.rate.filter(|r| *r > 0.0);
                    cage
                })
                .collect();
            ids.push(self.create_delivery(&vendor_id, date, purchase_rate, cages)?);
        }
        Ok((ids, parsed.skipped))
    }

    // ---- snapshot exchange ----

    pub fn export_blob(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.data)?)
    }

    pub fn import_overwrite(&mut self, blob: &str) -> bool {
        if self.store.import_overwrite(blob) {
            self.data = self.store.load();
            return true;
        }
        false
    }

    pub fn import_merge(&mut self, blob: &str) -> bool {
        if self.store.save(&self.data) && self.store.import_merge(blob) {
            self.data = self.store.load();
            return true;
        }
        false
    }

    pub fn create_backup(&mut self) -> Result<String> {
        self.data.settings.last_backup_at = Some(crate::ident::now());
        self.persist()?;
        self.store.create_backup()
    }

    pub fn restore_backup(&mut self, blob: &str) -> bool {
        if self.store.restore_backup(blob) {
            self.data = self.store.load();
            return true;
        }
        false
    }
}

impl<S: Storage + Send + 'static> Erp<S> {
    /// Arm the autosave timer for a shared desk, using the interval from
    /// settings. Each tick flushes staged edits; ticks with nothing staged
    /// write nothing.
    pub fn start_autosave(erp: &Arc<Mutex<Erp<S>>>, scheduler: &mut AutoSave) -> Result<()> {
        let interval = erp
            .lock()
            .map_err(|_| anyhow!("desk lock poisoned"))?
            .autosave_interval();
        Self::start_autosave_every(erp, scheduler, interval);
        Ok(())
    }

    pub fn start_autosave_every(
        erp: &Arc<Mutex<Erp<S>>>,
        scheduler: &mut AutoSave,
        interval: Duration,
    ) {
        let erp = Arc::clone(erp);
        scheduler.start(interval, move || {
            let mut erp = erp.lock().map_err(|_| anyhow!("desk lock poisoned"))?;
            erp.flush()
        });
    }
}
