use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ident;
use crate::store::Dataset;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Purchase,
    Sale,
    Payment,
    Advance,
    Adjustment,
}

impl EntryKind {
    /// Sign convention of the running balance: purchases and sales grow
    /// what is owed, payments and advances shrink it, adjustments carry
    /// their own sign.
    pub fn signed(&self, amount: f64) -> f64 {
        match self {
            EntryKind::Purchase | EntryKind::Sale => amount,
            EntryKind::Payment | EntryKind::Advance => -amount,
            EntryKind::Adjustment => amount,
        }
    }
}

/// Append-only record of a financial event. `balance` is the party's
/// outstanding amount after this entry; history amounts are never edited
/// in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub party_id: String,
    pub party_name: String,
    pub kind: EntryKind,
    pub amount: f64,
    #[serde(default)]
    pub paid_now: f64,
    pub balance: f64,
    pub description: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Everything `record` needs to append one entry.
#[derive(Clone, Debug)]
pub struct EntryDraft {
    pub party_id: String,
    pub kind: EntryKind,
    pub amount: f64,
    pub paid_now: f64,
    pub reference_id: Option<String>,
    pub date: NaiveDate,
    pub description: String,
}

/// Append one entry and move the party's running balance. The balance is
/// cumulative across all of the party's entries, not a per-transaction
/// remainder: `new = previous + signed(kind, amount) - paid_now`.
pub fn record(data: &mut Dataset, draft: EntryDraft) -> Result<String> {
    validate(&draft)?;

    let party = data
        .party_mut(&draft.party_id)
        .ok_or(anyhow!("unknown party `{}'", draft.party_id))?;

    let balance = party.balance + draft.kind.signed(draft.amount) - draft.paid_now;
    party.balance = balance;
    let party_name = party.name.clone();

    let entry = LedgerEntry {
        id: ident::next_id(),
        party_id: draft.party_id,
        party_name,
        kind: draft.kind,
        amount: draft.amount,
        paid_now: draft.paid_now,
        balance,
        description: draft.description,
        reference_id: draft.reference_id,
        date: draft.date,
        created_at: ident::now(),
    };
    let id = entry.id.clone();
    tracing::debug!(entry = %id, kind = ?entry.kind, balance, "ledger entry appended");
    data.ledger_entries.push(entry);
    Ok(id)
}

/// Correct an earlier entry without rewriting it: appends a payment entry
/// against the same party, referencing the original, and moves the running
/// balance down by `additional_payment`.
pub fn amend(data: &mut Dataset, entry_id: &str, additional_payment: f64) -> Result<String> {
    if !(additional_payment > 0.0) {
        return Err(anyhow!("additional payment must be positive"));
    }

    let original = data
        .ledger_entries
        .iter()
        .find(|e| e.id == entry_id)
        .ok_or(anyhow!("unknown ledger entry `{}'", entry_id))?;

    let draft = EntryDraft {
        party_id: original.party_id.clone(),
        kind: EntryKind::Payment,
        amount: additional_payment,
        paid_now: 0.0,
        reference_id: Some(original.id.clone()),
        date: original.date,
        description: format!("payment against {}", original.description),
    };
    record(data, draft)
}

/// The party's entries in creation order; the account statement.
pub fn statement<'a>(data: &'a Dataset, party_id: &str) -> Vec<&'a LedgerEntry> {
    let mut entries: Vec<&LedgerEntry> = data
        .ledger_entries
        .iter()
        .filter(|e| e.party_id == party_id)
        .collect();
    entries.sort_by_key(|e| e.created_at);
    entries
}

fn validate(draft: &EntryDraft) -> Result<()> {
    let amount_ok = match draft.kind {
        // adjustments may be signed either way, but zero is meaningless
        EntryKind::Adjustment => draft.amount != 0.0,
        _ => draft.amount > 0.0,
    };
    if !amount_ok || !draft.amount.is_finite() {
        return Err(anyhow!(
            "invalid {:?} amount: {}",
            draft.kind,
            draft.amount
        ));
    }
    if !draft.paid_now.is_finite() || draft.paid_now < 0.0 {
        return Err(anyhow!("paid-now must be non-negative: {}", draft.paid_now));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{amend, record, statement, EntryDraft, EntryKind};
    use crate::party::{Party, PartyKind};
    use crate::store::Dataset;
    use anyhow::{anyhow, Result};
    use chrono::NaiveDate;

    fn dataset_with_party(name: &str) -> (Dataset, String) {
        let mut data = Dataset::default();
        let party = Party::new(name, PartyKind::Vendor);
        let id = party.id.clone();
        data.customers.push(party);
        (data, id)
    }

    fn day() -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 5, 3).ok_or(anyhow!("invalid date"))
    }

    fn draft(party_id: &str, kind: EntryKind, amount: f64, paid_now: f64) -> Result<EntryDraft> {
        Ok(EntryDraft {
            party_id: party_id.to_string(),
            kind,
            amount,
            paid_now,
            reference_id: None,
            date: day()?,
            description: "test".to_string(),
        })
    }

    #[test]
    fn balance_is_cumulative() -> Result<()> {
        let (mut data, vendor) = dataset_with_party("Suguna");

        record(&mut data, draft(&vendor, EntryKind::Purchase, 1000.0, 400.0)?)?;
        record(&mut data, draft(&vendor, EntryKind::Purchase, 500.0, 0.0)?)?;
        record(&mut data, draft(&vendor, EntryKind::Payment, 300.0, 0.0)?)?;

        let entries = statement(&data, &vendor);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].balance, 600.0);
        assert_eq!(entries[1].balance, 1100.0);
        assert_eq!(entries[2].balance, 800.0);

        // each balance is the prefix sum of signed amounts minus paid-now
        let mut running = 0.0;
        for entry in &entries {
            running += entry.kind.signed(entry.amount) - entry.paid_now;
            assert_eq!(entry.balance, running);
        }

        assert_eq!(data.party(&vendor).map(|p| p.balance), Some(800.0));
        Ok(())
    }

    #[test]
    fn amend_appends_instead_of_rewriting() -> Result<()> {
        let (mut data, vendor) = dataset_with_party("Suguna");
        let first = record(&mut data, draft(&vendor, EntryKind::Purchase, 1000.0, 0.0)?)?;

        let correction = amend(&mut data, &first, 250.0)?;

        assert_eq!(data.ledger_entries.len(), 2);
        let original = &data.ledger_entries[0];
        assert_eq!(original.amount, 1000.0);
        assert_eq!(original.balance, 1000.0);

        let payment = &data.ledger_entries[1];
        assert_eq!(payment.id, correction);
        assert_eq!(payment.kind, EntryKind::Payment);
        assert_eq!(payment.reference_id.as_deref(), Some(first.as_str()));
        assert_eq!(payment.balance, 750.0);
        Ok(())
    }

    #[test]
    fn rejects_bad_amounts_and_unknown_parties() -> Result<()> {
        let (mut data, vendor) = dataset_with_party("Suguna");

        assert!(record(&mut data, draft(&vendor, EntryKind::Sale, 0.0, 0.0)?).is_err());
        assert!(record(&mut data, draft(&vendor, EntryKind::Sale, -5.0, 0.0)?).is_err());
        assert!(record(&mut data, draft(&vendor, EntryKind::Sale, 10.0, -1.0)?).is_err());
        assert!(record(&mut data, draft("nobody", EntryKind::Sale, 10.0, 0.0)?).is_err());
        assert!(amend(&mut data, "nobody", 10.0).is_err());

        // failed recordings leave no trace
        assert!(data.ledger_entries.is_empty());
        assert_eq!(data.party(&vendor).map(|p| p.balance), Some(0.0));
        Ok(())
    }

    #[test]
    fn adjustment_may_be_negative() -> Result<()> {
        let (mut data, vendor) = dataset_with_party("Suguna");
        record(&mut data, draft(&vendor, EntryKind::Purchase, 100.0, 0.0)?)?;
        record(&mut data, draft(&vendor, EntryKind::Adjustment, -30.0, 0.0)?)?;
        assert_eq!(data.party(&vendor).map(|p| p.balance), Some(70.0));
        Ok(())
    }
}
