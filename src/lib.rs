//! Challan - the book-keeping core of a small poultry trading business
//! ---
//!
//! Incoming stock arrives as delivery challans, outgoing stock leaves as
//! invoices, and every confirmed document moves a party's running balance
//! on an append-only ledger. The whole dataset persists as one JSON
//! snapshot behind an injectable [`Storage`][store::Storage] backend, so
//! the core runs the same against a file or an in-memory buffer.
//!
//! Intended for a single local writer; there is no locking and no
//! transaction machinery, just one snapshot and one cooperative auto-save
//! timer.

extern crate pest;
#[macro_use]
extern crate pest_derive;

/// Periodic draft flushing. One repeating timer, restart replaces it.
pub mod autosave;

/// Pasted-text intake: turns loosely formatted cage rows into groups.
pub mod bulk;

/// Delivery challans, cages, and invoices.
pub mod document;

/// The orchestration facade the forms talk to.
pub mod erp;

/// Record ids and timestamps.
pub mod ident;

/// Append-only financial entries and the running-balance projection.
pub mod ledger;

/// Collision-resistant, human-decodable document numbers.
pub mod numbering;

/// Customers and vendors.
pub mod party;

/// The snapshot dataset and its storage backends.
pub mod store;

pub use autosave::AutoSave;
pub use bulk::parse as parse_bulk;
pub use erp::Erp;
pub use store::{Dataset, FileStorage, MemStorage, Storage};
