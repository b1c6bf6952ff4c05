//! Versioned JSON state documents for Vigil.
//!
//! Every piece of durable Vigil state (quota ledgers, backoff state, the
//! request cache, the processed-content set) lives in its own JSON document
//! under a data directory and is rewritten whole on each mutation.
//!
//! # Features
//!
//! - **Versioned envelope**: documents are stored as `{"version": N, "data": ...}`
//! - **Legacy tolerance**: bare documents without an envelope load as version 0
//! - **Atomic writes**: temp file + rename, so a crash never leaves half a document
//!
//! # Example
//!
//! ```rust
//! use vigil_storage::JsonStore;
//! use std::collections::BTreeSet;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let store: JsonStore<BTreeSet<String>> = JsonStore::new(dir.path().join("seen.json"), 1);
//!
//! let mut seen = BTreeSet::new();
//! seen.insert("1790000000000000001".to_string());
//! store.save(&seen)?;
//!
//! assert_eq!(store.load()?, Some(seen));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod layout;
mod store;

pub use layout::DataLayout;
pub use store::JsonStore;
