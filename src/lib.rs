//! CareLink — beneficiary identity crosswalk subsystem
//!
//! Links an identity provider's pseudonymous subject identifier for a
//! healthcare-plan beneficiary to a record in a downstream clinical-data
//! directory and to a local account, then keeps that linkage consistent as
//! identifiers evolve.
//!
//! Flow: provider subject + two candidate raw identifiers are digested by
//! [`hash`], resolved against the remote directory by [`identity`] (via the
//! [`directory`] client), and reconciled into a local account and crosswalk
//! by [`crosswalk`]. Every branch of a resolution or reconciliation emits a
//! structured event through [`audit`].

pub mod audit;
pub mod config;
pub mod crosswalk;
pub mod db;
pub mod directory;
pub mod error;
pub mod hash;
pub mod identity;

pub use error::{DuplicateField, LinkError, LinkResult};
