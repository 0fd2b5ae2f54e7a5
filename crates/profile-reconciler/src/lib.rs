//! # Profile Reconciler
//!
//! Derives the `profiles` row and its tag tables from auth user metadata.
//!
//! ```text
//! AuthGateway (user + metadata) → ProfileReconciler → ProfileStore (PostgREST)
//! ```
//!
//! - **Idempotent**: `ensure_profile` never creates a second row
//! - **Verification-gated**: nothing is written for unconfirmed emails unless
//!   the local-development override is on
//! - **Best-effort tags**: tag writes are logged on failure and never fail the
//!   profile itself

mod error;
mod memory_store;
mod metadata;
mod models;
mod reconciler;
mod store;
mod supabase_store;
mod sweep;

pub use error::{ReconcileError, ReconcileResult, StoreError, StoreResult};
pub use memory_store::{MemoryProfileStore, StoreOp};
pub use metadata::{MetadataView, GOAL_KEYS, RESTRICTION_KEYS};
pub use models::{
    EnsureOutcome, Profile, ProfileCompletion, ProfilePatch, ProfileView, RecoveryReport, TagKind,
};
pub use reconciler::ProfileReconciler;
pub use store::ProfileStore;
pub use supabase_store::SupabaseProfileStore;
pub use sweep::{ReconciliationSweep, SweepHandle};
