pub mod core;
pub mod crm;
pub mod extract;
pub mod features;
pub mod scraping;
pub mod sync;

// --- Primary core exports ---
pub use core::types;
pub use core::types::*;
pub use core::{load_scout_config, ScoutConfig};

pub use crm::{ApiEnvelope, ApiFailure, CrmClient};
pub use features::credential_store;
pub use sync::{Cycle, CycleOutcome, PageSession};
