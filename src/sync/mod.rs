//! Orchestration of the profile → CRM sync on a live page.

pub mod cycle;
pub mod session;
pub mod ui;

pub use cycle::{Cycle, CycleContext, CycleError, CycleOutcome, CycleSettings, CycleState};
pub use session::{CycleRecord, PageSession, SessionReport, RECENT_CYCLES};
pub use ui::Fragment;
