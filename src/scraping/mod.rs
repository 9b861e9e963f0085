pub mod browser_manager;
pub mod cdp_page;
pub mod page;
pub mod poller;
pub mod snapshot_page;

pub use cdp_page::CdpPage;
pub use page::{attribute_selector, NavigationKind, PageError, PageEvent, PageResult, ProfilePage};
pub use poller::{wait_until, WaitBudget, WaitError, WaitOptions};
pub use snapshot_page::SnapshotPage;
