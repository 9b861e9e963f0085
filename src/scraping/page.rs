//! Page capability: the narrow set of DOM queries and mutations a sync cycle
//! performs on the host profile page.
//!
//! Reads go through [`ProfilePage::content`] (a full HTML snapshot parsed by
//! the extractors); writes are limited to clicking, tagging one container,
//! styling it, and inserting/removing the injected fragments.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    /// The browser/driver rejected the command or went away.
    #[error("page driver error: {0}")]
    Driver(String),
    /// An injected script ran but returned something unexpected.
    #[error("page script error: {0}")]
    Script(String),
}

pub type PageResult<T> = Result<T, PageError>;

/// `[attr="value"]`, the form [`ProfilePage::tag_parent`] tags are addressed by.
pub fn attribute_selector(attribute: &str, value: &str) -> String {
    format!("[{attribute}=\"{value}\"]")
}

/// Lifecycle events the session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// Document finished loading (first visit or full reload).
    Load,
    /// Single-page-app navigation reported by the Navigation API.
    Navigate(NavigationKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    Push,
    Replace,
    Reload,
    Traverse,
}

impl NavigationKind {
    /// Maps `NavigateEvent.navigationType`.
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim() {
            "push" => Some(Self::Push),
            "replace" => Some(Self::Replace),
            "reload" => Some(Self::Reload),
            "traverse" => Some(Self::Traverse),
            _ => None,
        }
    }
}

/// DOM access for one profile tab.
///
/// Selectors are CSS selectors; every mutating method reports whether a
/// matching element was found instead of failing on a miss.
#[async_trait]
pub trait ProfilePage: Send + Sync {
    /// Current `location.href`.
    async fn url(&self) -> PageResult<String>;

    /// Serialized HTML of the current document.
    async fn content(&self) -> PageResult<String>;

    /// Whether any element matches `selector`.
    async fn exists(&self, selector: &str) -> PageResult<bool>;

    /// Click (then blur) the first match.
    async fn click(&self, selector: &str) -> PageResult<bool>;

    /// Set `attribute="value"` on the parent of the element reached by taking
    /// the first match of each selector in `path`, each searched inside the
    /// previous one.
    async fn tag_parent(&self, path: &[&str], attribute: &str, value: &str) -> PageResult<bool>;

    /// Set an inline style property on the first match.
    async fn set_style(&self, selector: &str, property: &str, value: &str) -> PageResult<bool>;

    /// Append `html` as the last child of the first match of `parent`.
    async fn append_html(&self, parent: &str, html: &str) -> PageResult<bool>;

    /// Remove every match.
    async fn remove(&self, selector: &str) -> PageResult<bool>;

    /// Returns `true` once per user click on the first match since the last
    /// call; clicks are recorded by the element the cycle injected.
    async fn take_click(&self, selector: &str) -> PageResult<bool>;

    /// Show a blocking notice to the user.
    async fn alert(&self, message: &str) -> PageResult<()>;
}
