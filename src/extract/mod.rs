//! Profile field extraction.
//!
//! Pure functions over a parsed [`Html`] document. Each one reads one brittle
//! DOM path and fails soft: a missing element yields `None`, never an error.

pub mod employment;
pub mod fields;
pub mod name;

use scraper::{ElementRef, Html, Selector};

use crate::types::{PersonName, ProfileSnapshot};

pub use employment::{extract_company_url, extract_employment};
pub use fields::{extract_email, extract_region, extract_website, is_profile_dashboard, parse_region};
pub use name::{ContactInfoModal, NameStrategy, NameStrategySelection, NotificationLabel};

/// Empty comment nodes the host framework leaves around bound text.
pub(crate) const PLACEHOLDER: &str = "<!---->";

pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// First match of `css` in the whole document.
pub(crate) fn first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    doc.select(&sel).next()
}

/// First match of `css` among the descendants of `scope`.
pub(crate) fn first_in<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    scope.select(&sel).next()
}

/// Rendered text of an element with placeholder markup removed, trimmed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .replace(PLACEHOLDER, "")
        .trim()
        .to_string()
}

/// Builds a [`ProfileSnapshot`] from one document.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileExtractor {
    name_strategy: NameStrategySelection,
}

impl ProfileExtractor {
    pub fn new(name_strategy: NameStrategySelection) -> Self {
        Self { name_strategy }
    }

    pub fn name_strategy(&self) -> NameStrategySelection {
        self.name_strategy
    }

    pub fn name(&self, doc: &Html) -> Option<PersonName> {
        self.name_strategy.extract(doc)
    }

    /// Everything extractable from `doc`, which was rendered at `page_url`.
    pub fn snapshot(&self, doc: &Html, page_url: &str) -> ProfileSnapshot {
        ProfileSnapshot {
            name: self.name(doc),
            email: extract_email(doc),
            company_url: extract_company_url(doc, page_url),
            region: extract_region(doc),
            employment: extract_employment(doc),
            website: extract_website(page_url),
        }
    }
}
