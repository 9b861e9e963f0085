//! Name extraction strategies.
//!
//! LinkedIn never renders first and last name separately, so both strategies
//! recover the split from UI copy that embeds the first name alone:
//!
//! * [`ContactInfoModal`] reads the contact-info overlay heading (full name)
//!   and its `"<first>’s Profile"` sub-heading.
//! * [`NotificationLabel`] (legacy) reads the `"Notify me about all of
//!   <first>’s posts"` aria-label and subtracts it from the page `<h1>`.

use scraper::Html;

use super::{element_text, first, first_in};
use crate::types::PersonName;

pub trait NameStrategy: Send + Sync {
    fn id(&self) -> &'static str;

    /// Whether the document has the layout this strategy reads.
    fn applies_to(&self, doc: &Html) -> bool;

    fn extract(&self, doc: &Html) -> Option<PersonName>;
}

/// `full.replacen(first, "", 1)`, trimmed.
fn subtract_first_names(full: &str, first_names: &str) -> String {
    full.replacen(first_names, "", 1).trim().to_string()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContactInfoModal;

impl ContactInfoModal {
    const HEADING: &'static str = "h1#pv-contact-info";
    const LABEL: &'static str = "h3.pv-contact-info__header";
    const OVERLAY_LINK: &'static str = r#"a[href*="/overlay/contact-info"]"#;
}

impl NameStrategy for ContactInfoModal {
    fn id(&self) -> &'static str {
        "contact-info"
    }

    fn applies_to(&self, doc: &Html) -> bool {
        first(doc, Self::HEADING).is_some() || first(doc, Self::OVERLAY_LINK).is_some()
    }

    fn extract(&self, doc: &Html) -> Option<PersonName> {
        let full = first(doc, Self::HEADING).map(element_text)?;
        if full.is_empty() {
            return None;
        }

        let first_name = first(doc, Self::LABEL)
            .map(element_text)
            .map(|label| {
                label
                    .replace("’s Profile", "")
                    .replace("'s Profile", "")
                    .trim()
                    .to_string()
            })
            .unwrap_or_default();

        Some(PersonName {
            last: subtract_first_names(&full, &first_name),
            first: first_name,
        })
    }
}

/// Legacy strategy; kept as a fallback for layouts without the overlay.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationLabel;

impl NotificationLabel {
    const BOILERPLATE: [&'static str; 4] = [
        "Notify me about all of ",
        "’s posts",
        "'s posts",
        "Message ",
    ];

    fn label(doc: &Html) -> Option<String> {
        let main = first(doc, "main")?;
        first_in(main, ".artdeco-button")
            .and_then(|b| b.value().attr("aria-label"))
            .map(str::to_string)
            .filter(|l| !l.trim().is_empty())
    }

    fn heading(doc: &Html) -> String {
        first(doc, "main")
            .and_then(|main| first_in(main, "a"))
            .and_then(|a| first_in(a, "h1"))
            .map(element_text)
            .unwrap_or_default()
    }
}

impl NameStrategy for NotificationLabel {
    fn id(&self) -> &'static str {
        "notification-label"
    }

    fn applies_to(&self, doc: &Html) -> bool {
        Self::label(doc).is_some()
    }

    fn extract(&self, doc: &Html) -> Option<PersonName> {
        let full = Self::heading(doc);

        let name = match Self::label(doc) {
            Some(label) => {
                let first_names = Self::BOILERPLATE
                    .iter()
                    .fold(label, |acc, phrase| acc.replace(phrase, ""))
                    .trim()
                    .to_string();
                PersonName {
                    last: subtract_first_names(&full, &first_names),
                    first: first_names,
                }
            }
            None => PersonName {
                first: full,
                last: String::new(),
            },
        };

        if name.first.is_empty() && name.last.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// Which strategy a cycle uses. `Auto` picks by layout detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NameStrategySelection {
    #[default]
    Auto,
    ContactInfoModal,
    NotificationLabel,
}

static CONTACT_INFO_MODAL: ContactInfoModal = ContactInfoModal;
static NOTIFICATION_LABEL: NotificationLabel = NotificationLabel;

impl NameStrategySelection {
    pub fn parse_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "contact-info" | "contact_info" | "modal" => Some(Self::ContactInfoModal),
            "notification-label" | "notification_label" | "legacy" => Some(Self::NotificationLabel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::ContactInfoModal => CONTACT_INFO_MODAL.id(),
            Self::NotificationLabel => NOTIFICATION_LABEL.id(),
        }
    }

    /// The strategy to read `doc` with. `Auto` prefers the overlay layout and
    /// falls back to the legacy label; with neither present it keeps the
    /// overlay strategy so a wait keeps polling for the overlay.
    pub fn resolve(&self, doc: &Html) -> &'static dyn NameStrategy {
        match self {
            Self::ContactInfoModal => &CONTACT_INFO_MODAL,
            Self::NotificationLabel => &NOTIFICATION_LABEL,
            Self::Auto => {
                if CONTACT_INFO_MODAL.applies_to(doc) {
                    &CONTACT_INFO_MODAL
                } else if NOTIFICATION_LABEL.applies_to(doc) {
                    &NOTIFICATION_LABEL
                } else {
                    &CONTACT_INFO_MODAL
                }
            }
        }
    }

    pub fn extract(&self, doc: &Html) -> Option<PersonName> {
        self.resolve(doc).extract(doc)
    }
}
