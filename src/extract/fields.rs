use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;
use url::Url;

use super::{element_text, first, first_in};
use crate::types::{ProfileWebsite, Region};

static PROFILE_PATH: OnceLock<Regex> = OnceLock::new();
static PROFILE_ID: OnceLock<Regex> = OnceLock::new();

fn profile_path() -> &'static Regex {
    PROFILE_PATH.get_or_init(|| Regex::new(r"/in/.+/?$").expect("valid profile path pattern"))
}

fn profile_id() -> &'static Regex {
    PROFILE_ID.get_or_init(|| Regex::new(r"in/([^/?#]+)/?").expect("valid profile id pattern"))
}

/// Address from the first `mailto:` anchor, with all whitespace and control
/// characters removed.
pub fn extract_email(doc: &Html) -> Option<String> {
    let anchor = first(doc, r#"a[href*="mailto:"]"#)?;
    let email: String = element_text(anchor)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    (!email.is_empty()).then_some(email)
}

/// Split a locality line: `"Berlin, Germany"` → Berlin / Germany; a line
/// without a comma is all city.
pub fn parse_region(raw: &str) -> Region {
    let raw = raw.trim();
    if raw.contains(',') {
        let mut parts = raw.split(',');
        let city = parts.next().unwrap_or_default().trim().to_string();
        let country = raw.rsplit(',').next().unwrap_or_default().trim().to_string();
        Region { city, country }
    } else {
        Region {
            city: raw.to_string(),
            country: String::new(),
        }
    }
}

/// Locality line under the profile headline (`main` → first `section` →
/// `span.text-body-small.inline`).
pub fn extract_region(doc: &Html) -> Option<Region> {
    let main = first(doc, "main")?;
    let section = first_in(main, "section")?;
    let span = first_in(section, "span.text-body-small.inline")?;
    let raw = element_text(span);
    (!raw.is_empty()).then(|| parse_region(&raw))
}

/// Profile URL and its `/in/<id>` slug (empty when the URL has none).
pub fn extract_website(page_url: &str) -> Option<ProfileWebsite> {
    let url = page_url.trim();
    if url.is_empty() {
        return None;
    }
    let id = profile_id()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    Some(ProfileWebsite {
        url: url.to_string(),
        id,
    })
}

/// Whether `page_url` is a member profile (`/in/<id>`), as opposed to the
/// feed, search results, or a company page.
pub fn is_profile_dashboard(page_url: &str) -> bool {
    let path = Url::parse(page_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| page_url.to_string());
    profile_path().is_match(&path)
}
