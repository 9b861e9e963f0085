//! Current employment from the first entry of the Experience section.
//!
//! The section has no stable ids below `#experience`, so the entry is found by
//! position: the seventh `div` under the anchor's parent, then its first
//! `div.display-flex`. That container comes in two layouts:
//!
//! * one child: a single position: `title` then `company · <type>` spans.
//! * several children: a company group: the company line, then the title of
//!   the latest position.

use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;
use url::Url;

use super::{element_text, first, first_in, selector, PLACEHOLDER};
use crate::types::Employment;

const ENTRY_DIV_INDEX: usize = 6;
const VISIBLE_SPAN: &str = r#"span[aria-hidden="true"]"#;
const NESTED_VISIBLE_SPAN: &str = r#"div.display-flex span[aria-hidden="true"]"#;

static META_SUFFIX: OnceLock<Regex> = OnceLock::new();

/// `· 2 yrs 3 mos`, `· Full-time` and whatever follows on the line.
fn meta_suffix() -> &'static Regex {
    META_SUFFIX.get_or_init(|| Regex::new(r"·.+").expect("valid suffix pattern"))
}

fn current_entry(doc: &Html) -> Option<ElementRef<'_>> {
    let anchor = first(doc, "#experience")?;
    let section = anchor.parent().and_then(ElementRef::wrap)?;
    let divs = selector("div")?;
    section.select(&divs).nth(ENTRY_DIV_INDEX)
}

fn current_employer(doc: &Html) -> Option<ElementRef<'_>> {
    first_in(current_entry(doc)?, "div.display-flex")
}

fn clean_company(raw: &str) -> String {
    meta_suffix()
        .replace(&raw.replace(PLACEHOLDER, ""), "")
        .trim()
        .to_string()
}

fn clean_title(raw: &str) -> String {
    raw.replace(PLACEHOLDER, "").trim().to_string()
}

pub fn extract_employment(doc: &Html) -> Option<Employment> {
    let employer = current_employer(doc)?;
    let children: Vec<ElementRef<'_>> = employer.children().filter_map(ElementRef::wrap).collect();

    let (company, title) = if children.len() == 1 {
        let spans = selector(VISIBLE_SPAN)?;
        let mut texts = employer.select(&spans).map(element_text);
        let title = texts.next().unwrap_or_default();
        let company = texts.next().unwrap_or_default();
        (company, title)
    } else {
        let line = |idx: usize| {
            children
                .get(idx)
                .and_then(|child| first_in(*child, NESTED_VISIBLE_SPAN))
                .map(element_text)
                .unwrap_or_default()
        };
        (line(0), line(1))
    };

    Some(Employment {
        company: clean_company(&company),
        title: clean_title(&title),
    })
}

/// Absolute link to the current employer's company page, if the entry has one.
pub fn extract_company_url(doc: &Html, page_url: &str) -> Option<String> {
    let entry = current_entry(doc)?;
    let href = first_in(entry, r#"a[href*="/company/"]"#)?
        .value()
        .attr("href")?
        .trim()
        .to_string();
    match Url::parse(page_url).and_then(|base| base.join(&href)) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Some(href),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `#experience` is div 0 under the section; five wrappers make the entry div 6.
    fn experience(entry_body: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><body><main><section>
                <div id="experience" class="pv-profile-card__anchor"></div>
                <div class="header"><h2>Experience</h2></div>
                <div><div><div><div>
                    <div class="entry">{entry_body}</div>
                </div></div></div></div>
            </section></main></body></html>"#
        ))
    }

    #[test]
    fn single_position_layout() {
        let doc = experience(
            r#"<a href="/company/acme/"><img alt="Acme"></a>
            <div class="display-flex">
                <div class="wrapper">
                    <span aria-hidden="true"><!---->Staff Engineer<!----></span>
                    <span class="t-14"><span aria-hidden="true"><!---->Acme Corp · Full-time<!----></span></span>
                </div>
            </div>"#,
        );
        let job = extract_employment(&doc).unwrap();
        assert_eq!(job.title, "Staff Engineer");
        assert_eq!(job.company, "Acme Corp");
        assert_eq!(
            extract_company_url(&doc, "https://www.linkedin.com/in/jane/").as_deref(),
            Some("https://www.linkedin.com/company/acme/")
        );
    }

    #[test]
    fn grouped_layout_strips_placeholders_and_duration() {
        let doc = experience(
            r#"<div class="display-flex">
                <div><div class="display-flex"><span aria-hidden="true"><!---->Acme Corp<!----> · 2 yrs 3 mos</span></div></div>
                <div><div class="display-flex"><span aria-hidden="true"><!---->Head of Sales<!----></span></div></div>
            </div>"#,
        );
        let job = extract_employment(&doc).unwrap();
        assert_eq!(job.company, "Acme Corp");
        assert_eq!(job.title, "Head of Sales");
    }

    #[test]
    fn grouped_layout_ignores_markup_noise_order() {
        let doc = experience(
            r#"<div class="display-flex">
                <div><div class="display-flex"><!----><span aria-hidden="true">Acme Corp · 2 yrs 3 mos<!----></span><span class="visually-hidden">Acme Corp</span></div></div>
                <div><div class="display-flex"><span aria-hidden="true">Head of Sales</span><!----></div></div>
            </div>"#,
        );
        let job = extract_employment(&doc).unwrap();
        assert_eq!(job.company, "Acme Corp");
        assert_eq!(job.title, "Head of Sales");
    }

    #[test]
    fn missing_section_is_none() {
        assert!(extract_employment(&Html::parse_document("<main></main>")).is_none());
        let shallow = Html::parse_document(r#"<section><div id="experience"></div><div></div></section>"#);
        assert!(extract_employment(&shallow).is_none());
        assert!(extract_company_url(&shallow, "https://www.linkedin.com/").is_none());
    }

    #[test]
    fn single_position_without_company_line_fails_soft() {
        let doc = experience(
            r#"<div class="display-flex"><div><span aria-hidden="true">Founder</span></div></div>"#,
        );
        let job = extract_employment(&doc).unwrap();
        assert_eq!(job.title, "Founder");
        assert_eq!(job.company, "");
    }
}
