//! In-memory [`ProfilePage`] over saved HTML.
//!
//! The document is a list of frames: each `content()` call returns the
//! current frame and then advances (the last frame repeats), which lets a
//! caller replay an asynchronously rendering page. Clicking a selector
//! registered with [`SnapshotPage::on_click`] swaps in a new frame list.
//!
//! Mutations are not applied to the HTML. Injected fragments, container tags,
//! styles, clicks and alerts are kept in an overlay that the accessor methods
//! expose, and `exists`/`remove`/`take_click` consult that overlay for `#id`
//! and `[attr="value"]` selectors.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::page::{attribute_selector, PageError, PageResult, ProfilePage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedFragment {
    pub parent: String,
    pub id: Option<String>,
    pub html: String,
}

#[derive(Debug, Default)]
struct SnapshotState {
    url: String,
    frames: Vec<String>,
    cursor: usize,
    on_click: HashMap<String, Vec<String>>,
    clicks: Vec<String>,
    tags: Vec<(String, String)>,
    styles: Vec<(String, String, String)>,
    injected: Vec<InjectedFragment>,
    pending_clicks: HashSet<String>,
    alerts: Vec<String>,
}

impl SnapshotState {
    fn current(&self) -> &str {
        self.frames
            .get(self.cursor.min(self.frames.len().saturating_sub(1)))
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn matches_document(&self, selector: &str) -> PageResult<bool> {
        let sel = parse_selector(selector)?;
        let doc = Html::parse_document(self.current());
        let found = doc.select(&sel).next().is_some();
        Ok(found)
    }

    fn matches_tag(&self, selector: &str) -> bool {
        self.tags
            .iter()
            .any(|(attr, value)| selector == attribute_selector(attr, value))
    }

    fn injected_index(&self, selector: &str) -> Option<usize> {
        let id = selector.strip_prefix('#')?;
        self.injected
            .iter()
            .position(|f| f.id.as_deref() == Some(id))
    }
}

pub struct SnapshotPage {
    state: Mutex<SnapshotState>,
}

impl SnapshotPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self::with_frames(url, vec![html.into()])
    }

    pub fn with_frames(url: impl Into<String>, frames: Vec<String>) -> Self {
        Self {
            state: Mutex::new(SnapshotState {
                url: url.into(),
                frames,
                ..Default::default()
            }),
        }
    }

    /// Replace the frame list when `selector` is clicked.
    pub fn on_click(self, selector: impl Into<String>, frames: Vec<String>) -> Self {
        self.lock().on_click.insert(selector.into(), frames);
        self
    }

    /// Navigate in place: new URL, new frames, injected overlay kept (the
    /// SPA keeps foreign nodes until someone removes them).
    pub fn navigate(&self, url: impl Into<String>, frames: Vec<String>) {
        let mut state = self.lock();
        state.url = url.into();
        state.frames = frames;
        state.cursor = 0;
        state.tags.clear();
    }

    /// Simulate the user clicking an injected element.
    pub fn user_click(&self, selector: &str) -> bool {
        let mut state = self.lock();
        if state.injected_index(selector).is_some() {
            state.pending_clicks.insert(selector.to_string());
            true
        } else {
            false
        }
    }

    pub fn alerts(&self) -> Vec<String> {
        self.lock().alerts.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    pub fn injected(&self) -> Vec<InjectedFragment> {
        self.lock().injected.clone()
    }

    pub fn injected_ids(&self) -> Vec<String> {
        self.lock()
            .injected
            .iter()
            .filter_map(|f| f.id.clone())
            .collect()
    }

    pub fn styles(&self) -> Vec<(String, String, String)> {
        self.lock().styles.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SnapshotState> {
        // A poisoned lock only means a test panicked mid-call; the state is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_selector(selector: &str) -> PageResult<Selector> {
    Selector::parse(selector).map_err(|e| PageError::Script(format!("bad selector '{selector}': {e}")))
}

fn fragment_id(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let any = Selector::parse("[id]").ok()?;
    fragment
        .select(&any)
        .next()
        .and_then(|el| el.value().attr("id"))
        .map(str::to_string)
}

#[async_trait]
impl ProfilePage for SnapshotPage {
    async fn url(&self) -> PageResult<String> {
        Ok(self.lock().url.clone())
    }

    async fn content(&self) -> PageResult<String> {
        let mut state = self.lock();
        let html = state.current().to_string();
        if state.cursor + 1 < state.frames.len() {
            state.cursor += 1;
        }
        Ok(html)
    }

    async fn exists(&self, selector: &str) -> PageResult<bool> {
        let state = self.lock();
        if state.injected_index(selector).is_some() || state.matches_tag(selector) {
            return Ok(true);
        }
        state.matches_document(selector)
    }

    async fn click(&self, selector: &str) -> PageResult<bool> {
        let mut state = self.lock();
        if !state.matches_document(selector)? {
            return Ok(false);
        }
        state.clicks.push(selector.to_string());
        if let Some(frames) = state.on_click.get(selector).cloned() {
            state.frames = frames;
            state.cursor = 0;
        }
        Ok(true)
    }

    async fn tag_parent(&self, path: &[&str], attribute: &str, value: &str) -> PageResult<bool> {
        let selectors = path
            .iter()
            .map(|s| parse_selector(s))
            .collect::<PageResult<Vec<_>>>()?;
        let Some((first, rest)) = selectors.split_first() else {
            return Ok(false);
        };
        let mut state = self.lock();
        let has_parent = {
            let doc = Html::parse_document(state.current());
            let found = rest
                .iter()
                .fold(doc.select(first).next(), |scope, sel| {
                    scope.and_then(|el| el.select(sel).next())
                })
                .and_then(|el| el.parent())
                .is_some_and(|p| p.value().is_element());
            found
        };
        if has_parent {
            state.tags.push((attribute.to_string(), value.to_string()));
        }
        Ok(has_parent)
    }

    async fn set_style(&self, selector: &str, property: &str, value: &str) -> PageResult<bool> {
        let mut state = self.lock();
        if !(state.matches_tag(selector) || state.matches_document(selector)?) {
            return Ok(false);
        }
        state
            .styles
            .push((selector.to_string(), property.to_string(), value.to_string()));
        Ok(true)
    }

    async fn append_html(&self, parent: &str, html: &str) -> PageResult<bool> {
        let mut state = self.lock();
        if !(state.matches_tag(parent) || state.matches_document(parent)?) {
            return Ok(false);
        }
        state.injected.push(InjectedFragment {
            parent: parent.to_string(),
            id: fragment_id(html),
            html: html.to_string(),
        });
        Ok(true)
    }

    async fn remove(&self, selector: &str) -> PageResult<bool> {
        let mut state = self.lock();
        let before = state.injected.len();
        if let Some(id) = selector.strip_prefix('#') {
            state.injected.retain(|f| f.id.as_deref() != Some(id));
            state.pending_clicks.remove(selector);
        }
        Ok(state.injected.len() != before)
    }

    async fn take_click(&self, selector: &str) -> PageResult<bool> {
        let mut state = self.lock();
        if state.injected_index(selector).is_none() {
            return Ok(false);
        }
        Ok(state.pending_clicks.remove(selector))
    }

    async fn alert(&self, message: &str) -> PageResult<()> {
        self.lock().alerts.push(message.to_string());
        Ok(())
    }
}
