//! [`ProfilePage`] over a live Chromium tab (CDP via `chromiumoxide`).
//!
//! Every capability is a small self-contained script evaluated in the page's
//! main world. Selectors and values are embedded as JSON string literals so
//! they can never break out of the script.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::page::{NavigationKind, PageError, PageEvent, PageResult, ProfilePage};
use super::poller;

/// Records `load` plus every Navigation API `navigate` event into a queue the
/// event pump drains.
const NAVIGATION_HOOK: &str = r#"
(() => {
    if (window.__onetoolScout) return true;
    const state = { events: [] };
    window.__onetoolScout = state;
    if (window.navigation) {
        window.navigation.addEventListener('navigate', (e) => state.events.push(e.navigationType));
    }
    if (document.readyState === 'complete') {
        state.events.push('load');
    } else {
        window.addEventListener('load', () => state.events.push('load'));
    }
    return true;
})()
"#;

const DRAIN_EVENTS: &str = r#"
(() => {
    const state = window.__onetoolScout;
    if (!state) return [];
    const events = state.events;
    state.events = [];
    return events;
})()
"#;

fn js(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[derive(Clone)]
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn inner(&self) -> &Page {
        &self.page
    }

    /// Install the navigation hook on the current document and on every
    /// document the tab loads afterwards. A document that already finished
    /// loading queues its `load` right away, so the first drain reports it.
    pub async fn install_navigation_hook(&self) -> PageResult<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(NAVIGATION_HOOK))
            .await
            .map_err(|e| PageError::Driver(format!("failed to register navigation hook: {e}")))?;
        self.eval::<bool>(NAVIGATION_HOOK.to_string()).await?;
        Ok(())
    }

    /// Drain queued lifecycle events.
    pub async fn drain_events(&self) -> PageResult<Vec<PageEvent>> {
        let raw: Vec<String> = self.eval(DRAIN_EVENTS.to_string()).await?;
        Ok(raw
            .iter()
            .filter_map(|name| match name.as_str() {
                "load" => Some(PageEvent::Load),
                other => NavigationKind::parse_str(other).map(PageEvent::Navigate),
            })
            .collect())
    }

    /// Forward lifecycle events into `tx` every `interval` until the receiver
    /// is dropped or `cancel` fires.
    pub async fn pump_events(
        &self,
        tx: mpsc::Sender<PageEvent>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            match self.drain_events().await {
                Ok(events) => {
                    for event in events {
                        debug!("page event: {:?}", event);
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                // Mid-navigation the execution context is gone; the next drain recovers.
                Err(e) => debug!("event drain failed: {}", e),
            }
            if poller::pause(interval, Some(&cancel)).await.is_err() {
                return;
            }
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> PageResult<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| PageError::Driver(e.to_string()))?;
        result
            .into_value::<T>()
            .map_err(|e| PageError::Script(e.to_string()))
    }
}

#[async_trait]
impl ProfilePage for CdpPage {
    async fn url(&self) -> PageResult<String> {
        self.page
            .url()
            .await
            .map_err(|e| PageError::Driver(e.to_string()))
            .map(Option::unwrap_or_default)
    }

    async fn content(&self) -> PageResult<String> {
        self.page
            .content()
            .await
            .map_err(|e| PageError::Driver(e.to_string()))
    }

    async fn exists(&self, selector: &str) -> PageResult<bool> {
        self.eval(format!("document.querySelector({}) !== null", js(selector)))
            .await
    }

    async fn click(&self, selector: &str) -> PageResult<bool> {
        self.eval(format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.click();
                if (el.blur) el.blur();
                return true;
            }})()"#,
            sel = js(selector)
        ))
        .await
    }

    async fn tag_parent(&self, path: &[&str], attribute: &str, value: &str) -> PageResult<bool> {
        if path.is_empty() {
            return Ok(false);
        }
        let path = serde_json::to_string(path).map_err(|e| PageError::Script(e.to_string()))?;
        self.eval(format!(
            r#"(() => {{
                let el = document;
                for (const sel of {path}) {{
                    el = el.querySelector(sel);
                    if (!el) return false;
                }}
                const parent = el.parentElement;
                if (!parent) return false;
                parent.setAttribute({attr}, {val});
                return true;
            }})()"#,
            attr = js(attribute),
            val = js(value)
        ))
        .await
    }

    async fn set_style(&self, selector: &str, property: &str, value: &str) -> PageResult<bool> {
        self.eval(format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.style.setProperty({prop}, {val});
                return true;
            }})()"#,
            sel = js(selector),
            prop = js(property),
            val = js(value)
        ))
        .await
    }

    async fn append_html(&self, parent: &str, html: &str) -> PageResult<bool> {
        self.eval(format!(
            r#"(() => {{
                const parent = document.querySelector({sel});
                if (!parent) return false;
                parent.insertAdjacentHTML('beforeend', {html});
                const added = parent.lastElementChild;
                if (added) {{
                    added.addEventListener('click', () => {{
                        added.dataset.onetoolClicks = String((+added.dataset.onetoolClicks || 0) + 1);
                    }});
                }}
                return true;
            }})()"#,
            sel = js(parent),
            html = js(html)
        ))
        .await
    }

    async fn remove(&self, selector: &str) -> PageResult<bool> {
        self.eval(format!(
            r#"(() => {{
                const found = document.querySelectorAll({sel});
                found.forEach((el) => el.remove());
                return found.length > 0;
            }})()"#,
            sel = js(selector)
        ))
        .await
    }

    async fn take_click(&self, selector: &str) -> PageResult<bool> {
        self.eval(format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                const pending = +(el.dataset.onetoolClicks || 0);
                if (pending < 1) return false;
                el.dataset.onetoolClicks = String(pending - 1);
                return true;
            }})()"#,
            sel = js(selector)
        ))
        .await
    }

    async fn alert(&self, message: &str) -> PageResult<()> {
        // Deferred so the evaluation returns before the dialog blocks the page.
        let shown: bool = self
            .eval(format!(
                "(() => {{ setTimeout(() => window.alert({msg}), 0); return true; }})()",
                msg = js(message)
            ))
            .await?;
        if !shown {
            warn!("alert was not scheduled: {}", message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_are_embedded_as_string_literals() {
        assert_eq!(js(r#"a[href*="mailto:"]"#), r#""a[href*=\"mailto:\"]""#);
        assert_eq!(js("it's\n"), r#""it's\n""#);
    }

    #[test]
    fn hook_reports_load_once_per_document() {
        // Re-evaluation on a hooked document is a no-op.
        let guard = NAVIGATION_HOOK.find("if (window.__onetoolScout) return true;").unwrap();
        let ready = NAVIGATION_HOOK.find("document.readyState === 'complete'").unwrap();
        assert!(guard < ready);
        assert_eq!(NAVIGATION_HOOK.matches("state.events.push('load')").count(), 2);
    }
}
