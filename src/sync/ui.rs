//! Markup injected into the profile's action bar.

use crate::scraping::{PageResult, ProfilePage};

pub const CONTAINER_CLASS: &str = "one-tool-crm-container";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    /// "Add to 1Tool" button; clicking it creates the contact.
    AddButton,
    /// "Contact exists within 1Tool".
    ExistsLabel,
    /// Shown while a CRM request is in flight.
    Spinner,
}

impl Fragment {
    pub const ALL: [Fragment; 3] = [Fragment::AddButton, Fragment::ExistsLabel, Fragment::Spinner];

    pub fn id(&self) -> &'static str {
        match self {
            Fragment::AddButton => "one-tool-crm-button",
            Fragment::ExistsLabel => "one-tool-crm-label",
            Fragment::Spinner => "one-tool-crm-spinner",
        }
    }

    pub fn selector(&self) -> String {
        format!("#{}", self.id())
    }

    pub fn html(&self, icon_url: &str) -> String {
        let icon = format!(
            r#"<img src="{}" width="16" height="16" alt="" style="margin-right:6px">"#,
            escape_attribute(icon_url)
        );
        match self {
            Fragment::AddButton => format!(
                r#"<button id="{}" class="artdeco-button artdeco-button--2 artdeco-button--secondary {}" type="button">{}<span>Add to 1Tool</span></button>"#,
                self.id(),
                CONTAINER_CLASS,
                icon
            ),
            Fragment::ExistsLabel => format!(
                r#"<div id="{}" class="{}" style="display:inline-flex;align-items:center">{}<span>Contact exists within 1Tool</span></div>"#,
                self.id(),
                CONTAINER_CLASS,
                icon
            ),
            Fragment::Spinner => format!(
                r#"<div id="{}" class="{}" role="progressbar" style="display:inline-flex;align-items:center">{}<span>1Tool…</span></div>"#,
                self.id(),
                CONTAINER_CLASS,
                icon
            ),
        }
    }
}

fn escape_attribute(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('"', "&quot;")
}

/// Show or hide the spinner inside `container`. Showing is idempotent.
pub async fn toggle_loader(
    page: &dyn ProfilePage,
    container: &str,
    icon_url: &str,
    visible: bool,
) -> PageResult<()> {
    let spinner = Fragment::Spinner.selector();
    if visible {
        if !page.exists(&spinner).await? {
            page.append_html(container, &Fragment::Spinner.html(icon_url)).await?;
        }
    } else {
        page.remove(&spinner).await?;
    }
    Ok(())
}

/// Remove every injected fragment, wherever it ended up.
pub async fn remove_all(page: &dyn ProfilePage) -> PageResult<()> {
    for fragment in Fragment::ALL {
        page.remove(&fragment.selector()).await?;
    }
    Ok(())
}
