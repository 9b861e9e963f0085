//! One sync cycle: read the open profile, look it up in the CRM, and offer
//! to add it.
//!
//! Each run owns a [`CycleContext`] (its id, cancellation token, the tagged
//! button container and the snapshot gathered so far). Nothing is shared
//! between runs, so cancelling one cycle and starting the next cannot leak
//! state across them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use scraper::Html;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ui::{self, Fragment};
use crate::core::config::{
    ScoutConfig, DEFAULT_CONTAINER_BUDGET_MS, DEFAULT_ICON_URL, DEFAULT_POLL_INTERVAL_MS,
};
use crate::crm::CrmClient;
use crate::extract::{
    extract_company_url, extract_email, extract_employment, extract_region, extract_website,
    is_profile_dashboard, NameStrategySelection, ProfileExtractor,
};
use crate::features::{CredentialStore, StoreError};
use crate::scraping::{attribute_selector, wait_until, PageError, ProfilePage, WaitBudget, WaitError, WaitOptions};
use crate::types::{Contact, PersonName, ProfileSnapshot};

pub const CONTACT_INFO_LINK: &str = r#"a[href*="/overlay/contact-info"]"#;
pub const MODAL_DISMISS: &str = "button.artdeco-modal__dismiss";
pub const PAGE_LOADER: &str = "artdeco-loader";
/// First `main`, its first `section` (the profile header), then the dropdown.
pub const ACTION_DROPDOWN: [&str; 3] = ["main", "section", ".artdeco-dropdown"];
pub const CONTAINER_ATTRIBUTE: &str = "data-onetool-cycle";

pub const ALERT_NOT_LOGGED_IN: &str = "1ToolCRM: User not logged in";
pub const ALERT_CREATE_FAILED: &str = "1ToolCRM: Failed to create contact";
pub const ALERT_NO_CONTAINER: &str = "1ToolCRM: Could not find the profile actions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    ModalOpening,
    WaitingForFields,
    Extracting,
    Authenticating,
    CheckingMembership,
    RenderingResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The contact is already in the CRM; the label is shown.
    AlreadyMember,
    /// The user clicked the button and the contact was created.
    Added(Option<Contact>),
    /// The page is not a member profile; nothing was rendered.
    NotAProfile,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("user not logged in")]
    AuthMissing,
    #[error("action container not found within {}ms", budget.as_millis())]
    TimeoutExceeded { budget: Duration },
    #[error("cycle cancelled")]
    Cancelled,
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<WaitError> for CycleError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::TimedOut { budget } => CycleError::TimeoutExceeded { budget },
            WaitError::Cancelled => CycleError::Cancelled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub poll_interval: Duration,
    /// Budget for the contact-info overlay to render.
    pub field_budget: WaitBudget,
    pub container_budget: Duration,
    pub name_strategy: NameStrategySelection,
    pub icon_url: String,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            field_budget: WaitBudget::Unbounded,
            container_budget: Duration::from_millis(DEFAULT_CONTAINER_BUDGET_MS),
            name_strategy: NameStrategySelection::default(),
            icon_url: DEFAULT_ICON_URL.to_string(),
        }
    }
}

impl CycleSettings {
    pub fn from_config(config: &ScoutConfig) -> Self {
        Self {
            poll_interval: config.resolve_poll_interval(),
            field_budget: WaitBudget::Unbounded,
            container_budget: config.resolve_container_budget(),
            name_strategy: config.resolve_name_strategy(),
            icon_url: config.resolve_icon_url(),
        }
    }
}

/// Per-run state.
#[derive(Debug)]
pub struct CycleContext {
    pub id: String,
    pub cancel: CancellationToken,
    pub state: CycleState,
    /// Selector of the tagged action-button container, once found.
    pub container: Option<String>,
    pub snapshot: ProfileSnapshot,
}

impl CycleContext {
    pub fn new(cancel: CancellationToken) -> Self {
        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            id,
            cancel,
            state: CycleState::Idle,
            container: None,
            snapshot: ProfileSnapshot::default(),
        }
    }

    fn enter(&mut self, next: CycleState) {
        debug!("cycle {}: {:?} → {:?}", self.id, self.state, next);
        self.state = next;
    }
}

/// Runs sync cycles against one page.
pub struct Cycle {
    page: Arc<dyn ProfilePage>,
    credentials: CredentialStore,
    crm: CrmClient,
    settings: CycleSettings,
}

impl Cycle {
    pub fn new(
        page: Arc<dyn ProfilePage>,
        credentials: CredentialStore,
        crm: CrmClient,
        settings: CycleSettings,
    ) -> Self {
        Self {
            page,
            credentials,
            crm,
            settings,
        }
    }

    pub fn page(&self) -> &Arc<dyn ProfilePage> {
        &self.page
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub async fn run(&self, ctx: &mut CycleContext) -> Result<CycleOutcome, CycleError> {
        let result = self.drive(ctx).await;
        match &result {
            Ok(outcome) => info!("cycle {}: ✅ {:?}", ctx.id, outcome),
            Err(CycleError::Cancelled) => debug!("cycle {}: cancelled in {:?}", ctx.id, ctx.state),
            Err(e) => warn!("cycle {}: ❌ {} (in {:?})", ctx.id, e, ctx.state),
        }
        ctx.enter(CycleState::Idle);
        result
    }

    async fn drive(&self, ctx: &mut CycleContext) -> Result<CycleOutcome, CycleError> {
        let page = self.page.as_ref();

        ctx.enter(CycleState::ModalOpening);
        if !page.click(CONTACT_INFO_LINK).await? {
            debug!("cycle {}: no contact-info link yet", ctx.id);
        }

        ctx.enter(CycleState::WaitingForFields);
        let (name, email) = self.wait_for_contact_info(ctx).await?;
        info!("cycle {}: 👤 {} {}", ctx.id, name.first, name.last);
        ctx.snapshot.name = Some(name);
        ctx.snapshot.email = email;
        page.click(MODAL_DISMISS).await?;

        ctx.enter(CycleState::Extracting);
        let container = match self.find_container(ctx).await {
            Ok(container) => container,
            Err(CycleError::TimeoutExceeded { budget }) => {
                page.alert(ALERT_NO_CONTAINER).await?;
                return Err(CycleError::TimeoutExceeded { budget });
            }
            Err(e) => return Err(e),
        };
        page.set_style(&container, "flex-wrap", "wrap").await?;
        page.set_style(&container, "row-gap", "8px").await?;
        ctx.container = Some(container.clone());

        let url = page.url().await?;
        let html = page.content().await?;
        fill_profile_fields(&mut ctx.snapshot, &html, &url);

        self.loader(&container, true).await?;

        ctx.enter(CycleState::Authenticating);
        let credential = match self.credentials.load().await {
            Ok(Some(credential)) => credential,
            Ok(None) => return self.abort_logged_out(&container, CycleError::AuthMissing).await,
            Err(e) => return self.abort_logged_out(&container, CycleError::Store(e)).await,
        };
        let mut crm = self.crm.clone();
        if !crm.set_credential(&credential) {
            return self.abort_logged_out(&container, CycleError::AuthMissing).await;
        }

        if !is_profile_dashboard(&url) {
            debug!("cycle {}: {} is not a member profile", ctx.id, url);
            self.loader(&container, false).await?;
            return Ok(CycleOutcome::NotAProfile);
        }

        ctx.enter(CycleState::CheckingMembership);
        let found = cancellable(ctx, crm.find_contacts(&ctx.snapshot.membership_filter())).await?;
        if let Some(failure) = found.failure() {
            warn!("cycle {}: membership lookup failed: {}", ctx.id, failure);
        }
        let is_member = found.data().is_some_and(|wrapper| !wrapper.data.is_empty());

        ctx.enter(CycleState::RenderingResult);
        self.loader(&container, false).await?;
        if is_member {
            self.show(&container, Fragment::ExistsLabel).await?;
            return Ok(CycleOutcome::AlreadyMember);
        }

        let button = Fragment::AddButton.selector();
        let draft = ctx.snapshot.contact_draft();
        self.show(&container, Fragment::AddButton).await?;
        loop {
            self.wait_for_click(ctx, &button).await?;
            info!("cycle {}: ➕ adding contact", ctx.id);

            self.loader(&container, true).await?;
            page.remove(&button).await?;
            let created = cancellable(ctx, crm.create_contact(&draft)).await?;
            self.loader(&container, false).await?;

            if created.is_success() {
                self.show(&container, Fragment::ExistsLabel).await?;
                return Ok(CycleOutcome::Added(created.into_data().map(|w| w.data)));
            }
            if let Some(failure) = created.failure() {
                warn!("cycle {}: create failed: {}", ctx.id, failure);
            }
            self.show(&container, Fragment::AddButton).await?;
            page.alert(ALERT_CREATE_FAILED).await?;
        }
    }

    /// Name and email from the contact-info overlay once it has rendered.
    async fn wait_for_contact_info(
        &self,
        ctx: &CycleContext,
    ) -> Result<(PersonName, Option<String>), CycleError> {
        let extractor = ProfileExtractor::new(self.settings.name_strategy);
        let options = self.wait_options(ctx, self.settings.field_budget);
        let found = wait_until(
            || {
                let page = Arc::clone(&self.page);
                async move {
                    match page.content().await {
                        Ok(html) => read_contact_info(&extractor, &html),
                        Err(e) => {
                            debug!("contact info not readable yet: {}", e);
                            None
                        }
                    }
                }
            },
            &options,
        )
        .await?;
        Ok(found)
    }

    /// Tag the dropdown's parent with this cycle's id and return its selector.
    async fn find_container(&self, ctx: &CycleContext) -> Result<String, CycleError> {
        let options = self.wait_options(ctx, WaitBudget::Bounded(self.settings.container_budget));
        let marker = ctx.id.clone();
        let container = wait_until(
            || {
                let page = Arc::clone(&self.page);
                let marker = marker.clone();
                async move {
                    match page.tag_parent(&ACTION_DROPDOWN, CONTAINER_ATTRIBUTE, &marker).await {
                        Ok(true) => Some(attribute_selector(CONTAINER_ATTRIBUTE, &marker)),
                        Ok(false) => None,
                        Err(e) => {
                            debug!("action container lookup failed: {}", e);
                            None
                        }
                    }
                }
            },
            &options,
        )
        .await?;
        Ok(container)
    }

    async fn wait_for_click(&self, ctx: &CycleContext, selector: &str) -> Result<(), CycleError> {
        let options = self.wait_options(ctx, WaitBudget::Unbounded);
        wait_until(
            || {
                let page = Arc::clone(&self.page);
                async move { page.take_click(selector).await.ok().filter(|clicked| *clicked) }
            },
            &options,
        )
        .await?;
        Ok(())
    }

    fn wait_options(&self, ctx: &CycleContext, budget: WaitBudget) -> WaitOptions {
        WaitOptions {
            interval: self.settings.poll_interval,
            budget,
            cancel: Some(ctx.cancel.clone()),
        }
    }

    async fn loader(&self, container: &str, visible: bool) -> Result<(), CycleError> {
        ui::toggle_loader(self.page.as_ref(), container, &self.settings.icon_url, visible).await?;
        Ok(())
    }

    async fn show(&self, container: &str, fragment: Fragment) -> Result<(), CycleError> {
        let html = fragment.html(&self.settings.icon_url);
        if !self.page.append_html(container, &html).await? {
            warn!("action container vanished before {} could be shown", fragment.id());
        }
        Ok(())
    }

    async fn abort_logged_out(
        &self,
        container: &str,
        err: CycleError,
    ) -> Result<CycleOutcome, CycleError> {
        self.page.alert(ALERT_NOT_LOGGED_IN).await?;
        self.loader(container, false).await?;
        Err(err)
    }
}

/// Race `fut` against the cycle's cancellation.
async fn cancellable<F: Future>(ctx: &CycleContext, fut: F) -> Result<F::Output, CycleError> {
    tokio::select! {
        _ = ctx.cancel.cancelled() => Err(CycleError::Cancelled),
        out = fut => Ok(out),
    }
}

fn read_contact_info(
    extractor: &ProfileExtractor,
    html: &str,
) -> Option<(PersonName, Option<String>)> {
    let doc = Html::parse_document(html);
    if crate::extract::first(&doc, PAGE_LOADER).is_some() {
        return None;
    }
    let name = extractor.name(&doc)?;
    Some((name, extract_email(&doc)))
}

fn fill_profile_fields(snapshot: &mut ProfileSnapshot, html: &str, url: &str) {
    let doc = Html::parse_document(html);
    snapshot.region = extract_region(&doc);
    snapshot.employment = extract_employment(&doc);
    snapshot.company_url = extract_company_url(&doc, url);
    snapshot.website = extract_website(url);
}
