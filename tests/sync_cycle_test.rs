/// End-to-end sync cycles: saved profile markup replayed through
/// `SnapshotPage`, CRM served by wiremock.
use std::sync::Arc;
use std::time::Duration;

use onetool_scout::crm::CrmClient;
use onetool_scout::features::{CredentialStore, KeyValueStore, MemoryStore};
use onetool_scout::scraping::SnapshotPage;
use onetool_scout::sync::cycle::{
    ALERT_CREATE_FAILED, ALERT_NOT_LOGGED_IN, ALERT_NO_CONTAINER, CONTACT_INFO_LINK, MODAL_DISMISS,
};
use onetool_scout::sync::{Cycle, CycleContext, CycleError, CycleOutcome, CycleSettings, CycleState};
use onetool_scout::CachedCredential;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{any, body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROFILE_URL: &str = "https://www.linkedin.com/in/jane-doe/";
const BUTTON: &str = "#one-tool-crm-button";
const BUTTON_ID: &str = "one-tool-crm-button";
const LABEL_ID: &str = "one-tool-crm-label";

fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

const ACTIONS: &str = r#"<div class="pvs-profile-actions">
    <button class="artdeco-button">Message</button>
    <div class="artdeco-dropdown"><button>More</button></div>
</div>"#;

fn profile(actions: &str, overlay: &str) -> String {
    format!(
        r#"<html><body>
        <main>
          <section class="artdeco-card">
            <h1 class="text-heading-xlarge">Jane Doe</h1>
            <span class="text-body-small inline t-black--light"><!---->Berlin, Germany<!----></span>
            <a href="/in/jane-doe/overlay/contact-info/">Contact info</a>
            {actions}
          </section>
          <section>
            <div id="experience" class="pv-profile-card__anchor"></div>
            <div class="header"><h2>Experience</h2></div>
            <div><div><div><div>
              <div class="entry">
                <a href="/company/acme/"><img alt="Acme"></a>
                <div class="display-flex"><div class="wrapper">
                  <span aria-hidden="true"><!---->Staff Engineer<!----></span>
                  <span class="t-14"><span aria-hidden="true"><!---->Acme Corp · Full-time<!----></span></span>
                </div></div>
              </div>
            </div></div></div></div>
          </section>
        </main>
        {overlay}
        </body></html>"#
    )
}

const LOADING_OVERLAY: &str = r#"<div role="dialog" class="artdeco-modal">
    <button class="artdeco-modal__dismiss">Dismiss</button>
    <artdeco-loader></artdeco-loader>
</div>"#;

const CONTACT_OVERLAY: &str = r#"<div role="dialog" class="artdeco-modal">
    <button class="artdeco-modal__dismiss">Dismiss</button>
    <h1 id="pv-contact-info">Jane Doe</h1>
    <section class="pv-contact-info__contact-type">
      <h3 class="pv-contact-info__header">Jane’s Profile</h3>
      <a href="mailto:jane@doe.io">
        jane@doe.io
      </a>
    </section>
</div>"#;

/// Page whose contact-info overlay renders on the second poll and closes on dismiss.
fn profile_page(url: &str, actions: &str) -> Arc<SnapshotPage> {
    Arc::new(
        SnapshotPage::new(url, profile(actions, ""))
            .on_click(
                CONTACT_INFO_LINK,
                vec![profile(actions, LOADING_OVERLAY), profile(actions, CONTACT_OVERLAY)],
            )
            .on_click(MODAL_DISMISS, vec![profile(actions, "")]),
    )
}

fn credential() -> CachedCredential {
    CachedCredential {
        tenant: "acme".into(),
        token: "Bearer t0k".into(),
        user: "me@acme.io".into(),
        logged_in_at: None,
    }
}

async fn logged_in() -> CredentialStore {
    let store = Arc::new(MemoryStore::new());
    store
        .set("auth", serde_json::to_value(credential()).unwrap())
        .await
        .unwrap();
    CredentialStore::new(store)
}

fn logged_out() -> CredentialStore {
    CredentialStore::new(Arc::new(MemoryStore::new()))
}

fn settings() -> CycleSettings {
    CycleSettings {
        poll_interval: Duration::from_millis(20),
        container_budget: Duration::from_secs(2),
        ..Default::default()
    }
}

fn cycle(page: &Arc<SnapshotPage>, server: &MockServer, credentials: CredentialStore, settings: CycleSettings) -> Arc<Cycle> {
    let crm = CrmClient::new(reqwest::Client::new(), format!("{}/api", server.uri()));
    Arc::new(Cycle::new(page.clone(), credentials, crm, settings))
}

fn spawn_cycle(
    cycle: Arc<Cycle>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<(CycleContext, Result<CycleOutcome, CycleError>)> {
    tokio::spawn(async move {
        let mut ctx = CycleContext::new(cancel);
        let result = cycle.run(&mut ctx).await;
        (ctx, result)
    })
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn new_contact_is_added_on_click() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/contacts"))
        .and(query_param("filter[vorname]", "Jane"))
        .and(query_param("filter[name]", "Doe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/contacts"))
        .and(body_json(json!({
            "vorname": "Jane",
            "name": "Doe",
            "mail": "jane@doe.io",
            "firma": "Acme Corp",
            "job": "Staff Engineer"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {"id": 42, "vorname": "Jane", "name": "Doe"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = profile_page(PROFILE_URL, ACTIONS);
    let task = spawn_cycle(cycle(&page, &server, logged_in().await, settings()), CancellationToken::new());

    eventually("add button", || page.injected_ids() == vec![BUTTON_ID.to_string()]).await;
    assert!(page.user_click(BUTTON));

    let (ctx, result) = task.await.unwrap();
    match result.unwrap() {
        CycleOutcome::Added(Some(contact)) => assert_eq!(contact.id, Some(42)),
        other => panic!("unexpected outcome {other:?}"),
    }

    assert_eq!(page.injected_ids(), vec![LABEL_ID.to_string()]);
    assert_eq!(page.clicks(), vec![CONTACT_INFO_LINK.to_string(), MODAL_DISMISS.to_string()]);
    assert!(page.alerts().is_empty());

    let styles = page.styles();
    assert!(styles.iter().any(|(_, p, v)| p == "flex-wrap" && v == "wrap"));
    assert!(styles.iter().any(|(_, p, v)| p == "row-gap" && v == "8px"));

    assert_eq!(ctx.state, CycleState::Idle);
    assert!(ctx.container.is_some());
    let snapshot = &ctx.snapshot;
    assert_eq!(snapshot.region.as_ref().unwrap().city, "Berlin");
    assert_eq!(snapshot.website.as_ref().unwrap().id, "jane-doe");
    assert_eq!(
        snapshot.company_url.as_deref(),
        Some("https://www.linkedin.com/company/acme/")
    );
}

#[tokio::test]
async fn existing_contact_gets_the_label() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1, "vorname": "Jane", "name": "Doe"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let page = profile_page(PROFILE_URL, ACTIONS);
    let cycle = cycle(&page, &server, logged_in().await, settings());
    let mut ctx = CycleContext::new(CancellationToken::new());

    let outcome = cycle.run(&mut ctx).await.unwrap();

    assert_eq!(outcome, CycleOutcome::AlreadyMember);
    assert_eq!(page.injected_ids(), vec![LABEL_ID.to_string()]);
}

#[tokio::test]
async fn failed_create_restores_the_button() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": 5}})))
        .expect(1)
        .mount(&server)
        .await;

    let page = profile_page(PROFILE_URL, ACTIONS);
    let task = spawn_cycle(cycle(&page, &server, logged_in().await, settings()), CancellationToken::new());

    eventually("add button", || page.injected_ids().contains(&BUTTON_ID.to_string())).await;
    assert!(page.user_click(BUTTON));
    eventually("failure notice", || page.alerts().len() == 1).await;
    assert_eq!(page.alerts(), vec![ALERT_CREATE_FAILED.to_string()]);
    assert_eq!(page.injected_ids(), vec![BUTTON_ID.to_string()]);

    assert!(page.user_click(BUTTON));
    let (_, result) = task.await.unwrap();
    assert!(matches!(result, Ok(CycleOutcome::Added(Some(_)))));
    assert_eq!(page.injected_ids(), vec![LABEL_ID.to_string()]);
    assert_eq!(page.alerts().len(), 1);
}

#[tokio::test]
async fn logged_out_user_sees_one_notice_and_no_request_is_made() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let page = profile_page(PROFILE_URL, ACTIONS);
    let cycle = cycle(&page, &server, logged_out(), settings());
    let mut ctx = CycleContext::new(CancellationToken::new());

    let err = cycle.run(&mut ctx).await.unwrap_err();

    assert!(matches!(err, CycleError::AuthMissing));
    assert_eq!(page.alerts(), vec![ALERT_NOT_LOGGED_IN.to_string()]);
    assert!(page.injected_ids().is_empty(), "spinner must be cleared");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn non_profile_pages_are_left_alone() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let page = profile_page("https://www.linkedin.com/feed/", ACTIONS);
    let cycle = cycle(&page, &server, logged_in().await, settings());
    let mut ctx = CycleContext::new(CancellationToken::new());

    assert_eq!(cycle.run(&mut ctx).await.unwrap(), CycleOutcome::NotAProfile);
    assert!(page.injected_ids().is_empty());
    assert!(page.alerts().is_empty());
}

#[tokio::test]
async fn missing_action_bar_times_out_with_a_notice() {
    init_logger();
    let server = MockServer::start().await;
    let page = profile_page(PROFILE_URL, "<div class=\"pvs-profile-actions\"></div>");
    let settings = CycleSettings {
        container_budget: Duration::from_millis(200),
        ..settings()
    };
    let cycle = cycle(&page, &server, logged_in().await, settings);
    let mut ctx = CycleContext::new(CancellationToken::new());

    let started = tokio::time::Instant::now();
    let err = cycle.run(&mut ctx).await.unwrap_err();

    assert!(
        matches!(err, CycleError::TimeoutExceeded { budget } if budget == Duration::from_millis(200))
    );
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(page.alerts(), vec![ALERT_NO_CONTAINER.to_string()]);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn dropdowns_outside_the_profile_header_are_not_containers() {
    init_logger();
    let server = MockServer::start().await;
    let activity = |overlay: &str| {
        profile("", overlay).replace(
            r#"<div id="experience""#,
            r#"<div class="activity-controls"><div class="artdeco-dropdown"><button>More</button></div></div>
            <div id="experience""#,
        )
    };
    let page = Arc::new(
        SnapshotPage::new(PROFILE_URL, activity(""))
            .on_click(CONTACT_INFO_LINK, vec![activity(LOADING_OVERLAY), activity(CONTACT_OVERLAY)])
            .on_click(MODAL_DISMISS, vec![activity("")]),
    );
    let settings = CycleSettings {
        container_budget: Duration::from_millis(200),
        ..settings()
    };
    let cycle = cycle(&page, &server, logged_in().await, settings);
    let mut ctx = CycleContext::new(CancellationToken::new());

    let err = cycle.run(&mut ctx).await.unwrap_err();

    assert!(matches!(err, CycleError::TimeoutExceeded { .. }));
    assert_eq!(ctx.container, None);
    assert_eq!(page.alerts(), vec![ALERT_NO_CONTAINER.to_string()]);
    assert!(page.injected_ids().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_lookup_counts_as_not_a_member() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let page = profile_page(PROFILE_URL, ACTIONS);
    let cancel = CancellationToken::new();
    let task = spawn_cycle(cycle(&page, &server, logged_in().await, settings()), cancel.clone());

    eventually("add button", || page.injected_ids() == vec![BUTTON_ID.to_string()]).await;
    cancel.cancel();

    let (_, result) = task.await.unwrap();
    assert!(matches!(result, Err(CycleError::Cancelled)));
}

#[tokio::test]
async fn cancellation_ends_an_unbounded_wait() {
    init_logger();
    let server = MockServer::start().await;
    let page = Arc::new(
        SnapshotPage::new(PROFILE_URL, profile(ACTIONS, ""))
            .on_click(CONTACT_INFO_LINK, vec![profile(ACTIONS, LOADING_OVERLAY)]),
    );
    let cancel = CancellationToken::new();
    let task = spawn_cycle(cycle(&page, &server, logged_in().await, settings()), cancel.clone());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!task.is_finished());
    cancel.cancel();

    let (ctx, result) = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("cycle stops promptly")
        .unwrap();
    assert!(matches!(result, Err(CycleError::Cancelled)));
    assert!(ctx.snapshot.name.is_none());
    assert!(page.injected_ids().is_empty());
}
