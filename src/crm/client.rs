use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::envelope::{ApiEnvelope, ApiFailure};
use crate::core::config::ScoutConfig;
use crate::types::{
    AuthRequest, AuthResponse, CachedCredential, Contact, ContactDraft, DataWrapper,
    ValidationError,
};

/// Characters `encodeURI` escapes. `%` is left alone so query components that
/// were already escaped are not escaped twice.
const URI: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Characters `encodeURIComponent` escapes.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_uri(url: &str) -> String {
    utf8_percent_encode(url.trim(), URI).to_string()
}

pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// `filter[k]=v&…` for every present field of `filter`.
pub fn filter_query(filter: &ContactDraft) -> String {
    filter
        .fields()
        .into_iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                encode_uri_component(&format!("filter[{key}]")),
                encode_uri_component(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Clone)]
pub struct ApiRequest<B> {
    pub method: Method,
    pub url: String,
    pub body: Option<B>,
}

impl ApiRequest<()> {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
        }
    }
}

impl<B> ApiRequest<B> {
    pub fn post(url: impl Into<String>, body: B) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// 1Tool CRM REST client.
#[derive(Debug, Clone)]
pub struct CrmClient {
    http: Client,
    base_url: String,
    headers: HeaderMap,
    auth_header: HeaderName,
    tenant_header: HeaderName,
}

fn header_name(raw: &str, fallback: HeaderName) -> HeaderName {
    HeaderName::from_bytes(raw.trim().as_bytes()).unwrap_or_else(|e| {
        warn!("invalid header name '{}': {}; using {}", raw, e, fallback);
        fallback
    })
}

impl CrmClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers,
            auth_header: AUTHORIZATION,
            tenant_header: HeaderName::from_static("x-tenant"),
        }
    }

    pub fn from_config(config: &ScoutConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.resolve_http_timeout())
            .build()?;
        Ok(Self::new(http, config.resolve_base_url()).with_header_names(
            &config.resolve_authorization_header(),
            &config.resolve_tenant_header(),
        ))
    }

    /// Rename the two auth headers. Invalid names keep the current ones.
    pub fn with_header_names(mut self, auth: &str, tenant: &str) -> Self {
        self.auth_header = header_name(auth, self.auth_header.clone());
        self.tenant_header = header_name(tenant, self.tenant_header.clone());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Install the bearer-token and tenant headers for every later call.
    /// Returns `false` when the stored values are not valid header values.
    pub fn set_credential(&mut self, credential: &CachedCredential) -> bool {
        let (Ok(mut token), Ok(tenant)) = (
            HeaderValue::from_str(&credential.token),
            HeaderValue::from_str(&credential.tenant),
        ) else {
            warn!("cached credential contains characters not allowed in headers");
            return false;
        };
        token.set_sensitive(true);
        self.headers.insert(self.auth_header.clone(), token);
        self.headers.insert(self.tenant_header.clone(), tenant);
        true
    }

    pub fn with_credential(mut self, credential: &CachedCredential) -> Self {
        self.set_credential(credential);
        self
    }

    /// Send one request. Never fails: every error is folded into the envelope.
    pub async fn call<B, T>(&self, request: ApiRequest<B>) -> ApiEnvelope<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = encode_uri(&request.url);
        debug!("crm {} {}", request.method, url);

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .headers(self.headers.clone());

        if request.method != Method::GET {
            if let Some(body) = &request.body {
                match serde_json::to_string(body) {
                    Ok(json) => builder = builder.body(json.trim().to_string()),
                    Err(e) => {
                        return ApiEnvelope::Failure(Some(ApiFailure::Decode {
                            message: format!("request body: {e}"),
                        }))
                    }
                }
            }
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("crm {} {} failed: {}", request.method, url, e);
                return ApiEnvelope::Failure(Some(ApiFailure::Transport {
                    message: e.to_string(),
                }));
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!("crm {} {}: body read failed: {}", request.method, url, e);
                return ApiEnvelope::Failure(Some(ApiFailure::Transport {
                    message: e.to_string(),
                }));
            }
        };

        if !status.is_success() {
            warn!("crm {} {} → HTTP {}", request.method, url, status.as_u16());
            return ApiEnvelope::Failure(Some(ApiFailure::Rejected {
                status: status.as_u16(),
                error: serde_json::from_str::<ValidationError>(&text).ok(),
            }));
        }

        if text.trim().is_empty() {
            return ApiEnvelope::Success(None);
        }

        match serde_json::from_str::<T>(&text) {
            Ok(data) => ApiEnvelope::Success(Some(data)),
            Err(e) => {
                warn!("crm {} {}: unexpected body: {}", request.method, url, e);
                ApiEnvelope::Failure(Some(ApiFailure::Decode {
                    message: e.to_string(),
                }))
            }
        }
    }

    /// `POST /auth/user`. The returned token is what later calls send as bearer.
    pub async fn authenticate(&self, email: &str, password: &str) -> ApiEnvelope<AuthResponse> {
        let body = AuthRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.call(ApiRequest::post(format!("{}/auth/user", self.base_url), body))
            .await
    }

    /// `GET /contacts?filter[k]=v…`
    pub async fn find_contacts(&self, filter: &ContactDraft) -> ApiEnvelope<DataWrapper<Vec<Contact>>> {
        let query = filter_query(filter);
        let url = if query.is_empty() {
            format!("{}/contacts", self.base_url)
        } else {
            format!("{}/contacts?{}", self.base_url, query)
        };
        self.call(ApiRequest::get(url)).await
    }

    /// `POST /contacts`
    pub async fn create_contact(&self, draft: &ContactDraft) -> ApiEnvelope<DataWrapper<Contact>> {
        self.call(ApiRequest::post(format!("{}/contacts", self.base_url), draft))
            .await
    }
}
