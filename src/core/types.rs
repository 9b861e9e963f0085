use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─────────────────────────────────────────────────────────────────────────────
// Credential
// ─────────────────────────────────────────────────────────────────────────────

/// Login state persisted under the `auth` key of the key-value store.
///
/// `token` is stored with its `Bearer ` prefix already applied so it can be
/// copied into the authorization header verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredential {
    pub tenant: String,
    pub token: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_in_at: Option<DateTime<Utc>>,
}

impl CachedCredential {
    pub fn from_auth_response(response: &AuthResponse, user: &str) -> Self {
        Self {
            tenant: response.tenant_identifier.clone(),
            token: format!("Bearer {}", response.api_token),
            user: user.to_string(),
            logged_in_at: Some(Utc::now()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Profile snapshot
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub first: String,
    pub last: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employment {
    pub company: String,
    pub title: String,
}

/// Canonical profile URL plus the `/in/<id>` slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileWebsite {
    pub url: String,
    pub id: String,
}

/// Everything scraped from one profile visit. Every field is optional; a
/// missing DOM fragment leaves its field `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub name: Option<PersonName>,
    pub email: Option<String>,
    pub company_url: Option<String>,
    pub region: Option<Region>,
    pub employment: Option<Employment>,
    pub website: Option<ProfileWebsite>,
}

impl ProfileSnapshot {
    /// Partial contact used to look this person up in the CRM.
    pub fn membership_filter(&self) -> ContactDraft {
        ContactDraft {
            vorname: self.name.as_ref().map(|n| n.first.clone()),
            name: self.name.as_ref().map(|n| n.last.clone()),
            ..Default::default()
        }
    }

    /// Partial contact sent when the user clicks "Add to 1Tool".
    pub fn contact_draft(&self) -> ContactDraft {
        ContactDraft {
            vorname: self.name.as_ref().map(|n| n.first.clone()),
            name: self.name.as_ref().map(|n| n.last.clone()),
            mail: self.email.clone(),
            firma: self.employment.as_ref().map(|e| e.company.clone()),
            job: self.employment.as_ref().map(|e| e.title.clone()),
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CRM wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub api_token: String,
    pub tenant_identifier: String,
}

/// Laravel-style validation payload returned with 4xx responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub message: String,
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
}

/// A 1Tool contact record.
///
/// The CRM exposes 70+ columns; only the ones this client reads or writes are
/// typed; the rest ride along in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vorname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firma: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Partial contact: filter for lookups and body for creation. Absent fields
/// are not serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vorname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firma: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<String>,
}

impl ContactDraft {
    /// Present fields as `(key, value)` pairs, in declaration order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("vorname", &self.vorname),
            ("name", &self.name),
            ("mail", &self.mail),
            ("firma", &self.firma),
            ("job", &self.job),
            ("ort", &self.ort),
            ("web", &self.web),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
        .collect()
    }
}

/// `{ "data": ... }` wrapper the CRM puts around every resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataWrapper<T> {
    pub data: T,
}
