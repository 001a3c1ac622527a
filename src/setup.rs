//! LMS setup records.
//!
//! An [`LmsConfig`] identifies one configured LMS connection. Records are
//! created and edited by the admin tier and are read-only here. The client
//! secret is always the vault ciphertext; it is decrypted only while a token
//! request is being built.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend type of an LMS connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LmsType {
    #[serde(rename = "OPENEDX", alias = "OPEN_EDX")]
    OpenEdx,
    #[serde(rename = "MOODLE")]
    Moodle,
    #[serde(rename = "MOCK", alias = "MOCKUP")]
    Mock,
}

impl LmsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LmsType::OpenEdx => "OPENEDX",
            LmsType::Moodle => "MOODLE",
            LmsType::Mock => "MOCK",
        }
    }
}

impl fmt::Display for LmsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration attributes the connection test can report as missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LmsSetupAttribute {
    #[serde(rename = "lmsType")]
    LmsType,
    #[serde(rename = "lmsUrl")]
    ApiUrl,
    #[serde(rename = "lmsClientname")]
    ClientName,
    #[serde(rename = "lmsClientsecret")]
    ClientSecret,
}

impl LmsSetupAttribute {
    /// Attribute name as used by the admin tier forms.
    pub fn as_str(&self) -> &'static str {
        match self {
            LmsSetupAttribute::LmsType => "lmsType",
            LmsSetupAttribute::ApiUrl => "lmsUrl",
            LmsSetupAttribute::ClientName => "lmsClientname",
            LmsSetupAttribute::ClientSecret => "lmsClientsecret",
        }
    }
}

impl fmt::Display for LmsSetupAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured LMS connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmsConfig {
    /// Persistent identity of the setup record
    pub id: i64,

    /// Owning institution
    pub institution_id: i64,

    /// Display name
    pub name: String,

    /// Backend type
    pub lms_type: LmsType,

    /// Base API URL, e.g. `https://lms.example.org`
    #[serde(default)]
    pub api_url: String,

    /// OAuth client name (Moodle: web-service user name)
    #[serde(default)]
    pub client_name: String,

    /// Client secret as credential-vault ciphertext
    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl LmsConfig {
    /// Base URL without trailing slashes, ready for path concatenation.
    pub fn base_url(&self) -> &str {
        self.api_url.trim().trim_end_matches('/')
    }

    /// Required attributes that are blank, in declaration order.
    pub fn missing_attributes(&self) -> Vec<LmsSetupAttribute> {
        let mut missing = Vec::new();
        if self.api_url.trim().is_empty() {
            missing.push(LmsSetupAttribute::ApiUrl);
        }
        if self.client_name.trim().is_empty() {
            missing.push(LmsSetupAttribute::ClientName);
        }
        if self.client_secret.trim().is_empty() {
            missing.push(LmsSetupAttribute::ClientSecret);
        }
        missing
    }
}

impl fmt::Debug for LmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LmsConfig")
            .field("id", &self.id)
            .field("institution_id", &self.institution_id)
            .field("name", &self.name)
            .field("lms_type", &self.lms_type)
            .field("api_url", &self.api_url)
            .field("client_name", &self.client_name)
            .field("client_secret", &"<redacted>")
            .field("active", &self.active)
            .finish()
    }
}
