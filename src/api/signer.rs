//! Request authentication for the remote wallet API
//!
//! `sign = base64(HMAC-SHA256(secret, timestamp + METHOD + path + queryOrBody))`
//! where the timestamp is ISO-8601 truncated to whole seconds (`...:56Z`).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::ApiConfig;
use crate::error::{Error, Result};

pub const HEADER_KEY: &str = "OK-ACCESS-KEY";
pub const HEADER_SIGN: &str = "OK-ACCESS-SIGN";
pub const HEADER_TIMESTAMP: &str = "OK-ACCESS-TIMESTAMP";
pub const HEADER_PASSPHRASE: &str = "OK-ACCESS-PASSPHRASE";
pub const HEADER_PROJECT: &str = "OK-ACCESS-PROJECT";

/// HTTP verb of a signed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Request parameters: url query for GET, JSON body for POST
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    None,
    Query(Vec<(String, String)>),
    Body(serde_json::Value),
}

impl Params {
    pub fn query<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Params::Query(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// `?a=b&c=d` or empty
    pub fn query_string(&self) -> String {
        match self {
            Params::Query(pairs) if !pairs.is_empty() => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs.iter())
                    .finish();
                format!("?{}", encoded)
            }
            _ => String::new(),
        }
    }

    pub fn body(&self) -> Result<Option<String>> {
        match self {
            Params::Body(value) => Ok(Some(serde_json::to_string(value)?)),
            _ => Ok(None),
        }
    }
}

/// One API identity
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
    pub project_id: String,
}

impl Credentials {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            passphrase: config.passphrase.clone(),
            project_id: config.project_id.clone(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"***")
            .field("passphrase", &"***")
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Output of signing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub signature: String,
    pub timestamp: String,
}

/// Signs requests for a single identity fixed at construction
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
}

impl RequestSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Sign at time `at`. Pure given its inputs.
    pub fn sign(
        &self,
        method: Method,
        path: &str,
        params: &Params,
        at: DateTime<Utc>,
    ) -> Result<Signature> {
        let timestamp = format_timestamp(at);
        let message = pre_hash(&timestamp, method, path, params)?;
        let signature = hmac_base64(&message, &self.credentials.secret_key)?;
        Ok(Signature {
            signature,
            timestamp,
        })
    }

    /// Authentication headers for a signature produced by this signer
    pub fn headers(&self, signature: &Signature) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_KEY, self.credentials.api_key.clone()),
            (HEADER_SIGN, signature.signature.clone()),
            (HEADER_TIMESTAMP, signature.timestamp.clone()),
            (HEADER_PASSPHRASE, self.credentials.passphrase.clone()),
            (HEADER_PROJECT, self.credentials.project_id.clone()),
        ]
    }
}

/// `2025-01-01T12:34:56Z`; sub-second digits are dropped, not rounded
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// `timestamp + METHOD + path + queryOrBody`
pub fn pre_hash(timestamp: &str, method: Method, path: &str, params: &Params) -> Result<String> {
    let query_or_body = match method {
        Method::Get => params.query_string(),
        Method::Post => params.body()?.unwrap_or_default(),
    };
    Ok(format!("{}{}{}{}", timestamp, method.as_str(), path, query_or_body))
}

fn hmac_base64(message: &str, secret: &str) -> Result<String> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("HMAC initialization failed: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
