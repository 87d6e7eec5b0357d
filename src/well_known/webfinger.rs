//! Based on WebFinger (RFC 7033 <https://datatracker.ietf.org/doc/html/rfc7033>).
//!
//! Path: /.well-known/webfinger?resource=acct:USER@domain.tld
//!
//! Only the OpenID Connect issuer relation is ever returned. The requested
//! resource is compared against the configured one and echoed back as
//! `subject`, it is never interpreted further.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::config::{Configuration, extract_domain};
use crate::error::{Result, ServerError};

const HEADER: &str = "application/jrd+json";
pub const OPENID_ISSUER_REL: &str = "http://openid.net/specs/connect/1.0/issuer";

const RESOURCE_PARAM: &str = "resource";

/// Raw query pairs, in order. Keys may repeat.
pub type Params = Vec<(String, String)>;

/// First value of `key`, like a browser's `URLSearchParams.get`.
fn first_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

/// JSON Resource Descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jrd {
    pub subject: String,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl Jrd {
    /// Descriptor pointing `subject` at an OpenID Connect issuer.
    pub fn issuer(subject: &str, issuer_url: &str) -> Self {
        Self {
            subject: subject.to_owned(),
            links: vec![Link {
                rel: OPENID_ISSUER_REL.into(),
                r#type: None,
                href: Some(issuer_url.to_owned()),
            }],
        }
    }
}

/// Decide whether `requested` is served by `config`.
///
/// With the domain wildcard enabled, any local part at the configured
/// domain matches. Otherwise the whole resource must be identical.
pub fn resolve(requested: Option<&str>, config: &Configuration) -> Result<Jrd> {
    let requested = requested
        .filter(|resource| !resource.is_empty())
        .ok_or(ServerError::MissingResource)?;

    if config.allow_domain_wildcard() {
        let requested_domain =
            extract_domain(requested).ok_or(ServerError::InvalidResource)?;
        let configured_domain = extract_domain(config.resource()).ok_or_else(
            || ServerError::Internal {
                details: "invalid configured resource".into(),
            },
        )?;

        if requested_domain != configured_domain {
            return Err(ServerError::NotFound);
        }
    } else if requested != config.resource() {
        return Err(ServerError::NotFound);
    }

    Ok(Jrd::issuer(requested, config.issuer_url()))
}

pub async fn handler(
    State(config): State<Arc<Configuration>>,
    Query(params): Query<Params>,
) -> Result<impl IntoResponse> {
    let jrd = resolve(first_param(&params, RESOURCE_PARAM), &config)?;
    let body = serde_json::to_string(&jrd).map_err(|err| {
        ServerError::Internal {
            details: err.to_string(),
        }
    })?;

    Ok(([(header::CONTENT_TYPE, HEADER)], body))
}
