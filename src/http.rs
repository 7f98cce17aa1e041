//! Outbound HTTP used by every resolver.
//!
//! Redirect handling is chosen per request through [`RedirectPolicy`]: some
//! services answer a deleted resource with a redirect to a generic page, while
//! the legacy instance answers a successful lookup with a redirect whose
//! `Location` is the result itself.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{redirect, Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::constants::RESOLVER_USER_AGENT;
use crate::error::ResolveError;

/// How a request treats `301`, `302` and `303` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Follow redirects transparently.
    Follow,
    /// Do not follow; a redirect means the resource no longer exists.
    MasksAbsence,
    /// Do not follow; the redirect's `Location` is the payload.
    CarriesLocation,
}

impl RedirectPolicy {
    #[must_use]
    pub fn follows(self) -> bool {
        matches!(self, Self::Follow)
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Whether the status is one of the redirects services use to signal
    /// absence or to carry a result.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(
            self.status,
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
        )
    }

    /// Apply the not-found rules for `policy`.
    ///
    /// `404` is always [`ResolveError::NotFound`]. Under
    /// [`RedirectPolicy::MasksAbsence`] a redirect is too. Under
    /// [`RedirectPolicy::CarriesLocation`] a redirect is returned untouched.
    /// Any other unsuccessful status becomes
    /// [`ResolveError::UnexpectedStatus`].
    ///
    /// # Errors
    ///
    /// Returns an error if the status does not indicate usable content.
    pub fn check(self, policy: RedirectPolicy) -> Result<Self, ResolveError> {
        if self.status == StatusCode::NOT_FOUND {
            return Err(ResolveError::NotFound);
        }
        if self.is_redirect() {
            return match policy {
                RedirectPolicy::MasksAbsence => Err(ResolveError::NotFound),
                RedirectPolicy::CarriesLocation => Ok(self),
                RedirectPolicy::Follow => Err(ResolveError::UnexpectedStatus(self.status)),
            };
        }
        if !self.status.is_success() {
            return Err(ResolveError::UnexpectedStatus(self.status));
        }
        Ok(self)
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ResolveError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Port through which resolvers issue GET requests.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Issue a GET request. Status codes are not interpreted here; callers
    /// use [`FetchResponse::check`].
    async fn get(&self, url: &str, policy: RedirectPolicy) -> Result<FetchResponse, ResolveError>;
}

/// [`HttpFetch`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    following: Client,
    manual: Client,
}

impl ReqwestFetcher {
    /// Build both the redirect-following and the manual client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        let following = Client::builder()
            .user_agent(RESOLVER_USER_AGENT)
            .timeout(timeout)
            .build()?;
        let manual = Client::builder()
            .user_agent(RESOLVER_USER_AGENT)
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { following, manual })
    }

    fn client(&self, policy: RedirectPolicy) -> &Client {
        if policy.follows() {
            &self.following
        } else {
            &self.manual
        }
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str, policy: RedirectPolicy) -> Result<FetchResponse, ResolveError> {
        debug!(url = %url, ?policy, "Requesting");

        let response = self.client(policy).get(url).send().await?;
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        debug!(url = %url, status = %status, bytes = body.len(), "Received response");

        Ok(FetchResponse {
            status,
            location,
            body,
        })
    }
}
