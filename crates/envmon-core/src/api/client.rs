//! Shared HTTP transport for every request the admin client makes.
//!
//! The `Transport` owns the connection pool, the base URL, the active
//! bearer credential and the chain of registered response interceptors.
//! Clones share all of it, so a credential set or an interceptor
//! registered through one clone is seen by every other.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::models::Credential;

use super::ApiError;

/// Maximum number of retries for rate-limited (429) GET requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Which credential, if any, a request carries.
#[derive(Debug, Clone, Copy)]
pub enum RequestAuth<'a> {
    /// The transport's active credential, when one is set
    Active,
    /// A specific credential, regardless of the active one
    Explicit(&'a Credential),
    /// No Authorization header at all
    Anonymous,
}

/// What an interceptor sees once a request has completed.
#[derive(Debug)]
pub struct RequestOutcome<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    /// The bearer credential the request carried, if any
    pub credential: Option<&'a Credential>,
    pub result: Result<StatusCode, &'a ApiError>,
}

impl RequestOutcome<'_> {
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    pub fn is_authorization_rejection(&self) -> bool {
        matches!(self.result, Err(e) if e.is_authorization_rejection())
    }
}

/// Hook invoked after every request the transport completes,
/// successful or not.
pub trait ResponseInterceptor: Send + Sync {
    fn on_complete(&self, outcome: &RequestOutcome<'_>);
}

#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: Arc<str>,
    credential: Arc<RwLock<Option<Credential>>>,
    interceptors: Arc<RwLock<Vec<Arc<dyn ResponseInterceptor>>>>,
}

impl Transport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidUrl(format!(
                "base URL must start with http:// or https://: {}",
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url),
            credential: Arc::new(RwLock::new(None)),
            interceptors: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Set (or clear) the credential attached to `RequestAuth::Active` requests
    pub fn set_credential(&self, credential: Option<Credential>) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credential;
    }

    pub fn credential(&self) -> Option<Credential> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn register_interceptor(&self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor);
    }

    fn url(&self, path: &str) -> Result<String, ApiError> {
        if !path.starts_with('/') || path.contains("://") {
            return Err(ApiError::InvalidUrl(path.to_string()));
        }
        Ok(format!("{}{}", self.base_url, path))
    }

    fn resolve_credential(&self, auth: RequestAuth<'_>) -> Option<Credential> {
        match auth {
            RequestAuth::Active => self.credential(),
            RequestAuth::Explicit(credential) => Some(credential.clone()),
            RequestAuth::Anonymous => None,
        }
    }

    fn notify(&self, outcome: &RequestOutcome<'_>) {
        // Snapshot the chain so an interceptor may touch the transport
        // (e.g. clear the credential) without deadlocking.
        let interceptors: Vec<Arc<dyn ResponseInterceptor>> = self
            .interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for interceptor in interceptors {
            interceptor.on_complete(outcome);
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send one request and report its outcome to the interceptor chain.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        auth: RequestAuth<'_>,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, ApiError> {
        let url = self.url(path)?;
        let credential = self.resolve_credential(auth);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(header::ACCEPT, "application/json");
        if let Some(ref credential) = credential {
            request = request.bearer_auth(credential.as_str());
        }
        let request = build(request);

        debug!(%method, path, authenticated = credential.is_some(), "Sending request");

        let result = match request.send().await {
            Ok(response) => Self::check_response(response).await,
            Err(e) => Err(ApiError::from(e)),
        };

        let outcome = RequestOutcome {
            method: &method,
            path,
            credential: credential.as_ref(),
            result: result.as_ref().map(|r| r.status()),
        };
        self.notify(&outcome);

        if let Err(ref e) = result {
            debug!(%method, path, error = %e, "Request failed");
        }
        result
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    /// GET with the active credential, retrying rate-limited responses
    /// with exponential backoff.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get_json_as(path, RequestAuth::Active).await
    }

    pub async fn get_json_as<T: DeserializeOwned>(
        &self,
        path: &str,
        auth: RequestAuth<'_>,
    ) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            match self.execute(Method::GET, path, auth, |r| r).await {
                Ok(response) => return Self::parse_json(response, path).await,
                Err(ApiError::RateLimited) if retries < MAX_RATE_LIMIT_RETRIES => {
                    retries += 1;
                    warn!(path, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .execute(Method::POST, path, RequestAuth::Active, |r| r.json(body))
            .await?;
        Self::parse_json(response, path).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .execute(Method::PUT, path, RequestAuth::Active, |r| r.json(body))
            .await?;
        Self::parse_json(response, path).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(Method::DELETE, path, RequestAuth::Active, |r| r)
            .await
            .map(|_| ())
    }

    /// POST an `application/x-www-form-urlencoded` body.
    pub async fn post_form<T: DeserializeOwned, F: Serialize + ?Sized>(
        &self,
        path: &str,
        form: &F,
        auth: RequestAuth<'_>,
    ) -> Result<T, ApiError> {
        let response = self
            .execute(Method::POST, path, auth, |r| r.form(form))
            .await?;
        Self::parse_json(response, path).await
    }
}
