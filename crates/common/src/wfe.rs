//! The web front end: collaborators, derived URLs and the route table.

use std::sync::Arc;

use bytes::Bytes;
use error_stack::{Report, ResultExt};
use matchit::Router;

use crate::authority::Authority;
use crate::constants::{
    AUTHZ_PATH, BUILD_ID_PATH, CERT_PATH, INDEX_PATH, ISSUER_PATH, NEW_AUTHZ_PATH, NEW_CERT_PATH,
    NEW_REG_PATH, REG_PATH, REVOKE_CERT_PATH, TERMS_PATH,
};
use crate::error::ConfigurationError;
use crate::metrics::WfeMetrics;
use crate::nonce::NonceService;
use crate::request_signing::RequestVerifier;
use crate::settings::Settings;
use crate::storage::Storage;

/// Absolute URLs of every resource, derived once from the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub base: String,
    pub new_reg: String,
    pub reg: String,
    pub new_authz: String,
    pub authz: String,
    pub new_cert: String,
    pub cert: String,
    pub revoke_cert: String,
    pub terms: String,
    pub issuer: String,
    pub build: String,
}

impl Endpoints {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        let url = |path: &str| format!("{}{}", base, path);
        Self {
            new_reg: url(NEW_REG_PATH),
            reg: url(REG_PATH),
            new_authz: url(NEW_AUTHZ_PATH),
            authz: url(AUTHZ_PATH),
            new_cert: url(NEW_CERT_PATH),
            cert: url(CERT_PATH),
            revoke_cert: url(REVOKE_CERT_PATH),
            terms: url(TERMS_PATH),
            issuer: url(ISSUER_PATH),
            build: url(BUILD_ID_PATH),
            base,
        }
    }
}

/// Resource a request path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    NewRegistration,
    Registration,
    NewAuthorization,
    Authorization,
    NewCertificate,
    Certificate,
    RevokeCertificate,
    Terms,
    Issuer,
    BuildId,
}

fn build_router() -> Result<Router<Route>, Report<ConfigurationError>> {
    let routes = [
        (INDEX_PATH.to_string(), Route::Index),
        (NEW_REG_PATH.to_string(), Route::NewRegistration),
        (REG_PATH.to_string(), Route::Registration),
        (format!("{REG_PATH}{{id}}"), Route::Registration),
        (NEW_AUTHZ_PATH.to_string(), Route::NewAuthorization),
        (AUTHZ_PATH.to_string(), Route::Authorization),
        (format!("{AUTHZ_PATH}{{id}}"), Route::Authorization),
        (NEW_CERT_PATH.to_string(), Route::NewCertificate),
        (CERT_PATH.to_string(), Route::Certificate),
        (format!("{CERT_PATH}{{id}}"), Route::Certificate),
        (REVOKE_CERT_PATH.to_string(), Route::RevokeCertificate),
        (TERMS_PATH.to_string(), Route::Terms),
        (ISSUER_PATH.to_string(), Route::Issuer),
        (BUILD_ID_PATH.to_string(), Route::BuildId),
    ];

    let mut router = Router::new();
    for (path, route) in routes {
        router
            .insert(path.as_str(), route)
            .change_context(ConfigurationError::new("Invalid route table"))
            .attach(path.clone())?;
    }
    Ok(router)
}

/// Everything a request handler needs.
pub struct WebFrontEnd {
    pub(crate) authority: Arc<dyn Authority>,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) nonces: Arc<dyn NonceService>,
    pub(crate) verifier: RequestVerifier,
    pub(crate) endpoints: Endpoints,
    pub(crate) subscriber_agreement_url: Option<String>,
    pub(crate) terms_text: String,
    pub(crate) issuer_certificate: Bytes,
    pub(crate) router: Router<Route>,
    pub(crate) metrics: WfeMetrics,
}

impl WebFrontEnd {
    /// Wire the front end to its collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the route table or the counters cannot be built.
    pub fn new(
        settings: &Settings,
        authority: Arc<dyn Authority>,
        storage: Arc<dyn Storage>,
        nonces: Arc<dyn NonceService>,
        issuer_certificate: Vec<u8>,
    ) -> Result<Self, Report<ConfigurationError>> {
        let verifier = RequestVerifier::new(nonces.clone(), storage.clone());
        Ok(Self {
            authority,
            storage,
            nonces,
            verifier,
            endpoints: Endpoints::new(&settings.wfe.base_url),
            subscriber_agreement_url: settings.wfe.subscriber_agreement_url.clone(),
            terms_text: settings.wfe.terms_text.clone(),
            issuer_certificate: Bytes::from(issuer_certificate),
            router: build_router()?,
            metrics: WfeMetrics::new()?,
        })
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub fn metrics(&self) -> &WfeMetrics {
        &self.metrics
    }
}
