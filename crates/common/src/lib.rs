//! Web front end for an ACME certificate authority.
//!
//! This crate holds everything that does not depend on a particular HTTP
//! server: signed-request verification, the nonce registry, the resource
//! handlers and their problem documents. Requests come in as
//! `http::Request<Bytes>` and leave as `http::Response<Bytes>`; an adapter
//! such as the `acme-wfe-server` binary moves them on and off the wire.
//!
//! # Modules
//!
//! - [`authority`]: Interface to the certificate authority back end
//! - [`cert`]: Certificate and CSR parsing
//! - [`constants`]: Resource paths, header names and content types
//! - [`error`]: Error kinds and their HTTP mapping
//! - [`handlers`]: One handler per ACME resource
//! - [`http_util`]: Response building and standard headers
//! - [`memory`]: In-memory storage and authority for development
//! - [`metrics`]: Prometheus counters of created objects
//! - [`models`]: Accounts, authorizations, challenges and certificates
//! - [`nonce`]: Single-use anti-replay nonces
//! - [`problem`]: Problem documents returned on error
//! - [`request_signing`]: JWS parsing and signer verification
//! - [`router`]: Path dispatch
//! - [`settings`]: Configuration management and validation
//! - [`storage`]: Read-only interface to persisted objects
//! - [`templates`]: Handlebars template for the index page
//! - [`test_support`]: Testing utilities and fixtures
//! - [`wfe`]: The front end and its route table

pub mod authority;
pub mod cert;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod http_util;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod nonce;
pub mod problem;
pub mod request_signing;
pub mod router;
pub mod settings;
pub mod storage;
pub mod templates;
pub mod wfe;

pub use router::{reject_request, route_request};
pub use wfe::WebFrontEnd;
