use std::convert::Infallible;
use std::sync::Arc;

use error_stack::{Report, ResultExt};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use acme_wfe_common::error::ConfigurationError;
use acme_wfe_common::memory::{development_issuer, MemoryAuthority, MemoryStorage};
use acme_wfe_common::nonce::NonceRegistry;
use acme_wfe_common::settings::Settings;
use acme_wfe_common::wfe::Endpoints;
use acme_wfe_common::WebFrontEnd;

mod http_wrapper;
mod logging;

use crate::http_wrapper::serve_request;

fn load_settings() -> Result<Settings, Report<ConfigurationError>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let toml = std::fs::read_to_string(&path)
                .change_context(ConfigurationError::new("Failed to read settings file"))
                .attach(path)?;
            Settings::from_toml(&toml)
        }
        None => Settings::new(),
    }
}

fn load_issuer(settings: &Settings) -> Result<Vec<u8>, Report<ConfigurationError>> {
    let Some(path) = &settings.wfe.issuer_certificate_path else {
        log::warn!("No issuer certificate configured, serving a development issuer");
        return development_issuer();
    };

    let error = || ConfigurationError::new("Failed to load issuer certificate");
    let raw = std::fs::read(path)
        .change_context_lazy(error)
        .attach(path.clone())?;
    if raw.starts_with(b"-----BEGIN") {
        let (_, pem) = x509_parser::pem::parse_x509_pem(&raw)
            .change_context_lazy(error)
            .attach(path.clone())?;
        Ok(pem.contents)
    } else {
        Ok(raw)
    }
}

fn build_front_end(settings: &Settings) -> Result<WebFrontEnd, Report<ConfigurationError>> {
    let storage = Arc::new(MemoryStorage::new());
    let authority = Arc::new(MemoryAuthority::new(
        storage.clone(),
        Endpoints::new(&settings.wfe.base_url).authz,
    ));
    let nonces = Arc::new(NonceRegistry::new(settings.nonce.capacity));
    WebFrontEnd::new(settings, authority, storage, nonces, load_issuer(settings)?)
}

#[tokio::main]
async fn main() -> Result<(), Report<ConfigurationError>> {
    logging::init_logger()?;

    let settings = load_settings()?;
    log::info!("Settings {settings:?}");
    log::warn!("Using the in-memory development authority; challenges are not validated");

    let max_body_bytes = settings.server.max_body_bytes;
    let wfe = Arc::new(build_front_end(&settings)?);

    let listener = TcpListener::bind(&settings.server.listen_address)
        .await
        .change_context(ConfigurationError::new("Failed to bind listen address"))
        .attach(settings.server.listen_address.clone())?;
    log::info!(
        "Serving {} on {}",
        wfe.endpoints().base,
        settings.server.listen_address
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(connection) => connection,
                    Err(e) => {
                        log::error!("Accept error: {e}");
                        continue;
                    }
                };
                log::debug!("New connection from {remote_addr}");

                let wfe = Arc::clone(&wfe);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let wfe = Arc::clone(&wfe);
                        async move {
                            Ok::<_, Infallible>(serve_request(&wfe, req, max_body_bytes).await)
                        }
                    });
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        log::debug!("Connection error from {remote_addr}: {e}");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                break;
            }
        }
    }

    match wfe.metrics().render() {
        Ok(text) => log::info!("Final counters:\n{text}"),
        Err(e) => log::warn!("Could not render counters: {e:?}"),
    }

    Ok(())
}
