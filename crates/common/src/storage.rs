//! Read side of the storage collaborator.

use async_trait::async_trait;
use derive_more::Display;
use error_stack::Report;

use crate::models::{Account, Authorization, Certificate, Serial, ShortSerial};
use crate::request_signing::AccountKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StorageError {
    #[display("Record not found")]
    NotFound,
    /// More than one record matched a lookup that must be unique.
    #[display("Multiple records match")]
    Ambiguous,
    #[display("Storage backend failure")]
    Backend,
}

impl core::error::Error for StorageError {}

/// Lookups the front end performs. Writes go through [`crate::authority::Authority`].
#[async_trait]
pub trait Storage: Send + Sync {
    async fn account_by_key(&self, key: &AccountKey) -> Result<Account, Report<StorageError>>;

    async fn authorization(&self, id: &str) -> Result<Authorization, Report<StorageError>>;

    /// Exact serial lookup.
    async fn certificate(&self, serial: &Serial) -> Result<Certificate, Report<StorageError>>;

    /// Must report [`StorageError::Ambiguous`] when several certificates
    /// share the short serial.
    async fn certificate_by_short_serial(
        &self,
        short: &ShortSerial,
    ) -> Result<Certificate, Report<StorageError>>;
}
