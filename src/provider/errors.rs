//! Error categories reported to providers

use thiserror::Error;

/// The set of known failures a provider is told about through
/// [`Provider::handle_error`](super::Provider::handle_error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KnownError {
    /// Beacon data could not be sent
    #[error("send beacon")]
    SendBeacon,

    /// The provider's session configuration could not be fetched
    #[error("provider config fetch")]
    ProviderConfigFetch,

    /// A test resource could not be fetched
    #[error("test resource fetch")]
    TestResourceFetch,

    /// A test failed while executing
    #[error("test execution")]
    TestExecution,
}
