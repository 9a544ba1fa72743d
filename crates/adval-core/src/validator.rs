//! Adapter contract shared by every verification-service wrapper.

use std::future::Future;
use std::pin::Pin;

use crate::{NormalizedResult, ProviderId, ValidationInput};

pub type ValidateFuture<'a> = Pin<Box<dyn Future<Output = NormalizedResult> + Send + 'a>>;

/// Contract every provider adapter implements.
///
/// `validate` never fails to its caller: auth failures, network failures,
/// malformed responses, rate limiting, and not-found all resolve into a
/// [`NormalizedResult`] with either `service_unavailable` set (transient,
/// eligible for fallback) or a populated `errors` list (confident
/// rejection, never retried elsewhere).
///
/// Implementations must be `Send + Sync`; the orchestrator shares them
/// across concurrently outstanding requests.
pub trait AddressValidator: Send + Sync {
    /// Unique identifier for the wrapped service.
    fn id(&self) -> ProviderId;

    /// Whether required credentials/configuration are present. A disabled
    /// adapter must never be invoked for network I/O.
    fn is_enabled(&self) -> bool;

    /// Validate one address against the wrapped service.
    fn validate<'a>(&'a self, input: &'a ValidationInput) -> ValidateFuture<'a>;
}
