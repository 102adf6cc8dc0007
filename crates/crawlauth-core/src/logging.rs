//! Process-wide tracing setup with credential redaction.

use crate::guard::{CredentialGuard, RedactingMakeWriter};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,crawlauth_core=info";

/// Install a global fmt subscriber writing to stderr through `guard`.
///
/// The filter comes from `RUST_LOG` when set. Returns an error if a global
/// subscriber is already installed, which callers embedding this crate in a
/// larger application can ignore.
pub fn init_tracing(
    guard: Arc<CredentialGuard>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with_target(false)
        .with_line_number(true)
        .with_writer(RedactingMakeWriter::new(std::io::stderr, guard))
        .try_init()
}
