//! Authentication method implementations.

pub mod backoff;
pub mod form_login;
pub mod storage_state;

pub use backoff::RetryPolicy;
pub use form_login::{FormLoginMethod, FormLoginOutcome, SelectorSource};
pub use storage_state::StorageStateMethod;
