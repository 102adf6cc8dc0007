//! Environment fixtures shared by unit tests in this crate.

use std::sync::Once;

static ENV: Once = Once::new();

/// Set every variable the unit tests read. Tests call this before touching
/// the environment, so all writes happen before any read.
pub(crate) fn init() {
    ENV.call_once(|| {
        let vars = [
            ("CRAWLAUTH_GUARD_ID", "guard-user@example.com"),
            ("CRAWLAUTH_GUARD_PW", "guard-password"),
            (
                "CRAWLAUTH_GUARD_COOKIES",
                r#"[{"name":"sid","value":"cookie-secret-1"}]"#,
            ),
            ("CRAWLAUTH_CREDS_TEST_ID", "auditor@example.com"),
            ("CRAWLAUTH_CREDS_TEST_PW", "auditor-secret"),
        ];
        for (name, value) in vars {
            // SAFETY: runs once, before any test in this binary reads the
            // environment.
            unsafe { std::env::set_var(name, value) };
        }
    });
}
