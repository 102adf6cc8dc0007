use crawlauth_core::{CredentialGuard, REDACTED};
use proptest::prelude::*;

fn registrable(secret: &str) -> bool {
    !secret.trim().is_empty() && !REDACTED.contains(secret)
}

proptest! {
    #[test]
    fn adjacent_secrets_never_survive_redaction(
        secrets in proptest::collection::vec("[ -~]{4,10}", 2..5),
        pieces in proptest::collection::vec(0usize..8, 1..8),
    ) {
        prop_assume!(secrets.iter().all(|s| registrable(s)));
        let guard = CredentialGuard::new();
        guard.add_secrets(&secrets);

        let text: String = pieces
            .iter()
            .map(|i| secrets[i % secrets.len()].as_str())
            .collect();
        let redacted = guard.redact(&text);
        for secret in &secrets {
            prop_assert!(!redacted.contains(secret.as_str()));
        }
    }

    #[test]
    fn secret_embedded_at_any_offset_is_removed(
        prefix in "[ -~]{0,40}",
        suffix in "[ -~]{0,40}",
        secret in "[ -~]{6,24}",
    ) {
        prop_assume!(registrable(&secret));
        let guard = CredentialGuard::new();
        guard.add_secret(&secret);

        let text = format!("{prefix}{secret}{suffix}");
        let redacted = guard.redact(&text);
        prop_assert!(!redacted.contains(&secret));
        prop_assert!(redacted.contains(REDACTED));
    }

    #[test]
    fn leak_check_fires_iff_secret_present(
        text in "[ -~]{0,60}",
        secret in "[ -~]{6,12}",
    ) {
        prop_assume!(registrable(&secret));
        let guard = CredentialGuard::new();
        guard.add_secret(&secret);
        let result = guard.validate_no_leaks(&text, "prop");
        prop_assert_eq!(result.is_err(), text.contains(&secret));
    }

    #[test]
    fn nested_secret_yields_one_placeholder(
        inner in "[a-z]{4,8}",
        head in "[0-9]{1,4}",
        tail in "[0-9]{1,4}",
    ) {
        let outer = format!("{head}{inner}{tail}");
        let guard = CredentialGuard::new();
        guard.add_secrets([inner.as_str(), outer.as_str()]);

        let redacted = guard.redact(&format!("<{outer}>"));
        prop_assert_eq!(redacted, format!("<{REDACTED}>"));
    }
}

#[test]
fn redact_serializable_scrubs_struct_fields() {
    #[derive(serde::Serialize)]
    struct Report<'a> {
        role: &'a str,
        note: &'a str,
    }

    let guard = CredentialGuard::new();
    guard.add_secret("tok-123456");
    let value = guard
        .redact_serializable(&Report {
            role: "admin",
            note: "header was Bearer tok-123456",
        })
        .unwrap();
    assert_eq!(value["note"], "header was Bearer [REDACTED]");
    assert_eq!(value["role"], "admin");
}
