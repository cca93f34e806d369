//! Edge Case Tests for the Token Lifecycle
//!
//! Boundary conditions for:
//! - Validation paths (current token, reuse window, fail-closed records)
//! - Rotation and the reuse window
//! - Device eviction ordering
//! - Expiry sweep timing
//! - Credential-change reset
//!
//! Everything runs through the `*_at` variants with fixed instants; no test
//! sleeps or reads the wall clock.

#[cfg(test)]
mod validation_tests {
    use crate::config::AuthConfig;
    use crate::hash::hash_token;
    use crate::lifecycle::{IssueOptions, TokenManager};
    use crate::record::{TokenRecord, TokenSet};
    use time::macros::datetime;
    use time::Duration;

    fn manager(lifespan_secs: i64, throttle_secs: i64) -> TokenManager {
        TokenManager::new(AuthConfig {
            token_lifespan: Duration::seconds(lifespan_secs),
            batch_request_buffer_throttle: Duration::seconds(throttle_secs),
            ..AuthConfig::default()
        })
        .unwrap()
    }

    // =========================================================================
    // Freshly issued tokens validate immediately; wrong secrets never do
    // =========================================================================
    #[test]
    fn issued_token_is_valid_and_wrong_secret_is_not() {
        let manager = manager(3600, 5);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        let issued = manager
            .issue_at(
                &mut tokens,
                IssueOptions {
                    device_id: Some("d1".to_owned()),
                    ..IssueOptions::default()
                },
                t0,
            )
            .unwrap();

        assert!(manager.is_valid_at(&tokens, "d1", &issued.secret, t0));
        assert!(!manager.is_valid_at(&tokens, "d1", "wrong-secret", t0));
    }

    // =========================================================================
    // Unknown devices are rejected without any hashing work
    // =========================================================================
    #[test]
    fn unknown_device_is_rejected() {
        let manager = manager(3600, 5);
        let tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);
        assert!(!manager.is_valid_at(&tokens, "nope", "anything", t0));
    }

    // =========================================================================
    // Once expiry passes (and no reuse window applies), validation fails
    // =========================================================================
    #[test]
    fn expired_token_is_rejected() {
        let manager = manager(3600, 5);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        let issued = manager
            .issue_at(
                &mut tokens,
                IssueOptions {
                    device_id: Some("d1".to_owned()),
                    ..IssueOptions::default()
                },
                t0,
            )
            .unwrap();

        let just_before = t0 + Duration::seconds(3599);
        let at_expiry = t0 + Duration::seconds(3600);
        assert!(manager.is_valid_at(&tokens, "d1", &issued.secret, just_before));
        assert!(
            !manager.is_valid_at(&tokens, "d1", &issued.secret, at_expiry),
            "expiry must be strictly in the future for the current path"
        );
    }

    // =========================================================================
    // Reuse path fails closed when last_token_hash or updated_at is missing
    // =========================================================================
    #[test]
    fn reuse_path_requires_both_last_hash_and_updated_at() {
        let manager = manager(3600, 5);
        let t0 = datetime!(2026-03-01 00:00 UTC);
        let old_hash = hash_token("old-secret").unwrap();
        let expired = t0 - Duration::seconds(1);

        // last_token_hash present, updated_at absent
        let mut missing_updated = TokenSet::new();
        missing_updated.insert(
            "d1".to_owned(),
            TokenRecord {
                token_hash: hash_token("current").unwrap(),
                expiry: expired,
                last_token_hash: Some(old_hash.clone()),
                updated_at: None,
            },
        );
        assert!(!manager.is_valid_at(&missing_updated, "d1", "old-secret", t0));

        // updated_at present, last_token_hash absent
        let mut missing_last = TokenSet::new();
        missing_last.insert(
            "d1".to_owned(),
            TokenRecord {
                token_hash: hash_token("current").unwrap(),
                expiry: expired,
                last_token_hash: None,
                updated_at: Some(t0),
            },
        );
        assert!(!manager.is_valid_at(&missing_last, "d1", "old-secret", t0));
    }

    // =========================================================================
    // A record carrying a malformed stored hash never validates and never
    // panics
    // =========================================================================
    #[test]
    fn malformed_stored_hash_fails_closed() {
        let manager = manager(3600, 5);
        let t0 = datetime!(2026-03-01 00:00 UTC);
        let mut tokens = TokenSet::new();
        tokens.insert(
            "d1".to_owned(),
            TokenRecord {
                token_hash: "garbage-not-a-hash".to_owned(),
                expiry: t0 + Duration::hours(1),
                last_token_hash: Some("also-garbage".to_owned()),
                updated_at: Some(t0),
            },
        );

        assert!(!manager.is_valid_at(&tokens, "d1", "anything", t0));
    }
}

#[cfg(test)]
mod rotation_tests {
    use crate::config::AuthConfig;
    use crate::headers::ProviderContext;
    use crate::lifecycle::{IssueOptions, TokenManager};
    use crate::record::TokenSet;
    use time::macros::datetime;
    use time::Duration;

    fn manager(lifespan_secs: i64, throttle_secs: i64) -> TokenManager {
        TokenManager::new(AuthConfig {
            token_lifespan: Duration::seconds(lifespan_secs),
            batch_request_buffer_throttle: Duration::seconds(throttle_secs),
            ..AuthConfig::default()
        })
        .unwrap()
    }

    fn context() -> ProviderContext {
        ProviderContext::new("email", "user@example.com")
    }

    // =========================================================================
    // Rotate A -> B at t=0 with a 5s window: A validates at t=3, not at
    // t=6; B validates throughout its lifespan.
    // =========================================================================
    #[test]
    fn previous_token_survives_only_within_the_reuse_window() {
        let manager = manager(3600, 5);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        let issued = manager
            .issue_at(
                &mut tokens,
                IssueOptions {
                    device_id: Some("d1".to_owned()),
                    ..IssueOptions::default()
                },
                t0 - Duration::minutes(10),
            )
            .unwrap();
        let secret_a = issued.secret;

        let rotated = manager.rotate_at(&mut tokens, "d1", &context(), t0).unwrap();
        let secret_b = rotated.secret;

        assert!(manager.is_valid_at(&tokens, "d1", &secret_a, t0 + Duration::seconds(3)));
        assert!(
            !manager.is_valid_at(&tokens, "d1", &secret_a, t0 + Duration::seconds(6)),
            "previous token must die once the window elapses"
        );
        assert!(
            !manager.is_valid_at(&tokens, "d1", &secret_a, t0 + Duration::seconds(5)),
            "window is half-open: exactly at the boundary is too late"
        );

        assert!(manager.is_valid_at(&tokens, "d1", &secret_b, t0));
        assert!(manager.is_valid_at(&tokens, "d1", &secret_b, t0 + Duration::seconds(6)));
        assert!(manager.is_valid_at(&tokens, "d1", &secret_b, t0 + Duration::seconds(3599)));
        assert!(!manager.is_valid_at(&tokens, "d1", &secret_b, t0 + Duration::seconds(3600)));
    }

    // =========================================================================
    // last_token_hash holds exactly the pre-rotation hash; a second rotation
    // forgets the oldest secret entirely
    // =========================================================================
    #[test]
    fn second_rotation_drops_the_oldest_secret() {
        let manager = manager(3600, 60);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        let first = manager.rotate_at(&mut tokens, "d1", &context(), t0).unwrap();
        let second = manager
            .rotate_at(&mut tokens, "d1", &context(), t0 + Duration::seconds(1))
            .unwrap();

        let t = t0 + Duration::seconds(2);
        assert!(manager.is_valid_at(&tokens, "d1", &second.secret, t));
        assert!(
            manager.is_valid_at(&tokens, "d1", &first.secret, t),
            "first secret is the previous token, inside the window"
        );

        let third = manager
            .rotate_at(&mut tokens, "d1", &context(), t0 + Duration::seconds(2))
            .unwrap();
        let t = t0 + Duration::seconds(3);
        assert!(manager.is_valid_at(&tokens, "d1", &third.secret, t));
        assert!(manager.is_valid_at(&tokens, "d1", &second.secret, t));
        assert!(
            !manager.is_valid_at(&tokens, "d1", &first.secret, t),
            "only the immediately preceding token is reusable"
        );
    }

    // =========================================================================
    // Rotating a device with no record issues its first token: no reuse
    // window exists yet
    // =========================================================================
    #[test]
    fn first_rotation_has_no_previous_token() {
        let manager = manager(3600, 5);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        let rotated = manager.rotate_at(&mut tokens, "new-device", &context(), t0).unwrap();

        let record = tokens.get("new-device").unwrap();
        assert!(record.last_token_hash.is_none());
        assert_eq!(record.updated_at, Some(t0));
        assert!(manager.is_valid_at(&tokens, "new-device", &rotated.secret, t0));
    }

    // =========================================================================
    // Rotation headers carry the new secret and stringified expiry
    // =========================================================================
    #[test]
    fn rotation_headers_describe_the_new_session() {
        let manager = manager(3600, 5);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        let rotated = manager.rotate_at(&mut tokens, "d1", &context(), t0).unwrap();

        assert_eq!(rotated.headers.access_token, rotated.secret);
        assert_eq!(rotated.headers.client, "d1");
        assert_eq!(rotated.headers.token_type, "Bearer");
        assert_eq!(
            rotated.headers.expiry,
            (t0 + Duration::seconds(3600)).unix_timestamp().to_string()
        );
        assert_eq!(rotated.headers.provider, "email");
        assert_eq!(rotated.headers.uid, "user@example.com");
    }

    // =========================================================================
    // Extending the reuse window keeps the previous token alive for
    // trailing requests without minting a new secret
    // =========================================================================
    #[test]
    fn extend_keeps_the_window_alive() {
        let manager = manager(3600, 5);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        let issued = manager
            .issue_at(
                &mut tokens,
                IssueOptions {
                    device_id: Some("d1".to_owned()),
                    ..IssueOptions::default()
                },
                t0 - Duration::minutes(1),
            )
            .unwrap();
        let secret_a = issued.secret;
        manager.rotate_at(&mut tokens, "d1", &context(), t0).unwrap();

        // Without the extension the old secret dies at t0+5.
        let headers = manager
            .extend_reuse_window_at(&mut tokens, "d1", &secret_a, &context(), t0 + Duration::seconds(3))
            .unwrap();
        assert_eq!(headers.access_token, secret_a, "extension echoes the reused secret");

        assert!(
            manager.is_valid_at(&tokens, "d1", &secret_a, t0 + Duration::seconds(7)),
            "window now measures from the extension"
        );
        assert!(!manager.is_valid_at(&tokens, "d1", &secret_a, t0 + Duration::seconds(9)));
    }

    // =========================================================================
    // Extending a device that no longer exists is an error, not a panic
    // =========================================================================
    #[test]
    fn extend_on_missing_device_errors() {
        let manager = manager(3600, 5);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        let result = manager.extend_reuse_window_at(&mut tokens, "ghost", "tok", &context(), t0);
        assert!(matches!(result, Err(crate::error::AuthError::DeviceNotFound)));
    }
}

#[cfg(test)]
mod eviction_and_sweep_tests {
    use crate::config::AuthConfig;
    use crate::headers::ProviderContext;
    use crate::lifecycle::{IssueOptions, TokenManager};
    use crate::record::TokenSet;
    use time::macros::datetime;
    use time::Duration;

    fn manager(max_devices: usize) -> TokenManager {
        TokenManager::new(AuthConfig {
            token_lifespan: Duration::seconds(3600),
            batch_request_buffer_throttle: Duration::seconds(5),
            max_number_of_devices: max_devices,
            ..AuthConfig::default()
        })
        .unwrap()
    }

    fn context() -> ProviderContext {
        ProviderContext::new("email", "user@example.com")
    }

    fn issue(manager: &TokenManager, tokens: &mut TokenSet, device: &str, at: time::OffsetDateTime) {
        manager
            .issue_at(
                tokens,
                IssueOptions {
                    device_id: Some(device.to_owned()),
                    ..IssueOptions::default()
                },
                at,
            )
            .unwrap();
    }

    // =========================================================================
    // Rotation enforces the ceiling; the evicted session is the one
    // expiring soonest
    // =========================================================================
    #[test]
    fn rotation_evicts_the_oldest_expiring_device() {
        let manager = manager(2);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        issue(&manager, &mut tokens, "oldest", t0);
        issue(&manager, &mut tokens, "middle", t0 + Duration::minutes(1));

        manager
            .rotate_at(&mut tokens, "newest", &context(), t0 + Duration::minutes(2))
            .unwrap();

        assert_eq!(tokens.len(), 2);
        assert!(!tokens.contains_device("oldest"), "smallest expiry goes first");
        assert!(tokens.contains_device("middle"));
        assert!(tokens.contains_device("newest"));
    }

    // =========================================================================
    // Issuance alone does not evict; the ceiling is applied by rotation
    // (and by the service layer before persisting)
    // =========================================================================
    #[test]
    fn issue_does_not_evict() {
        let manager = manager(2);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        issue(&manager, &mut tokens, "a", t0);
        issue(&manager, &mut tokens, "b", t0);
        issue(&manager, &mut tokens, "c", t0);

        assert_eq!(tokens.len(), 3);
    }

    // =========================================================================
    // Expired sessions are swept at the start of every mutating operation,
    // so they never count toward the ceiling
    // =========================================================================
    #[test]
    fn expired_sessions_never_count_toward_the_ceiling() {
        let manager = manager(2);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        issue(&manager, &mut tokens, "stale-1", t0 - Duration::hours(2));
        issue(&manager, &mut tokens, "stale-2", t0 - Duration::hours(2));
        issue(&manager, &mut tokens, "live", t0 - Duration::minutes(5));
        assert_eq!(tokens.len(), 3);

        // Both stale sessions are past expiry at t0; the rotation sweeps
        // them before the ceiling is evaluated, so nothing live is evicted.
        manager.rotate_at(&mut tokens, "second", &context(), t0).unwrap();

        assert_eq!(tokens.device_ids(), vec!["live".to_owned(), "second".to_owned()]);
    }

    // =========================================================================
    // Sweep runs on issue and extend as well
    // =========================================================================
    #[test]
    fn issue_and_extend_sweep_first() {
        let manager = manager(10);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        issue(&manager, &mut tokens, "stale", t0 - Duration::hours(2));
        issue(&manager, &mut tokens, "fresh", t0);
        assert!(!tokens.contains_device("stale"), "issue sweeps expired records");

        // Once "fresh" itself ages out, extend sweeps it and reports the
        // device as gone rather than refreshing a dead session.
        let later = t0 + Duration::hours(2);
        let result = manager.extend_reuse_window_at(&mut tokens, "fresh", "tok", &context(), later);
        assert!(result.is_err());
        assert!(tokens.is_empty(), "extend sweeps expired records");
    }
}

#[cfg(test)]
mod credential_reset_tests {
    use crate::config::AuthConfig;
    use crate::headers::ProviderContext;
    use crate::lifecycle::TokenManager;
    use crate::record::TokenSet;
    use time::macros::datetime;
    use time::Duration;

    fn manager(remove_on_change: bool) -> TokenManager {
        TokenManager::new(AuthConfig {
            token_lifespan: Duration::hours(1),
            remove_tokens_after_credential_change: remove_on_change,
            ..AuthConfig::default()
        })
        .unwrap()
    }

    fn context() -> ProviderContext {
        ProviderContext::new("email", "user@example.com")
    }

    // =========================================================================
    // Three devices with distinct rotation times: only the most recent
    // survives a credential change
    // =========================================================================
    #[test]
    fn reset_keeps_only_the_session_that_changed_the_credential() {
        let manager = manager(true);
        let mut tokens = TokenSet::new();
        let t0 = datetime!(2026-03-01 00:00 UTC);

        manager.rotate_at(&mut tokens, "phone", &context(), t0).unwrap();
        manager
            .rotate_at(&mut tokens, "laptop", &context(), t0 + Duration::minutes(1))
            .unwrap();
        manager
            .rotate_at(&mut tokens, "tablet", &context(), t0 + Duration::seconds(30))
            .unwrap();

        let removed = manager.reset_after_credential_change(&mut tokens, true).unwrap();

        assert_eq!(tokens.device_ids(), vec!["laptop".to_owned()]);
        assert_eq!(removed.len(), 2);
    }

    // =========================================================================
    // Disabled feature or unchanged credential leaves the set alone
    // =========================================================================
    #[test]
    fn reset_is_noop_when_disabled_or_unchanged() {
        let t0 = datetime!(2026-03-01 00:00 UTC);

        let disabled = manager(false);
        let mut tokens = TokenSet::new();
        disabled.rotate_at(&mut tokens, "a", &context(), t0).unwrap();
        disabled.rotate_at(&mut tokens, "b", &context(), t0).unwrap();
        assert!(disabled.reset_after_credential_change(&mut tokens, true).is_none());
        assert_eq!(tokens.len(), 2);

        let enabled = manager(true);
        assert!(enabled.reset_after_credential_change(&mut tokens, false).is_none());
        assert_eq!(tokens.len(), 2);
    }
}
