//! Integration tests for login throttling and the token lifecycle.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use laburen_trust::auth::{LoginGuard, TokenIssuer};
use laburen_trust::config::TrustConfig;
use laburen_trust::domain::{IdentifierKind, OrgId, SessionMeta};
use laburen_trust::infra::{MemoryLoginActivityStore, MemoryRefreshTokenStore, TrustError};

use common::{test_org, test_principal};

fn guard() -> LoginGuard {
    LoginGuard::new(Arc::new(MemoryLoginActivityStore::new()), TrustConfig::default())
}

fn issuer() -> TokenIssuer {
    TokenIssuer::new(
        b"integration-test-secret-32-bytes",
        "laburen-trust",
        Arc::new(MemoryRefreshTokenStore::new()),
        TrustConfig::default(),
    )
}

#[tokio::test]
async fn fifth_failure_locks_and_the_lock_expires() {
    let guard = guard();
    let now = Utc::now();
    let who = "ana@example.com";

    for i in 1..=4u32 {
        let gate = guard
            .record_failure_at(who, IdentifierKind::Email, now)
            .await
            .unwrap();
        assert!(gate.allowed, "attempt {i}");
        assert_eq!(gate.remaining_attempts, 5 - i);
    }

    let locked = guard
        .record_failure_at(who, IdentifierKind::Email, now)
        .await
        .unwrap();
    assert!(locked.locked);
    assert!(!locked.allowed);
    assert_eq!(locked.lockout_ends_at, Some(now + Duration::minutes(30)));

    let still = guard.check_at(who, now + Duration::minutes(29)).await.unwrap();
    assert!(still.locked);
    assert_eq!(still.retry_after_minutes(now + Duration::minutes(29)), Some(1));

    // Lock expired and the failure window has rolled past.
    let after = guard.check_at(who, now + Duration::minutes(31)).await.unwrap();
    assert!(after.allowed);
    assert!(!after.locked);
    assert_eq!(after.remaining_attempts, 5);
}

#[tokio::test]
async fn failures_outside_the_window_do_not_count() {
    let guard = guard();
    let now = Utc::now();
    let who = "+5491155550000";

    for _ in 0..3 {
        guard
            .record_failure_at(who, IdentifierKind::Phone, now)
            .await
            .unwrap();
    }
    // 16 minutes later the window has moved past all three.
    let later = now + Duration::minutes(16);
    let gate = guard.check_at(who, later).await.unwrap();
    assert_eq!(gate.remaining_attempts, 5);

    for _ in 0..4 {
        guard
            .record_failure_at(who, IdentifierKind::Phone, later)
            .await
            .unwrap();
    }
    let gate = guard.check_at(who, later).await.unwrap();
    assert!(gate.allowed);
    assert_eq!(gate.remaining_attempts, 1);
}

#[tokio::test]
async fn identifiers_are_throttled_independently() {
    let guard = guard();
    let now = Utc::now();

    for _ in 0..5 {
        guard
            .record_failure_at("ana@example.com", IdentifierKind::Email, now)
            .await
            .unwrap();
    }
    assert!(guard.check_at("ana@example.com", now).await.unwrap().locked);
    assert!(guard.check_at("bruno@example.com", now).await.unwrap().allowed);
}

#[tokio::test]
async fn rotation_invalidates_the_spent_token() {
    let issuer = issuer();
    let now = Utc::now();

    let pair = issuer
        .issue_pair_at(test_principal(), test_org(), SessionMeta::default(), now)
        .await
        .unwrap();

    let claims = issuer.verify_access(&pair.access_token).unwrap();
    assert_eq!(claims.sub, test_principal().0.to_string());
    assert_eq!(claims.org, test_org().0.to_string());

    let rotated = issuer
        .rotate_at(&pair.refresh_token, SessionMeta::default(), now)
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, pair.refresh_token);

    // Replaying the spent token is a revocation event.
    assert!(matches!(
        issuer
            .rotate_at(&pair.refresh_token, SessionMeta::default(), now)
            .await,
        Err(TrustError::Revoked(_))
    ));

    // The fresh one still works, and carries the same principal and org.
    let again = issuer
        .rotate_at(&rotated.refresh_token, SessionMeta::default(), now)
        .await
        .unwrap();
    let claims = issuer.verify_access(&again.access_token).unwrap();
    assert_eq!(claims.org, test_org().0.to_string());
}

#[tokio::test]
async fn refresh_token_expires_after_seven_days() {
    let issuer = issuer();
    let now = Utc::now();
    let pair = issuer
        .issue_pair_at(test_principal(), test_org(), SessionMeta::default(), now)
        .await
        .unwrap();

    assert!(matches!(
        issuer
            .rotate_at(
                &pair.refresh_token,
                SessionMeta::default(),
                now + Duration::days(8),
            )
            .await,
        Err(TrustError::Expired(_))
    ));
}

#[tokio::test]
async fn revoke_all_ends_every_session() {
    let issuer = issuer();
    let now = Utc::now();
    let mut pairs = Vec::new();
    for i in 0..3 {
        pairs.push(
            issuer
                .issue_pair_at(
                    test_principal(),
                    test_org(),
                    SessionMeta::default(),
                    now + Duration::seconds(i),
                )
                .await
                .unwrap(),
        );
    }

    // Another principal's session survives.
    let other = issuer
        .issue_pair_at(
            laburen_trust::domain::PrincipalId::new(),
            OrgId::new(),
            SessionMeta::default(),
            now,
        )
        .await
        .unwrap();

    let revoked = issuer.revoke_all_at(test_principal(), now).await.unwrap();
    assert_eq!(revoked, 3);

    for pair in &pairs {
        assert!(matches!(
            issuer
                .rotate_at(&pair.refresh_token, SessionMeta::default(), now)
                .await,
            Err(TrustError::Revoked(_))
        ));
    }
    issuer
        .rotate_at(&other.refresh_token, SessionMeta::default(), now)
        .await
        .unwrap();
}

#[tokio::test]
async fn refresh_tokens_are_opaque_not_jwts() {
    let issuer = issuer();
    let pair = issuer
        .issue_pair_at(test_principal(), test_org(), SessionMeta::default(), Utc::now())
        .await
        .unwrap();

    assert!(pair.refresh_token.starts_with("rt_"));
    // An access token passed as a refresh token is malformed, not a JWT
    // validation error.
    assert!(matches!(
        issuer
            .rotate_at(&pair.access_token, SessionMeta::default(), Utc::now())
            .await,
        Err(TrustError::FormatInvalid(_))
    ));
}
