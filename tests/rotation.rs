mod common;

use common::*;
use credence::application_port::*;
use credence::domain_model::*;
use credence::domain_port::{RefreshTokenStore, ReplayMarkStore};
use std::collections::HashSet;
use std::time::Duration;

#[tokio::test]
async fn login_issues_a_verifiable_pair() {
    let h = Harness::new();
    let login = h.login(ALICE).await;

    assert_eq!(login.user_id, UserId::derived_from(ALICE));
    let claims = h
        .service
        .verify_access_token(&login.tokens.access_token.0)
        .await
        .unwrap();
    assert_eq!(claims.sub, login.user_id.to_string());
    assert_eq!(claims.role, "admin");
    assert_eq!(claims.iss, "credence.test");
    assert!(login.tokens.expires_in > 290 && login.tokens.expires_in <= 300);
    assert!(login.tokens.refresh_token.is_well_formed());

    let record = h
        .service
        .lookup(&login.tokens.refresh_token, &scope())
        .await
        .unwrap();
    assert_eq!(record.user_id, login.user_id);
}

#[tokio::test]
async fn wrong_password_is_invalid_credentials() {
    let h = Harness::new();
    let result = h
        .service
        .login(
            LoginInput {
                email: ALICE.into(),
                password: "nope".into(),
            },
            &scope(),
        )
        .await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    assert_eq!(h.store.calls("store"), 0);
}

#[tokio::test]
async fn refresh_rotates_and_retires_the_old_token() {
    let h = Harness::new();
    let login = h.login(ALICE).await;
    let old = login.tokens.refresh_token;

    let rotated = h.refresh(&old).await.unwrap();
    assert_ne!(rotated.refresh_token, old);
    assert!(h.store.get(&old).await.unwrap().is_none());
    assert!(h.store.get(&rotated.refresh_token).await.unwrap().is_some());

    let claims = h
        .service
        .verify_access_token(&rotated.access_token.0)
        .await
        .unwrap();
    assert_eq!(claims.user_id().unwrap(), login.user_id);

    // the new token is itself good for exactly one more rotation
    let again = h.refresh(&rotated.refresh_token).await.unwrap();
    assert_ne!(again.refresh_token, rotated.refresh_token);
}

#[tokio::test]
async fn tokens_are_never_reissued() {
    let h = Harness::new();
    let mut token = h.login(ALICE).await.tokens.refresh_token;
    let mut seen = HashSet::new();
    seen.insert(token.clone());
    for _ in 0..20 {
        token = h.refresh(&token).await.unwrap().refresh_token;
        assert!(seen.insert(token.clone()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_have_exactly_one_winner() {
    let h = Harness::new();
    let token = h.login(ALICE).await.tokens.refresh_token;

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let service = h.service.clone();
        let token = token.clone();
        tasks.push(tokio::spawn(async move {
            service
                .refresh(
                    RefreshInput {
                        refresh_token: token,
                        access_hint: None,
                    },
                    &scope(),
                )
                .await
        }));
    }

    let mut winners = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(pair) => winners.push(pair),
            Err(e) => assert!(matches!(e, AuthError::TokenInvalid), "unexpected {e:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
}

#[tokio::test]
async fn replaying_a_rotated_token_revokes_every_session() {
    let h = Harness::new();
    let laptop = h.login(ALICE).await.tokens.refresh_token;
    let phone = h.login(ALICE).await.tokens.refresh_token;
    let bob = h.login(BOB).await.tokens.refresh_token;

    let rotated = h.refresh(&laptop).await.unwrap().refresh_token;

    // the attacker replays the stolen, already rotated token
    let replay = h.refresh(&laptop).await;
    assert!(matches!(replay, Err(AuthError::TokenInvalid)));

    assert!(matches!(h.refresh(&rotated).await, Err(AuthError::TokenInvalid)));
    assert!(matches!(h.refresh(&phone).await, Err(AuthError::TokenInvalid)));
    assert!(
        h.service
            .list_sessions(UserId::derived_from(ALICE), &scope())
            .await
            .unwrap()
            .is_empty()
    );

    // other users are untouched
    assert!(h.refresh(&bob).await.is_ok());
}

#[tokio::test]
async fn unknown_token_with_access_hint_revokes_the_hinted_user() {
    let h = Harness::new();
    let login = h.login(ALICE).await;

    let forged = RefreshToken::generate();
    let result = h
        .refresh_with_hint(&forged, Some(&login.tokens.access_token))
        .await;
    assert!(matches!(result, Err(AuthError::TokenInvalid)));
    assert!(matches!(
        h.refresh(&login.tokens.refresh_token).await,
        Err(AuthError::TokenInvalid)
    ));
}

#[tokio::test]
async fn unknown_token_without_owner_is_only_rejected() {
    let h = Harness::new();
    let login = h.login(ALICE).await;

    let result = h.refresh(&RefreshToken::generate()).await;
    assert!(matches!(result, Err(AuthError::TokenInvalid)));
    assert_eq!(h.store.calls("revoke_all"), 0);
    assert!(h.refresh(&login.tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn malformed_token_never_reaches_the_store() {
    let h = Harness::new();
    let result = h.refresh(&RefreshToken("short".into())).await;
    assert!(matches!(result, Err(AuthError::TokenInvalid)));
    assert_eq!(h.store.calls("consume"), 0);
}

#[tokio::test]
async fn expired_refresh_token_is_invalid() {
    let h = Harness::with_ttls(Duration::from_secs(300), Duration::from_secs(1));
    let token = h.login(ALICE).await.tokens.refresh_token;
    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert!(matches!(h.refresh(&token).await, Err(AuthError::TokenInvalid)));
    assert!(matches!(
        h.service.lookup(&token, &scope()).await,
        Err(AuthError::TokenInvalid)
    ));
}

#[tokio::test]
async fn expired_access_token_is_renewed_by_refresh() {
    let h = Harness::with_ttls(Duration::from_secs(1), Duration::from_secs(3600));
    let login = h.login(ALICE).await;
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert!(matches!(
        h.service
            .verify_access_token(&login.tokens.access_token.0)
            .await,
        Err(AuthError::TokenExpired)
    ));

    let renewed = h.refresh(&login.tokens.refresh_token).await.unwrap();
    let claims = h
        .service
        .verify_access_token(&renewed.access_token.0)
        .await
        .unwrap();
    assert_eq!(claims.user_id().unwrap(), login.user_id);
}

#[tokio::test]
async fn removed_user_cannot_refresh() {
    let h = Harness::new();
    let login = h.login(ALICE).await;
    h.users.remove(login.user_id);

    assert!(matches!(
        h.refresh(&login.tokens.refresh_token).await,
        Err(AuthError::TokenInvalid)
    ));
}

#[tokio::test]
async fn logout_ends_only_that_session() {
    let h = Harness::new();
    let laptop = h.login(ALICE).await.tokens.refresh_token;
    let phone = h.login(ALICE).await.tokens.refresh_token;

    h.service.logout(&laptop, &scope()).await.unwrap();
    h.service.logout(&laptop, &scope()).await.unwrap();

    assert!(matches!(h.refresh(&laptop).await, Err(AuthError::TokenInvalid)));
    assert!(h.refresh(&phone).await.is_ok());
}

#[tokio::test]
async fn logout_all_ends_every_session() {
    let h = Harness::new();
    let user = UserId::derived_from(ALICE);
    let tokens = [
        h.login(ALICE).await.tokens.refresh_token,
        h.login(ALICE).await.tokens.refresh_token,
        h.login(ALICE).await.tokens.refresh_token,
    ];

    assert_eq!(h.service.logout_all(user, &scope()).await.unwrap(), 3);
    for token in &tokens {
        assert!(matches!(h.refresh(token).await, Err(AuthError::TokenInvalid)));
    }
    assert_eq!(h.service.logout_all(user, &scope()).await.unwrap(), 0);
}

#[tokio::test]
async fn store_outage_is_not_an_invalid_token() {
    let h = Harness::new();
    let token = h.login(ALICE).await.tokens.refresh_token;

    h.store.fail("consume", 1);
    assert!(matches!(
        h.refresh(&token).await,
        Err(AuthError::StoreUnavailable(_))
    ));
    // the token survived the outage
    assert!(h.refresh(&token).await.is_ok());
}

#[tokio::test]
async fn retry_after_a_failed_rotation_revokes_nothing() {
    let h = Harness::new();
    let phone = h.login(ALICE).await.tokens.refresh_token;
    let laptop = h.login(ALICE).await.tokens.refresh_token;

    // consume succeeds, storing the replacement fails every attempt
    h.store.fail("store", 3);
    assert!(matches!(
        h.refresh(&laptop).await,
        Err(AuthError::StoreUnavailable(_))
    ));
    assert!(h.marks.consumed_by(&laptop.fingerprint()).await.unwrap().is_none());

    assert!(matches!(h.refresh(&laptop).await, Err(AuthError::TokenInvalid)));
    assert_eq!(h.store.calls("revoke_all"), 0);
    assert!(h.refresh(&phone).await.is_ok());
}

#[tokio::test]
async fn transient_write_failures_are_retried() {
    let h = Harness::new();
    h.store.fail("store", 2);
    let login = h.login(ALICE).await;
    assert_eq!(h.store.calls("store"), 3);
    assert!(h.refresh(&login.tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn lost_consume_reply_is_not_retried() {
    let h = Harness::new();
    let token = h.login(ALICE).await.tokens.refresh_token;

    *h.store.faults.lose_consume_reply.lock().unwrap() = true;
    assert!(matches!(
        h.refresh(&token).await,
        Err(AuthError::StoreUnavailable(_))
    ));
    assert_eq!(h.store.calls("consume"), 1);
    assert_eq!(h.store.calls("revoke_all"), 0);
}

#[tokio::test]
async fn slow_store_hits_the_deadline() {
    let h = Harness::new();
    let token = h.login(ALICE).await.tokens.refresh_token;

    *h.store.faults.delay.lock().unwrap() = Some(Duration::from_millis(500));
    let result = h
        .service
        .refresh(
            RefreshInput {
                refresh_token: token,
                access_hint: None,
            },
            &CallScope::with_timeout(Duration::from_millis(50)),
        )
        .await;
    assert!(matches!(result, Err(AuthError::StoreUnavailable(_))));
}

#[tokio::test]
async fn cancelled_request_touches_nothing() {
    let h = Harness::new();
    let token = h.login(ALICE).await.tokens.refresh_token;

    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    let result = h
        .service
        .refresh(
            RefreshInput {
                refresh_token: token.clone(),
                access_hint: None,
            },
            &scope().with_cancel(cancel),
        )
        .await;
    assert!(matches!(result, Err(AuthError::StoreUnavailable(_))));
    assert!(h.store.get(&token).await.unwrap().is_some());
}

#[tokio::test]
async fn issue_session_skips_password_check() {
    let h = Harness::new();
    let principal = Principal {
        user_id: UserId::derived_from(BOB),
        role: Role::new("user"),
    };
    let pair = h.service.issue_session(&principal, &scope()).await.unwrap();
    let claims = h
        .service
        .verify_access_token(&pair.access_token.0)
        .await
        .unwrap();
    assert_eq!(claims.principal().unwrap(), principal);
}
