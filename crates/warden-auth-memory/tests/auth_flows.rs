mod common;

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use warden_auth::{
    AuthError, LoginRequest, NewSession, OtpGenerator, OtpLoginRequest, RateLimitCategory,
    RefreshRacePolicy, SessionStore, UserDirectory,
};

use common::{BOB_PASSWORD, login, stack, stack_with};

#[tokio::test]
async fn refresh_twice_advances_version() {
    let stack = stack();
    let pair = login(&stack, "web").await;

    let session = stack.sessions.find(pair.session_id).await.unwrap().unwrap();
    assert_eq!(session.token_version, 1);
    assert_eq!(session.refresh_count, 0);
    assert!(!session.is_revoked);

    let second = stack
        .orchestrator
        .refresh_access_token(&pair.refresh_token)
        .await
        .expect("first refresh");
    let third = stack
        .orchestrator
        .refresh_access_token(&second.refresh_token)
        .await
        .expect("second refresh");
    assert_eq!(third.session_id, pair.session_id);

    let session = stack.sessions.find(pair.session_id).await.unwrap().unwrap();
    assert_eq!(session.token_version, 3);
    assert_eq!(session.refresh_count, 2);
    assert_eq!(session.channel(), Some("web"));
}

#[tokio::test]
async fn replayed_refresh_token_revokes_every_device() {
    let stack = stack();
    let phone = login(&stack, "mobile").await;
    let laptop = login(&stack, "web").await;

    let rotated = stack
        .orchestrator
        .refresh_access_token(&laptop.refresh_token)
        .await
        .unwrap();
    stack
        .orchestrator
        .refresh_access_token(&rotated.refresh_token)
        .await
        .unwrap();

    let err = stack
        .orchestrator
        .refresh_access_token(&laptop.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SecurityViolation));
    assert_eq!(err.status_code(), 401);

    for id in [phone.session_id, laptop.session_id] {
        let session = stack.sessions.find(id).await.unwrap().unwrap();
        assert!(session.is_revoked);
        assert_eq!(session.revoked_reason.as_deref(), Some("token reuse detected"));
    }
    assert!(
        stack
            .orchestrator
            .list_active_sessions("u1")
            .await
            .unwrap()
            .is_empty()
    );

    // The stolen lineage is dead too.
    let err = stack
        .orchestrator
        .refresh_access_token(&phone.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionInvalid { .. }));
}

#[test]
fn otp_code_expires_after_two_windows() {
    let generator = OtpGenerator::new(std::time::Duration::from_secs(60));
    let code = generator.generate_at("+15550001234", "salt1", 1000);

    assert!(generator.verify_at("+15550001234", "salt1", &code, 1000));
    assert!(generator.verify_at("+15550001234", "salt1", &code, 1050));
    assert!(!generator.verify_at("+15550001234", "salt1", &code, 1130));
}

#[tokio::test]
async fn sixth_failed_login_is_rate_limited() {
    let stack = stack();

    for attempt in 1..=5 {
        let err = stack
            .orchestrator
            .login(LoginRequest::new("bob@example.com", "wrong", "web"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, AuthError::InvalidCredentials),
            "attempt {attempt}: {err}"
        );
    }

    let err = stack
        .orchestrator
        .login(LoginRequest::new("bob@example.com", "wrong", "web"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::RateLimited {
            category: RateLimitCategory::Login,
            ..
        }
    ));
    assert_eq!(err.status_code(), 429);
    assert!(err.retry_after().is_some());

    // Other identifiers are unaffected.
    stack
        .orchestrator
        .login(LoginRequest::new("+15550001234", BOB_PASSWORD, "mobile"))
        .await
        .expect("mobile identifier has its own bucket");
}

#[tokio::test]
async fn logout_and_logout_everywhere() {
    let stack = stack();
    let first = login(&stack, "web").await;
    let second = login(&stack, "web").await;
    let third = login(&stack, "mobile").await;

    stack.orchestrator.logout(&first.access_token).await.unwrap();
    let err = stack
        .orchestrator
        .refresh_access_token(&first.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionInvalid { .. }));

    let active = stack
        .orchestrator
        .sessions_for_token(&second.access_token)
        .await
        .unwrap();
    assert_eq!(active.len(), 2);

    let revoked = stack.orchestrator.logout_all(&third.access_token).await.unwrap();
    assert_eq!(revoked, 2);

    let session = stack.sessions.find(second.session_id).await.unwrap().unwrap();
    assert_eq!(
        session.revoked_reason.as_deref(),
        Some("user logout (all devices)")
    );
    let first_session = stack.sessions.find(first.session_id).await.unwrap().unwrap();
    assert_eq!(first_session.revoked_reason.as_deref(), Some("user logout"));
}

#[tokio::test]
async fn otp_login_round_trip() {
    let stack = stack();
    let key = "+15550001234";

    stack.orchestrator.initiate_otp_login(key).await.unwrap();
    let code = stack.delivery.last_code(key).expect("code delivered");

    let request = OtpLoginRequest {
        identifier: key.to_string(),
        code: code.clone(),
        channel: "mobile".to_string(),
        user_agent: Some("ios".to_string()),
    };
    let pair = stack
        .orchestrator
        .complete_otp_login(request.clone())
        .await
        .unwrap();

    let session = stack.sessions.find(pair.session_id).await.unwrap().unwrap();
    assert_eq!(session.device_info, "mobile - ios");
    assert_eq!(session.metadata["loginMethod"], "otp");

    let user = stack.users.find_by_id("u1").await.unwrap().unwrap();
    assert!(user.last_login_at.is_some());

    // A confirmed code cannot be replayed.
    let err = stack
        .orchestrator
        .complete_otp_login(request)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidVerificationCode));
}

#[tokio::test]
async fn otp_login_rejects_unlisted_channel() {
    let stack = stack();
    let key = "+15550001234";
    stack.orchestrator.initiate_otp_login(key).await.unwrap();
    let code = stack.delivery.last_code(key).unwrap();

    let err = stack
        .orchestrator
        .complete_otp_login(OtpLoginRequest {
            identifier: key.to_string(),
            code,
            channel: "kiosk".to_string(),
            user_agent: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ChannelNotAuthorized { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refresh_has_single_winner() {
    for policy in [RefreshRacePolicy::Reject, RefreshRacePolicy::TreatAsReuse] {
        let stack = Arc::new(stack_with(policy));
        let pair = login(&stack, "web").await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let stack = stack.clone();
            let token = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move {
                stack.orchestrator.refresh_access_token(&token).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(AuthError::SessionInvalid { .. } | AuthError::SecurityViolation) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1, "policy {policy:?}");

        let session = stack.sessions.find(pair.session_id).await.unwrap().unwrap();
        assert_eq!(session.token_version, 2);
        assert_eq!(session.refresh_count, 1);
    }
}

#[tokio::test]
async fn cleanup_sweep_revokes_expired_sessions() {
    let stack = stack();
    let live = login(&stack, "web").await;

    let idle = stack
        .sessions
        .create_session(NewSession::new("u1", "web"))
        .await
        .unwrap();
    let mut stale = stack.store.find_by_id(idle.id).await.unwrap().unwrap();
    stale.expires_at = OffsetDateTime::now_utc() - Duration::minutes(5);
    stack.store.create(&stale).await.unwrap();

    let old = stack
        .sessions
        .create_session(NewSession::new("u1", "mobile"))
        .await
        .unwrap();
    let mut ancient = stack.store.find_by_id(old.id).await.unwrap().unwrap();
    ancient.expires_at = OffsetDateTime::now_utc() + Duration::hours(1);
    ancient.absolute_expires_at = OffsetDateTime::now_utc() - Duration::days(1);
    stack.store.create(&ancient).await.unwrap();

    assert!(!stack.sessions.is_valid(idle.id).await.unwrap());
    assert!(!stack.sessions.is_valid(old.id).await.unwrap());

    let report = stack.sessions.cleanup_expired().await.unwrap();
    assert_eq!(report.idle_expired, 1);
    assert_eq!(report.lifetime_exceeded, 1);

    let idle = stack.sessions.find(idle.id).await.unwrap().unwrap();
    assert_eq!(idle.revoked_reason.as_deref(), Some("Session expired"));
    let old = stack.sessions.find(old.id).await.unwrap().unwrap();
    assert_eq!(
        old.revoked_reason.as_deref(),
        Some("Maximum session lifetime exceeded")
    );
    assert!(stack.sessions.is_valid(live.session_id).await.unwrap());

    // Second pass finds nothing new.
    assert_eq!(stack.sessions.cleanup_expired().await.unwrap().total(), 0);
}
