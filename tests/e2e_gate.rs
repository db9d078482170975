//! E2E tests for the request gate

mod common;

use chrono::{Duration, Utc};
use common::{TestServer, location, set_cookies};

#[tokio::test]
async fn test_gated_page_redirects_without_session() {
    let server = TestServer::new().await;

    for path in ["/", "/dashboard", "/api/me", "/authors"] {
        let response = server.client.get(server.url(path)).send().await.unwrap();
        assert!(response.status().is_redirection(), "{path}");
        assert_eq!(location(&response), "/auth/signin", "{path}");
    }
}

#[tokio::test]
async fn test_sign_in_flow_is_exempt() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/auth/signin"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = server
        .client
        .get(server.url("/api/auth/session"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body.is_null());
}

#[tokio::test]
async fn test_valid_session_cookie_passes() {
    let server = TestServer::new().await;
    let (_user, cookie) = server.signed_in("ada@example.com").await;

    let response = server
        .client
        .get(server.url("/"))
        .header("Cookie", cookie)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("Welcome, ada"));
}

#[tokio::test]
async fn test_bearer_token_passes() {
    let server = TestServer::new().await;
    let user = server.create_user("bearer@example.com").await;
    let token = server.create_session(&user).await;

    let response = server
        .client
        .get(server.url("/api/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["user"]["id"], user.id);
}

#[tokio::test]
async fn test_unknown_token_redirects() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/"))
        .header("Cookie", "authgate.session-token=forged")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(location(&response), "/auth/signin");
}

#[tokio::test]
async fn test_expired_session_redirects_and_is_removed() {
    let server = TestServer::new().await;
    let user = server.create_user("late@example.com").await;
    server
        .state
        .adapter
        .create_session(authgate::data::Session {
            session_token: "expired-token".to_string(),
            user_id: user.id.clone(),
            expires: Utc::now() - Duration::minutes(1),
        })
        .await
        .unwrap();

    let response = server
        .client
        .get(server.url("/"))
        .header("Cookie", "authgate.session-token=expired-token")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert!(
        server
            .state
            .adapter
            .get_session_and_user("expired-token")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_deleted_user_loses_access() {
    let server = TestServer::new().await;
    let (user, cookie) = server.signed_in("gone@example.com").await;
    server.state.adapter.delete_user(&user.id).await.unwrap();

    let response = server
        .client
        .get(server.url("/"))
        .header("Cookie", cookie)
        .send()
        .await
        .unwrap();

    assert!(response.status().is_redirection());
}

#[tokio::test]
async fn test_extended_session_reissues_cookie() {
    let server = TestServer::new().await;
    let user = server.create_user("aging@example.com").await;
    let near_expiry = Utc::now() + Duration::minutes(1);
    server
        .state
        .adapter
        .create_session(authgate::data::Session {
            session_token: "aging-token".to_string(),
            user_id: user.id.clone(),
            expires: near_expiry,
        })
        .await
        .unwrap();

    let response = server
        .client
        .get(server.url("/"))
        .header("Cookie", "authgate.session-token=aging-token")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(
        set_cookies(&response).contains(&(
            "authgate.session-token".to_string(),
            "aging-token".to_string()
        ))
    );
    let raw_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(raw_cookie.contains("Expires="), "{raw_cookie}");

    let (session, _) = server
        .state
        .adapter
        .get_session_and_user("aging-token")
        .await
        .unwrap()
        .unwrap();
    assert!(session.expires > near_expiry + Duration::days(1));
}

#[tokio::test]
async fn test_fresh_or_bearer_session_sets_no_cookie() {
    let server = TestServer::new().await;
    let (user, cookie) = server.signed_in("steady@example.com").await;

    let response = server
        .client
        .get(server.url("/"))
        .header("Cookie", cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(set_cookies(&response).is_empty());

    server
        .state
        .adapter
        .create_session(authgate::data::Session {
            session_token: "aging-bearer".to_string(),
            user_id: user.id.clone(),
            expires: Utc::now() + Duration::minutes(1),
        })
        .await
        .unwrap();

    let response = server
        .client
        .get(server.url("/api/me"))
        .bearer_auth("aging-bearer")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(set_cookies(&response).is_empty());
}
