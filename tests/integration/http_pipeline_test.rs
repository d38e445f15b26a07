//! The request pipeline over reqwest against a mock HTTP server

use std::time::Duration;

use mockito::{Matcher, Server};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use jobmarket_lib::api::types::{JobFeed, JobFeedQuery};
use jobmarket_lib::auth::REFRESH_TOKEN_KEY;
use jobmarket_lib::{ApiRequest, ErrorCode, JobsApi, NoticeLevel, SecretStore};

use super::harness::TestClient;

#[tokio::test]
async fn test_feed_query_and_headers_reach_the_server() {
    let mut server = Server::new_async().await;
    let feed_mock = server
        .mock("GET", "/api/jobs/feed")
        .match_header("authorization", "Bearer a1")
        .match_header("accept", "application/json")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("state".into(), "NSW".into()),
            Matcher::UrlEncoded("urgency".into(), "urgent,flexible".into()),
            Matcher::UrlEncoded("limit".into(), "5".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jobs":[{"id":"j1","title":"Hang a door","status":"open"}],"nextCursor":null}"#)
        .expect(1)
        .create_async()
        .await;

    let test = TestClient::new(&server.url()).signed_in("a1", "r1").await;
    let jobs = JobsApi::new(test.client.clone());

    let feed = jobs
        .feed(&JobFeedQuery {
            state: Some("NSW".to_string()),
            urgency: vec!["urgent".to_string(), "flexible".to_string()],
            limit: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();

    feed_mock.assert_async().await;
    assert_eq!(feed.jobs.len(), 1);
    assert_eq!(feed.jobs[0].title, "Hang a door");
    assert!(feed.next_cursor.is_none());
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed_transparently() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("GET", "/api/jobs")
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .with_body(r#"{"message":"Token expired"}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::Json(json!({ "refresh_token": "r1" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"new"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", "/api/jobs")
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jobs":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let test = TestClient::new(&server.url()).signed_in("old", "r1").await;
    let feed: JobFeed = test.client.get("/jobs").await.unwrap();
    assert!(feed.jobs.is_empty());

    rejected.assert_async().await;
    refresh.assert_async().await;
    accepted.assert_async().await;
    assert_eq!(test.credentials.access_token().await.as_deref(), Some("new"));
}

#[tokio::test]
async fn test_concurrent_rejections_share_one_refresh() {
    let mut server = Server::new_async().await;
    let _rejected = server
        .mock("GET", Matcher::Regex(r"^/api/jobs/\d$".to_string()))
        .match_header("authorization", "Bearer old")
        .with_status(401)
        .expect_at_least(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"new"}"#)
        .expect(1)
        .create_async()
        .await;
    let accepted = server
        .mock("GET", Matcher::Regex(r"^/api/jobs/\d$".to_string()))
        .match_header("authorization", "Bearer new")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true}"#)
        .expect(5)
        .create_async()
        .await;

    let test = TestClient::new(&server.url()).signed_in("old", "r1").await;
    let calls = (0..5).map(|n| {
        let client = test.client.clone();
        async move { client.get::<Value>(&format!("/jobs/{}", n)).await }
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap(), json!({ "ok": true }));
    }
    refresh.assert_async().await;
    accepted.assert_async().await;
    assert!(!test.client.is_refreshing().await);
}

#[tokio::test]
async fn test_rejected_refresh_signs_out() {
    let mut server = Server::new_async().await;
    let _rejected = server
        .mock("GET", "/api/quotes/mine")
        .with_status(401)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .with_status(401)
        .with_body(r#"{"message":"Invalid refresh token"}"#)
        .expect(1)
        .create_async()
        .await;

    let test = TestClient::new(&server.url()).signed_in("old", "r1").await;
    let mut notices = test.notices.subscribe();

    let err = test.client.get::<Value>("/quotes/mine").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::SessionExpired);

    refresh.assert_async().await;
    assert!(!test.credentials.is_authenticated().await);
    assert!(test.secrets.get(REFRESH_TOKEN_KEY).await.unwrap().is_none());

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_server_errors_are_normalized() {
    let mut server = Server::new_async().await;
    let _invalid = server
        .mock("POST", "/api/jobs")
        .with_status(422)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"Validation failed","errors":{"budget_max":["must exceed budget_min"]}}"#)
        .create_async()
        .await;
    let _broken = server
        .mock("GET", "/api/jobs/j1")
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let test = TestClient::new(&server.url()).signed_in("a1", "r1").await;

    let err = test
        .client
        .post::<Value, _>("/jobs", &json!({ "title": "Fence" }))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(err.status, Some(422));
    assert_eq!(err.message, "Validation failed");
    assert_eq!(
        err.errors,
        Some(json!({ "budget_max": ["must exceed budget_min"] }))
    );

    // A body that is not JSON still yields a status and a fallback message
    let err = test.client.get::<Value>("/jobs/j1").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Server);
    assert_eq!(err.status, Some(503));
    assert_eq!(err.message, "An error occurred");
}

#[tokio::test]
async fn test_slow_server_times_out_as_network_error() {
    // Accepts connections and never answers
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let hold = tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            open.push(stream);
        }
    });

    let test = TestClient::new(&url);
    let mut notices = test.notices.subscribe();

    let err = test
        .client
        .execute(ApiRequest::get("/jobs/feed").timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Network);
    assert!(err.status.is_none());

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.message, "Network error. Please check your connection.");
    hold.abort();
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    // Nothing listens on the discard port
    let test = TestClient::new("http://127.0.0.1:9").signed_in("a1", "r1").await;

    let err = test.client.get::<Value>("/jobs").await.unwrap_err();
    assert!(err.is_network());
    assert!(test.credentials.is_authenticated().await);
}
