//! End-to-end refresh behaviour through clients built by a `ClientFactory`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rota_client::{
    ClientFactory, ClientOptions, CredentialPair, Error, FnHooks, RefreshError, TokenStore,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    factory: ClientFactory,
    logouts: Arc<AtomicUsize>,
}

impl Harness {
    async fn start(pair: Option<(&str, &str)>) -> Self {
        let server = MockServer::start().await;
        let store = TokenStore::in_memory();
        if let Some((access, refresh)) = pair {
            store.set_pair(&CredentialPair::new(access, refresh)).await.unwrap();
        }

        let logouts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&logouts);
        let hooks = FnHooks::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        Self {
            server,
            factory: ClientFactory::new(store, Arc::new(hooks)),
            logouts,
        }
    }

    fn base(&self) -> String {
        format!("{}/api", self.server.uri())
    }

    fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    async fn refresh_calls(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/api/auth/refresh")
            .count()
    }
}

#[tokio::test]
async fn test_expired_access_is_refreshed_and_request_replayed() {
    let h = Harness::start(Some(("A1", "R1"))).await;

    Mock::given(method("GET"))
        .and(path("/api/contracts"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/contracts"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [1, 2] })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({ "refreshToken": "R1" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "jwt": "A2", "refreshToken": "R2" })),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let client = h.factory.create_default_client(&h.base()).unwrap();
    let body: Value = client.get_json("contracts").await.unwrap();
    assert_eq!(body["items"], json!([1, 2]));

    let stored = h.factory.token_store().pair().await.unwrap().unwrap();
    assert_eq!(stored, CredentialPair::new("A2", "R2"));
    assert_eq!(h.logouts(), 0);
}

#[tokio::test]
async fn test_missing_refresh_credential_logs_out() {
    let h = Harness::start(None).await;
    h.factory.token_store().set_access("A1").await.unwrap();

    Mock::given(method("GET"))
        .and(path("/api/contracts"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let client = h.factory.create_default_client(&h.base()).unwrap();
    let err = client.get("contracts").await.unwrap_err();

    assert!(matches!(err, Error::Refresh(RefreshError::NoRefreshCredential)));
    assert!(err.requires_reauth());
    assert_eq!(h.logouts(), 1);
    assert_eq!(h.refresh_calls().await, 0);
    assert!(h.factory.token_store().get_access().await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_rejections_share_one_refresh() {
    let h = Harness::start(Some(("A1", "R1"))).await;

    for route in ["/api/x", "/api/y"] {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", "Bearer A3"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&h.server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jwt": "A3", "refreshToken": "R3" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let client = h.factory.create_default_client(&h.base()).unwrap();
    let (x, y) = tokio::join!(client.get("x"), client.get("y"));

    assert_eq!(x.unwrap().text().await.unwrap(), "ok");
    assert_eq!(y.unwrap().text().await.unwrap(), "ok");
    assert_eq!(h.refresh_calls().await, 1);
}

#[tokio::test]
async fn test_clients_of_one_factory_share_an_episode() {
    let h = Harness::start(Some(("A1", "R1"))).await;

    Mock::given(method("GET"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jwt": "A2" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let contracts = h.factory.create_default_client(&h.base()).unwrap();
    let users = h
        .factory
        .create_client(&h.base(), ClientOptions::default())
        .unwrap();

    let (a, b) = tokio::join!(contracts.get("contracts"), users.get("users"));
    assert_eq!(a.unwrap().status().as_u16(), 200);
    assert_eq!(b.unwrap().status().as_u16(), 200);

    // No refreshToken in the response: the old one is kept.
    let stored = h.factory.token_store().pair().await.unwrap().unwrap();
    assert_eq!(stored, CredentialPair::new("A2", "R1"));
}

#[tokio::test]
async fn test_rejected_replay_is_not_retried_again() {
    let h = Harness::start(Some(("A1", "R1"))).await;

    Mock::given(method("GET"))
        .and(path("/api/contracts"))
        .respond_with(ResponseTemplate::new(401).set_body_string("still no"))
        .expect(2)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "jwt": "A2", "refreshToken": "R2" })),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let client = h.factory.create_default_client(&h.base()).unwrap();
    let err = client.get("contracts").await.unwrap_err();

    assert!(matches!(err, Error::RetryExhausted { status: 401, .. }));
    assert_eq!(h.refresh_calls().await, 1);
    assert_eq!(h.logouts(), 0);
}

#[tokio::test]
async fn test_refresh_rejection_fans_out_and_logs_out_once() {
    let h = Harness::start(Some(("A1", "R1"))).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("refresh expired")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let client = h.factory.create_default_client(&h.base()).unwrap();
    let (x, y) = tokio::join!(client.get("x"), client.get("y"));

    for result in [x, y] {
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            Error::Refresh(RefreshError::RefreshCallFailed { status: Some(401), .. })
        ));
    }
    assert_eq!(h.logouts(), 1);
    assert!(h.factory.token_store().pair().await.unwrap().is_none());
}

#[tokio::test]
async fn test_other_statuses_pass_through() {
    let h = Harness::start(Some(("A1", "R1"))).await;

    Mock::given(method("GET"))
        .and(path("/api/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&h.server)
        .await;

    let client = h.factory.create_default_client(&h.base()).unwrap();
    let response = client.get("broken").await.unwrap();
    assert_eq!(response.status().as_u16(), 500);

    let err = client.get_json::<Value>("broken").await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 500, ref message } if message == "boom"));
    assert_eq!(h.refresh_calls().await, 0);
}

#[tokio::test]
async fn test_public_client_never_sends_credentials() {
    let h = Harness::start(Some(("A1", "R1"))).await;

    Mock::given(method("GET"))
        .and(path("/api/status"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let public = h.factory.public_client(&h.base()).unwrap();
    let response = public.get("status").await.unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let requests = h.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
    assert_eq!(h.refresh_calls().await, 0);
}
