/// End-to-end reconciliation scenarios against a mocked mutation endpoint
use chrono::DateTime;
use rust_amocrm_api::batch::{MutationBatch, PostOptions, Touch};
use rust_amocrm_api::client::AmocrmClient;
use rust_amocrm_api::config::Config;
use rust_amocrm_api::errors::ApiError;
use rust_amocrm_api::models::{Contact, Model, ADD_ERROR, UPDATE_ERROR};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(server: &MockServer) -> AmocrmClient {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let mut config = Config::new("acme", "jane@acme.io", "test_hash");
    config.base_url = Some(server.uri());
    AmocrmClient::new(config).unwrap()
}

async fn mock_auth_and_account(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/private/api/auth.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session_id=test-session; Path=/")
                .set_body_json(json!({"response": {"auth": true}})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/account"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 100,
            "subdomain": "acme",
            "_embedded": {"custom_fields": {"contacts": []}}
        })))
        .mount(server)
        .await;
}

async fn mock_post_contacts(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/v2/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn contact(name: &str) -> Contact {
    Contact {
        name: Some(name.to_string()),
        ..Contact::default()
    }
}

#[tokio::test]
async fn test_adds_get_ids_in_submission_order() {
    let server = MockServer::start().await;
    mock_auth_and_account(&server).await;
    mock_post_contacts(
        &server,
        json!({"_embedded": {"items": [{"id": 10}, {"id": 11}], "errors": {}}}),
    )
    .await;

    let client = test_client(&server);
    let mut a = contact("A");
    let mut b = contact("B");
    let mut batch = MutationBatch::new();
    batch.save(&mut a).unwrap();
    batch.save(&mut b).unwrap();

    let result = client.post_batch(batch, &PostOptions::default()).await.unwrap();
    assert_eq!(result.posted, 2);
    assert!(result.errors.is_empty());
    assert_eq!(a.id, Some(10));
    assert_eq!(b.id, Some(11));
    assert!(a.meta.is_empty());
    assert!(b.meta.is_empty());
}

#[tokio::test]
async fn test_errored_add_is_skipped_during_attribution() {
    let server = MockServer::start().await;
    mock_auth_and_account(&server).await;
    // Index 0 failed; the only returned item belongs to the second add.
    mock_post_contacts(
        &server,
        json!({"_embedded": {
            "items": [{"id": 11}],
            "errors": {"add": {"0": "bad name"}}
        }}),
    )
    .await;

    let client = test_client(&server);
    let mut a = contact("A");
    let mut b = contact("B");
    let mut batch = MutationBatch::new();
    batch.save(&mut a).unwrap();
    batch.save(&mut b).unwrap();

    let result = client.post_batch(batch, &PostOptions::default()).await.unwrap();
    assert_eq!(result.posted, 1);
    assert_eq!(a.id, None);
    assert_eq!(a.meta[ADD_ERROR], "bad name");
    assert_eq!(b.id, Some(11));
    assert!(!b.meta.contains_key(ADD_ERROR));
}

#[tokio::test]
async fn test_count_mismatch_applies_nothing() {
    let server = MockServer::start().await;
    mock_auth_and_account(&server).await;
    // One add in, nothing accounted for in the response.
    mock_post_contacts(&server, json!({"_embedded": {"items": [], "errors": {}}})).await;

    let client = test_client(&server);
    let mut a = contact("A");
    a.meta.insert("add_error".to_string(), "stale".to_string());
    let before_updated_at = a.updated_at;
    let mut batch = MutationBatch::new();
    batch.save(&mut a).unwrap();

    let err = client
        .post_batch(
            batch,
            &PostOptions {
                touch: Touch::Skip,
                raise_on_errors: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Client(_)));
    // The batch was rejected wholesale: id, updated_at, and meta are
    // exactly as submitted, stale error included.
    assert_eq!(a.id, None);
    assert_eq!(a.updated_at, before_updated_at);
    assert_eq!(a.meta["add_error"], "stale");
}

#[tokio::test]
async fn test_unattributable_add_errors_fail_every_add() {
    let server = MockServer::start().await;
    mock_auth_and_account(&server).await;
    // List-form errors with a length that does not match the add batch:
    // attribution is impossible, so both adds are written off.
    mock_post_contacts(
        &server,
        json!({"_embedded": {
            "items": [],
            "errors": {"add": ["Phone is invalid"]}
        }}),
    )
    .await;

    let client = test_client(&server);
    let mut a = contact("A");
    let mut b = contact("B");
    let mut batch = MutationBatch::new();
    batch.save(&mut a).unwrap();
    batch.save(&mut b).unwrap();

    let result = client.post_batch(batch, &PostOptions::default()).await.unwrap();
    assert_eq!(result.errors.add.len(), 2);
    assert_eq!(a.id, None);
    assert_eq!(b.id, None);
    for object in [&a, &b] {
        let message = &object.meta[ADD_ERROR];
        assert!(message.contains("Maybe not added"));
        assert!(message.contains("Phone is invalid"));
    }
}

#[tokio::test]
async fn test_successful_resubmission_clears_stale_error() {
    let server = MockServer::start().await;
    mock_auth_and_account(&server).await;
    // First attempt fails the update, the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/api/v2/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"items": [], "errors": {"update": {"5": "conflict"}}}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"items": [{"id": 5, "updated_at": 1600000000}], "errors": {}}
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let mut e = contact("E");
    e.id = Some(5);

    let mut batch = MutationBatch::new();
    batch.save(&mut e).unwrap();
    let result = client.post_batch(batch, &PostOptions::default()).await.unwrap();
    assert_eq!(result.errors.update[&5], "conflict");
    assert_eq!(e.meta[UPDATE_ERROR], "conflict");

    let mut batch = MutationBatch::new();
    batch.save(&mut e).unwrap();
    let result = client.post_batch(batch, &PostOptions::default()).await.unwrap();
    assert!(result.errors.is_empty());
    assert!(!e.meta.contains_key(UPDATE_ERROR));
    assert_eq!(e.updated_at.unwrap().timestamp(), 1_600_000_000);
}

#[tokio::test]
async fn test_server_updated_at_overrides_local() {
    let server = MockServer::start().await;
    mock_auth_and_account(&server).await;
    let t0 = DateTime::from_timestamp(1_500_000_000, 0).unwrap();
    let t1 = 1_500_000_060;
    mock_post_contacts(
        &server,
        json!({"_embedded": {"items": [{"id": 5, "updated_at": t1}], "errors": {}}}),
    )
    .await;

    let client = test_client(&server);
    let mut e = contact("E");
    e.id = Some(5);
    e.updated_at = Some(t0);

    let mut batch = MutationBatch::new();
    batch.save(&mut e).unwrap();
    // Touch::Skip keeps the local T0 so the server echo genuinely
    // disagrees; the overwrite must happen without an error.
    let result = client
        .post_batch(
            batch,
            &PostOptions {
                touch: Touch::Skip,
                raise_on_errors: false,
            },
        )
        .await
        .unwrap();
    assert!(result.errors.is_empty());
    assert_eq!(e.updated_at.unwrap().timestamp(), t1);
}

#[tokio::test]
async fn test_touch_now_advances_updated_at_before_submit() {
    let server = MockServer::start().await;
    mock_auth_and_account(&server).await;

    let echoed = chrono::Utc::now().timestamp();
    mock_post_contacts(
        &server,
        json!({"_embedded": {"items": [{"id": 5, "updated_at": echoed}], "errors": {}}}),
    )
    .await;

    let client = test_client(&server);
    let mut e = contact("E");
    e.id = Some(5);
    e.updated_at = Some(DateTime::from_timestamp(1_500_000_000, 0).unwrap());

    let mut batch = MutationBatch::new();
    batch.save(&mut e).unwrap();
    client.post_batch(batch, &PostOptions::default()).await.unwrap();
    // Stamped to now (whole seconds) on submit, then confirmed by the echo.
    assert_eq!(e.updated_at.unwrap().timestamp(), echoed);
    assert_eq!(e.updated_at.unwrap().timestamp_subsec_nanos(), 0);
}

#[tokio::test]
async fn test_raise_on_errors_after_partial_application() {
    let server = MockServer::start().await;
    mock_auth_and_account(&server).await;
    mock_post_contacts(
        &server,
        json!({"_embedded": {
            "items": [{"id": 10}],
            "errors": {"add": {"1": "rejected"}}
        }}),
    )
    .await;

    let client = test_client(&server);
    let mut a = contact("A");
    let mut b = contact("B");
    let mut batch = MutationBatch::new();
    batch.save(&mut a).unwrap();
    batch.save(&mut b).unwrap();

    let err = client
        .post_batch(batch, &PostOptions::raising())
        .await
        .unwrap_err();
    let ApiError::Post(post) = err else {
        panic!("expected post error");
    };
    assert_eq!(post.model, Contact::NAME);
    assert_eq!(post.errors.add[&1], "rejected");
    // Partial success is applied before the raise: the good add has its
    // id, the bad one its message.
    assert_eq!(a.id, Some(10));
    assert_eq!(b.meta[ADD_ERROR], "rejected");
}

#[tokio::test]
async fn test_delete_errors_land_on_objects() {
    let server = MockServer::start().await;
    mock_auth_and_account(&server).await;
    mock_post_contacts(
        &server,
        json!({"_embedded": {"items": [], "errors": {"delete": {"7": "not allowed"}}}}),
    )
    .await;

    let client = test_client(&server);
    let mut gone = contact("G");
    gone.id = Some(7);
    let mut batch = MutationBatch::new();
    batch.delete(&mut gone).unwrap();

    let result = client.post_batch(batch, &PostOptions::default()).await.unwrap();
    assert_eq!(result.errors.delete[&7], "not allowed");
    assert_eq!(gone.meta["delete_error"], "not allowed");
}

#[tokio::test]
async fn test_duplicate_update_id_rejected_at_insert() {
    let mut first = contact("A");
    first.id = Some(5);
    let mut second = contact("B");
    second.id = Some(5);

    let mut batch = MutationBatch::new();
    batch.save(&mut first).unwrap();
    let err = batch.save(&mut second).unwrap_err();
    assert!(matches!(err, ApiError::Client(_)));
}

#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let server = MockServer::start().await;
    let client = test_client(&server);
    let batch: MutationBatch<'_, Contact> = MutationBatch::new();
    let result = client.post_batch(batch, &PostOptions::default()).await.unwrap();
    assert_eq!(result.posted, 0);
    // No auth, no request: the server saw nothing.
    assert!(server.received_requests().await.unwrap().is_empty());
}
