use dymaxionlabs::resource::Id;
use dymaxionlabs::retry::TransportRetry;
use dymaxionlabs::{ApiRequest, Error, Task};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{client_for, client_with_config, task_json, Sequence};

#[tokio::test]
async fn sends_the_api_key() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/t1/"))
        .and(header("Authorization", "Api-Key test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_json("t1", "RUNNING")))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let id: Id<Task> = "t1".parse()?;
    let task = Task::get(&client, &id).await?;
    assert_eq!(task.id, id);
    Ok(())
}

#[tokio::test]
async fn retries_idempotent_requests() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ping/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let res: Value = client.get_json(ApiRequest::get("/ping/")).await?;
    assert_eq!(res, json!({ "ok": true }));
    Ok(())
}

#[tokio::test]
async fn retries_a_get_that_timed_out() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping/"))
        .respond_with(Sequence::new(vec![
            ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": false }))
                .set_delay(Duration::from_millis(500)),
            ResponseTemplate::new(200).set_body_json(json!({ "ok": true })),
        ]))
        .expect(2)
        .mount(&server)
        .await;
    let client = client_with_config(&server, |config| {
        config.timeout(Duration::from_millis(100))
    });

    let res: Value = client.get_json(ApiRequest::get("/ping/")).await?;
    assert_eq!(res, json!({ "ok": true }));
    Ok(())
}

#[tokio::test]
async fn only_json_calls_have_a_deadline() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"zip bytes".to_vec())
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;
    let client = client_with_config(&server, |config| {
        config
            .timeout(Duration::from_millis(100))
            .retry(TransportRetry::disabled())
    });

    let err = client
        .request(ApiRequest::get("/slow.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CouldNotAccessUrl { .. }));
    assert!(err.might_be_temporary());
    let data = client.get_bytes(ApiRequest::get("/slow.zip")).await?;
    assert_eq!(&data[..], b"zip bytes");
    Ok(())
}

#[tokio::test]
async fn gives_up_after_three_retries() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping/"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = client.request(ApiRequest::get("/ping/")).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest { .. }));
    assert!(err.might_be_temporary());
    Ok(())
}

#[tokio::test]
async fn never_retries_post() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/estimators/u1/train/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = client
        .request(ApiRequest::post("/estimators/u1/train/"))
        .await
        .unwrap_err();
    match err {
        Error::InternalServerError { body, .. } => assert_eq!(body, "busy"),
        other => panic!("unexpected error: {}", other),
    }
    Ok(())
}

#[tokio::test]
async fn classifies_error_statuses() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    for (route, status) in &[("/a/", 404), ("/b/", 400), ("/c/", 500), ("/d/", 201)] {
        Mock::given(method("POST"))
            .and(path(*route))
            .respond_with(ResponseTemplate::new(*status))
            .mount(&server)
            .await;
    }
    let client = client_for(&server);

    let post = |route: &'static str| client.request(ApiRequest::post(route));
    assert!(matches!(post("/a/").await, Err(Error::NotFound { .. })));
    assert!(matches!(post("/b/").await, Err(Error::BadRequest { .. })));
    assert!(matches!(
        post("/c/").await,
        Err(Error::InternalServerError { .. })
    ));
    assert_eq!(post("/d/").await?.status().as_u16(), 201);
    Ok(())
}

#[tokio::test]
async fn no_content_is_empty() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/tasks/t1/"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let res = client.request(ApiRequest::delete("/tasks/t1/")).await?;
    assert!(res.is_empty());
    assert_eq!(res.json::<Value>()?, Value::Null);
    Ok(())
}

#[tokio::test]
async fn follows_pagination_on_our_own_host() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [task_json("t3", "FAILED")],
            "next": null,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tasks/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [task_json("t1", "RUNNING"), task_json("t2", "FINISHED")],
            "next": "http://internal.invalid:8000/tasks/?page=2",
        })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let tasks = Task::all(&client).await?;
    let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2", "t3"]);
    Ok(())
}
