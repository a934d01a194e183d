use dymaxionlabs::resource::estimator::{Args, DEFAULT_CONFIDENCE};
use dymaxionlabs::resource::EstimatorType;
use dymaxionlabs::{Error, Estimator, File};
use serde_json::json;
use wiremock::matchers::{any, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{client_for, estimator_json, file_json, task_json};

fn estimator() -> Estimator {
    serde_json::from_value(estimator_json("u1")).unwrap()
}

#[tokio::test]
async fn create_returns_what_the_server_echoes() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/estimators/"))
        .and(body_json(json!({
            "name": "pools",
            "estimator_type": "OD",
            "classes": ["pool"],
            "metadata": null,
            "configuration": {},
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(estimator_json("u1")))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let mut args = Args::new("pools", "object_detection".parse::<EstimatorType>()?);
    args.classes = vec!["pool".to_owned()];
    let estimator = Estimator::create(&client, &args).await?;
    assert_eq!(estimator.uuid.as_str(), "u1");
    assert_eq!(estimator.name, "pools");
    assert_eq!(estimator.classes, vec!["pool".to_owned()]);
    assert_eq!(estimator.estimator_type, EstimatorType::ObjectDetection);
    assert!(estimator.latest_training_task().is_none());
    Ok(())
}

#[tokio::test]
async fn predict_rejects_bad_arguments_without_requests() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let mut estimator = estimator();
    let no_dirs: &[&str] = &[];
    assert!(matches!(
        estimator.predict_files(&client, no_dirs, 0.5).await,
        Err(Error::InvalidArgument { .. })
    ));
    for confidence in &[-0.1, 1.5, f64::NAN] {
        assert!(matches!(
            estimator.predict_files(&client, &["tiles/"], *confidence).await,
            Err(Error::InvalidArgument { .. })
        ));
    }
    assert!(estimator.prediction_tasks.is_empty());
    Ok(())
}

#[tokio::test]
async fn predict_prepends_the_new_task() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/estimators/u1/predict/"))
        .and(body_json(json!({ "files": ["tiles/a/", "tiles/b/"], "confidence": 0.2 })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "detail": task_json("p2", "PENDING") })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let mut estimator = estimator();
    estimator
        .prediction_tasks
        .push(serde_json::from_value(task_json("p1", "FINISHED"))?);
    let task = estimator
        .predict_files(&client, &["tiles/a/", "tiles/b/"], DEFAULT_CONFIDENCE)
        .await?;
    assert_eq!(task.id.as_str(), "p2");
    let ids: Vec<&str> = estimator
        .prediction_tasks
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(ids, vec!["p2", "p1"]);
    assert_eq!(estimator.latest_prediction_task().map(|t| t.id.as_str()), Some("p2"));
    Ok(())
}

#[tokio::test]
async fn train_prepends_the_new_task() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/estimators/u1/train/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "detail": task_json("t7", "PENDING") })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let mut estimator = estimator();
    estimator.train(&client).await?;
    assert_eq!(
        estimator.latest_training_task().map(|t| t.id.as_str()),
        Some("t7")
    );
    Ok(())
}

#[tokio::test]
async fn labels_need_a_label_or_a_property() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/estimators/u1/load_labels/"))
        .and(body_json(json!({
            "vector_file": "labels/pools.geojson",
            "related_file": "scenes/a.tif",
            "label": null,
            "label_property": "kind",
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "detail": task_json("l1", "PENDING") })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let estimator = estimator();
    let vector: File = serde_json::from_value(file_json("labels/pools.geojson"))?;
    let image: File = serde_json::from_value(file_json("scenes/a.tif"))?;
    assert!(matches!(
        estimator
            .add_labels_for(&client, &vector, &image, None, Some(""))
            .await,
        Err(Error::InvalidArgument { .. })
    ));
    let task = estimator
        .add_labels_for(&client, &vector, &image, None, Some("kind"))
        .await?;
    assert_eq!(task.id.as_str(), "l1");
    Ok(())
}

#[tokio::test]
async fn add_image_does_not_duplicate_paths() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/estimators/u1/"))
        .and(body_json(json!({ "image_files": ["scenes/a.tif", "scenes/b.tif"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(estimator_json("u1")))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let mut estimator = estimator();
    estimator.image_files = vec!["scenes/a.tif".to_owned()];
    let images: Vec<File> = vec![
        serde_json::from_value(file_json("scenes/a.tif"))?,
        serde_json::from_value(file_json("scenes/b.tif"))?,
    ];
    estimator.add_image(&client, &images).await?;
    assert_eq!(estimator.image_files, vec!["scenes/a.tif", "scenes/b.tif"]);
    Ok(())
}

#[tokio::test]
async fn save_patches_editable_fields() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let mut saved = estimator_json("u1");
    saved["name"] = json!("pools v2");
    Mock::given(method("PATCH"))
        .and(path("/estimators/u1/"))
        .and(body_json(json!({
            "name": "pools v2",
            "classes": ["pool"],
            "metadata": null,
            "configuration": {},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(saved))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/estimators/u1/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let mut estimator = estimator();
    estimator.name = "pools v2".to_owned();
    estimator.save(&client).await?;
    assert_eq!(estimator.name, "pools v2");
    estimator.delete(&client).await?;
    Ok(())
}

#[tokio::test]
async fn clones_and_describes() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/estimators/u1/clone/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(estimator_json("u2")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/estimators/u1/describe_annotations/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pool": 12 })))
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server);

    let estimator = estimator();
    assert_eq!(estimator.clone_estimator(&client).await?.uuid.as_str(), "u2");
    assert_eq!(
        estimator.describe_annotations(&client).await?,
        json!({ "pool": 12 })
    );
    Ok(())
}

#[test]
fn unknown_estimator_types_are_rejected() {
    assert!(matches!(
        "classification".parse::<EstimatorType>(),
        Err(Error::UnknownEstimatorType { .. })
    ));
}
