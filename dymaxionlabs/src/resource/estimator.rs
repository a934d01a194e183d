//! Trainable models.

use serde::de::Unexpected;
use serde::{self, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::result;
use std::str::FromStr;
use tracing::debug;

use super::id::*;
use super::{Detail, Extra, File, Resource, Task, Updatable};
use crate::client::{ApiRequest, Client};
use crate::errors::*;

/// The default confidence threshold for `predict_files`.
pub const DEFAULT_CONFIDENCE: f64 = 0.2;

/// A model which can be trained on annotated images and then used to
/// predict on new ones.
#[derive(Clone, Debug, Deserialize, Resource, Serialize, Updatable)]
#[api_name = "estimators"]
pub struct Estimator {
    /// The ID of this estimator.
    #[resource_id]
    pub uuid: Id<Estimator>,

    /// A human-readable name.
    #[updatable]
    pub name: String,

    /// The labels this estimator detects.
    #[serde(default)]
    #[updatable]
    pub classes: Vec<String>,

    /// What kind of model this is.
    pub estimator_type: EstimatorType,

    /// User-defined metadata.
    #[serde(default)]
    #[updatable]
    pub metadata: Option<Value>,

    /// Storage paths of the images used for training.
    #[serde(default)]
    #[updatable]
    pub image_files: Vec<String>,

    /// Training configuration.
    #[serde(default)]
    #[updatable]
    pub configuration: Option<Value>,

    /// Training tasks, newest first.
    #[serde(default)]
    pub training_tasks: Vec<Task>,

    /// Prediction tasks, newest first.
    #[serde(default)]
    pub prediction_tasks: Vec<Task>,

    /// Any other fields sent by the server.
    #[serde(flatten)]
    pub extra: Extra,
}

impl Estimator {
    /// Fetch every estimator in the current project.
    pub async fn all(client: &Client) -> Result<Vec<Estimator>> {
        client.list().await
    }

    /// Fetch the estimator with the specified UUID.
    pub async fn get(client: &Client, uuid: &Id<Estimator>) -> Result<Estimator> {
        client.fetch(uuid).await
    }

    /// Create a new estimator.
    pub async fn create(client: &Client, args: &Args) -> Result<Estimator> {
        client.create(args).await
    }

    /// Send our name, classes, metadata and configuration to the server,
    /// and replace ourselves with its answer.
    pub async fn save(&mut self, client: &Client) -> Result<&mut Self> {
        let update = EstimatorUpdate {
            name: Some(self.name.clone()),
            classes: Some(self.classes.clone()),
            metadata: Some(self.metadata.clone()),
            configuration: Some(self.configuration.clone()),
            ..EstimatorUpdate::default()
        };
        *self = client.update(&self.uuid, &update).await?;
        Ok(self)
    }

    /// Delete this estimator.
    pub async fn delete(&self, client: &Client) -> Result<()> {
        client.delete(&self.uuid).await
    }

    /// Add `images` to the training set. Images already present are not
    /// added twice.
    pub async fn add_image(&mut self, client: &Client, images: &[File]) -> Result<&mut Self> {
        let mut image_files = self.image_files.clone();
        for image in images {
            if !image_files.contains(&image.path) {
                image_files.push(image.path.clone());
            }
        }
        let update = EstimatorUpdate {
            image_files: Some(image_files.clone()),
            ..EstimatorUpdate::default()
        };
        debug!("PATCH {}: {:?}", self.uuid.path(), update);
        client
            .request(ApiRequest::patch(self.uuid.path()).json(&update)?)
            .await?;
        self.image_files = image_files;
        Ok(self)
    }

    /// Load annotations for `image_file` from the polygons in
    /// `vector_file`. Each annotation is labelled `label`, or with the value
    /// of its `label_property`. At least one of the two is required.
    pub async fn add_labels_for(
        &self,
        client: &Client,
        vector_file: &File,
        image_file: &File,
        label: Option<&str>,
        label_property: Option<&str>,
    ) -> Result<Task> {
        let is_blank = |s: Option<&str>| s.map(str::is_empty).unwrap_or(true);
        if is_blank(label) && is_blank(label_property) {
            return Err(Error::invalid_argument(
                "either a label or a label property is required",
            ));
        }
        let body = serde_json::json!({
            "vector_file": vector_file.path,
            "related_file": image_file.path,
            "label": label,
            "label_property": label_property,
        });
        self.start_job("load_labels", Some(body), client).await
    }

    /// Start training on every image and annotation of this estimator.
    pub async fn train(&mut self, client: &Client) -> Result<Task> {
        let task = self.start_job("train", None, client).await?;
        self.training_tasks.insert(0, task.clone());
        Ok(task)
    }

    /// Start predicting on the tiles in `tile_dirs`, keeping results with
    /// at least `confidence`. See `DEFAULT_CONFIDENCE`.
    pub async fn predict_files<S: AsRef<str>>(
        &mut self,
        client: &Client,
        tile_dirs: &[S],
        confidence: f64,
    ) -> Result<Task> {
        if tile_dirs.is_empty() {
            return Err(Error::invalid_argument("no tile directories to predict on"));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::invalid_argument(format!(
                "confidence must be between 0.0 and 1.0, not {}",
                confidence
            )));
        }
        let files: Vec<&str> = tile_dirs.iter().map(|dir| dir.as_ref()).collect();
        let body = serde_json::json!({ "files": files, "confidence": confidence });
        let task = self.start_job("predict", Some(body), client).await?;
        self.prediction_tasks.insert(0, task.clone());
        Ok(task)
    }

    /// Create a copy of this estimator on the server.
    pub async fn clone_estimator(&self, client: &Client) -> Result<Estimator> {
        let path = format!("{}clone/", self.uuid.path());
        client.request(ApiRequest::post(path)).await?.json()
    }

    /// Summarize the annotations attached to this estimator.
    pub async fn describe_annotations(&self, client: &Client) -> Result<Value> {
        let path = format!("{}describe_annotations/", self.uuid.path());
        client.get_json(ApiRequest::get(path)).await
    }

    /// The most recent training task, if any.
    pub fn latest_training_task(&self) -> Option<&Task> {
        self.training_tasks.first()
    }

    /// The most recent prediction task, if any.
    pub fn latest_prediction_task(&self) -> Option<&Task> {
        self.prediction_tasks.first()
    }

    /// POST to one of our action endpoints and return the task it starts.
    async fn start_job(&self, action: &str, body: Option<Value>, client: &Client) -> Result<Task> {
        let mut req = ApiRequest::post(format!("{}{}/", self.uuid.path(), action));
        if let Some(body) = body {
            req = req.json(&body)?;
        }
        let detail: Detail<Task> = client.request(req).await?.json()?;
        debug!("{} on {} started task {}", action, self.uuid, detail.detail.id);
        Ok(detail.detail)
    }
}

/// Arguments used to create an estimator.
#[derive(Debug, Serialize)]
pub struct Args {
    /// A human-readable name.
    pub name: String,

    /// What kind of model to build.
    pub estimator_type: EstimatorType,

    /// The labels to detect.
    pub classes: Vec<String>,

    /// User-defined metadata.
    pub metadata: Option<Value>,

    /// Training configuration.
    pub configuration: Value,

    /// Placeholder to allow extensibility without breaking the API.
    #[serde(skip)]
    _placeholder: (),
}

impl Args {
    /// Arguments for an estimator with no classes, metadata or
    /// configuration.
    pub fn new<S: Into<String>>(name: S, estimator_type: EstimatorType) -> Args {
        Args {
            name: name.into(),
            estimator_type,
            classes: vec![],
            metadata: None,
            configuration: Value::Object(Default::default()),
            _placeholder: (),
        }
    }
}

impl super::Args for Args {
    type Resource = Estimator;
}

/// The kinds of estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EstimatorType {
    /// Finds and boxes objects.
    ObjectDetection,
    /// Labels every pixel.
    Segmentation,
}

impl EstimatorType {
    /// The code used on the wire.
    pub fn code(self) -> &'static str {
        match self {
            EstimatorType::ObjectDetection => "OD",
            EstimatorType::Segmentation => "SG",
        }
    }
}

impl FromStr for EstimatorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "object_detection" | "OD" => Ok(EstimatorType::ObjectDetection),
            "segmentation" | "SG" => Ok(EstimatorType::Segmentation),
            _ => Err(Error::UnknownEstimatorType {
                type_name: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for EstimatorType {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorType::ObjectDetection => fmt.write_str("object_detection"),
            EstimatorType::Segmentation => fmt.write_str("segmentation"),
        }
    }
}

impl<'de> Deserialize<'de> for EstimatorType {
    fn deserialize<D>(deserializer: D) -> result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            <D::Error as serde::de::Error>::invalid_value(
                Unexpected::Str(&s),
                &"an estimator type such as \"OD\" or \"object_detection\"",
            )
        })
    }
}

impl Serialize for EstimatorType {
    fn serialize<S>(&self, serializer: S) -> result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.code().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimator_types_parse_names_and_codes() {
        assert_eq!(
            "object_detection".parse::<EstimatorType>().unwrap(),
            EstimatorType::ObjectDetection
        );
        assert_eq!("SG".parse::<EstimatorType>().unwrap(), EstimatorType::Segmentation);
        assert!(matches!(
            "classification".parse::<EstimatorType>(),
            Err(Error::UnknownEstimatorType { .. })
        ));
    }

    #[test]
    fn create_args_use_wire_codes() {
        let mut args = Args::new("trees", EstimatorType::ObjectDetection);
        args.classes = vec!["tree".to_owned()];
        let body = serde_json::to_value(&args).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "name": "trees",
                "estimator_type": "OD",
                "classes": ["tree"],
                "metadata": null,
                "configuration": {},
            })
        );
    }

    #[test]
    fn update_only_sends_what_changed() {
        let update = EstimatorUpdate {
            name: Some("renamed".to_owned()),
            metadata: Some(None),
            ..EstimatorUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({ "name": "renamed", "metadata": null })
        );
    }
}
