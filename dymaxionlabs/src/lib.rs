//! A Rust client for the Dymaxion Labs geospatial analysis API.
//!
//! Dymaxion Labs trains object detection and segmentation models on
//! satellite and aerial imagery. This library lets you upload imagery, train
//! estimators, run predictions and collect the results from Rust.
//!
//! ```no_run
//! use dymaxionlabs::{
//!     resource::{estimator, EstimatorType, Id},
//!     ChunkSize, Client, Config, Estimator, File, ProgressOptions, WaitOptions,
//! };
//! use std::{path::Path, time::Duration};
//!
//! # #[tokio::main]
//! # async fn main() -> dymaxionlabs::Result<()> {
//! // Read `DYM_API_KEY` (and optionally `DYM_API_URL`) from the environment.
//! let client = Client::new(Config::from_env()?)?;
//!
//! // Upload an image. Large files are sent in resumable chunks.
//! let image = File::upload(
//!     &client,
//!     Path::new("scene.tif"),
//!     "scenes/",
//!     ChunkSize::default(),
//!     &mut ProgressOptions::default(),
//! )
//! .await?;
//!
//! // Create an estimator and train it.
//! let args = estimator::Args::new("pools", EstimatorType::ObjectDetection);
//! let mut estimator = Estimator::create(&client, &args).await?;
//! estimator.add_image(&client, &[image]).await?;
//! let mut task = estimator.train(&client).await?;
//!
//! // Training takes a while.
//! let options = WaitOptions::default().timeout(Duration::from_secs(4 * 3600));
//! task.wait_until_finished(&client, &options).await?;
//! println!("training is {}", task.state);
//! #
//! #   Ok(())
//! # }
//! ```
//!
//! For more information, see the [Dymaxion Labs API][] and our
//! [example code][].
//!
//! [Dymaxion Labs API]: https://api.dymaxionlabs.com
//! [example code]: https://github.com/dymaxionlabs/dymaxionlabs-rs/tree/master/dymaxionlabs/examples

#![warn(missing_docs)]

#[macro_use]
extern crate dymaxionlabs_derive;

pub use client::{ApiRequest, ApiResponse, Client};
pub use config::{
    Config, API_KEY_VAR, API_URL_VAR, DEFAULT_API_URL, DEFAULT_TIMEOUT, PROJECT_ID_VAR,
};
pub use errors::*;
pub use progress::{ProgressCallback, ProgressOptions, UploadProgress};
pub use resource::{Estimator, File, Task, TaskState};
pub use upload::{ChunkSize, ResumableUpload};
pub use wait::WaitOptions;

#[macro_use]
pub mod wait;
mod client;
mod config;
mod errors;
mod progress;
pub mod resource;
pub mod retry;
pub mod upload;
