//! `dymaxion`: upload files and drive Dymaxion Labs jobs from the shell.
//!
//! Credentials come from `DYM_API_KEY` (and optionally `DYM_API_URL` and
//! `DYM_PROJECT_ID`). Listings are written to stdout as line-delimited JSON.
//! Set `RUST_LOG=dymaxionlabs=debug` to see what the client is doing.

use anyhow::{bail, Context, Result};
use dymaxionlabs::resource::estimator::{self, EstimatorType};
use dymaxionlabs::resource::Id;
use dymaxionlabs::{
    ChunkSize, Client, Estimator, File, ProgressOptions, Task, UploadProgress, WaitOptions,
};
use futures::SinkExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;
use tokio::io;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod key_value;
mod line_delimited_json_codec;

use key_value::KeyValue;
use line_delimited_json_codec::LineDelimitedJsonCodec;

/// Our command-line arguments.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "dymaxion",
    about = "Upload files and run Dymaxion Labs estimators."
)]
struct Opt {
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Upload a local file to project storage.
    Upload {
        /// The file to upload.
        #[structopt(parse(from_os_str))]
        local: PathBuf,

        /// Where to put it. A path ending in "/" is treated as a directory.
        #[structopt(default_value = "")]
        storage_path: String,

        /// Chunk size for resumable uploads, in MiB.
        #[structopt(long = "chunk-size", default_value = "1")]
        chunk_size: u64,
    },

    /// List files in project storage.
    Files {
        /// Only list files matching this glob.
        #[structopt(default_value = "*")]
        glob: String,
    },

    /// List estimators.
    Estimators,

    /// Create a new estimator.
    CreateEstimator {
        /// A human-readable name.
        name: String,

        /// "object_detection" or "segmentation".
        #[structopt(long = "type", default_value = "object_detection")]
        estimator_type: EstimatorType,

        /// A class to detect. May be repeated.
        #[structopt(long = "class")]
        classes: Vec<String>,

        /// Metadata of the form "key=value". Values are parsed as JSON if
        /// possible, and as strings otherwise. May be repeated.
        #[structopt(long = "metadata")]
        metadata: Vec<KeyValue>,
    },

    /// Start training an estimator.
    Train {
        /// The estimator's UUID.
        uuid: Id<Estimator>,
    },

    /// Start a prediction over directories of tiles.
    Predict {
        /// The estimator's UUID.
        uuid: Id<Estimator>,

        /// Storage directories containing tiles.
        #[structopt(required = true)]
        dirs: Vec<String>,

        /// Minimum confidence score, between 0 and 1.
        #[structopt(long = "confidence", default_value = "0.2")]
        confidence: f64,
    },

    /// Inspect and control tasks.
    Task(TaskCommand),
}

#[derive(Debug, StructOpt)]
enum TaskCommand {
    /// Print a task.
    Status { id: Id<Task> },

    /// Wait for a task to stop running, then print it.
    Wait {
        id: Id<Task>,

        /// Seconds between polls.
        #[structopt(long = "poll-interval", default_value = "5")]
        poll_interval: f64,

        /// Give up after this many seconds.
        #[structopt(long = "timeout")]
        timeout: Option<f64>,
    },

    /// Cancel a task.
    Cancel { id: Id<Task> },

    /// Download a finished task's artifacts as a zip file.
    Artifacts {
        id: Id<Task>,

        /// Directory to write the zip file to.
        #[structopt(long = "output", short = "o", default_value = ".", parse(from_os_str))]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::from_args();
    debug!("{:?}", opt);
    let client = Client::from_env().context("could not configure client")?;
    match opt.cmd {
        Command::Upload {
            local,
            storage_path,
            chunk_size,
        } => upload(&client, local, &storage_path, chunk_size).await,
        Command::Files { glob } => write_json_lines(File::all(&client, &glob).await?).await,
        Command::Estimators => write_json_lines(Estimator::all(&client).await?).await,
        Command::CreateEstimator {
            name,
            estimator_type,
            classes,
            metadata,
        } => {
            let mut args = estimator::Args::new(name, estimator_type);
            args.classes = classes;
            if !metadata.is_empty() {
                args.metadata = Some(Value::Object(KeyValue::into_object(metadata)));
            }
            write_json_lines(vec![Estimator::create(&client, &args).await?]).await
        }
        Command::Train { uuid } => {
            let mut estimator = Estimator::get(&client, &uuid).await?;
            write_json_lines(vec![estimator.train(&client).await?]).await
        }
        Command::Predict {
            uuid,
            dirs,
            confidence,
        } => {
            let mut estimator = Estimator::get(&client, &uuid).await?;
            let task = estimator.predict_files(&client, &dirs[..], confidence).await?;
            write_json_lines(vec![task]).await
        }
        Command::Task(cmd) => task(&client, cmd).await,
    }
}

/// Upload `local`, showing a progress bar on stderr.
async fn upload(client: &Client, local: PathBuf, storage_path: &str, chunk_size: u64) -> Result<()> {
    let chunk_size = ChunkSize::megabytes(chunk_size)?;
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        )?
        .progress_chars("#>-"),
    );
    let file = {
        let mut on_progress = |p: &UploadProgress| -> dymaxionlabs::Result<()> {
            bar.set_length(p.total_bytes);
            bar.set_position(p.bytes_uploaded);
            Ok(())
        };
        let mut progress = ProgressOptions::default().callback(&mut on_progress);
        File::upload(client, &local, storage_path, chunk_size, &mut progress).await
    };
    match file {
        Ok(file) => {
            bar.finish();
            write_json_lines(vec![file]).await
        }
        Err(err) => {
            bar.abandon();
            Err(err).with_context(|| format!("could not upload {}", local.display()))
        }
    }
}

async fn task(client: &Client, cmd: TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::Status { id } => write_json_lines(vec![Task::get(client, &id).await?]).await,
        TaskCommand::Wait {
            id,
            poll_interval,
            timeout,
        } => {
            let token = CancellationToken::new();
            let interrupted = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, no longer waiting");
                    interrupted.cancel();
                }
            });
            let options = WaitOptions::default()
                .retry_interval(seconds(poll_interval, "--poll-interval")?)
                .timeout(timeout.map(|t| seconds(t, "--timeout")).transpose()?)
                .allowed_errors(5)
                .cancellation_token(token);

            let spinner = ProgressBar::new_spinner();
            spinner.enable_steady_tick(Duration::from_millis(120));
            let mut task = Task::get(client, &id).await?;
            {
                let mut on_poll = |task: &Task| -> dymaxionlabs::Result<()> {
                    spinner.set_message(format!("{} {}", task.id, task.state));
                    Ok(())
                };
                let mut progress = ProgressOptions::default().callback(&mut on_poll);
                task.wait_until_finished_opt(client, &options, &mut progress)
                    .await?;
            }
            spinner.finish_and_clear();
            let (id, state) = (task.id.clone(), task.state.clone());
            write_json_lines(vec![task]).await?;
            if state.is_err() {
                bail!("task {} stopped in state {}", id, state);
            }
            Ok(())
        }
        TaskCommand::Cancel { id } => {
            let mut task = Task::get(client, &id).await?;
            task.cancel(client).await?;
            write_json_lines(vec![task]).await
        }
        TaskCommand::Artifacts { id, output } => {
            let mut task = Task::get(client, &id).await?;
            let path = task.download_artifacts(client, &output).await?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// Convert a command-line number of seconds to a `Duration`.
fn seconds(secs: f64, flag: &str) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        bail!("{} must be a non-negative number of seconds", flag);
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Write `items` to stdout, one JSON value per line.
async fn write_json_lines<T: Serialize>(items: Vec<T>) -> Result<()> {
    let mut out = FramedWrite::new(io::stdout(), LineDelimitedJsonCodec::new());
    for item in items {
        out.send(item).await?;
    }
    Ok(())
}
