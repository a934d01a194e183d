//! Upload an image, tile it, run an estimator over the tiles and download
//! the results.
//!
//! Usage: `predict_and_wait <IMAGE> <ESTIMATOR_UUID> <OUTPUT_DIR>`

use anyhow::{bail, Context, Result};
use dymaxionlabs::resource::estimator::DEFAULT_CONFIDENCE;
use dymaxionlabs::resource::file::DEFAULT_TILE_SIZE;
use dymaxionlabs::resource::Id;
use dymaxionlabs::{ChunkSize, Client, Estimator, File, ProgressOptions, UploadProgress, WaitOptions};
use std::env;
use std::path::Path;
use std::process;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{
    fmt::{format::FmtSpan, Subscriber},
    prelude::*,
    EnvFilter,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Configure tracing.
    let filter = EnvFilter::from_default_env();
    Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_env_filter(filter)
        .finish()
        .init();

    let args: Vec<_> = env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: predict_and_wait <IMAGE> <ESTIMATOR_UUID> <OUTPUT_DIR>");
        process::exit(1);
    }
    let image = Path::new(&args[1]);
    let uuid: Id<Estimator> = args[2].parse().context("bad estimator UUID")?;
    let output_dir = Path::new(&args[3]);

    let client = Client::from_env().context("pass DYM_API_KEY as an environment variable")?;

    let mut report = |p: &UploadProgress| -> dymaxionlabs::Result<()> {
        info!("uploaded {:.0}%", 100.0 * p.fraction());
        Ok(())
    };
    let mut progress = ProgressOptions::default().callback(&mut report);
    let mut file = File::upload(&client, image, "predict/", ChunkSize::default(), &mut progress)
        .await
        .context("could not upload image")?;
    info!("uploaded {}", file.path);

    let options = WaitOptions::default()
        .retry_interval(Duration::from_secs(10))
        .allowed_errors(5);
    let tiles = format!("predict/tiles/{}/", file.name);
    let mut tiling = file.tiling(&client, &tiles, DEFAULT_TILE_SIZE).await?;
    tiling.wait_until_finished(&client, &options).await?;
    if !tiling.state.is_finished() {
        bail!("tiling task {} stopped in state {}", tiling.id, tiling.state);
    }

    let mut estimator = Estimator::get(&client, &uuid).await?;
    let mut task = estimator
        .predict_files(&client, &[tiles], DEFAULT_CONFIDENCE)
        .await?;
    info!("started prediction task {}", task.id);
    task.wait_until_finished(&client, &options).await?;
    if !task.state.is_finished() {
        bail!("prediction task {} stopped in state {}", task.id, task.state);
    }

    let zip = task.download_artifacts(&client, output_dir).await?;
    println!("{}", zip.display());
    Ok(())
}
