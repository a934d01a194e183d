//! Files in project storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use url::Url;

use super::{Detail, Extra, Task};
use crate::client::{ApiRequest, Client};
use crate::errors::*;
use crate::progress::{ProgressOptions, UploadProgress};
use crate::upload::{ChunkSize, ResumableUpload, MIN_SIZE_RESUMABLE_UPLOAD};

/// The storage API lives under this path.
const BASE_PATH: &str = "/storage";

/// The default edge length of tiles, in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 500;

/// A file stored in the project's storage.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct File {
    /// The file name.
    pub name: String,

    /// The full path in storage.
    pub path: String,

    /// File metadata, such as raster bounds.
    #[serde(default)]
    pub metadata: Option<Value>,

    /// Any other fields sent by the server.
    #[serde(flatten)]
    pub extra: Extra,

    /// The most recent tiling job started by `tiling`.
    #[serde(skip)]
    pub tiling_job: Option<Task>,
}

/// The body of `create-resumable-upload`.
#[derive(Debug, Deserialize)]
struct ResumableSession {
    session_url: String,
}

impl File {
    /// List the files matching `path_glob`, such as `"foo/b*/images/*.tif"`.
    pub async fn all(client: &Client, path_glob: &str) -> Result<Vec<File>> {
        let req = ApiRequest::get(format!("{}/files/", BASE_PATH)).query("path", path_glob);
        let files: Option<Vec<File>> = client.get_json(req).await?;
        Ok(files.unwrap_or_default())
    }

    /// Fetch the file at `path`.
    pub async fn get(client: &Client, path: &str) -> Result<File> {
        let req = ApiRequest::get(format!("{}/file/", BASE_PATH)).query("path", path);
        let detail: Detail<File> = client.get_json(req).await?;
        Ok(detail.detail)
    }

    /// Fetch the file at `path`, or `None` if there isn't one.
    pub async fn get_opt(client: &Client, path: &str) -> Result<Option<File>> {
        match File::get(client, path).await {
            Ok(file) => Ok(Some(file)),
            Err(ref err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Upload the local file at `input_path` to `storage_path`.
    ///
    /// If `storage_path` is empty or ends with `/`, the local file name is
    /// appended to it. Files larger than 1 MiB are sent as a resumable
    /// upload in chunks of `chunk_size`, and `progress_options` hears about
    /// each chunk. Smaller files are sent in a single request.
    pub async fn upload(
        client: &Client,
        input_path: &Path,
        storage_path: &str,
        chunk_size: ChunkSize,
        progress_options: &mut ProgressOptions<'_, UploadProgress>,
    ) -> Result<File> {
        let size = fs::metadata(input_path)
            .await
            .map_err(|e| Error::could_not_read_file(input_path, e))?
            .len();
        let file_name = file_name(input_path)?;
        let storage_path = storage_path_for(storage_path, &file_name);
        if size > MIN_SIZE_RESUMABLE_UPLOAD {
            debug!("resumable upload of {} ({} bytes)", storage_path, size);
            Self::resumable_upload(
                client,
                input_path,
                &file_name,
                &storage_path,
                size,
                chunk_size,
                progress_options,
            )
            .await
        } else {
            debug!("single-shot upload of {} ({} bytes)", storage_path, size);
            Self::single_shot_upload(
                client,
                input_path,
                &file_name,
                &storage_path,
                size,
                progress_options,
            )
            .await
        }
    }

    async fn single_shot_upload(
        client: &Client,
        input_path: &Path,
        file_name: &str,
        storage_path: &str,
        size: u64,
        progress_options: &mut ProgressOptions<'_, UploadProgress>,
    ) -> Result<File> {
        let data = fs::read(input_path)
            .await
            .map_err(|e| Error::could_not_read_file(input_path, e))?;
        let req = ApiRequest::post(format!("{}/upload/", BASE_PATH)).multipart_file(
            vec![("path".to_owned(), storage_path.to_owned())],
            "file",
            file_name,
            guess_mime_type(input_path),
            data.into(),
        );
        let detail: Detail<File> = client.request(req).await?.json()?;
        progress_options.notify(&UploadProgress {
            bytes_uploaded: size,
            total_bytes: size,
        })?;
        Ok(detail.detail)
    }

    async fn resumable_upload(
        client: &Client,
        input_path: &Path,
        file_name: &str,
        storage_path: &str,
        size: u64,
        chunk_size: ChunkSize,
        progress_options: &mut ProgressOptions<'_, UploadProgress>,
    ) -> Result<File> {
        let stream = fs::File::open(input_path)
            .await
            .map_err(|e| Error::could_not_read_file(input_path, e))?;

        let req = ApiRequest::post(format!("{}/create-resumable-upload/", BASE_PATH))
            .query("path", storage_path)
            .query("size", size);
        let session: ResumableSession = client.request(req).await?.json()?;
        let session_url: Url = session
            .session_url
            .parse()
            .map_err(|e| Error::could_not_parse_url(session.session_url.clone(), e))?;

        let mut upload = ResumableUpload::new(client, session_url, chunk_size);
        upload
            .initiate(
                stream,
                serde_json::json!({ "name": file_name }),
                guess_mime_type(input_path),
            )
            .await
            .map_err(|e| Error::could_not_read_file(input_path, e))?;
        while !upload.finished() {
            let progress = upload.transmit_next_chunk().await?;
            progress_options.notify(&progress)?;
        }

        let req = ApiRequest::post(format!("{}/check-completed-file/", BASE_PATH))
            .query("path", storage_path);
        client.request(req).await?;
        File::get(client, storage_path).await
    }

    /// Delete this file from storage.
    pub async fn delete(&self, client: &Client) -> Result<()> {
        let req = ApiRequest::delete(format!("{}/file/", BASE_PATH)).query("path", &self.path);
        client.request(req).await?;
        debug!("deleted {}", self.path);
        Ok(())
    }

    /// Download this file into `output_dir`, creating it if needed. Returns
    /// the path of the local copy.
    pub async fn download(&self, client: &Client, output_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir)
            .await
            .map_err(|e| Error::could_not_write_file(output_dir, e))?;
        let req = ApiRequest::get(format!("{}/download/", BASE_PATH)).query("path", &self.path);
        let data = client.get_bytes(req).await?;
        let output_file = output_dir.join(&self.name);
        fs::write(&output_file, &data)
            .await
            .map_err(|e| Error::could_not_write_file(&output_file, e))?;
        Ok(output_file)
    }

    /// Start cutting this image into `tile_size` × `tile_size` tiles, written
    /// to the storage directory `output_path`.
    pub async fn tiling(
        &mut self,
        client: &Client,
        output_path: &str,
        tile_size: u32,
    ) -> Result<Task> {
        if output_path.is_empty() {
            return Err(Error::invalid_argument("tiling output path must not be empty"));
        }
        let body = serde_json::json!({
            "path": self.path,
            "output_path": output_path,
            "tile_size": tile_size,
        });
        let req = ApiRequest::post("/estimators/start_tiling_job/").json(&body)?;
        let detail: Detail<Task> = client.request(req).await?.json()?;
        self.tiling_job = Some(detail.detail.clone());
        Ok(detail.detail)
    }
}

/// The final component of `path`, as a string.
fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_owned())
        .ok_or_else(|| {
            Error::invalid_argument(format!("cannot upload {}: no file name", path.display()))
        })
}

/// Where in storage should `file_name` go?
fn storage_path_for(storage_path: &str, file_name: &str) -> String {
    if storage_path.trim().is_empty() {
        file_name.to_owned()
    } else if storage_path.ends_with('/') {
        format!("{}{}", storage_path, file_name)
    } else {
        storage_path.to_owned()
    }
}

/// Guess a content type from the file extension.
fn guess_mime_type(path: &Path) -> mime::Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_paths_get_the_local_name_when_needed() {
        assert_eq!(storage_path_for("", "a.tif"), "a.tif");
        assert_eq!(storage_path_for("  ", "a.tif"), "a.tif");
        assert_eq!(storage_path_for("scenes/", "a.tif"), "scenes/a.tif");
        assert_eq!(storage_path_for("scenes/b.tif", "a.tif"), "scenes/b.tif");
    }

    #[test]
    fn guesses_common_types() {
        assert_eq!(guess_mime_type(Path::new("x/a.tif")).as_ref(), "image/tiff");
        assert_eq!(guess_mime_type(Path::new("a.png")).as_ref(), "image/png");
        assert_eq!(guess_mime_type(Path::new("a.json")), mime::APPLICATION_JSON);
        assert_eq!(guess_mime_type(Path::new("noext")), mime::APPLICATION_OCTET_STREAM);
    }
}
