//! Resumable uploads.
//!
//! Large files are sent to a server-issued session URL in fixed-size chunks.
//! The server answers `308` until it has seen every byte, and `200` or `201`
//! once the upload is complete.

use bytes::Bytes;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::StatusCode;
use std::cmp::min;
use std::io::SeekFrom;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio::time::sleep;
use tracing::{debug, trace, warn};
use url::Url;

use crate::client::Client;
use crate::errors::*;
use crate::progress::UploadProgress;
use crate::retry::ChunkRetryStrategy;

/// One mebibyte.
pub const MEGABYTE: u64 = 1024 * 1024;

/// Files strictly larger than this are uploaded in chunks.
pub const MIN_SIZE_RESUMABLE_UPLOAD: u64 = MEGABYTE;

/// The size of each chunk of a resumable upload, a whole number of
/// mebibytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkSize(u64);

impl ChunkSize {
    /// `n` mebibytes. Zero is rejected.
    pub fn megabytes(n: u64) -> Result<ChunkSize> {
        match n.checked_mul(MEGABYTE) {
            Some(bytes) if bytes > 0 => Ok(ChunkSize(bytes)),
            _ => Err(Error::invalid_argument(format!(
                "chunk size of {} MiB is not allowed",
                n
            ))),
        }
    }

    /// The chunk size in bytes.
    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        ChunkSize(MEGABYTE)
    }
}

/// A resumable upload session.
///
/// ```no_run
/// # use dymaxionlabs::{ChunkSize, Client, ResumableUpload};
/// # #[tokio::main]
/// # async fn main() -> dymaxionlabs::Result<()> {
/// # let client = Client::from_env()?;
/// # let session_url = url::Url::parse("https://storage.example.com/session").unwrap();
/// let file = tokio::fs::File::open("scene.tif").await?;
/// let mut upload = ResumableUpload::new(&client, session_url, ChunkSize::default());
/// upload
///     .initiate(file, serde_json::json!({ "name": "scene.tif" }), "image/tiff".parse().unwrap())
///     .await?;
/// while !upload.finished() {
///     let progress = upload.transmit_next_chunk().await?;
///     println!("{:.0}%", progress.fraction() * 100.0);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ResumableUpload<S> {
    http: reqwest::Client,
    session_url: Url,
    chunk_size: u64,
    retry: ChunkRetryStrategy,
    stream: Option<S>,
    total_bytes: Option<u64>,
    bytes_uploaded: u64,
    finished: bool,
    metadata: serde_json::Value,
    content_type: Option<mime::Mime>,
}

impl<S> ResumableUpload<S>
where
    S: AsyncRead + AsyncSeek + Unpin + Send,
{
    /// Bind a new session to `session_url`. Chunk PUTs use `client`'s upload
    /// connection pool and chunk retry policy, but do not send its
    /// credentials. A chunk may take as long as it needs once connected.
    pub fn new(client: &Client, session_url: Url, chunk_size: ChunkSize) -> Self {
        ResumableUpload {
            http: client.upload_http().clone(),
            session_url,
            chunk_size: chunk_size.bytes(),
            retry: client.config().get_chunk_retry().clone(),
            stream: None,
            total_bytes: None,
            bytes_uploaded: 0,
            finished: false,
            metadata: serde_json::Value::Null,
            content_type: None,
        }
    }

    /// Override the chunk retry policy.
    pub fn retry_strategy(mut self, retry: ChunkRetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Record the data to send. The total size is found by seeking to the
    /// end of `stream`. This does not talk to the server.
    pub async fn initiate(
        &mut self,
        mut stream: S,
        metadata: serde_json::Value,
        content_type: mime::Mime,
    ) -> Result<()> {
        let total_bytes = stream.seek(SeekFrom::End(0)).await?;
        stream.seek(SeekFrom::Start(0)).await?;
        debug!(
            "initiating upload of {} bytes to {}",
            total_bytes,
            url_without_credentials(&self.session_url),
        );
        self.stream = Some(stream);
        self.total_bytes = Some(total_bytes);
        self.bytes_uploaded = 0;
        self.finished = false;
        self.metadata = metadata;
        self.content_type = Some(content_type);
        Ok(())
    }

    /// Send the next unsent byte range.
    ///
    /// Retryable statuses are retried with the same bytes, so each range
    /// counts towards `bytes_uploaded` at most once.
    pub async fn transmit_next_chunk(&mut self) -> Result<UploadProgress> {
        if self.finished {
            return Err(Error::UploadAlreadyFinished {});
        }
        let total = self.total_bytes.ok_or(Error::UploadNotInitiated {})?;
        let start = self.bytes_uploaded;
        let len = min(self.chunk_size, total - start);
        let payload = self.read_chunk(start, len).await?;
        let content_range = if len == 0 {
            format!("bytes */{}", total)
        } else {
            format!("bytes {}-{}/{}", start, start + len - 1, total)
        };
        trace!("sending {}", content_range);
        let res = self.put_with_retry(payload, &content_range).await?;
        self.process_response(res, len, total).await?;
        Ok(self.progress())
    }

    /// Has the server acknowledged every byte?
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Bytes acknowledged by the server so far.
    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    /// The size of the payload, once `initiate` has been called.
    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    /// The URL chunks are sent to.
    pub fn session_url(&self) -> &Url {
        &self.session_url
    }

    /// The metadata recorded by `initiate`.
    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// How far along we are.
    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            bytes_uploaded: self.bytes_uploaded,
            total_bytes: self.total_bytes.unwrap_or(0),
        }
    }

    /// Read `len` bytes starting at `start`.
    async fn read_chunk(&mut self, start: u64, len: u64) -> Result<Bytes> {
        let stream = self.stream.as_mut().ok_or(Error::UploadNotInitiated {})?;
        stream.seek(SeekFrom::Start(start)).await?;
        let mut buf = vec![0; len as usize];
        stream.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// PUT one chunk, retrying retryable statuses until the strategy gives
    /// up. Returns the last response received.
    async fn put_with_retry(
        &self,
        payload: Bytes,
        content_range: &str,
    ) -> Result<reqwest::Response> {
        let mut res = self.put(payload.clone(), content_range).await?;
        let mut backoff = self.retry.backoff();
        let mut total_sleep = Duration::from_secs(0);
        let mut num_retries = 0;
        while self.retry.status_is_retryable(res.status())
            && self.retry.retry_allowed(total_sleep, num_retries)
        {
            let wait = backoff.next_wait();
            num_retries += 1;
            total_sleep += wait;
            warn!(
                "{} for chunk {}, retrying in {:?} ({} retries so far)",
                res.status(),
                content_range,
                wait,
                num_retries,
            );
            sleep(wait).await;
            res = self.put(payload.clone(), content_range).await?;
        }
        Ok(res)
    }

    /// A single chunk PUT.
    async fn put(&self, payload: Bytes, content_range: &str) -> Result<reqwest::Response> {
        let mut req = self
            .http
            .put(self.session_url.clone())
            .header(CONTENT_RANGE, content_range)
            .body(payload);
        if let Some(ref content_type) = self.content_type {
            req = req.header(CONTENT_TYPE, content_type.as_ref());
        }
        req.send()
            .await
            .map_err(|e| Error::could_not_access_url(&self.session_url, e))
    }

    /// Update our counters from the server's answer to a chunk of `len`
    /// bytes.
    async fn process_response(
        &mut self,
        res: reqwest::Response,
        len: u64,
        total: u64,
    ) -> Result<()> {
        let status = res.status();
        let uploaded = self.bytes_uploaded + len;
        match status {
            StatusCode::PERMANENT_REDIRECT => {
                if let Some(range) = res.headers().get(RANGE) {
                    let end = range
                        .to_str()
                        .ok()
                        .and_then(parse_range_end)
                        .ok_or_else(|| {
                            self.invalid_response(format!("cannot parse Range {:?}", range))
                        })?;
                    if end + 1 != uploaded {
                        return Err(self.invalid_response(format!(
                            "server has {} bytes but we sent {}",
                            end + 1,
                            uploaded,
                        )));
                    }
                }
                self.bytes_uploaded = uploaded;
                Ok(())
            }
            StatusCode::OK | StatusCode::CREATED => {
                if uploaded != total {
                    return Err(self.invalid_response(format!(
                        "upload completed after {} of {} bytes",
                        uploaded, total,
                    )));
                }
                self.bytes_uploaded = uploaded;
                self.finished = true;
                debug!("upload of {} bytes complete", total);
                Ok(())
            }
            _ => {
                let body = res.text().await.unwrap_or_default();
                Err(Error::from_status(&self.session_url, status, body))
            }
        }
    }

    fn invalid_response(&self, message: String) -> Error {
        Error::InvalidUploadResponse {
            url: url_without_credentials(&self.session_url),
            message,
        }
    }
}

/// Extract `N` from a `Range: bytes=0-N` header.
fn parse_range_end(range: &str) -> Option<u64> {
    let (_, end) = range.strip_prefix("bytes=")?.split_once('-')?;
    end.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_is_whole_mebibytes() {
        assert_eq!(ChunkSize::default().bytes(), MEGABYTE);
        assert_eq!(ChunkSize::megabytes(3).unwrap().bytes(), 3 * MEGABYTE);
        assert!(ChunkSize::megabytes(0).is_err());
        assert!(ChunkSize::megabytes(u64::MAX).is_err());
    }

    #[test]
    fn parses_range_headers() {
        assert_eq!(parse_range_end("bytes=0-1048575"), Some(1_048_575));
        assert_eq!(parse_range_end("bytes=0-"), None);
        assert_eq!(parse_range_end("0-10"), None);
    }
}
