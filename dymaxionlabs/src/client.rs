//! A client connection to the Dymaxion Labs API.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{multipart, redirect, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::Config;
use crate::errors::*;
use crate::resource::{self, Id, Resource, Updatable};

/// A request to the API, relative to the configured base URL.
#[derive(Debug)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: RequestBody,
    deadline: bool,
}

/// The payload of an `ApiRequest`.
#[derive(Debug)]
enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Binary(Bytes),
    Multipart {
        fields: Vec<(String, String)>,
        file_field: String,
        file_name: String,
        mime_type: mime::Mime,
        data: Bytes,
    },
}

impl ApiRequest {
    /// Create a new request with no body.
    pub fn new<S: Into<String>>(method: Method, path: S) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: vec![],
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            deadline: true,
        }
    }

    /// A `GET` request.
    pub fn get<S: Into<String>>(path: S) -> Self {
        Self::new(Method::GET, path)
    }

    /// A `POST` request.
    pub fn post<S: Into<String>>(path: S) -> Self {
        Self::new(Method::POST, path)
    }

    /// A `PATCH` request.
    pub fn patch<S: Into<String>>(path: S) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// A `DELETE` request.
    pub fn delete<S: Into<String>>(path: S) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a query parameter.
    pub fn query<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a header. These are sent in addition to `Authorization`.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Don't limit how long the whole exchange may take, only how long it
    /// takes to connect. Use this for large response bodies.
    pub fn without_timeout(mut self) -> Self {
        self.deadline = false;
        self
    }

    /// Send `body` serialized as JSON.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Send `data` as a raw byte payload.
    pub fn binary(mut self, data: Bytes) -> Self {
        self.body = RequestBody::Binary(data);
        self
    }

    /// Send a `multipart/form-data` body with plain `fields` and a single
    /// file attachment.
    pub fn multipart_file<S1, S2>(
        mut self,
        fields: Vec<(String, String)>,
        file_field: S1,
        file_name: S2,
        mime_type: mime::Mime,
        data: Bytes,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        self.body = RequestBody::Multipart {
            fields,
            file_field: file_field.into(),
            file_name: file_name.into(),
            mime_type,
            data,
        };
        self
    }
}

/// A successful response from the API.
#[derive(Debug)]
pub struct ApiResponse {
    status: StatusCode,
    body: Option<Bytes>,
}

impl ApiResponse {
    /// The HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Did the server answer `204 No Content`?
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
    }

    /// Parse the body as JSON. An empty response parses as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match self.body {
            Some(ref body) => Ok(serde_json::from_slice(body)?),
            None => Ok(serde_json::from_value(serde_json::Value::Null)?),
        }
    }

    /// Return the raw body.
    pub fn into_bytes(self) -> Bytes {
        self.body.unwrap_or_default()
    }
}

/// One page of a paginated listing.
#[derive(Debug, Deserialize)]
struct Page<T> {
    results: Vec<T>,
    next: Option<String>,
}

/// A client connection to the Dymaxion Labs API.
///
/// Connection pools are created once and shared by every request made
/// through this client. Resumable upload chunks get a pool of their own,
/// which never follows redirects.
#[derive(Clone, Debug)]
pub struct Client {
    config: Config,
    http: reqwest::Client,
    upload_http: reqwest::Client,
}

impl Client {
    /// Create a new `Client`.
    pub fn new(config: Config) -> Result<Client> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.get_timeout())
            .build()?;
        // A `308` from an upload session means "resume incomplete", even if
        // it carries a `Location`.
        let upload_http = reqwest::Client::builder()
            .connect_timeout(config.get_timeout())
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Client {
            config,
            http,
            upload_http,
        })
    }

    /// Create a new `Client` configured from `DYM_*` environment variables.
    pub fn from_env() -> Result<Client> {
        Self::new(Config::from_env()?)
    }

    /// Our configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The connection pool for resumable upload chunks.
    pub(crate) fn upload_http(&self) -> &reqwest::Client {
        &self.upload_http
    }

    /// Resolve `path` against our API URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        self.config
            .get_api_url()
            .join(path)
            .map_err(|e| Error::could_not_parse_url(path, e))
    }

    /// Send `req`, retrying idempotent requests on transient failures, and
    /// map error statuses onto our error types.
    pub async fn request(&self, req: ApiRequest) -> Result<ApiResponse> {
        let mut url = self.url(&req.path)?;
        if !req.query.is_empty() {
            url.query_pairs_mut().extend_pairs(req.query.iter());
        }
        self.request_url(url, req).await
    }

    /// Like `request`, but with a fully resolved URL.
    async fn request_url(&self, url: Url, req: ApiRequest) -> Result<ApiResponse> {
        let retry = self.config.get_retry();
        let may_retry = retry.method_allowed(&req.method);
        let mut retries = 0;
        let res = loop {
            debug!("{} {}", req.method, url_without_credentials(&url));
            match self.build(&url, &req)?.send().await {
                Ok(res) => {
                    let status = res.status();
                    if may_retry
                        && retry.status_is_retryable(status)
                        && retry.retry_allowed(retries)
                    {
                        retries += 1;
                        let backoff = retry.backoff(retries);
                        warn!(
                            "{} for {} {}, retrying in {:?} ({}/{})",
                            status,
                            req.method,
                            url_without_credentials(&url),
                            backoff,
                            retries,
                            retry.get_total(),
                        );
                        sleep(backoff).await;
                        continue;
                    }
                    break res;
                }
                Err(err)
                    if may_retry
                        && (err.is_timeout() || err.is_connect())
                        && retry.retry_allowed(retries) =>
                {
                    retries += 1;
                    let backoff = retry.backoff(retries);
                    warn!(
                        "error on {} {}, retrying in {:?}: {}",
                        req.method,
                        url_without_credentials(&url),
                        backoff,
                        err,
                    );
                    sleep(backoff).await;
                }
                Err(err) => return Err(Error::could_not_access_url(&url, err)),
            }
        };
        self.handle_response(&url, res).await
    }

    /// Build a `reqwest` request for one attempt at `req`.
    fn build(&self, url: &Url, req: &ApiRequest) -> Result<reqwest::RequestBuilder> {
        let mut builder = self
            .http
            .request(req.method.clone(), url.clone())
            .header(AUTHORIZATION, self.config.authorization())
            .headers(req.headers.clone());
        if req.deadline {
            builder = builder.timeout(self.config.get_timeout());
        }
        match req.body {
            RequestBody::Empty => {}
            RequestBody::Json(ref value) => builder = builder.json(value),
            RequestBody::Binary(ref data) => builder = builder.body(data.clone()),
            RequestBody::Multipart {
                ref fields,
                ref file_field,
                ref file_name,
                ref mime_type,
                ref data,
            } => {
                let mut form = multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                let part = multipart::Part::stream(data.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime_type.as_ref())?;
                form = form.part(file_field.clone(), part);
                builder = builder.multipart(form);
            }
        }
        Ok(builder)
    }

    /// Turn a raw response into an `ApiResponse` or an error.
    async fn handle_response(&self, url: &Url, res: reqwest::Response) -> Result<ApiResponse> {
        let status = res.status();
        if status.is_client_error() || status.is_server_error() {
            let body = res.text().await.unwrap_or_default();
            debug!("Error status: {} body: {}", status, body);
            return Err(Error::from_status(url, status, body));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(ApiResponse { status, body: None });
        }
        let body = res
            .bytes()
            .await
            .map_err(|e| Error::could_not_access_url(url, e))?;
        trace!("Success body: {} bytes", body.len());
        Ok(ApiResponse {
            status,
            body: Some(body),
        })
    }

    /// `GET` a JSON document.
    pub async fn get_json<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T> {
        self.request(req).await?.json()
    }

    /// `GET` a binary document, such as a file download. The download may
    /// take as long as it needs once connected.
    pub async fn get_bytes(&self, req: ApiRequest) -> Result<Bytes> {
        Ok(self.request(req.without_timeout()).await?.into_bytes())
    }

    /// Fetch every item of a paginated listing, following `next` links.
    pub async fn fetch_all<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<Vec<T>> {
        let mut items = vec![];
        let mut page: Page<T> = self.request(req).await?.json()?;
        loop {
            items.extend(page.results);
            let next = match page.next {
                Some(next) => next,
                None => return Ok(items),
            };
            // Keep our own host, which may differ from the one the server
            // believes it is running on.
            let next = Url::parse(&next).map_err(|e| Error::could_not_parse_url(next, e))?;
            let mut url = self.url(next.path())?;
            url.set_query(next.query());
            page = self
                .request_url(url, ApiRequest::get(next.path()))
                .await?
                .json()?;
        }
    }

    /// Create a new resource.
    pub async fn create<Args>(&self, args: &Args) -> Result<Args::Resource>
    where
        Args: resource::Args,
    {
        let path = format!("{}/", Args::Resource::base_path());
        self.request(ApiRequest::post(path).json(args)?)
            .await?
            .json()
    }

    /// Fetch an existing resource.
    pub async fn fetch<R: Resource>(&self, id: &Id<R>) -> Result<R> {
        self.get_json(ApiRequest::get(id.path())).await
    }

    /// Fetch every resource of type `R`.
    pub async fn list<R: Resource>(&self) -> Result<Vec<R>> {
        self.fetch_all(ApiRequest::get(format!("{}/", R::base_path())))
            .await
    }

    /// Apply a partial `update` to the specified resource, returning the
    /// updated resource.
    pub async fn update<R: Resource + Updatable>(
        &self,
        id: &Id<R>,
        update: &<R as Updatable>::Update,
    ) -> Result<R> {
        debug!("PATCH {}: {:?}", id.path(), update);
        self.request(ApiRequest::patch(id.path()).json(update)?)
            .await?
            .json()
    }

    /// Delete the specified resource.
    pub async fn delete<R: Resource>(&self, id: &Id<R>) -> Result<()> {
        self.request(ApiRequest::delete(id.path())).await?;
        debug!("Deleted {}", id);
        Ok(())
    }
}
