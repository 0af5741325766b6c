//! Client for the Astro Data Archive REST API.
//!
//! When reporting a bug, run with `verbose` set and include the client's
//! `Display` output: it names the client version, server API version and
//! timeouts in use.

use crate::core::batch::{BatchSummary, CutoutBatch};
use crate::core::bounds::{hdu_bounds, HduBounds};
use crate::domain::model::{CutoutTarget, FitsHeader, Found, SkyPosition};
use crate::domain::ports::{Archive, ConfigProvider, Storage};
use crate::domain::query::{FindQuery, VoHduQuery};
use crate::utils::curl::{curl_find_str, curl_get_str};
use crate::utils::error::{AstrogetError, Result, ServerStatus};
use crate::utils::monitor::SystemMonitor;
use crate::utils::validation::{validate_archive_id, validate_positive_number};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

pub const PROD_URL: &str = "https://astroarchive.noirlab.edu";
pub const PAT_URL: &str = "https://marsnat1-pat.csdc.noirlab.edu";
pub const DEV_URL: &str = "http://localhost:8010";

pub const MAX_CONNECT_TIMEOUT: f64 = 3.1;
pub const MAX_READ_TIMEOUT: f64 = 90.0 * 60.0;
pub const DEFAULT_CONNECT_TIMEOUT: f64 = 3.05;
pub const DEFAULT_READ_TIMEOUT: f64 = 5.0 * 60.0;

/// Bump when the server's API version increments.
pub const KNOWN_GOOD_API_VERSION: f64 = 8.0;

/// The server numbers HDUs one higher than the file does.
pub const HDU_INDEX_OFFSET: usize = 1;

pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub url: String,
    pub connect_timeout: f64,
    pub read_timeout: f64,
    pub verbose: bool,
    pub show_curl: bool,
    pub concurrent_requests: usize,
    pub monitor: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            url: PROD_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            verbose: false,
            show_curl: false,
            concurrent_requests: crate::config::DEFAULT_CONCURRENT_REQUESTS,
            monitor: false,
        }
    }
}

impl ClientOptions {
    pub fn from_config<C: ConfigProvider>(config: &C) -> Self {
        Self {
            url: config.server_url().to_string(),
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            verbose: config.verbose(),
            show_curl: config.show_curl(),
            concurrent_requests: config.concurrent_requests(),
            monitor: false,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_monitor(mut self, monitor: bool) -> Self {
        self.monitor = monitor;
        self
    }
}

pub struct ArchiveClient<S: Storage> {
    root_url: String,
    api_url: String,
    api_version: f64,
    verbose: bool,
    show_curl: bool,
    monitor: bool,
    connect_timeout: f64,
    read_timeout: f64,
    concurrent_requests: usize,
    headers: Mutex<HashMap<String, Vec<FitsHeader>>>,
    client: Client,
    storage: S,
}

impl<S: Storage> ArchiveClient<S> {
    /// Create a client and check the server's API version against ours.
    pub async fn connect(options: ClientOptions, storage: S) -> Result<Self> {
        let root_url = options.url.trim_end_matches('/').to_string();
        let api_url = format!("{}/api", root_url);
        let connect_timeout = options.connect_timeout.min(MAX_CONNECT_TIMEOUT);
        let read_timeout = options.read_timeout.min(MAX_READ_TIMEOUT);

        let client = Client::builder()
            .connect_timeout(timeout_duration("connect_timeout", connect_timeout)?)
            .read_timeout(timeout_duration("read_timeout", read_timeout)?)
            .user_agent(format!("astroget/{}", CLIENT_VERSION))
            .build()?;

        if options.verbose {
            tracing::debug!("apiurl={}", api_url);
        }

        let mut archive = Self {
            root_url,
            api_url,
            api_version: 0.0,
            verbose: options.verbose,
            show_curl: options.show_curl,
            monitor: options.monitor,
            connect_timeout,
            read_timeout,
            concurrent_requests: options.concurrent_requests.max(1),
            headers: Mutex::new(HashMap::new()),
            client,
            storage,
        };

        archive.api_version = archive.fetch_server_version().await?;
        archive.check_api_version()?;
        Ok(archive)
    }

    fn check_api_version(&self) -> Result<()> {
        if self.api_version.trunc() - KNOWN_GOOD_API_VERSION.trunc() >= 1.0 {
            return Err(AstrogetError::ApiVersionMismatch {
                expected: KNOWN_GOOD_API_VERSION,
                actual: self.api_version,
                api_url: self.api_url.clone(),
            });
        }
        Ok(())
    }

    /// Ask the server for its API version.
    pub async fn fetch_server_version(&self) -> Result<f64> {
        let url = self.endpoint("version/", &[])?;
        self.log_get(&url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AstrogetError::ServerConnectionError {
                endpoint: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(self.server_error(response).await);
        }

        let body = response.text().await?;
        body.trim()
            .trim_matches('"')
            .parse::<f64>()
            .map_err(|e| AstrogetError::ProcessingError {
                message: format!("Server returned unparseable API version '{}': {}", body, e),
            })
    }

    /// API version reported by the server at connect time.
    pub fn expected_server_version(&self) -> f64 {
        self.api_version
    }

    pub fn client_version(&self) -> &'static str {
        CLIENT_VERSION
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.api_url, path))?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    fn log_get(&self, url: &Url) {
        if self.show_curl {
            tracing::info!("{}", curl_get_str(url.as_str()));
        }
    }

    fn verbose_or(&self, verbose: Option<bool>) -> bool {
        verbose.unwrap_or(self.verbose)
    }

    /// Turn a non-200 response into an error, using the JSON status body when there is one.
    async fn server_error(&self, response: Response) -> AstrogetError {
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return AstrogetError::ApiError(e),
        };

        if self.verbose {
            tracing::debug!("Web-service error status={} content={}", status, body);
        }

        match serde_json::from_str::<ServerStatus>(&body) {
            Ok(server_status)
                if server_status.error_code.is_some() || server_status.error_message.is_some() =>
            {
                if let Some(traceback) = &server_status.traceback {
                    tracing::debug!("Server traceback=\n{}", traceback);
                }
                AstrogetError::from_status(&server_status)
            }
            _ => AstrogetError::ServerError {
                code: "UNKNOWN".to_string(),
                message: format!("HTTP {}: {}", status_label(status), body.trim()),
            },
        }
    }

    /// Find records in the archive database.
    pub async fn find_with(&self, query: &FindQuery, verbose: Option<bool>) -> Result<Found> {
        let verbose = self.verbose_or(verbose);
        query.validate_fields()?;
        if !query.constraints.is_empty() {
            tracing::debug!(
                "Constraint fields are not checked against the server field registry: {:?}",
                query
                    .constraints
                    .iter()
                    .map(|c| c.field.as_str())
                    .collect::<Vec<_>>()
            );
        }

        let url = self.endpoint("adv_search/find/", &query.url_params())?;
        let spec = query.search_spec();
        if verbose {
            tracing::debug!("ads/find url={}", url);
        }
        if self.show_curl {
            tracing::info!("{}", curl_find_str(&spec, url.as_str()));
        }

        let response = self.client.post(url).json(&spec).send().await?;
        if response.status() != StatusCode::OK {
            return Err(self.server_error(response).await);
        }

        let body: Value = response.json().await?;
        let found = Found::from_json(body)?;
        tracing::debug!("{}", found);
        Ok(found)
    }

    /// Find HDUs covering a position through the SIA service.
    pub async fn vohdu_with(&self, query: &VoHduQuery, verbose: Option<bool>) -> Result<Found> {
        let verbose = self.verbose_or(verbose);
        let url = self.endpoint("sia/vohdu", &query.url_params())?;
        if verbose {
            tracing::debug!("url={}", url);
        }
        self.log_get(&url);

        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(self.server_error(response).await);
        }

        let body: Value = response.json().await?;
        let mut found = Found::from_json(body)?;
        for record in &mut found.records {
            let hdu_idx = record.get("hdu_idx").and_then(Value::as_u64);
            let rewritten = match (record.get_str("url"), hdu_idx) {
                (Some(url), Some(idx)) => match hdu_retrieve_url(url, idx as usize) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        // 無法解析的 url 原樣保留
                        tracing::debug!("Leaving retrieve url '{}' as is: {}", url, e);
                        None
                    }
                },
                _ => None,
            };
            if let Some(url) = rewritten {
                if verbose {
                    tracing::debug!("Offsetting HDU index in retrieve url: {}", url);
                }
                record.data.insert("url".to_string(), Value::String(url));
            }
        }
        Ok(found)
    }

    /// Download one FITS file; returns where it was written.
    pub async fn retrieve(
        &self,
        file_id: &str,
        hdus: &[String],
        outfile: Option<&str>,
    ) -> Result<String> {
        validate_archive_id("file_id", file_id)?;
        let params = if hdus.is_empty() {
            Vec::new()
        } else {
            vec![("hdus", hdus.join(","))]
        };
        let url = self.endpoint(&format!("retrieve/{}/", file_id), &params)?;
        if self.verbose {
            tracing::debug!("retrieve url={}", url);
        }
        self.log_get(&url);

        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(self.server_error(response).await);
        }
        let data = response.bytes().await?;

        let filename = outfile
            .map(str::to_string)
            .unwrap_or_else(|| retrieve_filename(file_id, hdus));
        self.storage.write_file(&filename, &data).await?;
        tracing::info!("📁 Wrote {} ({} bytes)", filename, data.len());
        Ok(self.storage.locate(&filename))
    }

    fn cutout_url(&self, target: &CutoutTarget, size: u32) -> Result<Url> {
        validate_archive_id("md5", &target.md5)?;
        validate_positive_number("size", size as usize, 1)?;
        let params = [
            ("ra", target.ra.to_string()),
            ("dec", target.dec.to_string()),
            ("size", size.to_string()),
            ("hduidx", (target.hdu_idx + HDU_INDEX_OFFSET).to_string()),
        ];
        self.endpoint(&format!("cutout/{}", target.md5), &params)
    }

    /// Download a subimage of one HDU; returns where it was written.
    pub async fn cutout(
        &self,
        target: &CutoutTarget,
        size: u32,
        outfile: Option<&str>,
    ) -> Result<String> {
        let data = self.fetch_cutout(target, size).await?;
        let filename = outfile
            .map(str::to_string)
            .unwrap_or_else(|| target.default_filename());
        self.storage.write_file(&filename, &data).await?;
        tracing::info!("📁 Wrote {} ({} bytes)", filename, data.len());
        Ok(self.storage.locate(&filename))
    }

    /// Download a batch of cutouts into a single zip archive.
    pub async fn cutouts(
        &self,
        size: u32,
        targets: &[CutoutTarget],
        archive_name: &str,
    ) -> Result<BatchSummary> {
        let monitor = SystemMonitor::new(self.monitor);
        let batch = CutoutBatch::new(self, size, self.concurrent_requests);
        let output = batch.run(targets).await?;
        monitor.log_stats("cutouts fetched");

        self.storage
            .write_file(archive_name, &output.archive_bytes)
            .await?;
        monitor.log_final_stats();

        Ok(BatchSummary::new(
            output.run_id,
            self.storage.locate(archive_name),
            &output.entries,
            monitor.elapsed(),
        ))
    }

    /// FITS header of every HDU in an archived file. Results are cached per md5.
    pub async fn fetch_fits_header(&self, md5: &str) -> Result<Vec<FitsHeader>> {
        validate_archive_id("md5", md5)?;
        let url = self.endpoint(&format!("header/{}", md5), &[("format", "json".to_string())])?;
        if self.verbose {
            tracing::debug!("api/header url={}", url);
        }
        self.log_get(&url);

        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(self.server_error(response).await);
        }

        let body: Value = response.json().await?;
        let headers = parse_header_list(body)?;
        self.headers
            .lock()
            .await
            .insert(md5.to_string(), headers.clone());
        Ok(headers)
    }

    pub async fn cached_header(&self, md5: &str) -> Option<Vec<FitsHeader>> {
        self.headers.lock().await.get(md5).cloned()
    }

    /// Sky bounds of every HDU of `md5` that carries corner keywords.
    pub async fn hdu_bounds(&self, md5: &str) -> Result<Vec<HduBounds>> {
        let headers = match self.cached_header(md5).await {
            Some(headers) => headers,
            None => self.fetch_fits_header(md5).await?,
        };
        Ok(hdu_bounds(&headers))
    }

    /// First HDU of `md5` whose bounds contain `pos`.
    pub async fn find_hdu(&self, md5: &str, pos: SkyPosition) -> Result<Option<HduBounds>> {
        let bounds = self.hdu_bounds(md5).await?;
        Ok(bounds.into_iter().find(|b| b.contains(pos)))
    }
}

#[async_trait::async_trait]
impl<S: Storage> Archive for ArchiveClient<S> {
    async fn find(&self, query: &FindQuery) -> Result<Found> {
        self.find_with(query, None).await
    }

    async fn vohdu(&self, query: &VoHduQuery) -> Result<Found> {
        self.vohdu_with(query, None).await
    }

    async fn fits_header(&self, md5: &str) -> Result<Vec<FitsHeader>> {
        self.fetch_fits_header(md5).await
    }

    async fn fetch_cutout(&self, target: &CutoutTarget, size: u32) -> Result<Vec<u8>> {
        let url = self.cutout_url(target, size)?;
        if self.verbose {
            tracing::debug!("cutout url={}", url);
        }
        self.log_get(&url);

        let response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            let err = self.server_error(response).await;
            tracing::debug!("cutout({:?}, size={}) failed: {}", target, size, err);
            return Err(err);
        }
        Ok(response.bytes().await?.to_vec())
    }
}

impl<S: Storage> fmt::Display for ArchiveClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(astroget:{}, api:{:?}, {}, verbose={}, connect_timeout={:?}, read_timeout={:?})",
            CLIENT_VERSION,
            self.api_version,
            self.api_url,
            self.verbose,
            self.connect_timeout,
            self.read_timeout
        )
    }
}

fn timeout_duration(field: &str, seconds: f64) -> Result<Duration> {
    let invalid = |reason: String| AstrogetError::InvalidConfigValueError {
        field: field.to_string(),
        value: seconds.to_string(),
        reason,
    };
    if seconds.is_nan() || seconds <= 0.0 {
        return Err(invalid("Timeout must be a positive number of seconds".to_string()));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| invalid(e.to_string()))
}

fn status_label(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// `ADA_<id>_<hdus>.fits`, with `x` standing for "all HDUs".
pub fn retrieve_filename(file_id: &str, hdus: &[String]) -> String {
    let hdustr = if hdus.is_empty() {
        "x".to_string()
    } else {
        hdus.join("_")
    };
    format!("ADA_{}_{}.fits", file_id, hdustr)
}

/// Point a retrieve url at the primary HDU plus the record's own HDU.
pub fn hdu_retrieve_url(url: &str, hdu_idx: usize) -> Result<String> {
    let mut parsed = Url::parse(url)?;
    parsed.set_query(Some(&format!("hdus=0,{}", hdu_idx + HDU_INDEX_OFFSET)));
    Ok(parsed.to_string())
}

fn parse_header_list(body: Value) -> Result<Vec<FitsHeader>> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(header) => Ok(header),
                other => Err(AstrogetError::ProcessingError {
                    message: format!("Expected one header object per HDU, got {}", other),
                }),
            })
            .collect(),
        Value::Object(header) => Ok(vec![header]),
        other => Err(AstrogetError::ProcessingError {
            message: format!("Unexpected header response: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.files.lock().await.get(path).cloned().ok_or_else(|| {
                AstrogetError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files
                .lock()
                .await
                .insert(path.to_string(), data.to_vec());
            Ok(())
        }

        fn locate(&self, path: &str) -> String {
            format!("mem://{}", path)
        }
    }

    fn mock_version<'a>(server: &'a MockServer, version: &str) -> httpmock::Mock<'a> {
        let version = version.to_string();
        server.mock(|when, then| {
            when.method(GET).path("/api/version/");
            then.status(200).body(version);
        })
    }

    async fn connect(server: &MockServer) -> ArchiveClient<MockStorage> {
        let options = ClientOptions::default().with_url(server.base_url());
        ArchiveClient::connect(options, MockStorage::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_reads_api_version() {
        let server = MockServer::start();
        let version_mock = mock_version(&server, "8.0");

        let client = connect(&server).await;

        version_mock.assert();
        assert_eq!(client.expected_server_version(), 8.0);
        assert_eq!(client.api_url(), format!("{}/api", server.base_url()));
    }

    #[tokio::test]
    async fn test_connect_strips_trailing_slash() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        let options = ClientOptions::default().with_url(format!("{}/", server.base_url()));

        let client = ArchiveClient::connect(options, MockStorage::default())
            .await
            .unwrap();

        assert_eq!(client.root_url(), server.base_url());
    }

    #[tokio::test]
    async fn test_connect_rejects_newer_major_api() {
        let server = MockServer::start();
        mock_version(&server, "9.1");
        let options = ClientOptions::default().with_url(server.base_url());

        let err = ArchiveClient::connect(options, MockStorage::default())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, AstrogetError::ApiVersionMismatch { actual, .. } if actual == 9.1));
    }

    #[tokio::test]
    async fn test_connect_accepts_older_and_minor_api() {
        for version in ["7.0", "8.9"] {
            let server = MockServer::start();
            mock_version(&server, version);
            let client = connect(&server).await;
            assert_eq!(client.expected_server_version(), version.parse::<f64>().unwrap());
        }
    }

    #[tokio::test]
    async fn test_connect_unreachable_server() {
        let options = ClientOptions::default().with_url("http://127.0.0.1:1");
        let err = ArchiveClient::connect(options, MockStorage::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AstrogetError::ServerConnectionError { ref endpoint, .. }
            if endpoint == "http://127.0.0.1:1/api/version/"));
    }

    #[tokio::test]
    async fn test_non_positive_timeouts_are_rejected() {
        for (connect_timeout, read_timeout) in [(-1.0, 30.0), (1.0, 0.0), (f64::NAN, 30.0)] {
            let mut options = ClientOptions::default().with_url("http://127.0.0.1:1");
            options.connect_timeout = connect_timeout;
            options.read_timeout = read_timeout;

            let err = ArchiveClient::connect(options, MockStorage::default())
                .await
                .err()
                .unwrap();
            assert!(
                matches!(err, AstrogetError::InvalidConfigValueError { .. }),
                "{:?}",
                err
            );
        }
    }

    #[tokio::test]
    async fn test_ids_cannot_escape_the_endpoint() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        let client = connect(&server).await;

        let err = client.retrieve("../../x", &[], None).await.unwrap_err();
        assert!(matches!(err, AstrogetError::InvalidConfigValueError { ref field, .. } if field == "file_id"));

        let target = CutoutTarget::new("a/b", 1, 10.0, 10.0);
        assert!(client.cutout(&target, 50, None).await.is_err());
        assert!(client.fits_header("..").await.is_err());
        assert!(client.storage().files.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_timeouts_are_clamped() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        let mut options = ClientOptions::default().with_url(server.base_url());
        options.connect_timeout = 10.0;
        options.read_timeout = 100_000.0;

        let client = ArchiveClient::connect(options, MockStorage::default())
            .await
            .unwrap();

        assert_eq!(
            client.to_string(),
            format!(
                "(astroget:{}, api:8.0, {}/api, verbose=false, connect_timeout=3.1, read_timeout=5400.0)",
                CLIENT_VERSION,
                server.base_url()
            )
        );
    }

    #[tokio::test]
    async fn test_find_posts_search_spec() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        let find_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/adv_search/find/")
                .query_param("limit", "2")
                .query_param("rectype", "file")
                .query_param("sort", "md5sum")
                .json_body(json!({
                    "outfields": ["md5sum", "instrument"],
                    "search": [["instrument", "decam"]]
                }));
            then.status(200).json_body(json!([
                {"META": {"endpoint": "adv_search/find"}, "HEADER": {}},
                {"md5sum": "a5fb3eef401a24461e4cd4c25e773d8f", "instrument": "decam"},
                {"md5sum": "b5cb08bbcf5c03e036b4f08f115e5773", "instrument": "decam"}
            ]));
        });

        let client = connect(&server).await;
        let query = FindQuery::new()
            .outfields(["md5sum", "instrument"])
            .constrain("instrument", vec![json!("decam")])
            .sort("md5sum")
            .limit(2);
        let found = client.find(&query).await.unwrap();

        find_mock.assert();
        assert_eq!(found.len(), 2);
        assert_eq!(found.records[1].md5sum(), Some("b5cb08bbcf5c03e036b4f08f115e5773"));
    }

    #[tokio::test]
    async fn test_find_maps_server_status() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        server.mock(|when, then| {
            when.method(POST).path("/api/adv_search/find/");
            then.status(400).json_body(json!({
                "errorCode": "BADSRCH",
                "errorMessage": "Unknown field 'nope'",
                "traceback": "Traceback ..."
            }));
        });

        let client = connect(&server).await;
        let err = client
            .find(&FindQuery::new().constrain("nope", vec![json!(1)]))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "[UNKNOWN] Unknown field 'nope' [BADSRCH]");
    }

    #[tokio::test]
    async fn test_find_job_active() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        server.mock(|when, then| {
            when.method(POST).path("/api/adv_search/find/");
            then.status(409)
                .json_body(json!({"errorCode": "JOBACTIV", "errorMessage": "busy"}));
        });

        let client = connect(&server).await;
        let err = client.find(&FindQuery::new()).await.unwrap_err();
        assert!(matches!(err, AstrogetError::JobActive(_)));
    }

    #[tokio::test]
    async fn test_vohdu_rewrites_retrieve_urls() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        let retrieve_url = format!("{}/api/retrieve/abc/?hdus=35", server.base_url());
        let sia_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/sia/vohdu")
                .query_param("POS", "194.1820667,21.6826583")
                .query_param("SIZE", "0.3")
                .query_param("instrument", "decam")
                .query_param("format", "json")
                .query_param("FORMAT", "ALL")
                .query_param("VERB", "0");
            then.status(200).json_body(json!([
                {"md5sum": "abc", "hdu_idx": 35, "url": retrieve_url},
                {"md5sum": "def"}
            ]));
        });

        let client = connect(&server).await;
        let query = VoHduQuery::new(SkyPosition::new(194.1820667, 21.6826583), 0.3)
            .instrument("decam");
        let found = client.vohdu(&query).await.unwrap();

        sia_mock.assert();
        assert_eq!(
            found.records[0].get_str("url").unwrap(),
            format!("{}/api/retrieve/abc/?hdus=0,36", server.base_url())
        );
        assert!(found.records[1].get("url").is_none());
    }

    #[tokio::test]
    async fn test_vohdu_keeps_records_with_relative_urls() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        let retrieve_url = format!("{}/api/retrieve/def/", server.base_url());
        server.mock(|when, then| {
            when.method(GET).path("/api/sia/vohdu");
            then.status(200).json_body(json!([
                {"md5sum": "abc", "hdu_idx": 1, "url": "/api/retrieve/abc/"},
                {"md5sum": "def", "hdu_idx": 2, "url": retrieve_url}
            ]));
        });

        let client = connect(&server).await;
        let found = client
            .vohdu(&VoHduQuery::new(SkyPosition::new(1.0, 2.0), 0.1))
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found.records[0].get_str("url"), Some("/api/retrieve/abc/"));
        assert_eq!(
            found.records[1].get_str("url").unwrap(),
            format!("{}/api/retrieve/def/?hdus=0,3", server.base_url())
        );
    }

    #[tokio::test]
    async fn test_vohdu_error_carries_body() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        server.mock(|when, then| {
            when.method(GET).path("/api/sia/vohdu");
            then.status(500).body("internal failure");
        });

        let client = connect(&server).await;
        let err = client
            .vohdu(&VoHduQuery::new(SkyPosition::new(1.0, 2.0), 0.1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("internal failure"));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_cutout_writes_default_filename() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        let cutout_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/cutout/09a586a9d93a14a517f6d2e0e25f53da")
                .query_param("ra", "283.763875")
                .query_param("dec", "-30.479861")
                .query_param("size", "400")
                .query_param("hduidx", "37");
            then.status(200).body("FITSDATA");
        });

        let client = connect(&server).await;
        let target = CutoutTarget::new("09a586a9d93a14a517f6d2e0e25f53da", 36, 283.763875, -30.479861);
        let path = client.cutout(&target, 400, None).await.unwrap();

        cutout_mock.assert();
        assert_eq!(
            path,
            "mem://subimage_09a586a9d93a14a517f6d2e0e25f53da_283_-30.fits"
        );
        let written = client
            .storage()
            .get_file("subimage_09a586a9d93a14a517f6d2e0e25f53da_283_-30.fits")
            .await
            .unwrap();
        assert_eq!(written, b"FITSDATA");
    }

    #[tokio::test]
    async fn test_retrieve_with_hdus() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        let retrieve_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/retrieve/abc123/")
                .query_param("hdus", "0,35");
            then.status(200).body("FILE");
        });

        let client = connect(&server).await;
        let hdus = vec!["0".to_string(), "35".to_string()];
        let path = client.retrieve("abc123", &hdus, None).await.unwrap();

        retrieve_mock.assert();
        assert_eq!(path, "mem://ADA_abc123_0_35.fits");
    }

    #[tokio::test]
    async fn test_fits_header_is_cached() {
        let server = MockServer::start();
        mock_version(&server, "8.0");
        let header_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/header/abc")
                .query_param("format", "json");
            then.status(200).json_body(json!([
                {"SIMPLE": true, "NAXIS": 0},
                {"XTENSION": "IMAGE", "CENRA1": 10.0}
            ]));
        });

        let client = connect(&server).await;
        assert!(client.cached_header("abc").await.is_none());

        let headers = client.fits_header("abc").await.unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[1]["XTENSION"], "IMAGE");

        // 第二次走快取
        client.hdu_bounds("abc").await.unwrap();
        header_mock.assert_hits(1);
        assert_eq!(client.cached_header("abc").await.unwrap(), headers);
    }

    #[test]
    fn test_retrieve_filename() {
        assert_eq!(retrieve_filename("abc", &[]), "ADA_abc_x.fits");
        assert_eq!(
            retrieve_filename("abc", &["0".to_string(), "3".to_string()]),
            "ADA_abc_0_3.fits"
        );
    }

    #[test]
    fn test_hdu_retrieve_url_replaces_query() {
        let url = hdu_retrieve_url("https://astroarchive.noirlab.edu/api/retrieve/abc/?hdus=5", 5)
            .unwrap();
        assert_eq!(url, "https://astroarchive.noirlab.edu/api/retrieve/abc/?hdus=0,6");
    }

    #[test]
    fn test_parse_header_list_rejects_scalars() {
        assert!(parse_header_list(json!([1, 2])).is_err());
        assert_eq!(parse_header_list(json!({"A": 1})).unwrap().len(), 1);
    }
}
