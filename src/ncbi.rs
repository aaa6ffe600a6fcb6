use std::fs::File;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::CurateError;

pub const ASSEMBLY_SUMMARY_URL: &str =
    "https://ftp.ncbi.nlm.nih.gov/genomes/refseq/bacteria/assembly_summary.txt";

pub const PROTEIN_SUFFIX: &str = "_protein.faa.gz";
pub const CDS_SUFFIX: &str = "_cds_from_genomic.fna.gz";

/// Retrieves one remote file into a directory, keeping the remote file name.
pub trait RemoteFetcher: Send + Sync {
    fn fetch(&self, url: &str, destination_dir: &Utf8Path) -> Result<Utf8PathBuf, CurateError>;
}

/// NCBI genomes FTP tree is also served over HTTPS; the client rewrites `ftp://`.
#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
}

impl NcbiHttpClient {
    pub fn new() -> Result<Self, CurateError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("marker-curator/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CurateError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| CurateError::NcbiHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, CurateError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(CurateError::NcbiHttp(err.to_string()));
                }
            }
        }
    }
}

impl RemoteFetcher for NcbiHttpClient {
    fn fetch(&self, url: &str, destination_dir: &Utf8Path) -> Result<Utf8PathBuf, CurateError> {
        let url = https_url(url);
        let name = file_name(&url)
            .ok_or_else(|| CurateError::NcbiHttp(format!("no file name in url {url}")))?;
        let destination = destination_dir.join(name);

        tracing::debug!("GET {url}");
        let mut response = self.send_with_retries(&url)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(CurateError::NcbiStatus { status, message });
        }

        let mut file = File::create(destination.as_std_path())
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
        if let Err(err) = std::io::copy(&mut response, &mut file) {
            let _ = std::fs::remove_file(destination.as_std_path());
            return Err(CurateError::NcbiHttp(format!("{url}: {err}")));
        }
        Ok(destination)
    }
}

pub fn https_url(url: &str) -> String {
    match url.strip_prefix("ftp://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}

pub fn file_name(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|name| !name.is_empty())
}

/// `{ftp_path}/{base}{suffix}` where `base` is the last segment of the ftp path.
pub fn assembly_file_url(ftp_path: &str, base_name: &str, suffix: &str) -> String {
    format!("{}/{base_name}{suffix}", ftp_path.trim_end_matches('/'))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
