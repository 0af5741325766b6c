use crate::domain::model::{CutoutTarget, FitsHeader, Found};
use crate::domain::query::{FindQuery, VoHduQuery};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Where `path` ends up, for reporting back to the caller.
    fn locate(&self, path: &str) -> String;
}

pub trait ConfigProvider: Send + Sync {
    fn server_url(&self) -> &str;
    fn output_path(&self) -> &str;
    fn connect_timeout(&self) -> f64;
    fn read_timeout(&self) -> f64;
    fn verbose(&self) -> bool;
    fn show_curl(&self) -> bool;
    fn concurrent_requests(&self) -> usize;
}

/// Read side of the archive API.
#[async_trait]
pub trait Archive: Send + Sync {
    async fn find(&self, query: &FindQuery) -> Result<Found>;
    async fn vohdu(&self, query: &VoHduQuery) -> Result<Found>;
    async fn fits_header(&self, md5: &str) -> Result<Vec<FitsHeader>>;
    /// Raw FITS bytes of one cutout, `size` pixels on a side.
    async fn fetch_cutout(&self, target: &CutoutTarget, size: u32) -> Result<Vec<u8>>;
}
