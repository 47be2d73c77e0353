use crate::domain::model::{Environment, VpcContext, VpcQuery};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Where assembly files end up (local directory, S3 bucket, ...).
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Removing a file that does not exist is not an error.
    fn remove_file(&self, path: &str) -> impl std::future::Future<Output = Result<()>> + Send;
    fn location(&self) -> String;
}

/// Read-only source of synthesis-time lookup values.
///
/// `Ok(None)` means the provider answered but the value does not exist.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn vpc(&self, query: &VpcQuery) -> Result<Option<VpcContext>>;
    async fn export(&self, environment: &Environment, name: &str) -> Result<Option<String>>;
}
