use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "ecs-service-stack")]
#[command(about = "Synthesize the load-balanced ECS service stack into a CloudFormation template")]
pub struct CliConfig {
    /// Stack configuration file (TOML); built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<String>,

    /// Context file holding cached lookup values
    #[arg(long, default_value = "cdk.context.json")]
    pub context: String,

    /// Cloud assembly output directory
    #[arg(short, long, default_value = "cdk.out")]
    pub output: String,

    /// Environment name used to derive stack and lookup names
    #[arg(long)]
    pub environment: Option<String>,

    /// Override the container image
    #[arg(long)]
    pub image: Option<String>,

    /// Override the desired task count
    #[arg(long)]
    pub desired_count: Option<u32>,

    /// Synthesize and print the template without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Emit JSON log lines instead of the compact format
    #[arg(long)]
    pub json_logs: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Query AWS for lookup values missing from the context file and cache them
    #[cfg(feature = "aws")]
    #[arg(long)]
    pub lookups: bool,

    /// Publish the zipped cloud assembly to this S3 bucket
    #[cfg(feature = "aws")]
    #[arg(long)]
    pub publish_bucket: Option<String>,

    #[cfg(feature = "aws")]
    #[arg(long, default_value = "cloud-assembly")]
    pub publish_prefix: String,
}

/// Writes assembly files under a base directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(path);
        let data = fs::read(full_path)?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // 先寫暫存檔再改名，避免留下寫到一半的檔案
        let tmp_path = tmp_sibling(&full_path);
        fs::write(&tmp_path, data)?;
        if let Err(e) = fs::rename(&tmp_path, &full_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        match fs::remove_file(self.base_path.join(path)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn location(&self) -> String {
        self.base_path.display().to_string()
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("cdk.out"));

        storage.write_file("manifest.json", b"{}").await.unwrap();

        assert_eq!(storage.read_file("manifest.json").await.unwrap(), b"{}");
        assert!(!dir.path().join("cdk.out/manifest.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_local_storage_remove() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.write_file("a.json", b"{}").await.unwrap();
        storage.remove_file("a.json").await.unwrap();

        assert!(!dir.path().join("a.json").exists());
        // 不存在的檔案也算成功
        storage.remove_file("a.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_rename_cleans_up_temp_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("manifest.json")).unwrap();
        let storage = LocalStorage::new(dir.path());

        assert!(storage.write_file("manifest.json", b"{}").await.is_err());
        assert!(!dir.path().join("manifest.json.tmp").exists());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_cli_defaults() {
        let cli = CliConfig::parse_from(["ecs-service-stack"]);
        assert_eq!(cli.output, "cdk.out");
        assert_eq!(cli.context, "cdk.context.json");
        assert!(cli.config.is_none());
        assert!(!cli.dry_run);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_cli_overrides() {
        let cli = CliConfig::parse_from([
            "ecs-service-stack",
            "--desired-count",
            "12",
            "--environment",
            "staging",
            "-o",
            "out",
        ]);
        assert_eq!(cli.desired_count, Some(12));
        assert_eq!(cli.environment.as_deref(), Some("staging"));
        assert_eq!(cli.output, "out");
    }
}
