use crate::core::template::Stack;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ASSEMBLY_VERSION: &str = "36.0.0";

/// Rendered synthesis output, held in memory until emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudAssembly {
    stack_name: String,
    template_file: String,
    resource_count: usize,
    files: BTreeMap<String, Vec<u8>>,
}

impl CloudAssembly {
    pub fn from_stack(stack: &Stack) -> Result<Self> {
        let template_file = format!("{}.template.json", stack.name());
        let template = serde_json::to_string_pretty(&stack.to_template())?;

        let mut artifacts = serde_json::Map::new();
        artifacts.insert(
            stack.name().to_string(),
            json!({
                "type": "aws:cloudformation:stack",
                "environment": stack.environment().uri(),
                "properties": {
                    "templateFile": template_file,
                },
            }),
        );
        let manifest = json!({
            "version": ASSEMBLY_VERSION,
            "artifacts": artifacts,
        });

        let mut files = BTreeMap::new();
        files.insert(template_file.clone(), template.into_bytes());
        files.insert(
            MANIFEST_FILE.to_string(),
            serde_json::to_string_pretty(&manifest)?.into_bytes(),
        );

        Ok(Self {
            stack_name: stack.name().to_string(),
            template_file,
            resource_count: stack.resources().len(),
            files,
        })
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn template_file(&self) -> &str {
        &self.template_file
    }

    pub fn resource_count(&self) -> usize {
        self.resource_count
    }

    pub fn zip_file_name(&self) -> String {
        format!("{}.zip", self.stack_name)
    }

    pub fn template_bytes(&self) -> &[u8] {
        self.files
            .get(&self.template_file)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn template_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(self.template_bytes())?)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(name, data)| (name.as_str(), data.as_slice()))
    }

    /// SHA-256 of the template, hex encoded.
    pub fn template_digest(&self) -> String {
        Sha256::digest(self.template_bytes())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// 將所有檔案寫入 storage，manifest 最後寫。
    /// 任何一個檔案寫入失敗時，已寫出的檔案會被移除
    pub async fn emit<S: Storage>(&self, storage: &S) -> Result<()> {
        let ordered = self
            .files
            .iter()
            .filter(|(name, _)| name.as_str() != MANIFEST_FILE)
            .chain(self.files.get_key_value(MANIFEST_FILE));

        let mut written: Vec<&str> = Vec::new();
        for (name, data) in ordered {
            tracing::debug!("Writing {} ({} bytes)", name, data.len());
            if let Err(e) = storage.write_file(name, data).await {
                tracing::warn!("⚠️ Writing {} failed, removing {} file(s) already written", name, written.len());
                for done in written.iter().rev() {
                    if let Err(cleanup) = storage.remove_file(done).await {
                        tracing::warn!("Could not remove {}: {}", done, cleanup);
                    }
                }
                return Err(e);
            }
            written.push(name.as_str());
        }

        tracing::info!(
            "📁 Cloud assembly for '{}' written to {}",
            self.stack_name,
            storage.location()
        );
        Ok(())
    }

    /// Uploads the zipped assembly as a single object and returns its name.
    pub async fn publish_zip<S: Storage>(&self, storage: &S) -> Result<String> {
        let name = self.zip_file_name();
        let bytes = self.to_zip()?;
        storage.write_file(&name, &bytes).await?;
        tracing::info!("📦 Published {} ({} bytes) to {}", name, bytes.len(), storage.location());
        Ok(name)
    }

    /// Zip archive of the assembly with fixed timestamps, so identical
    /// input gives identical bytes.
    pub fn to_zip(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

        for (name, data) in &self.files {
            zip.start_file(name.as_str(), entry_options())?;
            zip.write_all(data)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

fn entry_options() -> FileOptions<'static, ()> {
    FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}
