use crate::domain::model::{Environment, VpcContext, VpcQuery};
use crate::domain::ports::ContextProvider;
use crate::utils::error::{Result, SynthError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// Cached lookup values, one JSON object keyed by provider query.
///
/// Keys sort on write so the file diffs cleanly under version control.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextFile {
    entries: BTreeMap<String, Value>,
}

pub fn exports_context_key(environment: &Environment) -> String {
    format!(
        "exports-provider:account={}:region={}",
        environment.account, environment.region
    )
}

impl ContextFile {
    /// 載入 context 檔；檔案不存在時視為空的 context
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("Context file {} not found, starting empty", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_string()?)?;
        tracing::info!("💾 Context saved to {}", path.display());
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(&self.entries)?;
        json.push('\n');
        Ok(json)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn get_vpc(&self, query: &VpcQuery) -> Result<Option<VpcContext>> {
        let key = query.context_key();
        match self.entries.get(&key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| SynthError::ContextLookupError {
                    key,
                    message: format!("malformed cached VPC: {}", e),
                }),
            None => Ok(None),
        }
    }

    pub fn put_vpc(&mut self, query: &VpcQuery, context: VpcContext) -> Result<()> {
        self.entries
            .insert(query.context_key(), serde_json::to_value(context)?);
        Ok(())
    }

    pub fn exports_for(&self, environment: &Environment) -> Result<Option<BTreeMap<String, String>>> {
        let key = exports_context_key(environment);
        match self.entries.get(&key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| SynthError::ContextLookupError {
                    key,
                    message: format!("malformed cached exports: {}", e),
                }),
            None => Ok(None),
        }
    }

    pub fn put_exports(
        &mut self,
        environment: &Environment,
        exports: BTreeMap<String, String>,
    ) -> Result<()> {
        self.entries.insert(
            exports_context_key(environment),
            serde_json::to_value(exports)?,
        );
        Ok(())
    }
}

#[async_trait]
impl ContextProvider for ContextFile {
    async fn vpc(&self, query: &VpcQuery) -> Result<Option<VpcContext>> {
        self.get_vpc(query)
    }

    async fn export(&self, environment: &Environment, name: &str) -> Result<Option<String>> {
        Ok(self
            .exports_for(environment)?
            .and_then(|exports| exports.get(name).cloned()))
    }
}

/// Answers from a context file first and asks `remote` on a miss,
/// recording every new answer so it can be saved afterwards.
pub struct CachingContextProvider<R: ContextProvider> {
    cache: Mutex<ContextFile>,
    remote: R,
}

impl<R: ContextProvider> CachingContextProvider<R> {
    pub fn new(cache: ContextFile, remote: R) -> Self {
        Self {
            cache: Mutex::new(cache),
            remote,
        }
    }

    fn with_cache<T>(&self, f: impl FnOnce(&mut ContextFile) -> Result<T>) -> Result<T> {
        let mut cache = self.cache.lock().map_err(|_| SynthError::ProviderError {
            message: "context cache lock poisoned".to_string(),
        })?;
        f(&mut cache)
    }

    pub fn snapshot(&self) -> Result<ContextFile> {
        self.with_cache(|cache| Ok(cache.clone()))
    }
}

#[async_trait]
impl<R: ContextProvider> ContextProvider for CachingContextProvider<R> {
    async fn vpc(&self, query: &VpcQuery) -> Result<Option<VpcContext>> {
        if let Some(hit) = self.with_cache(|cache| cache.get_vpc(query))? {
            return Ok(Some(hit));
        }

        tracing::info!("🌐 VPC '{}' not cached, querying provider", query.vpc_name);
        let answer = self.remote.vpc(query).await?;
        if let Some(context) = &answer {
            self.with_cache(|cache| cache.put_vpc(query, context.clone()))?;
        }
        Ok(answer)
    }

    async fn export(&self, environment: &Environment, name: &str) -> Result<Option<String>> {
        let cached = self.with_cache(|cache| cache.exports_for(environment))?;
        if let Some(value) = cached.as_ref().and_then(|exports| exports.get(name)) {
            return Ok(Some(value.clone()));
        }

        tracing::info!("🌐 Export '{}' not cached, querying provider", name);
        let answer = self.remote.export(environment, name).await?;
        if let Some(value) = &answer {
            let mut exports = cached.unwrap_or_default();
            exports.insert(name.to_string(), value.clone());
            self.with_cache(|cache| cache.put_exports(environment, exports))?;
        }
        Ok(answer)
    }
}
