use crate::config::PlatformConfig;
use crate::domain::model::{
    ClusterHandle, Environment, ImportedValue, NamespaceHandle, SecurityGroupRef, VpcHandle,
    VpcQuery,
};
use crate::domain::ports::ContextProvider;
use crate::utils::error::{Result, SynthError};

/// Read-only view of the network, namespace and cluster created by the base
/// platform stack.
#[derive(Debug, Clone)]
pub struct BasePlatform {
    vpc: VpcHandle,
    namespace: NamespaceHandle,
    cluster: ClusterHandle,
}

impl BasePlatform {
    pub async fn lookup(
        environment: &Environment,
        platform: &PlatformConfig,
        provider: &dyn ContextProvider,
    ) -> Result<Self> {
        let query = VpcQuery {
            environment: environment.clone(),
            vpc_name: platform.vpc_name.clone(),
        };

        tracing::info!("🔎 Looking up VPC '{}'", query.vpc_name);
        let vpc = match provider.vpc(&query).await? {
            Some(context) => VpcHandle::new(&platform.vpc_name, context),
            None => {
                return Err(SynthError::ContextLookupError {
                    key: query.context_key(),
                    message: format!("no VPC named '{}' found", platform.vpc_name),
                })
            }
        };
        tracing::debug!("VPC '{}' resolved to {}", vpc.name(), vpc.vpc_id());

        let mut imports = ExportResolver::new(environment, provider);
        let ns_name = imports.resolve(&platform.namespace_name_export).await?;
        let ns_arn = imports.resolve(&platform.namespace_arn_export).await?;
        let ns_id = imports.resolve(&platform.namespace_id_export).await?;

        let mut security_groups = Vec::with_capacity(platform.security_group_exports.len());
        for (i, export) in platform.security_group_exports.iter().enumerate() {
            if let Some(group_id) = imports.resolve(export).await? {
                security_groups.push(SecurityGroupRef::new(
                    format!("ClusterSecGrp{}", i + 1),
                    group_id,
                ));
            }
        }

        let cluster_name = imports.resolve(&platform.cluster_name_export).await?;

        // 一次列出所有缺少的匯出值
        let (ns_name, ns_arn, ns_id, cluster_name) = match (ns_name, ns_arn, ns_id, cluster_name) {
            (Some(name), Some(arn), Some(id), Some(cluster)) if imports.is_complete() => {
                (name, arn, id, cluster)
            }
            _ => return Err(imports.into_error()),
        };

        let namespace = NamespaceHandle::new(ns_name, ns_arn, ns_id);
        let cluster = ClusterHandle::new(cluster_name, security_groups, vpc.clone(), namespace.clone());

        tracing::info!(
            "✅ Base platform resolved: cluster export '{}', {} security group(s)",
            cluster.cluster_name().export_name(),
            cluster.security_groups().len()
        );

        Ok(Self {
            vpc,
            namespace,
            cluster,
        })
    }

    pub fn vpc(&self) -> &VpcHandle {
        &self.vpc
    }

    pub fn namespace(&self) -> &NamespaceHandle {
        &self.namespace
    }

    pub fn cluster(&self) -> &ClusterHandle {
        &self.cluster
    }
}

struct ExportResolver<'a> {
    environment: &'a Environment,
    provider: &'a dyn ContextProvider,
    missing: Vec<String>,
}

impl<'a> ExportResolver<'a> {
    fn new(environment: &'a Environment, provider: &'a dyn ContextProvider) -> Self {
        Self {
            environment,
            provider,
            missing: Vec::new(),
        }
    }

    async fn resolve(&mut self, export_name: &str) -> Result<Option<ImportedValue>> {
        match self.provider.export(self.environment, export_name).await? {
            Some(value) => {
                tracing::debug!("Export '{}' = '{}'", export_name, value);
                Ok(Some(ImportedValue::new(export_name, value)))
            }
            None => {
                tracing::warn!("Export '{}' not found", export_name);
                self.missing.push(export_name.to_string());
                Ok(None)
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    fn into_error(self) -> SynthError {
        SynthError::MissingExportError {
            names: self.missing,
        }
    }
}
