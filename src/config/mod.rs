pub mod cli;
pub mod context;
pub mod toml_config;

#[cfg(feature = "aws")]
pub mod aws;

use crate::domain::model::{Environment, PolicyStatement, WorkloadSpec};
use crate::utils::error::{Result, SynthError};
use crate::utils::validation::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

pub const ACCOUNT_ENV_VAR: &str = "AWS_ACCOUNT_ID";
pub const REGION_ENV_VAR: &str = "AWS_DEFAULT_REGION";
const REGION_FALLBACK_ENV_VAR: &str = "AWS_REGION";

pub const DEFAULT_ENVIRONMENT_NAME: &str = "ecsworkshop";

/// Everything the generator needs; nothing is read from the process
/// environment once this is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub environment_name: String,
    pub stack_name: String,
    pub environment: Environment,
    pub platform: PlatformConfig,
    pub service: ServiceConfig,
    pub policy: PolicyConfig,
    pub patch: PatchConfig,
}

/// Names under which the base platform publishes its resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub vpc_name: String,
    pub namespace_name_export: String,
    pub namespace_arn_export: String,
    pub namespace_id_export: String,
    pub security_group_exports: Vec<String>,
    pub cluster_name_export: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub construct_id: String,
    pub service_name: String,
    pub image: String,
    pub container_name: String,
    pub container_port: u16,
    pub cpu: u32,
    pub memory_limit_mib: u32,
    pub desired_count: u32,
    pub public_load_balancer: bool,
    pub listener_port: u16,
    pub environment: BTreeMap<String, String>,
}

/// Extra permissions for the task role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchConfig {
    /// Drop `LaunchType` so the cluster's default capacity provider strategy applies.
    pub remove_launch_type: bool,
}

impl PlatformConfig {
    pub fn for_environment(environment_name: &str) -> Self {
        Self {
            vpc_name: format!("{}-base/BaseVPC", environment_name),
            namespace_name_export: "NSNAME".to_string(),
            namespace_arn_export: "NSARN".to_string(),
            namespace_id_export: "NSID".to_string(),
            security_group_exports: vec![
                "ECSSecGrpList1".to_string(),
                "ECSSecGrpList2".to_string(),
                "ECSSecGrpList3".to_string(),
            ],
            cluster_name_export: "ECSClusterName".to_string(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            construct_id: "EC2CapacityProviderService".to_string(),
            service_name: "ecsdemo-capacityproviders-ec2".to_string(),
            image: "adam9098/ecsdemo-capacityproviders:latest".to_string(),
            container_name: "web".to_string(),
            container_port: 5000,
            cpu: 256,
            memory_limit_mib: 512,
            desired_count: 3,
            public_load_balancer: true,
            listener_port: 80,
            environment: BTreeMap::new(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            actions: vec!["ecs:ListTasks".to_string(), "ecs:DescribeTasks".to_string()],
            resources: vec!["*".to_string()],
        }
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            remove_launch_type: true,
        }
    }
}

impl StackConfig {
    pub fn new(environment_name: impl Into<String>, environment: Environment) -> Self {
        let environment_name = environment_name.into();
        Self {
            stack_name: default_stack_name(&environment_name),
            platform: PlatformConfig::for_environment(&environment_name),
            environment_name,
            environment,
            service: ServiceConfig::default(),
            policy: PolicyConfig::default(),
            patch: PatchConfig::default(),
        }
    }

    /// 產生工作負載定義，並把部署區域注入容器環境變數
    pub fn workload(&self) -> WorkloadSpec {
        let mut environment = self.service.environment.clone();
        environment
            .entry(REGION_ENV_VAR.to_string())
            .or_insert_with(|| self.environment.region.clone());

        WorkloadSpec {
            construct_id: self.service.construct_id.clone(),
            service_name: self.service.service_name.clone(),
            image: self.service.image.clone(),
            container_name: self.service.container_name.clone(),
            container_port: self.service.container_port,
            cpu: self.service.cpu,
            memory_limit_mib: self.service.memory_limit_mib,
            desired_count: self.service.desired_count,
            public_load_balancer: self.service.public_load_balancer,
            listener_port: self.service.listener_port,
            environment,
        }
    }

    /// 換環境名稱，並重新推導由名稱而來的 stack 名稱與 VPC 名稱
    pub fn rename_environment(&mut self, environment_name: impl Into<String>) {
        let environment_name = environment_name.into();
        self.stack_name = default_stack_name(&environment_name);
        self.platform.vpc_name = PlatformConfig::for_environment(&environment_name).vpc_name;
        self.environment_name = environment_name;
    }

    pub fn task_role_statement(&self) -> PolicyStatement {
        PolicyStatement::allow(
            self.policy.actions.clone(),
            self.policy.resources.iter().map(|r| json!(r)).collect(),
        )
    }
}

pub fn default_stack_name(environment_name: &str) -> String {
    format!("{}-capacityproviders-ec2", environment_name)
}

/// 從行程環境變數讀取部署目標
pub fn environment_from_process() -> Result<Environment> {
    let account = std::env::var(ACCOUNT_ENV_VAR).map_err(|_| SynthError::MissingConfigError {
        field: ACCOUNT_ENV_VAR.to_string(),
    })?;
    let region = std::env::var(REGION_ENV_VAR)
        .or_else(|_| std::env::var(REGION_FALLBACK_ENV_VAR))
        .map_err(|_| SynthError::MissingConfigError {
            field: REGION_ENV_VAR.to_string(),
        })?;
    Ok(Environment::new(account, region))
}

impl Validate for StackConfig {
    fn validate(&self) -> Result<()> {
        validate_resolved_string("environment_name", &self.environment_name)?;
        validate_resolved_string("stack_name", &self.stack_name)?;
        if !self
            .stack_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
            || !self.stack_name.starts_with(|c: char| c.is_ascii_alphabetic())
        {
            return Err(SynthError::InvalidConfigValueError {
                field: "stack_name".to_string(),
                value: self.stack_name.clone(),
                reason: "Stack names must start with a letter and contain only letters, digits and hyphens"
                    .to_string(),
            });
        }

        validate_no_placeholder("account", &self.environment.account)?;
        validate_no_placeholder("region", &self.environment.region)?;
        validate_aws_account("account", &self.environment.account)?;
        validate_aws_region("region", &self.environment.region)?;

        self.platform.validate()?;
        self.service.validate()?;
        self.policy.validate()?;

        tracing::debug!("Stack configuration for '{}' is valid", self.stack_name);
        Ok(())
    }
}

impl Validate for PlatformConfig {
    fn validate(&self) -> Result<()> {
        validate_resolved_string("platform.vpc_name", &self.vpc_name)?;
        validate_resolved_string("platform.namespace_name_export", &self.namespace_name_export)?;
        validate_resolved_string("platform.namespace_arn_export", &self.namespace_arn_export)?;
        validate_resolved_string("platform.namespace_id_export", &self.namespace_id_export)?;
        validate_resolved_string("platform.cluster_name_export", &self.cluster_name_export)?;
        if self.security_group_exports.is_empty() {
            return Err(SynthError::ConfigValidationError {
                field: "platform.security_group_exports".to_string(),
                message: "at least one cluster security group export is required".to_string(),
            });
        }
        for export in &self.security_group_exports {
            validate_resolved_string("platform.security_group_exports", export)?;
        }
        Ok(())
    }
}

impl Validate for ServiceConfig {
    fn validate(&self) -> Result<()> {
        validate_resolved_string("service.construct_id", &self.construct_id)?;
        if self.construct_id.contains('/') {
            return Err(SynthError::InvalidConfigValueError {
                field: "service.construct_id".to_string(),
                value: self.construct_id.clone(),
                reason: "Construct ids cannot contain '/'".to_string(),
            });
        }
        validate_resolved_string("service.service_name", &self.service_name)?;
        validate_resolved_string("service.container_name", &self.container_name)?;
        validate_no_placeholder("service.image", &self.image)?;
        validate_image_reference("service.image", &self.image)?;
        validate_range("service.container_port", self.container_port, 1, u16::MAX)?;
        validate_range("service.listener_port", self.listener_port, 1, u16::MAX)?;
        validate_range("service.cpu", self.cpu, 1, 10240)?;
        validate_positive_number("service.memory_limit_mib", self.memory_limit_mib, 6)?;
        validate_positive_number("service.desired_count", self.desired_count, 1)?;

        for (name, value) in &self.environment {
            validate_resolved_string("service.environment", name)?;
            validate_no_placeholder(&format!("service.environment.{}", name), value)?;
        }
        Ok(())
    }
}

impl Validate for PolicyConfig {
    fn validate(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(SynthError::ConfigValidationError {
                field: "policy.actions".to_string(),
                message: "at least one action is required".to_string(),
            });
        }
        for action in &self.actions {
            validate_no_placeholder("policy.actions", action)?;
            validate_read_only_action("policy.actions", action)?;
        }
        if self.resources.is_empty() {
            return Err(SynthError::ConfigValidationError {
                field: "policy.resources".to_string(),
                message: "at least one resource is required".to_string(),
            });
        }
        for resource in &self.resources {
            validate_resolved_string("policy.resources", resource)?;
        }
        Ok(())
    }
}

#[cfg(feature = "cli")]
pub use cli::CliConfig;
