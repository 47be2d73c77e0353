use crate::config::{PatchConfig, PolicyConfig, ServiceConfig, StackConfig, DEFAULT_ENVIRONMENT_NAME};
use crate::domain::model::Environment;
use crate::utils::error::{Result, SynthError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// On-disk stack file. Every field is optional; anything left out falls
/// back to the defaults derived from `environment_name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackFile {
    #[serde(default)]
    pub stack: StackSection,
    #[serde(default)]
    pub platform: PlatformSection,
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub patch: PatchSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackSection {
    pub environment_name: Option<String>,
    pub stack_name: Option<String>,
    pub account: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformSection {
    pub vpc_name: Option<String>,
    pub namespace_name_export: Option<String>,
    pub namespace_arn_export: Option<String>,
    pub namespace_id_export: Option<String>,
    pub security_group_exports: Option<Vec<String>>,
    pub cluster_name_export: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    pub construct_id: Option<String>,
    pub service_name: Option<String>,
    pub image: Option<String>,
    pub container_name: Option<String>,
    pub container_port: Option<u16>,
    pub cpu: Option<u32>,
    pub memory_limit_mib: Option<u32>,
    pub desired_count: Option<u32>,
    pub public_load_balancer: Option<bool>,
    pub listener_port: Option<u16>,
    pub environment: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    pub actions: Option<Vec<String>>,
    pub resources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchSection {
    pub remove_launch_type: Option<bool>,
}

impl StackFile {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SynthError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| SynthError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${AWS_ACCOUNT_ID})；未設定的保持原樣，交給驗證處理
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid");

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    /// 合併檔案內容與預設值。`fallback` 提供檔案未指定的帳號與區域
    pub fn resolve(self, fallback: Option<Environment>) -> Result<StackConfig> {
        let environment_name = self
            .stack
            .environment_name
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT_NAME.to_string());

        let account = self
            .stack
            .account
            .or_else(|| fallback.as_ref().map(|e| e.account.clone()))
            .ok_or_else(|| SynthError::MissingConfigError {
                field: "stack.account".to_string(),
            })?;
        let region = self
            .stack
            .region
            .or_else(|| fallback.as_ref().map(|e| e.region.clone()))
            .ok_or_else(|| SynthError::MissingConfigError {
                field: "stack.region".to_string(),
            })?;

        let mut config = StackConfig::new(environment_name, Environment::new(account, region));
        if let Some(stack_name) = self.stack.stack_name {
            config.stack_name = stack_name;
        }

        let platform = self.platform;
        let target = &mut config.platform;
        overlay(&mut target.vpc_name, platform.vpc_name);
        overlay(&mut target.namespace_name_export, platform.namespace_name_export);
        overlay(&mut target.namespace_arn_export, platform.namespace_arn_export);
        overlay(&mut target.namespace_id_export, platform.namespace_id_export);
        overlay(&mut target.security_group_exports, platform.security_group_exports);
        overlay(&mut target.cluster_name_export, platform.cluster_name_export);

        let service = self.service;
        let target: &mut ServiceConfig = &mut config.service;
        overlay(&mut target.construct_id, service.construct_id);
        overlay(&mut target.service_name, service.service_name);
        overlay(&mut target.image, service.image);
        overlay(&mut target.container_name, service.container_name);
        overlay(&mut target.container_port, service.container_port);
        overlay(&mut target.cpu, service.cpu);
        overlay(&mut target.memory_limit_mib, service.memory_limit_mib);
        overlay(&mut target.desired_count, service.desired_count);
        overlay(&mut target.public_load_balancer, service.public_load_balancer);
        overlay(&mut target.listener_port, service.listener_port);
        overlay(&mut target.environment, service.environment);

        let target: &mut PolicyConfig = &mut config.policy;
        overlay(&mut target.actions, self.policy.actions);
        overlay(&mut target.resources, self.policy.resources);

        let target: &mut PatchConfig = &mut config.patch;
        overlay(&mut target.remove_launch_type, self.patch.remove_launch_type);

        Ok(config)
    }
}

fn overlay<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::validation::Validate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fallback() -> Option<Environment> {
        Some(Environment::new("123456789012", "us-west-2"))
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = StackFile::from_toml_str("").unwrap().resolve(fallback()).unwrap();
        assert_eq!(config.environment_name, "ecsworkshop");
        assert_eq!(config.stack_name, "ecsworkshop-capacityproviders-ec2");
        assert_eq!(config.service.desired_count, 3);
        assert!(config.patch.remove_launch_type);
    }

    #[test]
    fn test_parse_overrides() {
        let toml_content = r#"
[stack]
environment_name = "staging"
account = "210987654321"
region = "eu-west-1"

[service]
desired_count = 12
image = "nginx:1.27"

[service.environment]
LOG_LEVEL = "debug"

[platform]
security_group_exports = ["OnlyOne"]
"#;

        let config = StackFile::from_toml_str(toml_content)
            .unwrap()
            .resolve(fallback())
            .unwrap();

        assert_eq!(config.stack_name, "staging-capacityproviders-ec2");
        assert_eq!(config.platform.vpc_name, "staging-base/BaseVPC");
        assert_eq!(config.environment.account, "210987654321");
        assert_eq!(config.service.desired_count, 12);
        assert_eq!(config.service.image, "nginx:1.27");
        assert_eq!(config.service.container_port, 5000);
        assert_eq!(config.platform.security_group_exports, vec!["OnlyOne".to_string()]);
        assert_eq!(config.service.environment["LOG_LEVEL"], "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unset_variables_fail_validation() {
        let toml_content = r#"
[stack]
account = "123456789012"
region = "us-west-2"

[service]
service_name = "${ECS_STACK_TEST_UNSET_SERVICE_NAME}"

[policy]
resources = ["${ECS_STACK_TEST_UNSET_RESOURCE}"]
"#;

        let config = StackFile::from_toml_str(toml_content)
            .unwrap()
            .resolve(None)
            .unwrap();
        // 未設定的變數原樣保留
        assert_eq!(config.service.service_name, "${ECS_STACK_TEST_UNSET_SERVICE_NAME}");
        assert!(matches!(
            config.validate(),
            Err(SynthError::MissingConfigError { ref field }) if field.starts_with("service.service_name")
        ));

        let mut config = config;
        config.service.service_name = "web-svc".to_string();
        assert!(matches!(
            config.validate(),
            Err(SynthError::MissingConfigError { ref field }) if field.starts_with("policy.resources")
        ));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ECS_STACK_TEST_IMAGE", "registry.local:5000/demo:1");

        let toml_content = r#"
[service]
image = "${ECS_STACK_TEST_IMAGE}"
"#;

        let config = StackFile::from_toml_str(toml_content)
            .unwrap()
            .resolve(fallback())
            .unwrap();
        assert_eq!(config.service.image, "registry.local:5000/demo:1");

        std::env::remove_var("ECS_STACK_TEST_IMAGE");
    }

    #[test]
    fn test_unset_placeholder_fails_validation() {
        let toml_content = r#"
[stack]
account = "${ECS_STACK_TEST_UNSET_ACCOUNT}"
"#;
        let config = StackFile::from_toml_str(toml_content)
            .unwrap()
            .resolve(fallback())
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_account_without_fallback() {
        let err = StackFile::from_toml_str("").unwrap().resolve(None).unwrap_err();
        assert!(matches!(err, SynthError::MissingConfigError { ref field } if field == "stack.account"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let toml_content = r#"
[service]
desired_cuont = 3
"#;
        assert!(StackFile::from_toml_str(toml_content).is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[stack]\nenvironment_name = \"file-test\"\n")
            .unwrap();

        let config = StackFile::from_file(temp_file.path())
            .unwrap()
            .resolve(fallback())
            .unwrap();
        assert_eq!(config.environment_name, "file-test");
    }
}
