use crate::utils::error::{Result, SynthError};
use regex::Regex;
use std::sync::OnceLock;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn image_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // [registry[:port]/]path[:tag][@digest]
        Regex::new(
            r"^(?:[a-zA-Z0-9][a-zA-Z0-9.-]*(?::[0-9]+)?/)?[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*(?::[A-Za-z0-9_][A-Za-z0-9_.-]{0,127})?(?:@sha256:[a-f0-9]{64})?$",
        )
        .expect("image reference pattern is valid")
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SynthError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u32, min_value: u32) -> Result<()> {
    if value < min_value {
        return Err(SynthError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(SynthError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_image_reference(field_name: &str, image: &str) -> Result<()> {
    validate_non_empty_string(field_name, image)?;

    if !image_reference_pattern().is_match(image) {
        return Err(SynthError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: image.to_string(),
            reason: "Not a valid container image reference".to_string(),
        });
    }
    Ok(())
}

pub fn validate_aws_account(field_name: &str, account: &str) -> Result<()> {
    if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
        return Err(SynthError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: account.to_string(),
            reason: "AWS account id must be exactly 12 digits".to_string(),
        });
    }
    Ok(())
}

pub fn validate_aws_region(field_name: &str, region: &str) -> Result<()> {
    validate_non_empty_string(field_name, region)?;

    if !region
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        || !region.contains('-')
    {
        return Err(SynthError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: region.to_string(),
            reason: "AWS region can only contain lowercase letters, numbers, and hyphens"
                .to_string(),
        });
    }
    Ok(())
}

/// IAM 動作必須是 `service:Action` 且只允許唯讀動作
pub fn validate_read_only_action(field_name: &str, action: &str) -> Result<()> {
    let Some((service, name)) = action.split_once(':') else {
        return Err(SynthError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: action.to_string(),
            reason: "IAM action must have the form 'service:Action'".to_string(),
        });
    };

    if service.is_empty() || !service.chars().all(|c| c.is_ascii_lowercase() || c == '-') {
        return Err(SynthError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: action.to_string(),
            reason: format!("Invalid service prefix '{}'", service),
        });
    }

    let read_only = ["List", "Describe", "Get"]
        .iter()
        .any(|prefix| name.starts_with(prefix) && name.len() > prefix.len());
    if !read_only {
        return Err(SynthError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: action.to_string(),
            reason: "Only read-only (List*, Describe*, Get*) actions may be granted".to_string(),
        });
    }
    Ok(())
}

/// 找出未被替換的 `${VAR}` 佔位符
pub fn validate_no_placeholder(field_name: &str, value: &str) -> Result<()> {
    if value.contains("${") {
        return Err(SynthError::MissingConfigError {
            field: format!("{} (unresolved placeholder in '{}')", field_name, value),
        });
    }
    Ok(())
}

/// 非空且已完成環境變數替換
pub fn validate_resolved_string(field_name: &str, value: &str) -> Result<()> {
    validate_non_empty_string(field_name, value)?;
    validate_no_placeholder(field_name, value)
}
