use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Context lookup failed for '{key}': {message}")]
    ContextLookupError { key: String, message: String },

    #[error("Missing exported value(s): {}", names.join(", "))]
    MissingExportError { names: Vec<String> },

    #[error("Construct error at '{path}': {message}")]
    ConstructError { path: String, message: String },

    #[error("Provider error: {message}")]
    ProviderError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Lookup,
    Construct,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl SynthError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SynthError::MissingConfigError { .. }
            | SynthError::InvalidConfigValueError { .. }
            | SynthError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            SynthError::ContextLookupError { .. }
            | SynthError::MissingExportError { .. }
            | SynthError::ProviderError { .. } => ErrorCategory::Lookup,
            SynthError::ConstructError { .. } => ErrorCategory::Construct,
            SynthError::IoError(_)
            | SynthError::SerializationError(_)
            | SynthError::ZipError(_) => ErrorCategory::Output,
        }
    }

    /// 嚴重程度決定 CLI 的退出碼
    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Lookup => ErrorSeverity::Medium,
            ErrorCategory::Construct | ErrorCategory::Output => ErrorSeverity::Critical,
        }
    }

    /// 程式退出碼；任何錯誤都不為 0
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::High => 1,     // 配置錯誤
            ErrorSeverity::Medium => 2,   // 查詢值缺漏
            ErrorSeverity::Critical => 3, // 建構或輸出失敗
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            SynthError::MissingConfigError { field } => {
                format!("Set '{}' in the stack file or the process environment", field)
            }
            SynthError::InvalidConfigValueError { field, .. }
            | SynthError::ConfigValidationError { field, .. } => {
                format!("Fix the value of '{}' and run again", field)
            }
            SynthError::ContextLookupError { .. } => {
                "Make sure the base platform stack is deployed, then refresh the context file (--lookups)"
                    .to_string()
            }
            SynthError::MissingExportError { .. } => {
                "Deploy the stack that publishes these exports, then refresh the context file"
                    .to_string()
            }
            SynthError::ProviderError { .. } => {
                "Check AWS credentials and the target account/region".to_string()
            }
            SynthError::ConstructError { .. } => {
                "The generated resource graph changed shape; review the patch step".to_string()
            }
            SynthError::IoError(_) | SynthError::ZipError(_) => {
                "Check that the output directory is writable".to_string()
            }
            SynthError::SerializationError(_) => {
                "Check the context file for malformed JSON".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Lookup => format!("Could not resolve platform resources: {}", self),
            ErrorCategory::Construct => format!("Could not build the stack: {}", self),
            ErrorCategory::Output => format!("Could not write the cloud assembly: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;
