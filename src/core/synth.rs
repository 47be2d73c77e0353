use crate::config::StackConfig;
use crate::core::assembly::CloudAssembly;
use crate::core::lookup::BasePlatform;
use crate::core::patch::apply_patches;
use crate::core::service::LoadBalancedEc2Service;
use crate::core::template::Stack;
use crate::domain::ports::{ContextProvider, Storage};
use crate::utils::error::Result;
use crate::utils::validation::Validate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthReport {
    pub stack_name: String,
    pub location: String,
    pub template_file: String,
    pub resource_count: usize,
    pub template_digest: String,
}

impl SynthReport {
    pub fn new(assembly: &CloudAssembly, location: String) -> Self {
        Self {
            stack_name: assembly.stack_name().to_string(),
            location,
            template_file: assembly.template_file().to_string(),
            resource_count: assembly.resource_count(),
            template_digest: assembly.template_digest(),
        }
    }
}

/// Runs validate → lookup → declare → patch → assemble → emit.
pub struct SynthEngine<C: ContextProvider> {
    config: StackConfig,
    provider: C,
}

impl<C: ContextProvider> SynthEngine<C> {
    pub fn new(config: StackConfig, provider: C) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn provider(&self) -> &C {
        &self.provider
    }

    /// Builds the stack in memory. Nothing is written.
    pub async fn build_stack(&self) -> Result<Stack> {
        self.config.validate()?;

        let platform = BasePlatform::lookup(
            &self.config.environment,
            &self.config.platform,
            &self.provider,
        )
        .await?;

        let mut stack = Stack::new(&self.config.stack_name, self.config.environment.clone());
        let service = LoadBalancedEc2Service::declare(&mut stack, &platform, &self.config.workload())?;

        apply_patches(
            &mut stack,
            &service,
            &self.config.patch,
            self.config.task_role_statement(),
        )?;

        tracing::debug!("Stack '{}' has {} resources", stack.name(), stack.resources().len());
        Ok(stack)
    }

    pub async fn synth(&self) -> Result<CloudAssembly> {
        tracing::info!("Starting synthesis of '{}'", self.config.stack_name);
        let stack = self.build_stack().await?;
        CloudAssembly::from_stack(&stack)
    }

    /// 完整執行：所有檔案都在記憶體中算好後才寫出
    pub async fn run<S: Storage>(&self, storage: &S) -> Result<SynthReport> {
        let assembly = self.synth().await?;
        assembly.emit(storage).await?;
        Ok(SynthReport::new(&assembly, storage.location()))
    }
}
