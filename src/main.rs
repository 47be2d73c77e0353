use anyhow::Context;
use clap::Parser;
use ecs_service_stack::config::toml_config::StackFile;
use ecs_service_stack::config::{environment_from_process, DEFAULT_ENVIRONMENT_NAME};
use ecs_service_stack::domain::ports::{ContextProvider, Storage};
use ecs_service_stack::utils::error::Result;
use ecs_service_stack::utils::{logger, validation::Validate};
use ecs_service_stack::{
    CliConfig, CloudAssembly, ContextFile, LocalStorage, StackConfig, SynthEngine, SynthReport,
};
use std::io::Write;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting ecs-service-stack");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    match run(&cli).await {
        Ok(Outcome::DryRun(assembly)) => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(assembly.template_bytes())
                .and_then(|_| writeln!(stdout))
                .context("writing template to stdout")?;
            tracing::info!("✅ Dry run finished, nothing written");
        }
        Ok(Outcome::Written(report)) => {
            tracing::info!("✅ Synthesis completed successfully!");
            println!("✅ Stack '{}' synthesized", report.stack_name);
            println!("📁 Output saved to: {}", report.location);
            println!(
                "📄 {} ({} resources, sha256 {})",
                report.template_file, report.resource_count, report.template_digest
            );
        }
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ Synthesis failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            std::process::exit(e.exit_code());
        }
    }

    Ok(())
}

enum Outcome {
    DryRun(CloudAssembly),
    Written(SynthReport),
}

fn load_config(cli: &CliConfig) -> Result<StackConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("📄 Loading stack file {}", path);
            StackFile::from_file(path)?.resolve(environment_from_process().ok())?
        }
        None => StackConfig::new(DEFAULT_ENVIRONMENT_NAME, environment_from_process()?),
    };

    if let Some(environment_name) = &cli.environment {
        config.rename_environment(environment_name.as_str());
    }
    if let Some(image) = &cli.image {
        config.service.image = image.clone();
    }
    if let Some(desired_count) = cli.desired_count {
        config.service.desired_count = desired_count;
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: &CliConfig) -> Result<Outcome> {
    let config = load_config(cli)?;
    let context = ContextFile::load(&cli.context)?;
    tracing::debug!("Loaded {} context entries from {}", context.len(), cli.context);

    #[cfg(feature = "aws")]
    if cli.lookups {
        use ecs_service_stack::config::aws::load_sdk_config;
        use ecs_service_stack::{AwsContextProvider, CachingContextProvider};

        let sdk_config = load_sdk_config(&config.environment.region).await;
        let provider = CachingContextProvider::new(context, AwsContextProvider::new(&sdk_config));
        let engine = SynthEngine::new(config, provider);

        let outcome = synthesize(cli, &engine).await;
        // 查到的值即使合成失敗也保留，下次不必重查
        engine.provider().snapshot()?.save(&cli.context)?;
        return outcome;
    }

    synthesize(cli, &SynthEngine::new(config, context)).await
}

async fn synthesize<C: ContextProvider>(cli: &CliConfig, engine: &SynthEngine<C>) -> Result<Outcome> {
    let assembly = engine.synth().await?;
    if cli.dry_run {
        return Ok(Outcome::DryRun(assembly));
    }

    let storage = LocalStorage::new(&cli.output);
    assembly.emit(&storage).await?;

    #[cfg(feature = "aws")]
    if let Some(bucket) = &cli.publish_bucket {
        use ecs_service_stack::config::aws::load_sdk_config;
        use ecs_service_stack::S3Storage;

        let sdk_config = load_sdk_config(&engine.config().environment.region).await;
        let s3 = S3Storage::new(
            aws_sdk_s3::Client::new(&sdk_config),
            bucket.as_str(),
            cli.publish_prefix.as_str(),
        );
        assembly.publish_zip(&s3).await?;
    }

    Ok(Outcome::Written(SynthReport::new(&assembly, storage.location())))
}
