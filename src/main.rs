mod anthropic;
mod cli;
mod config;
mod coordinator;
mod error;
mod executor;
mod runner;
mod skills;
mod state_machine;
mod telemetry;
mod tools;
mod ui;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use console::Style;
use tracing::{info, warn};

use anthropic::AnthropicClient;
use cli::{Cli, Command};
use config::MailroomConfig;
use coordinator::Coordinator;
use executor::{ContentLoader, SkillContext, SkillExecutor, SkillOutput};
use runner::CycleRunner;
use skills::{AnySkill, KeywordSkillExecutor, LlmSkillExecutor};
use state_machine::{ExtractionResult, SkillOperation};
use tools::{FsContentLoader, FsToolExecutor};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.json_logs);

    let mut config = MailroomConfig::load(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.model_tier = model.into();
    }

    match cli.command {
        Command::Run { cyclic, interval } => {
            if let Some(secs) = interval {
                config.cycle_interval_secs = secs;
            }
            run(&config, cyclic || config.cyclic_mode, cli.verbose).await
        }
        Command::Status => status(&config).await,
        Command::Analyze { file } => analyze(&config, &file).await,
    }
}

fn build_skill(config: &MailroomConfig) -> Result<AnySkill<AnthropicClient>> {
    if !config.has_api_key() {
        warn!("no API key configured, using keyword analysis");
        let skill = KeywordSkillExecutor::new().context("failed to build keyword patterns")?;
        return Ok(AnySkill::Keywords(skill));
    }

    let client = match &config.api_base_url {
        Some(url) => {
            AnthropicClient::with_base_url(config.api_key.clone(), url.clone(), config.request_timeout())
        }
        None => AnthropicClient::new(config.api_key.clone(), config.request_timeout()),
    }
    .context("failed to build HTTP client")?;

    Ok(AnySkill::Llm(LlmSkillExecutor::new(
        client,
        config.model_tier,
        config.max_tokens,
        config.request_timeout(),
    )))
}

async fn run(config: &MailroomConfig, cyclic: bool, verbose: bool) -> Result<()> {
    let skill = build_skill(config)?;
    info!(analysis = %skill.describe(), source = %config.inbox_path.display(), "starting");

    let coordinator = Coordinator::new(
        skill,
        FsToolExecutor::new(config.item_extension.clone()),
        FsContentLoader,
        config.locations(),
    )
    .with_max_idle_steps(config.max_idle_steps);
    let runner = CycleRunner::new(coordinator)
        .with_progress(!cyclic)
        .with_history(verbose);

    if cyclic {
        let interval = config.cycle_interval();
        println!(
            "Cyclic mode: one cycle every {}s. Press Ctrl-C to stop.",
            interval.as_secs()
        );
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        let summary = runner.run_forever(interval, shutdown).await;
        println!(
            "Stopped after {} cycle(s), {} failed, {} item(s) processed.",
            summary.cycles, summary.failed_cycles, summary.processed
        );
        return Ok(());
    }

    let report = runner.run_once().await;
    match report.error {
        None => Ok(()),
        Some(err) => Err(err.into()),
    }
}

async fn status(config: &MailroomConfig) -> Result<()> {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    let skill = build_skill(config)?;

    println!("{}", bold.apply_to("Mailroom status"));
    println!("  analysis: {}", skill.describe());
    println!("  inbox:    {}", config.inbox_path.display());
    println!("  archive:  {}", config.archive_path.display());
    println!("  report:   {}", config.report_path.display());
    println!(
        "  mode:     {}",
        if config.cyclic_mode {
            format!("cyclic, every {}s", config.cycle_interval_secs)
        } else {
            "single run".to_string()
        }
    );

    if !config.inbox_path.is_dir() {
        println!("  {}", dim.apply_to("inbox does not exist yet"));
        return Ok(());
    }
    let pending = FsToolExecutor::new(config.item_extension.clone())
        .enumerate(&config.inbox_path)
        .await
        .with_context(|| format!("failed to list {}", config.inbox_path.display()))?;
    println!("  pending:  {} item(s)", pending.len());
    for item in &pending {
        println!("    {}", dim.apply_to(item));
    }
    Ok(())
}

async fn analyze(config: &MailroomConfig, file: &Path) -> Result<()> {
    let skill = build_skill(config)?;
    let identifier = file.to_string_lossy().into_owned();
    let content = FsContentLoader
        .load(&identifier)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let context = SkillContext {
        identifier: identifier.clone(),
        content,
    };
    let SkillOutput::Analysis(output) = skill
        .run(SkillOperation::AnalyzeItem, &context)
        .await
        .with_context(|| format!("analysis of {} failed", file.display()))?;

    let result = ExtractionResult::from_output(output, &identifier, Utc::now());
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
