// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use petflow::config::consts::{EXIT_ENVIRONMENT, EXIT_FATAL_CONFIG, EXIT_SUCCESS};
use petflow::config::{load_and_validate_config, RuntimeBuilder, ToolMap};
use petflow::dataset::{LayoutDataset, ManifestDataset};
use petflow::errors::{ConfigError, PipelineError};
use petflow::graph::CapabilityRegistry;
use petflow::pipeline::{prune_tool, subject_dir, PipelineDriver, RunSummary};
use petflow::traits::DatasetReader;
use tracing_subscriber::EnvFilter;

fn usage(program: &str) {
    eprintln!("Usage: {} run <config> <dataset_dir|manifest.yaml>", program);
    eprintln!("       {} validate <config>", program);
    eprintln!("       {} invalidate <config> <tool>", program);
    eprintln!("Example: {} run configs/petflow.yaml /data/bids", program);
    eprintln!(
        "Example: {} run demos/quickstart.yaml demos/dataset/manifest.yaml",
        program
    );
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Maps a failure to the process exit code, printing the remediation hint.
fn report_error(error: &anyhow::Error) -> i32 {
    eprintln!("error: {:#}", error);
    if let Some(pipeline) = error.downcast_ref::<PipelineError>() {
        eprintln!("hint: {}", pipeline.hint());
        pipeline.exit_code()
    } else if let Some(config) = error.downcast_ref::<ConfigError>() {
        eprintln!("hint: {}", config.hint());
        EXIT_FATAL_CONFIG
    } else {
        EXIT_ENVIRONMENT
    }
}

fn open_dataset(path: &str, anat_derivatives: Option<&Path>) -> Result<Box<dyn DatasetReader>> {
    let path = Path::new(path);
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => {
            let manifest = ManifestDataset::load(path).map_err(PipelineError::from)?;
            Ok(Box::new(manifest))
        }
        _ if path.is_dir() => Ok(Box::new(
            LayoutDataset::new(path).with_anat_derivatives(anat_derivatives.map(Path::to_path_buf)),
        )),
        _ => Err(anyhow!(
            "dataset '{}' is neither a directory nor a YAML manifest",
            path.display()
        )),
    }
}

fn print_summary(summary: &RunSummary, work_dir: &Path) {
    println!();
    println!("Run {}", summary.run_id);
    for result in summary.subjects.values() {
        println!(
            "  sub-{:<8} {:<8} {:>7.1}s  {}",
            result.subject,
            result.outcome.label(),
            result.duration.as_secs_f64(),
            subject_dir(work_dir, &result.subject)
                .join("report.txt")
                .display()
        );
    }
    if summary.cancelled {
        println!("  (cancelled before completion)");
    }
}

async fn run(config_path: &str, dataset_path: &str) -> Result<i32> {
    let config = load_and_validate_config(config_path)
        .with_context(|| format!("loading {}", config_path))?;
    let work_dir = config.run.work_dir();
    let dataset = open_dataset(dataset_path, config.workflow.anat_derivatives.as_deref())?;

    let driver = PipelineDriver::new(RuntimeBuilder::from_config(config)?);

    let token = driver.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, cancelling (press again to abort)");
            token.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(EXIT_ENVIRONMENT);
            }
        }
    });

    let summary = driver.run(dataset.as_ref()).await?;
    print_summary(&summary, &work_dir);
    Ok(summary.exit_code())
}

fn validate(config_path: &str) -> Result<i32> {
    let config = load_and_validate_config(config_path)
        .with_context(|| format!("loading {}", config_path))?;
    ToolMap::from_config(&config).map_err(ConfigError::from)?;
    let registry = CapabilityRegistry::from_config(&config)?;
    let order = registry.evaluation_order().map_err(|e| ConfigError::Validation(vec![e]))?;

    println!(
        "{}: {} rules, {} tools, {} capabilities",
        config_path,
        config.rules.len(),
        config.tools.len(),
        registry.len()
    );
    for capability in order {
        if let Some(entry) = registry.get(&capability) {
            let rules: Vec<&str> = entry.rules.iter().map(|r| r.id.as_str()).collect();
            let marker = if entry.is_mandatory() { " (mandatory)" } else { "" };
            println!("  {}{}: {}", capability, marker, rules.join(" > "));
        }
    }
    Ok(EXIT_SUCCESS)
}

async fn invalidate(config_path: &str, tool: &str) -> Result<i32> {
    let config = load_and_validate_config(config_path)
        .with_context(|| format!("loading {}", config_path))?;
    let runtime = RuntimeBuilder::from_config(config)?;
    let Some(current) = runtime.tools.get(tool).map(|t| t.version().to_string()) else {
        return Err(anyhow!("tool '{}' is not configured in {}", tool, config_path));
    };

    let removed = prune_tool(&runtime.cache, tool, &current)
        .await
        .map_err(PipelineError::from)?;
    println!(
        "removed {} cache entries of '{}' not at version {}",
        removed, tool, current
    );
    Ok(EXIT_SUCCESS)
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("petflow");

    let outcome = match (args.get(1).map(String::as_str), args.len()) {
        (Some("run"), 4) => {
            init_tracing();
            run(&args[2], &args[3]).await
        }
        (Some("validate"), 3) => {
            init_tracing();
            validate(&args[2])
        }
        (Some("invalidate"), 4) => {
            init_tracing();
            invalidate(&args[2], &args[3]).await
        }
        _ => {
            usage(program);
            std::process::exit(EXIT_ENVIRONMENT);
        }
    };

    let code = match outcome {
        Ok(code) => code,
        Err(error) => report_error(&error),
    };
    std::process::exit(code);
}
