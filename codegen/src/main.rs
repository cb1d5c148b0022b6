//! Bounded code generator CLI.
//!
//! Runs the plan/generate/validate pipeline from a TOML config and prints the
//! result bundle as JSON. Exit codes are listed in [`codegen::exit_codes`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

use codegen::core::syntax::SyntaxValidator;
use codegen::core::types::Outcome;
use codegen::core::vars::Variables;
use codegen::exit_codes;
use codegen::io::config::{ExecutionMode, GeneratorConfig, load_config, write_config};
use codegen::io::python_syntax::PythonSyntaxValidator;
use codegen::io::sandbox::{InterpreterSandbox, NoopSandbox, Sandbox};
use codegen::io::service::build_service;
use codegen::logging;
use codegen::pipeline::Pipeline;

const DEFAULT_CONFIG: &str = "codegen.toml";

#[derive(Parser)]
#[command(
    name = "codegen",
    version,
    about = "Plan, generate and validate Python code under a step budget"
)]
struct Cli {
    /// Log progress to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline and print the result bundle.
    Run(RunArgs),
    /// Syntax-check a Python file.
    Check {
        path: PathBuf,
    },
    /// Write a starter config file.
    InitConfig {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Config file; missing files fall back to defaults.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// What to build (overrides `prompt`).
    #[arg(short, long)]
    prompt: Option<String>,
    #[arg(long)]
    max_steps: Option<u32>,
    /// plan_only, generate_only or full.
    #[arg(long)]
    mode: Option<String>,
    #[arg(long)]
    workspace_root: Option<PathBuf>,
    #[arg(long)]
    project_name: Option<String>,
    /// Keep everything in memory.
    #[arg(long)]
    no_workspace: bool,
    /// Workflow variable as KEY=VALUE; VALUE is parsed as JSON when possible.
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Check { path } => cmd_check(&path),
        Command::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let mut config = load_config(&args.config)?;
    apply_overrides(&mut config, &args)?;
    let mut variables = parse_vars(&args.vars)?;

    let resolved = config.resolve(&variables);
    resolved.validate()?;
    let service = build_service(&resolved.service)?;
    let sandbox: Box<dyn Sandbox> = match resolved.execution_mode {
        ExecutionMode::Full => Box::new(InterpreterSandbox::from_config(&resolved.sandbox)),
        ExecutionMode::PlanOnly | ExecutionMode::GenerateOnly => Box::new(NoopSandbox),
    };

    let validator = PythonSyntaxValidator::from_config(&resolved.sandbox);

    let pipeline = Pipeline::new(&*service, &validator, &*sandbox);
    let report = pipeline.run(&config, &mut variables);

    let mut out = serde_json::to_string_pretty(&report.bundle).context("serialize bundle")?;
    out.push('\n');
    print!("{out}");

    Ok(match report.outcome {
        Outcome::Completed => exit_codes::OK,
        Outcome::StepLimitExceeded { .. } => exit_codes::STEP_LIMIT,
        Outcome::Failed { .. } => exit_codes::FAILED,
    })
}

fn apply_overrides(config: &mut GeneratorConfig, args: &RunArgs) -> Result<()> {
    if let Some(prompt) = &args.prompt {
        config.prompt = prompt.clone();
    }
    if let Some(max_steps) = args.max_steps {
        config.max_steps = max_steps;
    }
    if let Some(mode) = &args.mode {
        config.execution_mode = mode.parse()?;
    }
    if let Some(root) = &args.workspace_root {
        config.workspace_root = root.clone();
    }
    if let Some(name) = &args.project_name {
        config.project_name = Some(name.clone());
    }
    if args.no_workspace {
        config.workspace_enabled = false;
    }
    Ok(())
}

fn parse_vars(raw: &[String]) -> Result<Variables> {
    let mut vars = Variables::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("invalid --var '{entry}' (expected KEY=VALUE)");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid --var '{entry}' (empty key)");
        }
        let value =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

fn cmd_check(path: &Path) -> Result<i32> {
    let source = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let label = path.display().to_string();
    match PythonSyntaxValidator::default().validate(&label, &source) {
        Ok(()) => {
            println!("{label}: ok");
            Ok(exit_codes::OK)
        }
        Err(err) => {
            println!("{err}");
            Ok(exit_codes::FAILED)
        }
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = GeneratorConfig {
        prompt: "Create a command-line todo list manager".to_string(),
        ..GeneratorConfig::default()
    };
    write_config(path, &config)?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}
