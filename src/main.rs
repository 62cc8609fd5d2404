use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use stepchain::config::{StepAction, WorkflowDefinition};
use stepchain::logging::{self, LogFormat, LogOptions};
use tracing::{Level, error};

/// TOML で定義したワークフローを実行する
#[derive(Parser)]
#[command(name = "stepchain", version, about = "Sequential workflow runner")]
struct Cli {
    /// ログレベル
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// ログを JSON 形式で出力
    #[arg(long, global = true)]
    log_json: bool,

    /// ログの出力先ファイル（省略時は標準エラー）
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ワークフローを実行
    Run {
        /// ワークフロー定義ファイル
        file: PathBuf,

        /// 初期値（JSON）。省略時は定義の initial_value
        #[arg(long)]
        input: Option<String>,

        /// 実行レポート全体を JSON で出力
        #[arg(long)]
        json: bool,
    },

    /// ワークフロー定義を検証
    Validate {
        /// ワークフロー定義ファイル
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let options = LogOptions {
        level: cli.log_level.into(),
        format: if cli.log_json { LogFormat::Json } else { LogFormat::Text },
        file: cli.log_file.clone(),
    };
    let _guard = match logging::init(&options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Commands::Run { file, input, json } => cmd_run(&file, input.as_deref(), json).await,
        Commands::Validate { file } => cmd_validate(&file),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "コマンドが失敗しました");
            eprintln!("エラー: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn cmd_run(
    file: &Path,
    input: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let definition = WorkflowDefinition::from_file(file)?;
    let initial_value = match input {
        Some(raw) => serde_json::from_str::<Value>(raw)?,
        None => definition.initial_value().clone(),
    };

    let report = definition.build().run(initial_value).await?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", serde_json::to_string_pretty(&report.result)?);
    }
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let definition = WorkflowDefinition::from_file(file)?;

    println!("Workflow: {}", definition.name());
    if let Some(description) = definition.description() {
        println!("Description: {description}");
    }
    if let Some(version) = definition.version() {
        println!("Version: {version}");
    }
    println!("Steps: {}", definition.steps().len());
    for (index, step) in definition.steps().iter().enumerate() {
        let name = step.name().unwrap_or("-");
        println!("  [{index}] {name}: {}", describe(step.action()));
    }
    Ok(())
}

fn describe(action: &StepAction) -> String {
    match action {
        StepAction::Noop => "noop".to_string(),
        StepAction::SetValue(value) => format!("set_value {value}"),
        StepAction::SetResult(value) => match value {
            Some(value) => format!("set_result {value}"),
            None => "set_result <value>".to_string(),
        },
        StepAction::PassNext(value) => match value {
            Some(value) => format!("pass_next {value}"),
            None => "pass_next <value>".to_string(),
        },
        StepAction::TakePrevious => "take_previous".to_string(),
        StepAction::Multiply { factor, store } => format!("multiply x{factor} -> {store:?}"),
        StepAction::SetState { key, value } => format!("set_state {key} = {value}"),
        StepAction::Sleep { millis, .. } => format!("sleep {millis}ms"),
        StepAction::Jump { to, once } => match once {
            Some(flag) => format!("jump {to:?} (once: {flag})"),
            None => format!("jump {to:?}"),
        },
        StepAction::Finish => "finish".to_string(),
        StepAction::Fail(message) => format!("fail \"{message}\""),
    }
}
