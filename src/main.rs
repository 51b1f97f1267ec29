use std::io::Read;
use std::panic;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use coderunner::{Config, ExecutionResult, Language, Pipeline};

const USAGE: &str = "usage: coderunner <source-file> [language] < input";

#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let mut args = std::env::args().skip(1);
    let source_path = args.next().ok_or(USAGE)?;
    let language: Language = match args.next() {
        Some(name) => name.parse()?,
        None => Language::GnuCpp,
    };

    let code = tokio::fs::read_to_string(&source_path).await?;
    let mut stdin = String::new();
    std::io::stdin().read_to_string(&mut stdin)?;

    let config = Config::from_env()?;
    tracing::debug!("Loaded configuration: {:?}", config);
    let pipeline = Pipeline::from_config(&config)?;

    match pipeline.execute_source(&code, &stdin, language).await {
        ExecutionResult::Success { output } => {
            println!("{}", output);
            Ok(ExitCode::SUCCESS)
        }
        ExecutionResult::Failure { kind, detail } => {
            eprintln!("{}: {}", kind, detail);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
