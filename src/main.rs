//! kinship — print the dependency tree of a Kubernetes object

use clap::Parser;

use kinship::cli::{run, Args};
use kinship::EngineError;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let code = match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            err.downcast_ref::<EngineError>()
                .map(EngineError::exit_code)
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}
