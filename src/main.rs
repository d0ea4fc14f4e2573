// src/main.rs

use autodeploy::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("autodeploy error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let log_dir = args.effective_log_dir();
    if let Some(path) = logging::init_logging(args.log_level, log_dir.as_deref())? {
        tracing::debug!(?path, "also logging to file");
    }
    run(args).await
}
