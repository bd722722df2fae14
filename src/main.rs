// src/main.rs

use dagrun::task::GraphState;
use dagrun::{cli, logging, run};

fn main() {
    match run_main() {
        Ok(GraphState::Failed) => std::process::exit(1),
        Ok(_) => {}
        Err(err) => {
            eprintln!("dagrun error: {err:?}");
            std::process::exit(1);
        }
    }
}

fn run_main() -> anyhow::Result<GraphState> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args)
}
