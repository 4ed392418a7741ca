// src/main.rs

use plangraph::{cli, logging, run};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("plangraph error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let log = logging::init_logging(args.log_level)?;
    run(args, &log)
}
