use clap::Parser;
use log::{info, warn};
use snafu::ErrorCompat;

mod args;
mod audit;

fn main() {
    let args = args::Args::parse();

    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .init();
    } else {
        env_logger::init();
    }

    info!("args: {:?}", args);

    let res = audit::run_scenario(
        &args.scenario,
        args.reference,
        args.out,
        args.interpretations,
        args.discrepancies,
    );
    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured: {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
