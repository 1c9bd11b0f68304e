//! Binary entry point: parse arguments, set up logging, hand off to
//! `bootstrap::Bootstrap::run`, and translate its result into a process exit
//! code (spec section 6.1).

mod atoms;
mod bootstrap;
mod cli;
mod controller;
mod error;
mod external_helper;
mod keysyms;
mod protocol_engine;
mod renderer;
mod selection_list;
mod singleton;
mod window;
mod xconn;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::bootstrap::Bootstrap;
use crate::cli::Cli;
use crate::error::MultiselectError;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("multiselect=info".parse().unwrap()))
        .without_time()
        .init();

    let cli = Cli::parse();

    if let Err(err) = Bootstrap::run(cli) {
        let code = err
            .downcast_ref::<MultiselectError>()
            .map(MultiselectError::exit_code)
            .unwrap_or(1);
        tracing::error!(error = %err, "multiselect exiting");
        std::process::exit(code);
    }
}
