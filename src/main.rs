//! Flow402 gateway HTTP entrypoint. See [`run`] for what the server wires up.

mod config;
mod run;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        println!("{e}");
        process::exit(1);
    }
}
