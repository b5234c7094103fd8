// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use modelmeter::config::Config;
use modelmeter::error::exit_code_for;
use modelmeter::run::{init_tracing, run};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);
    let _ = rustls::crypto::ring::default_provider().install_default();

    match run(&config).await {
        Ok(usage) => match serde_json::to_string(&usage) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("fatal: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(exit_code_for(&e));
        }
    }
}
