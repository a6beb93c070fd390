// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset catalog GraphQL server
//!
//! Usage:
//!   labelscope --config ~/.labelscope/config.json
//!   labelscope --fixture ./fixtures/catalog.json --bind 0.0.0.0:5151

use anyhow::Result;
use clap::Parser;
use labelscope::server::{self, AppState};
use labelscope::{store, Settings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "labelscope")]
#[command(about = "Serve the dataset catalog over GraphQL")]
#[command(version)]
struct Args {
    /// Settings file (defaults to ~/.labelscope/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve a JSON catalog fixture instead of the database
    #[arg(short, long)]
    fixture: Option<PathBuf>,

    /// Address to bind, e.g. 127.0.0.1:5151
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(fixture) = args.fixture {
        settings.fixture = Some(fixture);
    }
    if let Some(bind) = args.bind {
        settings.bind_address = bind;
    }

    tracing::info!("labelscope {}", labelscope::environment::VERSION);
    let store = store::open(&settings).await?;
    let state = AppState::new(store, settings);
    tracing::info!("Runtime context: {}", state.runtime.as_str());

    server::serve(state).await
}
