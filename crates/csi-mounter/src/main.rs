// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use csi_mounter::{ExitDecision, Mounter, MounterArgs, MounterConfig, SignalAbsorber, FATAL_EXIT_CODE};
use tracing::{error, info};

const COMPONENT: &str = "aws-s3-csi-mounter";

#[tokio::main]
async fn main() -> ExitCode {
    let args = MounterArgs::parse();

    if let Err(err) = args.logging.clone().init(COMPONENT) {
        eprintln!("Failed to initialize logging: {err:#}");
        return ExitCode::from(FATAL_EXIT_CODE);
    }

    match run(args).await {
        Ok(decision) => {
            info!(?decision, exit_code = decision.exit_code(), "Exiting");
            ExitCode::from(decision.exit_code())
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "Failed to run Mountpoint");
            ExitCode::from(FATAL_EXIT_CODE)
        }
    }
}

async fn run(args: MounterArgs) -> Result<ExitDecision> {
    let _absorber = SignalAbsorber::install().context("installing termination signal handlers")?;

    let config = MounterConfig::from(&args);
    info!(
        mountpoint_path = %config.mountpoint_path.display(),
        comm_dir = %config.comm.root().display(),
        recv_timeout_secs = config.recv_timeout.as_secs(),
        "Starting {}", COMPONENT
    );

    let decision = Mounter::new(config).run().await?;
    Ok(decision)
}
