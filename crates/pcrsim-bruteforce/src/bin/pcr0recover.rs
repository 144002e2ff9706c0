// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recover a register value from an expected PCR0
//!
//! Boots the firmware image through the root flow with the given register
//! snapshot, then searches register values a few bits away from the
//! snapshot until the simulated PCR0 equals the expected one.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use pcrsim_bootflow::{flows, BiosImage, BootProcess, RegisterId, Registers, RunStatus, State, TpmAlg};
use pcrsim_bruteforce::{recover_register, PcrReplay, RecoveryError};

#[derive(Parser)]
#[command(name = "pcr0recover")]
#[command(about = "Find the register value that makes the simulated PCR0 match an expected value")]
struct Cli {
    /// Firmware image to boot
    firmware: PathBuf,

    /// JSON object with register values, e.g. {"ACM_POLICY_STATUS": 12345}
    #[arg(long)]
    registers: PathBuf,

    /// Expected PCR0 value, hex
    #[arg(long)]
    expected: String,

    /// PCR bank the expected value belongs to
    #[arg(long, default_value = "sha256")]
    alg: TpmAlg,

    /// Register to correct
    #[arg(long, default_value = "ACM_POLICY_STATUS")]
    register: RegisterId,

    /// Maximum number of flipped bits
    #[arg(long, default_value_t = 3)]
    max_distance: u64,

    /// Maximum worker threads, 0 for one per CPU
    #[arg(long, default_value_t = 0)]
    max_concurrency: usize,
}

fn run(cli: Cli) -> Result<bool> {
    let expected = hex::decode(cli.expected.trim_start_matches("0x"))
        .context("expected PCR0 is not valid hex")?;

    let content = fs::read(&cli.firmware)
        .with_context(|| format!("failed to read firmware from {}", cli.firmware.display()))?;
    let json = fs::read_to_string(&cli.registers)
        .with_context(|| format!("failed to read registers from {}", cli.registers.display()))?;
    let registers: Registers = serde_json::from_str(&json)
        .with_context(|| format!("invalid register snapshot in {}", cli.registers.display()))?;

    let mut state = State::with_bios_image(BiosImage::new(content))?;
    state.include_artifact(registers)?;
    let mut process = BootProcess::with_flow(state, flows::root());
    if let RunStatus::Aborted(e) = process.finish() {
        bail!("boot flow aborted: {}", e);
    }

    let replay = PcrReplay::from_state(process.state(), 0, cli.alg)?;
    let simulated = replay.final_value()?;
    println!("simulated PCR0 {}: {}", cli.alg, hex::encode(&simulated));
    if simulated == expected {
        println!("simulated PCR0 already matches, nothing to recover");
        return Ok(true);
    }

    let location = replay
        .locate_register(cli.register)
        .ok_or(RecoveryError::RegisterNotMeasured {
            id: cli.register,
            pcr: 0,
        })?;
    match recover_register(
        &replay,
        location,
        &expected,
        cli.max_distance,
        cli.max_concurrency,
    )? {
        Some(recovered) => {
            println!("{}", recovered);
            Ok(true)
        }
        None => {
            println!(
                "no {} value within {} flipped bits reproduces the expected PCR0",
                cli.register, cli.max_distance
            );
            Ok(false)
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
