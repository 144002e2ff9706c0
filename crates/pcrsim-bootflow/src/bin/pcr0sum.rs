// SPDX-License-Identifier: MIT OR Apache-2.0

//! Simulate the measured boot of a firmware image
//!
//! Runs a boot flow over the image and prints what was measured: the log of
//! executed steps, the TPM command log, the final PCR values per bank, the
//! event log and the measured data with its byte references.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde::Serialize;

use pcrsim_bootflow::{
    flows, ActionCoordinates, BiosImage, BootProcess, References, Registers, RunStatus, State,
    Tpm, TpmAlg, TrustChainKind, SUPPORTED_ALGORITHMS,
};

#[derive(Parser)]
#[command(name = "pcr0sum")]
#[command(about = "Simulate the measured boot of a firmware image and print the resulting PCRs")]
struct Cli {
    /// Firmware image to boot
    firmware: PathBuf,

    /// Flow to run: root, intel, amd or ocp-pei
    #[arg(long, default_value = "root")]
    flow: String,

    /// JSON object with register values, e.g. {"ACM_POLICY_STATUS": 12345}
    #[arg(long)]
    registers: Option<PathBuf>,

    /// TPM banks to allocate (repeatable)
    #[arg(long = "alg")]
    algorithms: Vec<TpmAlg>,

    /// Print a JSON report instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct StepJson {
    flow: &'static str,
    flow_index: usize,
    step_index: usize,
    step: String,
    actions: Vec<String>,
    issues: Vec<String>,
}

#[derive(Serialize)]
struct EventJson {
    pcr: u8,
    alg: &'static str,
    event_type: String,
    digest: String,
    description: String,
}

#[derive(Serialize)]
struct MeasuredJson {
    actor: String,
    coords: ActionCoordinates,
    trust_chain: TrustChainKind,
    source: Option<String>,
    data: String,
    /// Byte references as recorded, `None` for forced bytes
    references: Option<References>,
    /// Hashed bytes, hex
    bytes: Option<String>,
}

/// JSON-friendly report with hex-encoded digests
#[derive(Serialize)]
struct ReportJson {
    flow: String,
    status: String,
    steps: Vec<StepJson>,
    /// PCR values grouped by algorithm: {"sha256": {"0": "abc...", ...}}
    pcrs: BTreeMap<&'static str, BTreeMap<u8, String>>,
    commands: Vec<String>,
    event_log: Vec<EventJson>,
    measured: Vec<MeasuredJson>,
}

impl ReportJson {
    fn new(flow: &str, process: &BootProcess) -> Self {
        let state = process.state();
        let tpm = state.tpm().ok();

        let steps = process
            .log()
            .iter()
            .map(|r| StepJson {
                flow: r.flow,
                flow_index: r.flow_index,
                step_index: r.step_index,
                step: r.step.clone(),
                actions: r.actions.iter().map(ToString::to_string).collect(),
                issues: r.issues.iter().map(ToString::to_string).collect(),
            })
            .collect();

        let mut pcrs: BTreeMap<&'static str, BTreeMap<u8, String>> = BTreeMap::new();
        if let Some(tpm) = tpm {
            for pcr in measured_pcrs(tpm) {
                for (alg, value) in tpm.pcr_values().banks(pcr) {
                    pcrs.entry(alg.name())
                        .or_default()
                        .insert(pcr, hex::encode(value));
                }
            }
        }

        let commands = tpm
            .map(|t| t.command_log().iter().map(ToString::to_string).collect())
            .unwrap_or_default();
        let event_log = tpm
            .map(|t| {
                t.event_log()
                    .iter()
                    .map(|e| EventJson {
                        pcr: e.pcr,
                        alg: e.alg.name(),
                        event_type: e.event_type.to_string(),
                        digest: hex::encode(&e.digest),
                        description: e.description.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let measured = state
            .measured_data()
            .iter()
            .map(|m| MeasuredJson {
                actor: m.actor.to_string(),
                coords: m.actor.coords,
                trust_chain: m.trust_chain,
                source: m.data_source.as_ref().map(ToString::to_string),
                data: m.data.to_string(),
                references: m.data.get_references().cloned(),
                bytes: m.data.bytes(state.artifacts()).ok().map(hex::encode),
            })
            .collect();

        Self {
            flow: flow.to_string(),
            status: process.status().to_string(),
            steps,
            pcrs,
            commands,
            event_log,
            measured,
        }
    }
}

/// PCR0 plus every PCR the event log mentions.
fn measured_pcrs(tpm: &Tpm) -> BTreeSet<u8> {
    let mut pcrs: BTreeSet<u8> = tpm.event_log().iter().map(|e| e.pcr).collect();
    pcrs.insert(0);
    pcrs
}

fn print_text(process: &BootProcess) {
    println!("== Steps ==");
    print!("{}", process.log());
    println!("status: {}", process.status());

    let Ok(tpm) = process.state().tpm() else {
        return;
    };
    println!("\n== Command log ==");
    print!("{}", tpm.command_log());

    println!("\n== PCR values ==");
    for pcr in measured_pcrs(tpm) {
        for (alg, value) in tpm.pcr_values().banks(pcr) {
            println!("PCR{} {:<6} {}", pcr, alg.name(), hex::encode(value));
        }
    }

    println!("\n== Event log ==");
    for (idx, entry) in tpm.event_log().iter().enumerate() {
        println!("{:4}. {}", idx, entry);
    }

    println!("\n== Measured data ==");
    print!("{}", process.state().measured_data());
}

fn load_registers(path: &Path) -> Result<Registers> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read registers from {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("invalid register snapshot in {}", path.display()))
}

fn run(cli: Cli) -> Result<()> {
    let flow = flows::by_name(&cli.flow).ok_or_else(|| {
        anyhow!(
            "unknown flow '{}', expected one of: {}",
            cli.flow,
            flows::FLOW_NAMES.join(", ")
        )
    })?;

    let content = fs::read(&cli.firmware)
        .with_context(|| format!("failed to read firmware from {}", cli.firmware.display()))?;
    let algorithms = if cli.algorithms.is_empty() {
        SUPPORTED_ALGORITHMS.to_vec()
    } else {
        cli.algorithms.clone()
    };

    let mut state = State::new();
    state.include_artifact(BiosImage::new(content))?;
    state.include_trust_chain(Tpm::with_algorithms(&algorithms).context("invalid TPM banks")?)?;
    if let Some(path) = &cli.registers {
        state.include_artifact(load_registers(path)?)?;
    }

    let mut process = BootProcess::with_flow(state, flow);
    process.finish();

    if cli.json {
        let report = ReportJson::new(&cli.flow, &process);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&process);
    }

    if let RunStatus::Aborted(e) = process.status() {
        bail!("boot flow aborted: {}", e);
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
