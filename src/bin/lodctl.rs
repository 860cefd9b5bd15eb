//! `lodctl`: encode and inspect LoD batches, resolve cluster roles.
//!
//! # Usage
//!
//! ```bash
//! # One sequence per line, whitespace-separated token ids (blank line = empty sequence)
//! printf '\n1 2\n\n' | lodctl encode
//! # {"values":[1,2],"lod":[[0,0,2,2]]}
//!
//! lodctl encode --input batch.txt | lodctl decode
//!
//! # Role resolution; flags fall back to PSERVERS / SERVER_ENDPOINT / TRAINING_ROLE
//! TRAINING_ROLE=PSERVER SERVER_ENDPOINT=127.0.0.1:6174 lodctl role
//!
//! # Layer plan of the stacked LSTM classifier
//! lodctl plan --input-dim 5147
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lod_rs::cluster::{ClusterConfig, PSERVERS_VAR, SERVER_ENDPOINT_VAR, TRAINING_ROLE_VAR};
use lod_rs::lod::{self, Lod, LodTensor};
use lod_rs::model::StackedLstmConfig;
use lod_rs::tensor::{Cpu, Tensor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lodctl", version, about = "LoD batch encoding and cluster role tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode sequences (one per line) into a LoD batch
    Encode(IoArgs),
    /// Decode a LoD batch back into one sequence per line
    Decode(IoArgs),
    /// Resolve and validate this process's cluster role
    Role(RoleArgs),
    /// Print the layer plan of the stacked LSTM classifier
    Plan(PlanArgs),
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Input file (stdin when omitted)
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RoleArgs {
    /// Comma-separated host:port of every parameter server
    #[arg(long, env = PSERVERS_VAR)]
    pservers: Option<String>,

    /// host:port of this process
    #[arg(long, env = SERVER_ENDPOINT_VAR)]
    server_endpoint: Option<String>,

    /// TRAINER or PSERVER
    #[arg(long, env = TRAINING_ROLE_VAR)]
    training_role: Option<String>,

    /// Number of trainer processes
    #[arg(long, default_value_t = 2)]
    trainers: usize,
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Vocabulary size
    #[arg(long)]
    input_dim: usize,

    #[arg(long, default_value_t = 2)]
    class_dim: usize,

    #[arg(long, default_value_t = 128)]
    emb_dim: usize,

    #[arg(long, default_value_t = 512)]
    hid_dim: usize,

    /// Number of fc/lstm pairs (odd)
    #[arg(long, default_value_t = 3)]
    stacked_num: usize,
}

/// JSON form of an encoded batch: flat values plus one offset level.
#[derive(Debug, Serialize, Deserialize)]
struct EncodedBatch {
    values: Vec<i64>,
    lod: Vec<Vec<usize>>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Encode(args) => encode(&args),
        Command::Decode(args) => decode(&args),
        Command::Role(args) => role(args),
        Command::Plan(args) => plan(args),
    }
}

fn read_input(args: &IoArgs) -> Result<String> {
    match &args.input {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn parse_sequences(text: &str) -> Result<Vec<Vec<i64>>> {
    text.lines()
        .enumerate()
        .map(|(n, line)| {
            line.split_whitespace()
                .map(|tok| {
                    tok.parse::<i64>()
                        .with_context(|| format!("line {}: `{tok}` is not an integer", n + 1))
                })
                .collect()
        })
        .collect()
}

fn encode(args: &IoArgs) -> Result<()> {
    write_encoded(&read_input(args)?, &mut io::stdout().lock())
}

fn decode(args: &IoArgs) -> Result<()> {
    write_decoded(&read_input(args)?, &mut io::stdout().lock())
}

/// Encodes one-sequence-per-line text and writes the batch as a JSON line.
fn write_encoded<W: Write>(text: &str, out: &mut W) -> Result<()> {
    let sequences = parse_sequences(text)?;
    debug!(sequences = sequences.len(), "parsed input");

    let encoded = lod::encode(&sequences, Cpu).context("encoding batch")?;
    let (values, lod) = encoded.into_parts();
    let batch = EncodedBatch {
        values: values.into_data(),
        lod: vec![lod.into()],
    };

    serde_json::to_writer(&mut *out, &batch)?;
    writeln!(out)?;
    Ok(())
}

/// Parses a JSON batch and writes one sequence per line.
fn write_decoded<W: Write>(json: &str, out: &mut W) -> Result<()> {
    let batch: EncodedBatch = serde_json::from_str(json).context("parsing encoded batch")?;

    let [offsets] = <[Vec<usize>; 1]>::try_from(batch.lod).map_err(|levels| {
        anyhow::anyhow!("expected exactly one lod level, got {}", levels.len())
    })?;
    let tensor = LodTensor::from_parts(
        Tensor::column(batch.values, Cpu),
        Lod::from_offsets(offsets)?,
    )?;

    for seq in tensor.sequences() {
        let line: Vec<String> = seq.iter().map(i64::to_string).collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    Ok(())
}

fn role(args: RoleArgs) -> Result<()> {
    let mut config = ClusterConfig::from_lookup(|key| match key {
        PSERVERS_VAR => args.pservers.clone(),
        SERVER_ENDPOINT_VAR => args.server_endpoint.clone(),
        TRAINING_ROLE_VAR => args.training_role.clone(),
        _ => None,
    })?;
    config.trainers = args.trainers;
    config.validate()?;

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn plan(args: PlanArgs) -> Result<()> {
    let config = StackedLstmConfig {
        input_dim: args.input_dim,
        class_dim: args.class_dim,
        emb_dim: args.emb_dim,
        hid_dim: args.hid_dim,
        stacked_num: args.stacked_num,
    };
    config.validate().context("invalid model")?;

    println!("{}", serde_json::to_string_pretty(&config.layers())?);
    Ok(())
}
