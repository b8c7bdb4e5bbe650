use anyhow::Result;
use clap::Parser;
use colored::*;
use serde::Serialize;
use std::collections::HashMap;

use vmem::{VirtualMemory, Word, NUM_FRAMES, NUM_PAGES, VIRTUAL_ADDRESS_WIDTH};

/// Workload driver for the virtual-memory simulator: writes a pattern of
/// probes, reads them back, and reports the paging activity.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of write/read probes
    #[arg(short = 'n', long, default_value_t = 1000)]
    probes: u64,

    /// Address pattern (sequential, strided, random)
    #[arg(short, long, default_value = "strided")]
    pattern: String,

    /// Stride in words for the strided pattern
    #[arg(short, long, default_value_t = 4097)]
    stride: u64,

    /// Seed for the random pattern
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,
}

#[derive(Serialize)]
struct TraceReport {
    pattern: String,
    probes: u64,
    distinct_addresses: usize,
    mismatches: u64,
    faults: u64,
    restores: u64,
    evictions: u64,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let addresses = generate_addresses(&args)?;

    let mut vm = VirtualMemory::new();
    // Later writes to the same address win; track what each one should
    // read back as.
    let mut expected: HashMap<u64, Word> = HashMap::new();
    for (i, &addr) in addresses.iter().enumerate() {
        let value = probe_value(i);
        if !vm.write(addr, value) {
            anyhow::bail!("write rejected for in-range address {addr:#x}");
        }
        expected.insert(addr, value);
    }

    let mut mismatches = 0u64;
    for (&addr, &value) in &expected {
        match vm.read(addr) {
            Some(got) if got == value => {}
            Some(got) => {
                mismatches += 1;
                println!(
                    "  {} addr {:#07x}: expected {}, got {}",
                    "MISMATCH".red().bold(),
                    addr,
                    value,
                    got
                );
            }
            None => anyhow::bail!("read rejected for in-range address {addr:#x}"),
        }
    }

    let stats = vm.stats();
    let report = TraceReport {
        pattern: args.pattern.clone(),
        probes: args.probes,
        distinct_addresses: expected.len(),
        mismatches,
        faults: stats.faults,
        restores: stats.restores,
        evictions: stats.evictions,
    };

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_summary(&report),
    }

    if mismatches > 0 {
        anyhow::bail!("{mismatches} probes read back the wrong value");
    }
    Ok(())
}

fn generate_addresses(args: &Args) -> Result<Vec<u64>> {
    let space = 1u64 << VIRTUAL_ADDRESS_WIDTH;
    let addresses = match args.pattern.as_str() {
        "sequential" => (0..args.probes).map(|i| i % space).collect(),
        "strided" => (0..args.probes)
            .map(|i| (i * args.stride) % space)
            .collect(),
        "random" => {
            // Deterministic LCG so runs are reproducible by seed.
            let mut state = args.seed;
            (0..args.probes)
                .map(|_| {
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    (state >> 16) % space
                })
                .collect()
        }
        other => anyhow::bail!("unknown pattern: {other} (expected sequential, strided or random)"),
    };
    Ok(addresses)
}

fn probe_value(i: usize) -> Word {
    (i as Word).wrapping_mul(2654435761u32 as Word) | 1
}

fn print_summary(report: &TraceReport) {
    println!("{}", "Paging Trace".bold().blue());
    println!("{}", "=====================================".blue());
    println!(
        "  geometry: {} frames / {} pages",
        NUM_FRAMES, NUM_PAGES
    );
    println!("  pattern: {}", report.pattern);
    println!(
        "  probes: {} ({} distinct addresses)",
        report.probes, report.distinct_addresses
    );
    println!();
    println!("  page faults: {}", report.faults);
    println!("  restores:    {}", report.restores);
    println!("  evictions:   {}", report.evictions);
    println!();
    if report.mismatches == 0 {
        println!("  {} all probes read back correctly", "OK".green().bold());
    } else {
        println!(
            "  {} {} mismatches",
            "FAIL".red().bold(),
            report.mismatches
        );
    }
}
