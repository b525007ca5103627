//! reloc - send a file or folder to a listening relocd

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

use reloc::addr::{resolve_target, AddressMode};
use reloc::cli::SendOpts;
use reloc::config::FileConfig;
use reloc::net::{Client, Transmission};
use reloc::protocol::timeouts::PROGRESS_TICK_MS;

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
    pb
}

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = SendOpts::parse();
    let file_config = FileConfig::load(opts.config.as_deref()).context("Failed to load config")?;

    // CLI flags override the config file
    let mut config = file_config.send;
    let (host, port) = match opts.mode {
        // External targets must be spelled out on the command line
        AddressMode::External => resolve_target(opts.mode, opts.host.as_deref(), opts.port)?,
        AddressMode::Internal => resolve_target(
            opts.mode,
            opts.host.as_deref().or(Some(config.host.as_str())),
            opts.port.or(Some(config.port)),
        )?,
    };
    config.host = host;
    config.port = port;
    if opts.timeout.is_some() {
        config.timeout_secs = opts.timeout;
    }
    config.is_async |= opts.is_async;

    let kind = if opts.path.is_dir() { "folder" } else { "file" };
    let name = reloc::fs_enum::transfer_name(&opts.path);
    let start = Instant::now();

    let mut client = Client::new(config);
    if opts.progress {
        // The whole tree is read into memory before anything is sent.
        eprintln!(
            "Reading {} bytes from {}",
            reloc::fs_enum::estimate_bytes(&opts.path),
            opts.path.display()
        );
    }
    let pb = opts.progress.then(progress_bar);
    if let Some(pb) = &pb {
        client = client.with_progress(pb.clone());
    }

    let report = match client
        .transmit(&opts.path)
        .with_context(|| format!("Failed to send {}", opts.path.display()))?
    {
        Transmission::Sent(report) => report,
        // The worker owns the socket; waiting here only keeps the process
        // alive until the bytes are out.
        detached @ Transmission::Detached(_) => detached.wait()?,
    };
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    println!("Successfully sent {}: {}", kind, name.display());
    println!(
        "{} entries, {} bytes on the wire in {:.2}s",
        report.entries,
        report.wire_bytes,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
