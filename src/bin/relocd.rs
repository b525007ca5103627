use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use reloc::addr::{lookup_external_ip, resolve_listen, AddressMode};
use reloc::cli::ListenOpts;
use reloc::config::FileConfig;
use reloc::logger::{Logger, NoopLogger, TextLogger};
use reloc::net::Server;

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = ListenOpts::parse();
    let mut config = FileConfig::load(opts.config.as_deref())
        .context("Failed to load config")?
        .listen;

    // CLI flags override the config file
    let (host, port) = match opts.mode {
        AddressMode::External => resolve_listen(opts.mode, opts.host.as_deref(), opts.port)?,
        AddressMode::Internal => resolve_listen(
            opts.mode,
            opts.host.as_deref().or(Some(config.host.as_str())),
            opts.port.or(Some(config.port)),
        )?,
    };
    config.host = host;
    config.port = port;
    if let Some(root) = opts.root {
        config.root = root;
    }
    if let Some(dir) = opts.log_dir {
        config.log_dir = dir;
    }
    config.is_async |= opts.is_async;
    config.use_log |= opts.log;
    if opts.no_mtime {
        config.preserve_mtime = false;
    }

    // Validate root directory exists and is a directory
    config
        .validate()
        .with_context(|| format!("Invalid destination root: {}", config.root.display()))?;
    config.root = std::fs::canonicalize(&config.root)
        .with_context(|| format!("Failed to canonicalize root path: {}", config.root.display()))?;

    // Choose logger once; zero overhead with NoopLogger
    let logger: Arc<dyn Logger> = if config.use_log {
        Arc::new(
            TextLogger::new(&config.log_dir)
                .with_context(|| format!("Failed to open log dir {}", config.log_dir.display()))?,
        )
    } else {
        Arc::new(NoopLogger)
    };

    let server = Server::bind(&config, logger.clone())
        .with_context(|| format!("bind {}", config.bind_addr()))?;

    println!("Starting reloc receiver:");
    if let Ok(name) = hostname::get() {
        println!("  Machine: {}", name.to_string_lossy());
    }
    println!("  Host: {}", config.host);
    println!("  Port: {}", config.port);
    println!("  Root: {}", config.root.display());
    if opts.mode == AddressMode::External {
        match lookup_external_ip() {
            Ok(ip) => {
                println!("  External host: {}", ip.ipv4);
                if let Some(v6) = ip.ipv6 {
                    println!("  External host (IPv6): {}", v6);
                }
            }
            Err(e) => {
                eprintln!("WARNING: {}", e);
                logger.error("external ip lookup", &e.to_string());
            }
        }
    }

    if let Some(handle) = server.receive()? {
        // The accept loop runs on its own thread; this thread has nothing
        // else to do, so keep the process alive until the loop ends.
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("receiver thread panicked"))??;
    }
    Ok(())
}
