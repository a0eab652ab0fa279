//! Kiln CLI - incremental static-asset build pipeline
//!
//! Usage: kiln <COMMAND>
//!
//! Commands:
//!   build   Build all configured modules incrementally
//!   watch   Watch for source changes and rebuild continuously
//!   clean   Remove the output directory and the build cache

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use clap::Parser;

use kiln::cli::{Cli, Commands};
use kiln::config::BuildConfig;
use kiln::watch::{WatchMode, WatchOptions};
use kiln::workflow::{BuildEvent, Workflow};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            config,
            release,
            modules,
            file,
            port,
        } => cmd_build(&config, release, modules, file, port, cli.json),
        Commands::Watch {
            config,
            debounce,
            port,
        } => cmd_watch(&config, debounce, port, cli.json),
        Commands::Clean { config } => cmd_clean(&config, cli.json),
    }
}

fn cmd_build(
    config_path: &Path,
    release: bool,
    modules: Option<Vec<String>>,
    file: Option<std::path::PathBuf>,
    port: Option<u16>,
    json: bool,
) -> Result<()> {
    let mut config = BuildConfig::load(config_path)?;
    if release {
        config.release = true;
    }

    // On-change mode: rebuild only the module owning the given source file.
    let modules = match file {
        Some(file) => {
            let abs = if file.is_absolute() {
                file
            } else {
                config.root.join(file)
            };
            let paths: BTreeSet<_> = [abs.clone()].into_iter().collect();
            let owners = kiln::watch::owning_modules(&config, &paths);
            if owners.is_empty() {
                anyhow::bail!("{} is not inside any configured module", abs.display());
            }
            Some(owners.into_iter().collect())
        }
        None => modules,
    };

    if !json {
        println!("kiln build");
        println!("Config: {}", config_path.display());
        println!("Output: {}", config.output.display());
        if config.release {
            println!("Mode: release");
        }
    }

    let mut workflow = Workflow::new(&config);
    if json {
        workflow = workflow.with_events(Box::new(|event| println!("{}", event.to_json())));
    } else {
        workflow = workflow.with_events(Box::new(|event| {
            if let BuildEvent::ModuleBuilt {
                module,
                compiled,
                cached,
            } = event
            {
                println!("  {module}: {compiled} compiled, {cached} cached");
            }
        }));
    }

    let filter: Option<BTreeSet<String>> = modules.map(|list| list.into_iter().collect());
    let report = workflow.run_filtered(filter.as_ref())?;

    if !json {
        for entry in &report.errors {
            eprintln!("error [{}] {}", entry.module, entry.message);
        }
        for entry in &report.warnings {
            eprintln!("warning [{}] {}", entry.module, entry.message);
        }
        println!(
            "Done: {} compiled, {} cached, {} removed, {} error(s)",
            report.compiled,
            report.cached,
            report.removed,
            report.errors.len()
        );
    }

    if let Some(port) = port {
        notify_reload(port);
    }
    Ok(())
}

/// Best-effort ping to a local hot-reload listener.
fn notify_reload(port: u16) {
    if let Ok(mut stream) = std::net::TcpStream::connect(("127.0.0.1", port)) {
        use std::io::Write;
        let _ = stream.write_all(b"reload\n");
    }
}

fn cmd_watch(config_path: &Path, debounce: u64, port: Option<u16>, json: bool) -> Result<()> {
    let config = BuildConfig::load(config_path)?;

    if !json {
        println!("kiln watch");
        println!("Watching {} module(s); Ctrl-C to stop", config.modules.len());
    }

    let mut watch = WatchMode::new(
        &config,
        WatchOptions {
            debounce_ms: debounce,
            notify_port: port,
        },
    );
    if json {
        watch = watch.with_events(Box::new(|event| println!("{}", event.to_json())));
    }
    watch.run()?;
    Ok(())
}

fn cmd_clean(config_path: &Path, json: bool) -> Result<()> {
    let config = BuildConfig::load(config_path)?;

    if config.output.exists() {
        std::fs::remove_dir_all(&config.output)?;
    }
    if !json {
        println!("Removed {}", config.output.display());
    }
    Ok(())
}
