mod cli;

use anyhow::{Context, Result};
use checkpoint_service::{ManagerConfig, ServiceDescriptor, ServiceManager};
use clap::Parser;
use log::error;

fn main() {
    // Initialize logger with custom format; tool noise stays at debug level
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = real_main() {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    let mut config =
        ManagerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if args.backend.is_some() {
        config.backend = args.backend;
    }
    let manager = ServiceManager::new(config).context("Failed to initialise service manager")?;

    match args.sub {
        cli::Cmd::Install {
            name,
            script,
            project_dir,
            project_name,
            service_type,
        } => {
            let desc = ServiceDescriptor::new(name, script, project_dir, project_name, service_type);
            manager
                .install(&desc)
                .with_context(|| format!("Failed to install {}", desc.service_name))?;
            println!("{} installed ({})", desc.service_name, manager.backend());
            Ok(())
        }
        cli::Cmd::Uninstall { name } => {
            manager
                .uninstall(&name)
                .with_context(|| format!("Failed to uninstall {name}"))?;
            println!("{name} uninstalled");
            Ok(())
        }
        cli::Cmd::Start { name } => handle_toggle(&name, "started", manager.start(&name)),
        cli::Cmd::Stop { name } => handle_toggle(&name, "stopped", manager.stop(&name)),
        cli::Cmd::Restart { name } => handle_toggle(&name, "restarted", manager.restart(&name)),
        cli::Cmd::Status { name } => handle_status(&manager, &name),
        cli::Cmd::List { pattern, names } => {
            let rows = match (names, pattern) {
                (true, _) => manager.list_service_names()?,
                (false, Some(pattern)) => manager.list(&pattern)?,
                (false, None) => manager.list_checkpoint_rows()?,
            };
            for row in rows {
                println!("{row}");
            }
            Ok(())
        }
        cli::Cmd::Detect => {
            println!("{}", manager.backend());
            Ok(())
        }
    }
}

/// Handle status command - exit 0 when running, 1 otherwise
fn handle_status(manager: &ServiceManager, name: &str) -> Result<()> {
    match manager.status(name) {
        Ok(status) => {
            println!("{name} is {status}");
            std::process::exit(if status.is_running() { 0 } else { 1 });
        }
        Err(e) => {
            eprintln!("Error checking status: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Handle start/stop/restart - one line, exit 0 on success
fn handle_toggle(name: &str, verb: &str, result: checkpoint_service::Result<()>) -> Result<()> {
    match result {
        Ok(()) => {
            println!("{name} {verb} successfully");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Failed: {e:#}");
            std::process::exit(1);
        }
    }
}
