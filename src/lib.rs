// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod sched;
pub mod types;

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{RawConfigFile, RestoreConfig, load_or_default};
use crate::engine::{ChannelEventReporter, ChannelTransport, RestoreOrchestrator};
use crate::exec::RestoreInvocation;
use crate::types::ProjectRequest;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading + CLI overrides
/// - the orchestrator with the process backend
/// - printing host events and completion messages to stdout
/// - Ctrl-C handling
///
/// Fails when any restore did not succeed.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut raw = load_or_default(args.config.as_deref())?;
    apply_overrides(&mut raw, &args);
    let cfg = RestoreConfig::try_from(raw)?;

    let projects = project_requests(&args);

    if args.dry_run {
        print_dry_run(&cfg, &projects);
        return Ok(());
    }

    let (reporter, mut events) = ChannelEventReporter::channel();
    let (transport, mut messages) = ChannelTransport::channel();
    let orchestrator =
        RestoreOrchestrator::with_process_backend(&cfg, Arc::new(reporter), Arc::new(transport));

    info!(
        program = %cfg.restore_program.display(),
        max_concurrent = cfg.max_concurrent,
        projects = projects.len(),
        "restoreq started"
    );

    // Host-facing output.
    let printer = tokio::spawn(async move {
        let mut events_open = true;
        let mut messages_open = true;
        while events_open || messages_open {
            tokio::select! {
                ev = events.recv(), if events_open => match ev {
                    Some(ev) => println!("{ev}"),
                    None => events_open = false,
                },
                msg = messages.recv(), if messages_open => match msg {
                    Some(msg) => println!("{msg}"),
                    None => messages_open = false,
                },
            }
        }
    });

    // Ctrl-C → cancel everything still running.
    let ctrl_c = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            orchestrator.shutdown();
        })
    };

    let handles: Vec<_> = projects
        .into_iter()
        .map(|project| orchestrator.submit(project))
        .collect();

    let total = handles.len();
    let mut failed = 0usize;
    for handle in handles {
        let outcome = handle.wait().await;
        if !outcome.succeeded {
            failed += 1;
        }
    }

    // Drop every sender so the printer drains and stops.
    ctrl_c.abort();
    let _ = ctrl_c.await;
    drop(orchestrator);
    let _ = printer.await;

    info!(total, failed, "restoreq finished");

    if failed > 0 {
        bail!("{failed} of {total} restores failed");
    }
    Ok(())
}

fn apply_overrides(raw: &mut RawConfigFile, args: &CliArgs) {
    if let Some(ref tool) = args.tool {
        raw.tools.primary = Some(tool.clone());
    }
    if let Some(ref host_id) = args.host_id {
        raw.host.host_id = host_id.clone();
    }
    if let Some(max) = args.max_concurrent {
        raw.limits.max_concurrent = Some(max);
    }
}

/// Context ids are 1-based positions on the command line.
fn project_requests(args: &CliArgs) -> Vec<ProjectRequest> {
    args.projects
        .iter()
        .enumerate()
        .map(|(i, path)| ProjectRequest::new(path.clone(), i as u64 + 1))
        .collect()
}

/// Simple dry-run output: resolved config and one command per project.
fn print_dry_run(cfg: &RestoreConfig, projects: &[ProjectRequest]) {
    println!("restoreq dry-run");
    println!("  program = {}", cfg.restore_program.display());
    println!("  max_concurrent = {}", cfg.max_concurrent);
    println!("  idle_timeout = {:?}", cfg.monitor.idle_timeout);
    println!("  poll_interval = {:?}", cfg.monitor.poll_interval);
    println!("  on_idle_timeout = {:?}", cfg.monitor.on_idle_timeout);
    println!("  host_id = {}", cfg.host_id);
    println!();

    println!("projects ({}):", projects.len());
    for project in projects {
        let invocation = RestoreInvocation::for_project(&cfg.restore_program, project);
        println!("  - {} (context {})", project.path.display(), project.context_id);
        println!("      cmd: {}", invocation.command_line());
        println!("      cwd: {}", invocation.working_dir.display());
    }

    debug!("dry-run complete (no execution)");
}
