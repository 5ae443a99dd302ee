mod classify;
mod controller;
mod coordinator;
mod dispatch;
mod normal_mode;
mod render;
mod usage;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use anyhow::Result;
use setupbase_core::{ExitStatus, SetupError};
use setupbase_installer::{InstallerLayout, SelfRestarter};
use tracing_subscriber::EnvFilter;

use crate::classify::ArgumentSet;
use crate::dispatch::{run_mode, LaunchContext};
use crate::render::{current_output_style, render_status_line, OutputStyle};

fn main() {
    let mut raw = std::env::args_os().map(|arg| arg.to_string_lossy().into_owned());
    let program = raw.next().unwrap_or_else(|| "setupbase".to_string());
    let tokens: Vec<String> = raw.collect();

    let args = ArgumentSet::new(tokens);
    init_tracing(args.is_verbose());

    let current_exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from(&program));
    let mut restarter = SelfRestarter::new(current_exe.clone());
    let style = current_output_style();

    let code = run_guarded(style, || {
        let context = LaunchContext {
            args,
            current_exe,
            layout: InstallerLayout::detect(),
            style,
        };
        run_mode(&context, &mut restarter)
    });

    if let Err(err) = restarter.finish() {
        eprintln!("{}", render_status_line(style, "error", &format!("{err:#}")));
    }
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "setupbase=debug"
    } else {
        "setupbase=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

/// Runs a mode handler behind the outer error boundary. Every escaping error,
/// panics included, ends up as `Failure`.
fn run_guarded(style: OutputStyle, run: impl FnOnce() -> Result<i32>) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => {
            eprintln!("{}", render_status_line(style, "error", &describe_error(&err)));
            ExitStatus::Failure.code()
        }
        Err(_) => {
            eprintln!(
                "{}",
                render_status_line(style, "error", "Unknown error, aborting.")
            );
            ExitStatus::Failure.code()
        }
    }
}

fn describe_error(err: &anyhow::Error) -> String {
    match err
        .chain()
        .find_map(|cause| cause.downcast_ref::<SetupError>())
    {
        Some(setup_error) => setup_error.to_string(),
        None => format!("{err:#}"),
    }
}

#[cfg(test)]
mod tests;
