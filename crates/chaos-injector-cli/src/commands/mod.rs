//! CLI command definitions and dispatch.

pub mod cgroup_info;
pub mod cpu_stress;
pub mod exec;

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::Context;
use chaos_injector_common::config::InjectorConfig;
use chaos_injector_common::constants::APP_NAME;
use clap::{Parser, Subcommand};

/// Chaos injector: binds to a target's resources and disrupts them.
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log every mutating operation without performing it.
    #[arg(long, global = true, env = "CHAOS_INJECTOR_DRY_RUN")]
    pub dry_run: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the cgroup binding of a target process.
    CgroupInfo(cgroup_info::CgroupInfoArgs),
    /// Stress the cores allocated to a target's cgroup.
    CpuStress(cpu_stress::CpuStressArgs),
    /// Run a supervised background command, optionally in the target netns.
    Exec(exec::ExecArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration is incomplete or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = InjectorConfig::from_env(cli.dry_run)?;
    tracing::debug!(config = ?config, "injector configuration loaded");

    match cli.command {
        Command::CgroupInfo(args) => cgroup_info::execute(&config, &args),
        Command::CpuStress(args) => cpu_stress::execute(&config, &args),
        Command::Exec(args) => exec::execute(&config, args),
    }
}

/// Returns a channel that yields once on Ctrl-C, SIGTERM, or when the
/// optional duration elapses.
fn shutdown_signal(duration: Option<Duration>) -> anyhow::Result<Receiver<()>> {
    let (tx, rx) = mpsc::channel();

    let on_signal = tx.clone();
    ctrlc::set_handler(move || {
        tracing::info!("termination signal received");
        let _ = on_signal.send(());
    })
    .context("failed to set termination handler")?;

    if let Some(duration) = duration {
        let _timer = std::thread::spawn(move || {
            std::thread::sleep(duration);
            tracing::info!(duration = ?duration, "disruption duration elapsed");
            let _ = tx.send(());
        });
    }

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_cpu_stress_flags() {
        let cli = Cli::try_parse_from([
            "chaos-injector",
            "--dry-run",
            "cpu-stress",
            "--target-pid",
            "42",
            "--count",
            "50%",
            "--percentage",
            "80",
        ])
        .unwrap();
        assert!(cli.dry_run);
        let Command::CpuStress(args) = cli.command else {
            panic!("expected cpu-stress");
        };
        assert_eq!(args.target_pid, 42);
        assert_eq!(args.percentage, 80);
        assert_eq!(args.count.map(|c| c.to_string()).as_deref(), Some("50%"));
    }

    #[test]
    fn rejects_out_of_range_percentage() {
        let result = Cli::try_parse_from([
            "chaos-injector",
            "cpu-stress",
            "--target-pid",
            "42",
            "--percentage",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn exec_netns_requires_target() {
        let result = Cli::try_parse_from(["chaos-injector", "exec", "--netns", "--", "tc", "qdisc"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "chaos-injector",
            "exec",
            "--netns",
            "--target-pid",
            "7",
            "--",
            "tc",
            "qdisc",
            "show",
        ])
        .unwrap();
        let Command::Exec(args) = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(args.command, vec!["tc", "qdisc", "show"]);
    }
}
