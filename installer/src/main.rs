//! cast CLI entrypoint.
//!
//! Installs verified SaltStack-based distros and scaffolds new distro
//! projects. SIGINT and SIGTERM cancel a running install; a running
//! `salt-call` is killed before the process exits.

use cast_installer::cancel::Cancellation;
use cast_installer::cli::{Cli, Command, InstallArgs, LogArgs};
use cast_installer::deps::{SaltProvisioner, SystemCommandExecutor, SystemToolLocator};
use cast_installer::dirs::SystemBaseDirs;
use cast_installer::error::Result;
use cast_installer::init::write_template;
use cast_installer::install_flow::{Services, install};
use cast_installer::output::write_line;
use cast_installer::registry::Registry;
use cast_installer::release::api::HttpReleaseApi;
use cast_installer::state::StateStore;
use cast_installer::sysinfo::{OsProbe, SystemOsProbe};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io::Write;
use tracing_subscriber::fmt::time::Uptime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let cancel = Cancellation::new();
    register_signals(&cancel);

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &cancel, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, cancel: &Cancellation, stdout: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Command::Install(args) => run_install(args, cancel, stdout),
        Command::Init => {
            let path = write_template(&std::env::current_dir()?)?;
            write_line(stdout, format!("wrote {}", path.display()));
            Ok(())
        }
    }
}

fn run_install(args: &InstallArgs, cancel: &Cancellation, stdout: &mut dyn Write) -> Result<()> {
    let config = args.install_config();
    let registry = Registry::builtin()?;
    let api = HttpReleaseApi::new(args.token(), cancel.clone());
    let os = SystemOsProbe::new();
    let locator = SystemToolLocator;
    let executor = SystemCommandExecutor;
    let provisioner = SaltProvisioner::new(
        args.saltstack_install_mode,
        &config.cache_root,
        os.os_info(),
        &locator,
        &executor,
    );
    let state = StateStore::for_user(&SystemBaseDirs)?;

    let services = Services {
        registry: &registry,
        api: &api,
        os: &os,
        deps: &provisioner,
        state: &state,
    };
    let outcome = install(&config, &services, cancel, stdout)?;
    tracing::info!(
        distro = %outcome.distro,
        release = %outcome.release,
        mode = %outcome.mode,
        "installation complete"
    );
    Ok(())
}

/// Route `log` and `tracing` records to stderr.
fn init_logging(args: &LogArgs) {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(!args.log_disable_color)
        .with_file(args.log_caller)
        .with_line_number(args.log_caller)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(filter);
    let result = if args.log_full_timestamp {
        registry.with(layer).try_init()
    } else {
        registry.with(layer.with_timer(Uptime::default())).try_init()
    };
    if result.is_err() {
        // A subscriber is already installed.
    }
}

fn register_signals(cancel: &Cancellation) {
    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, cancel.flag()) {
            tracing::warn!("unable to register handler for signal {signal}: {e}");
        }
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_line(stderr, err);
            1
        }
    }
}
