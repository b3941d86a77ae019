//! App Updater command line host
//!
//! Usage:
//!   app-updater check  [--config <path>] [--version-current <v>] [--verbose]
//!   app-updater update [--config <path>] [--version-current <v>] [--verbose]
//!
//! Exit status is 0 on success, 1 on failure and 2 when the installation
//! may have been left broken.

use std::path::PathBuf;
use std::process::ExitCode;

use app_updater::config::ConfigStore;
use app_updater::logging::{LogLevel, LoggingSystem};
use app_updater::update::{
    CheckOutcome, EventSink, PlatformTarget, UpdateEvent, UpdateOutcome, UpdateSession,
};
use app_updater::UpdateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Check,
    Update,
}

/// Command line arguments
#[derive(Debug, PartialEq, Eq)]
struct Args {
    command: Command,
    /// Config file; the per-user default if unset
    config: Option<PathBuf>,
    /// Overrides the configured current version
    version_current: Option<String>,
    verbose: bool,
}

impl Args {
    fn parse() -> Result<Self, String> {
        Self::parse_from(std::env::args().skip(1))
    }

    fn parse_from(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut command = None;
        let mut config = None;
        let mut version_current = None;
        let mut verbose = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "check" if command.is_none() => command = Some(Command::Check),
                "update" if command.is_none() => command = Some(Command::Update),
                "--config" | "-c" => {
                    let path = args.next().ok_or("--config requires a path")?;
                    config = Some(PathBuf::from(path));
                }
                "--version-current" => {
                    version_current =
                        Some(args.next().ok_or("--version-current requires a version")?);
                }
                "--verbose" | "-v" => {
                    verbose = true;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => {
                    return Err(format!("Unknown argument: {}", arg));
                }
            }
        }

        let command = command.ok_or("a command (check or update) is required")?;

        Ok(Self {
            command,
            config,
            version_current,
            verbose,
        })
    }
}

fn print_help() {
    println!(
        r#"App Updater - self-update engine

USAGE:
    app-updater <COMMAND> [OPTIONS]

COMMANDS:
    check                        Report whether a newer version is available
    update                       Download, verify and install the newer version

OPTIONS:
    -c, --config <PATH>          Config file (default: per-user config dir)
        --version-current <V>    Version of the running application
    -v, --verbose                Enable debug logging
    -h, --help                   Print this help message

ENVIRONMENT:
    APP_UPDATER_ENDPOINT         Manifest URL
    APP_UPDATER_CURRENT_VERSION  Version of the running application
"#
    );
}

fn log_event(event: UpdateEvent) {
    match event {
        UpdateEvent::UpdateAvailable { version } => {
            tracing::info!(version = %version, "Update available");
        }
        UpdateEvent::Installed { version } => {
            tracing::info!(version = %version, "Update installed, restart to apply");
        }
        UpdateEvent::Error {
            kind,
            message,
            unrecoverable,
        } => {
            tracing::error!(kind = %kind, unrecoverable, "{}", message);
        }
    }
}

async fn run(args: Args) -> Result<(), UpdateError> {
    let path = args.config.clone().unwrap_or_else(ConfigStore::default_path);
    let store = ConfigStore::load(&path).await?;
    let created = store.created();
    let mut config = store.into_config();
    config.apply_env_overrides();
    if let Some(version) = args.version_current {
        config.current_version = version;
    }
    if args.verbose {
        config.logging.level = LogLevel::Debug;
    }

    let _logging = match LoggingSystem::init(config.logging.clone()) {
        Ok(system) => Some(system),
        Err(e) => {
            eprintln!("Logging disabled: {}", e);
            None
        }
    };
    if created {
        tracing::info!(config = %path.display(), "Created default updater config");
    } else {
        tracing::debug!(config = %path.display(), "Configuration loaded");
    }

    let mut session = UpdateSession::new(config, PlatformTarget::current())?
        .with_events(EventSink::callback(log_event));

    match args.command {
        Command::Check => match session.check().await? {
            CheckOutcome::Skipped => println!("skipped: development environment"),
            CheckOutcome::UpToDate => println!("up to date: {}", session.current_version()),
            CheckOutcome::UpdateAvailable(version) => println!("update available: {}", version),
        },
        Command::Update => match session.update().await? {
            UpdateOutcome::Skipped => println!("skipped: development environment"),
            UpdateOutcome::UpToDate => println!("up to date: {}", session.current_version()),
            UpdateOutcome::Installed(version) => println!("installed: {}", version),
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            return ExitCode::from(1);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.is_unrecoverable() {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, String> {
        Args::parse_from(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_full_command_line() {
        let args = parse(&[
            "update",
            "--config",
            "/etc/app/updater.json",
            "--version-current",
            "1.2.3",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.command, Command::Update);
        assert_eq!(args.config, Some(PathBuf::from("/etc/app/updater.json")));
        assert_eq!(args.version_current.as_deref(), Some("1.2.3"));
        assert!(args.verbose);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["check", "update"]).is_err());
        assert!(parse(&["check", "--config"]).is_err());
        assert!(parse(&["check", "--bogus"]).is_err());
    }
}
