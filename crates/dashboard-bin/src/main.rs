//! Studydash dashboard CLI.
//!
//! Drives the auth session and profile reconciliation core from a terminal.

mod app;
mod commands;

use std::path::PathBuf;

use app::AppState;
use clap::{Parser, Subcommand};
use commands::RegistrationArgs;
use dashboard_config_and_utils::{init_logging, Config, Paths};

/// Studydash dashboard command-line interface.
#[derive(Parser)]
#[command(name = "dashboard")]
#[command(about = "Sign in, verify email and manage the Studydash profile")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, storage and logs. Defaults to ~/.studydash
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Keep everything in memory and use an in-process auth service
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long, env = "DASHBOARD_PASSWORD", hide_env_values = true)]
        password: String,
        #[command(flatten)]
        registration: RegistrationArgs,
        /// Skip the account-exists check
        #[arg(long)]
        skip_check: bool,
    },
    /// Sign in with email and password
    Signin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "DASHBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out everywhere
    Signout,
    /// Show the current session
    Session {
        /// Exchange the refresh token first
        #[arg(long)]
        refresh: bool,
    },
    /// Check whether the email has been confirmed
    Verify {
        /// Keep checking until confirmed
        #[arg(long)]
        watch: bool,
        /// Seconds between checks with --watch
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
    /// Send the confirmation email again
    Resend {
        #[arg(long)]
        email: String,
    },
    /// Save profile details and create the profile
    CompleteProfile {
        #[command(flatten)]
        registration: RegistrationArgs,
    },
    /// Repair the profile from account metadata
    Recover,
    /// Show the auth context and profile
    Profile,
    /// Manage stored API credentials
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Clear cached session, backoff state and stored tokens
    Reset,
    /// Periodically repair the signed-in user's profile
    Sweep {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Store a credential
    Set { name: String, value: String },
    /// Print a credential
    Get { name: String },
    /// Whether a credential is stored
    Has { name: String },
    /// Delete a credential
    Remove { name: String },
    /// List stored credential names
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    // Initialize logging
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    let state = AppState::build(config, &paths, cli.ephemeral)?;

    let result = match cli.command {
        Commands::Signup {
            email,
            password,
            registration,
            skip_check,
        } => commands::auth::sign_up(&state, email, password, registration, skip_check).await,
        Commands::Signin { email, password } => {
            commands::auth::sign_in(&state, email, password).await
        }
        Commands::Signout => commands::auth::sign_out(&state).await,
        Commands::Session { refresh } => commands::auth::session(&state, refresh).await,
        Commands::Verify { watch, interval } => {
            commands::auth::verify(&state, watch, interval).await
        }
        Commands::Resend { email } => commands::auth::resend(&state, email).await,
        Commands::CompleteProfile { registration } => {
            commands::profile::complete(&state, registration).await
        }
        Commands::Recover => commands::profile::recover(&state).await,
        Commands::Profile => commands::profile::show(&state).await,
        Commands::Keys { command } => match command {
            KeyCommands::Set { name, value } => commands::keys::set(&state, &name, &value),
            KeyCommands::Get { name } => commands::keys::get(&state, &name),
            KeyCommands::Has { name } => commands::keys::has(&state, &name),
            KeyCommands::Remove { name } => commands::keys::remove(&state, &name),
            KeyCommands::List => commands::keys::list(&state),
        },
        Commands::Reset => commands::auth::reset(&state),
        Commands::Sweep { once } => commands::profile::sweep(&state, once).await,
    };

    if let Err(e) = result {
        eprintln!("{}", e.user_message());
        if e.recommends_reset() {
            eprintln!("Repeated rate limiting detected. Run `dashboard reset` to clear local auth state.");
        }
        std::process::exit(1);
    }

    Ok(())
}
