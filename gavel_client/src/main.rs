//! Gavel client side executable.

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;

use tokio::runtime::Builder;

use gavel::{
    logger_init, pf_error, pf_warn, set_me, ClientConfig, FailoverClient,
    GavelError,
};

mod clients;

use crate::clients::{ClientMode, ClientRepl, ClientTester};

/// Command line arguments definition.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Primary node's address.
    #[arg(short, long)]
    primary: SocketAddr,

    /// Backup node's address.
    #[arg(short, long)]
    backup: SocketAddr,

    /// Client utility mode to run: repl|tester.
    #[arg(short, long)]
    utility: String,

    /// Client configuration TOML string.
    /// Every '+' is treated as newline.
    #[arg(long, default_value_t = String::from(""))]
    config: String,

    /// Mode-specific client parameters TOML string.
    /// Every '+' is treated as newline.
    #[arg(long, default_value_t = String::from(""))]
    params: String,

    /// Number of tokio worker threads.
    #[arg(long, default_value_t = 2)]
    threads: usize,
}

impl CliArgs {
    /// Sanitize command line arguments, return `Ok(mode)` on success or
    /// `Err(GavelError)` on any error.
    fn sanitize(&self) -> Result<ClientMode, GavelError> {
        if self.threads < 2 {
            Err(GavelError::msg(format!(
                "invalid number of threads {}",
                self.threads
            )))
        } else if self.primary == self.backup {
            Err(GavelError::msg(format!(
                "primary and backup share address {}",
                self.primary
            )))
        } else {
            ClientMode::parse_name(&self.utility).ok_or_else(|| {
                GavelError::msg(format!(
                    "utility mode '{}' unrecognized",
                    self.utility
                ))
            })
        }
    }
}

/// Actual main function of Gavel client executable.
fn client_main() -> Result<(), GavelError> {
    // read in and parse command line arguments
    let mut args = CliArgs::parse();
    let mode = args.sanitize()?;

    // parse optional config string if given
    let config_str = if args.config.is_empty() {
        None
    } else {
        args.config = args.config.replace('+', "\n");
        Some(&args.config[..])
    };
    let config = ClientConfig::from_toml(config_str)?;

    // parse optional params string if given
    let params_str = if args.params.is_empty() {
        None
    } else {
        args.params = args.params.replace('+', "\n");
        Some(&args.params[..])
    };

    let (primary, backup) = (args.primary, args.backup);

    // create tokio multi-threaded runtime
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.threads)
        .thread_name("tokio-worker-client")
        .build()?;

    // enter tokio runtime, connect to the service, and do work
    runtime.block_on(async move {
        let client =
            FailoverClient::new_and_connect(primary, backup, config).await?;

        match mode {
            ClientMode::Repl => {
                // run interactive REPL loop
                let mut repl = ClientRepl::new(client);
                repl.run().await?;
            }
            ClientMode::Tester => {
                // run scripted failover scenario
                let mut tester = ClientTester::new(client, params_str)?;
                tester.run().await?;
            }
        }

        Ok::<(), GavelError>(()) // give type hint for this async closure
    })
}

/// Main function of Gavel client executable.
fn main() -> ExitCode {
    logger_init();
    set_me("client");

    if let Err(ref e) = client_main() {
        pf_error!("client_main exitted: {}", e);
        ExitCode::FAILURE
    } else {
        pf_warn!("client_main exitted successfully");
        ExitCode::SUCCESS
    }
}
