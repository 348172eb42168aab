//! Gavel server node executable.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::{self, ExitCode};

use clap::Parser;

use tokio::runtime::Builder;

use gavel::{
    logger_init, pf_error, pf_info, pf_warn, set_me, GavelError, NodeRole,
    ServerConfig, ServerNode,
};

/// Command line arguments definition.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Role to start in: primary|backup.
    #[arg(short, long)]
    role: String,

    /// Port open to clients and, on the backup, to the primary.
    #[arg(short, long, default_value_t = 52700)]
    api_port: u16,

    /// Backup node's address; required for the primary.
    #[arg(short, long)]
    backup: Option<SocketAddr>,

    /// Server configuration TOML string.
    /// Every '+' is treated as newline.
    #[arg(long, default_value_t = String::from(""))]
    config: String,

    /// Number of tokio worker threads.
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

impl CliArgs {
    /// Sanitize command line arguments, return `Ok(role)` on success or
    /// `Err(GavelError)` on any error.
    fn sanitize(&self) -> Result<NodeRole, GavelError> {
        let role = match NodeRole::parse_name(&self.role) {
            Some(role) => role,
            None => {
                return Err(GavelError::msg(format!(
                    "role '{}' unrecognized",
                    self.role
                )))
            }
        };

        if self.api_port <= 1024 {
            Err(GavelError::msg(format!(
                "invalid api_port {}",
                self.api_port
            )))
        } else if self.threads < 2 {
            Err(GavelError::msg(format!(
                "invalid number of threads {}",
                self.threads
            )))
        } else if role == NodeRole::Primary && self.backup.is_none() {
            Err(GavelError::msg("primary requires --backup address"))
        } else if role == NodeRole::Backup && self.backup.is_some() {
            Err(GavelError::msg("backup does not take --backup address"))
        } else {
            Ok(role)
        }
    }
}

/// Actual main function of Gavel server executable.
fn server_main() -> Result<(), GavelError> {
    // read in and parse command line arguments
    let mut args = CliArgs::parse();
    let role = args.sanitize()?;
    set_me(role.to_string());

    // parse optional config string if given
    let config_str = if args.config.is_empty() {
        None
    } else {
        args.config = args.config.replace('+', "\n");
        Some(&args.config[..])
    };
    let config = ServerConfig::from_toml(config_str)?;

    // set up termination signals handler
    ctrlc::set_handler(move || {
        pf_warn!("server caught termination signal");
        process::exit(0);
    })?;

    let api_addr =
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.api_port);
    let backup_addr = args.backup;

    // create tokio multi-threaded runtime
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.threads)
        .thread_name("tokio-worker-server")
        .build()?;

    // enter tokio runtime, launch the node, and serve until killed
    runtime.block_on(async move {
        let node =
            ServerNode::launch(role, api_addr, backup_addr, config).await?;
        pf_info!("serving on {}", node.local_addr());

        // the node runs entirely on background tasks
        std::future::pending::<()>().await;
        Ok::<(), GavelError>(()) // give type hint for this async closure
    })
}

/// Main function of Gavel server executable.
fn main() -> ExitCode {
    logger_init();

    if let Err(ref e) = server_main() {
        pf_error!("server_main exitted: {}", e);
        ExitCode::FAILURE
    } else {
        pf_warn!("server_main exitted successfully");
        ExitCode::SUCCESS
    }
}
