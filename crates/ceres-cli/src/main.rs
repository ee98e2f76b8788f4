//! Ceres CLI - interactive C notebooks.

mod instrument;
mod run;
mod serve;
mod terminal;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ceres")]
#[command(about = "Interactive C execution with live output and stdin relay")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a C file interactively
    Run {
        /// Path to the C source file
        file: String,

        /// C compiler to use (defaults to $CERES_CC or gcc)
        #[arg(long)]
        cc: Option<String>,

        /// Seconds to wait for each input before sending the default value
        #[arg(long)]
        input_timeout: Option<u64>,

        /// Port of the input relay (0 picks a free port)
        #[arg(long, default_value = "0")]
        relay_port: u16,
    },

    /// Start the kernel server
    Serve {
        /// Host address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port of the WebSocket front end
        #[arg(short, long, default_value = "8888")]
        port: u16,

        /// Port of the input relay (0 picks a free port)
        #[arg(long, default_value = "0")]
        relay_port: u16,

        /// C compiler to use (defaults to $CERES_CC or gcc)
        #[arg(long)]
        cc: Option<String>,
    },

    /// Print the instrumented source of a C file
    Instrument {
        /// Path to the C source file
        file: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            file,
            cc,
            input_timeout,
            relay_port,
        } => {
            let options = run::RunOptions {
                cc,
                input_timeout,
                relay_port,
            };
            let status = run::execute(&file, options).await?;
            return Ok(run::exit_code(status));
        }

        Commands::Serve {
            host,
            port,
            relay_port,
            cc,
        } => {
            serve::execute(host, port, relay_port, cc).await?;
        }

        Commands::Instrument { file } => {
            instrument::execute(&file)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
