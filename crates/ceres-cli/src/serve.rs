//! Serve command implementation for Ceres CLI.
//!
//! Starts the WebSocket front end and the input relay.

use ceres_core::colors;
use ceres_core::{CompilerConfig, ExecutionConfig};
use ceres_server::ServerConfig;

/// Start the kernel server.
pub async fn execute(
    host: String,
    port: u16,
    relay_port: u16,
    cc: Option<String>,
) -> anyhow::Result<()> {
    println!("\n{}Ceres Server{} - Interactive C", colors::BOLD, colors::RESET);
    println!("{}", "─".repeat(50));

    let mut compiler = CompilerConfig::default();
    if let Some(cc) = cc {
        compiler = compiler.with_program(cc);
    }
    println!(
        "{}  ◆ Compiler:{} {}",
        colors::CYAN,
        colors::RESET,
        compiler.program.display()
    );

    let config = ServerConfig {
        host,
        port,
        relay_port,
    };

    println!(
        "{}  ◆ WebSocket:{} ws://{}:{}/ws",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    if config.relay_port != 0 {
        println!(
            "{}  ◆ Input relay:{} http://{}:{}/",
            colors::CYAN,
            colors::RESET,
            config.host,
            config.relay_port
        );
    }
    println!("{}", "─".repeat(50));
    println!("{}Press Ctrl+C to stop{}", colors::GREEN, colors::RESET);
    println!();

    ceres_server::serve(config, compiler, ExecutionConfig::default()).await?;

    Ok(())
}
