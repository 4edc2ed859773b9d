//! fq command-line client.
//!
//! Publishes stdin lines, subscribes with a transient binding, or prints
//! broker status counters over a single authenticated session.

use anyhow::{bail, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use fq_session::{Client, Message, TransientSubHooks};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::FqConfig;

/// fq broker command-line client
#[derive(Parser, Debug)]
#[command(name = "fq", version, about = "fq broker command-line client")]
struct Args {
    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Broker port
    #[arg(long)]
    port: Option<u16>,

    /// Sender credentials, user[/queue[/queue_type]]
    #[arg(long)]
    sender: Option<String>,

    /// Password
    #[arg(long)]
    password: Option<String>,

    /// Config file path
    #[arg(long, default_value = "fq.yaml")]
    config: PathBuf,

    /// Heartbeat interval, e.g. 500ms
    #[arg(long)]
    heartbeat: Option<humantime::Duration>,

    /// Publish-queue bound
    #[arg(long)]
    backlog: Option<usize>,

    /// Fail fast instead of blocking when the publish queue is full
    #[arg(long)]
    non_blocking: bool,

    /// Open the data channel in peering mode
    #[arg(long)]
    peer: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read lines from stdin and publish them
    Publish {
        /// Exchange to publish to
        exchange: String,
        /// Routing key for published lines
        route: String,
    },
    /// Bind transiently and print matching messages
    Subscribe {
        /// Exchange to bind against
        exchange: String,
        /// Routing-filter program, passed to the broker opaquely
        #[arg(default_value = "prefix:\"\"")]
        program: String,
    },
    /// Print broker status counters
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = FqConfig::load_from_file(&args.config)?;
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(sender) = &args.sender {
        config.sender = sender.clone();
    }
    if let Some(password) = &args.password {
        config.password = password.clone();
    }
    if let Some(heartbeat) = args.heartbeat {
        config.heartbeat_ms = heartbeat.as_millis() as u64;
    }
    if let Some(backlog) = args.backlog {
        config.backlog = backlog;
    }
    if args.non_blocking {
        config.non_blocking = true;
    }

    let client = if args.peer {
        Client::new_peer()
    } else {
        Client::new()
    };
    client.set_backlog(config.backlog);
    client.set_non_blocking(config.non_blocking);
    client.set_heartbeat(Duration::from_millis(config.heartbeat_ms));

    match args.command {
        Command::Publish { exchange, route } => {
            publish(&client, &config, &exchange, &route).await
        }
        Command::Subscribe { exchange, program } => {
            subscribe(&client, &config, &exchange, &program).await
        }
        Command::Status => status(&client, &config).await,
    }
}

async fn publish(client: &Client, config: &FqConfig, exchange: &str, route: &str) -> Result<()> {
    client.creds(&config.host, config.port, &config.sender, &config.password)?;
    client.connect()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut published = 0u64;
    let mut dropped = 0u64;
    while let Some(line) = lines.next_line().await? {
        let msg = Message::new(exchange, route, Bytes::from(line.into_bytes()));
        if client.publish(msg).await {
            published += 1;
        } else {
            dropped += 1;
        }
    }

    // Give the data sender a chance to drain before shutting down.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while client.data_backlog() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    info!("published {published} messages, dropped {dropped}");
    client.destroy();
    Ok(())
}

async fn subscribe(client: &Client, config: &FqConfig, exchange: &str, program: &str) -> Result<()> {
    let (hooks, mut msgs, mut errors) = TransientSubHooks::new();
    hooks.add_binding(exchange, program);
    client.set_hooks(hooks);
    client.creds(&config.host, config.port, &config.sender, &config.password)?;
    client.connect()?;

    loop {
        tokio::select! {
            msg = msgs.recv() => {
                let Some(msg) = msg else { break };
                println!(
                    "{} {} {}",
                    msg.exchange,
                    msg.route,
                    String::from_utf8_lossy(&msg.payload)
                );
            }
            err = errors.recv() => {
                if let Some(err) = err {
                    warn!("{err}");
                }
            }
        }
    }
    Ok(())
}

async fn status(client: &Client, config: &FqConfig) -> Result<()> {
    client.creds(&config.host, config.port, &config.sender, &config.password)?;
    client.connect()?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !client.data_ready() {
        if tokio::time::Instant::now() >= deadline {
            match client.last_error() {
                Some(err) => bail!("broker not reachable: {err}"),
                None => bail!("broker not reachable"),
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    client.status(|field, value| println!("{field}: {value}"));
    tokio::time::sleep(Duration::from_millis(500)).await;
    client.destroy();
    Ok(())
}
