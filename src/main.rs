//! Demo driver: runs the server or client role and ticks it from a plain
//! sleep loop, reading commands from stdin.

mod cli;
mod logging;

use std::{
    io::BufRead,
    sync::{mpsc, Arc},
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use cli::{parse_bytes, Cli, Command};
use loop_bridge::{
    agent::{AgentSignal, SignalHub},
    config::AppConfig,
    host::{HostStatus, ServerHost},
    net::tcp::{
        ClientHandler, ConnectionId, Logger, ServerContext, ServerHandler, TracingLogger,
        TransportClient, TransportServer,
    },
    StreamHandle,
};

struct LoggingServer;

impl ServerHandler for LoggingServer {
    fn on_connect(&self, ctx: &ServerContext, conn_id: ConnectionId) {
        info!(%conn_id, address = %ctx.address(conn_id), "client connected");
    }

    fn on_data(&self, _ctx: &ServerContext, conn_id: ConnectionId, data: &[u8]) {
        info!(%conn_id, data = %hex(data), "data received");
    }

    fn on_disconnect(&self, _ctx: &ServerContext, conn_id: ConnectionId) {
        info!(%conn_id, "client disconnected");
    }
}

struct LoggingClient;

impl ClientHandler for LoggingClient {
    fn on_connected(&self, stream: &StreamHandle) {
        info!(peer = ?stream.peer_addr(), "connected");
    }

    fn on_data(&self, _stream: &StreamHandle, data: &[u8]) {
        info!(data = %hex(data), "data received");
    }

    fn on_disconnected(&self) {
        info!("disconnected");
    }
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join("-")
}

/// Lines from stdin, read on a helper thread so the tick loop never blocks.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply(&mut config);

    logging::setup_logging(&config.logging, cli.json_logs)?;
    let commands = spawn_stdin_reader();

    match cli.command {
        Command::Server { .. } => run_server(&config, commands),
        Command::Client { .. } => run_client(&config, commands),
    }
}

fn run_server(config: &AppConfig, commands: mpsc::Receiver<String>) -> anyhow::Result<()> {
    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);
    let server = TransportServer::new(config.transport.to_transport_config(logger), LoggingServer);
    let mut host = ServerHost::new(server, config.host.to_host_config());
    let mut hub = SignalHub::new();
    host.attach(&mut hub);
    host.init(Instant::now())
        .context("failed to initialize the server event loop")?;

    info!("commands: start | send <id> <hex..> | broadcast <hex..> | disconnect <id> | address <id> | list | stop | activate | shutdown | maintenance <rfc3339> | error <msg> | quit");

    loop {
        while let Ok(line) = commands.try_recv() {
            if !server_command(&mut host, &mut hub, line.trim()) {
                host.shutdown();
                return Ok(());
            }
        }

        match host.tick(Instant::now())? {
            HostStatus::Terminate => {
                info!("grace period over, exiting");
                host.shutdown();
                return Ok(());
            }
            HostStatus::Running | HostStatus::ShuttingDown { .. } => {}
        }
        thread::sleep(config.transport.tick_interval());
    }
}

/// Returns `false` when the driver should exit.
fn server_command(host: &mut ServerHost<LoggingServer>, hub: &mut SignalHub, line: &str) -> bool {
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let server = host.server_mut();
    match word {
        "" => {}
        "quit" | "exit" => return false,
        "start" => {
            if let Err(e) = server.start_server() {
                warn!("start failed: {}", e);
            }
        }
        "stop" => server.stop_server(),
        "list" => info!(ids = ?server.connection_ids(), "connections"),
        "send" => {
            let (id, bytes) = rest.split_once(' ').unwrap_or((rest, ""));
            match (id.parse::<u64>(), parse_bytes(bytes)) {
                (Ok(id), Ok(bytes)) => {
                    let sent = server.send(ConnectionId(id), &bytes);
                    info!(sent, "send to {}", id);
                }
                _ => warn!("usage: send <id> <hex bytes>"),
            }
        }
        "broadcast" => match parse_bytes(rest) {
            Ok(bytes) => info!(count = server.broadcast(&bytes), "broadcast"),
            Err(e) => warn!("bad bytes: {}", e),
        },
        "disconnect" | "address" => match rest.trim().parse::<u64>() {
            Ok(id) if word == "disconnect" => {
                info!(ok = server.disconnect(ConnectionId(id)), "disconnect {}", id)
            }
            Ok(id) => info!("address of {}: {:?}", id, server.address(ConnectionId(id))),
            Err(_) => warn!("usage: {} <id>", word),
        },
        _ => match line.parse::<AgentSignal>() {
            Ok(signal) => {
                hub.emit(&signal);
            }
            Err(e) => warn!("{}", e),
        },
    }
    true
}

fn run_client(config: &AppConfig, commands: mpsc::Receiver<String>) -> anyhow::Result<()> {
    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);
    let mut client =
        TransportClient::new(config.transport.to_transport_config(logger), LoggingClient);
    client
        .init()
        .context("failed to initialize the client event loop")?;

    info!("commands: connect [ip] | send <hex..> | disconnect | status | quit");
    let tick_interval = config.transport.tick_interval().max(Duration::from_millis(1));

    loop {
        while let Ok(line) = commands.try_recv() {
            let line = line.trim();
            let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
            match word {
                "" => {}
                "quit" | "exit" => {
                    client.shutdown();
                    return Ok(());
                }
                "connect" => {
                    let ip = if rest.trim().is_empty() {
                        config.client.address.as_str()
                    } else {
                        rest.trim()
                    };
                    if let Err(e) = client.connect(ip) {
                        warn!("connect failed: {}", e);
                    }
                }
                "send" => match parse_bytes(rest) {
                    Ok(bytes) => info!(sent = client.send(&bytes), "send"),
                    Err(e) => warn!("bad bytes: {}", e),
                },
                "disconnect" => client.disconnect(),
                "status" => info!(state = ?client.state(), connected = client.is_connected(), "status"),
                other => warn!("unknown command: {}", other),
            }
        }

        client.tick()?;
        thread::sleep(tick_interval);
    }
}
