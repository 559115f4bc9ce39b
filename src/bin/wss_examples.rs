//! WebSocket Examples Binary
//!
//! Runs an echo endpoint, an echo-to-all endpoint and a client that talks
//! to the echo endpoint once, then stops the server.
//!
//! Usage:
//!   ./wss_examples            # Run the scenario and exit
//!   ./wss_examples --serve    # Keep serving after the client closed
//!
//! Try the endpoints from a browser console:
//!   var ws = new WebSocket("ws://localhost:8080/echo_all");
//!   ws.onmessage = function(evt) { console.log(evt.data); };
//!   ws.send("test");

use anyhow::{anyhow, Result};
use routesockets::{ClientConfig, ServerConfig, WebSocketClient, WebSocketServer};
use routesockets_demo::bin_common::{init_tracing, load_config_from_env, parse_args, ConfigType};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

fn load_server_config() -> Result<ServerConfig> {
    let path = load_config_from_env(ConfigType::Server);
    if path.exists() {
        Ok(ServerConfig::load(&path)?)
    } else {
        info!("No server config at {}, using defaults", path.display());
        Ok(ServerConfig {
            port: 8080,
            threads: 4,
            ..ServerConfig::default()
        })
    }
}

fn load_client_config(scheme: &str, port: u16) -> Result<ClientConfig> {
    let path = load_config_from_env(ConfigType::Client);
    if path.exists() {
        Ok(ClientConfig::load(&path)?)
    } else {
        info!("No client config at {}, connecting to local echo", path.display());
        Ok(ClientConfig {
            uri: format!("{}://localhost:{}/echo", scheme, port),
            verify_certificate: false,
            ..ClientConfig::default()
        })
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let serve = parse_args().iter().any(|arg| arg == "--serve");

    let server = WebSocketServer::new(load_server_config()?)?;

    // Example 1: echo endpoint
    server
        .endpoint("^/echo/?$")?
        .on_message(|server, connection, message| {
            let text = message.string().into_owned();
            info!("Server: Message received: \"{}\" from {}", text, connection.id());
            info!("Server: Sending message \"{}\" to {}", text, connection.id());

            server.send_with(connection, text, |result| {
                if let Err(e) = result {
                    warn!("Server: Error sending message: {}", e);
                }
            });
        })
        .on_open(|_server, connection| {
            info!("Server: Opened connection {}", connection.id());
        })
        .on_close(|_server, connection, status, _reason| {
            info!(
                "Server: Closed connection {} with status code {}",
                connection.id(),
                status
            );
        })
        .on_error(|_server, connection, error| {
            warn!("Server: Error in connection {}: {}", connection.id(), error);
        });

    // Example 2: echo to every connected client
    server
        .endpoint("^/echo_all/?$")?
        .on_message(|server, _connection, message| {
            for peer in server.get_connections() {
                server.send(&peer, message.clone());
            }
        });

    let server_thread = {
        let server = server.clone();
        thread::spawn(move || server.start())
    };

    // Wait for the listener so the client can connect
    thread::sleep(Duration::from_secs(1));

    // Example 3: client talking to the echo endpoint
    let scheme = if server.config().is_secure() { "wss" } else { "ws" };
    let port = server
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(server.config().port);
    let client = WebSocketClient::new(load_client_config(scheme, port)?)?;

    client
        .on_open(|client, connection| {
            info!("Client: Opened connection");
            info!("Client: Sending message: \"Hello\"");
            client.send(connection, "Hello");
        })
        .on_message(|client, connection, message| {
            info!("Client: Message received: \"{}\"", message.string());
            info!("Client: Sending close connection");
            if let Err(e) = client.send_close(connection, 1000, "") {
                warn!("Client: Close failed: {}", e);
            }
        })
        .on_close(|_client, _connection, status, _reason| {
            info!("Client: Closed connection with status code {}", status);
        })
        .on_error(|_client, _connection, error| {
            warn!("Client: Error: {}", error);
        });

    if let Err(e) = client.start() {
        warn!("Client: {}", e);
    }

    if serve {
        info!("Serving until the process is stopped");
    } else {
        server.stop();
    }

    server_thread
        .join()
        .map_err(|_| anyhow!("server thread panicked"))??;
    Ok(())
}
