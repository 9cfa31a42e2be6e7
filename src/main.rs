use std::net::IpAddr;
use std::sync::Arc;

use cmux_remote::host::StaticHostBridge;
use cmux_remote::{Config, RemoteServer};

/// Hand-rolled flag parsing: `--port`/`--listen`/`--tmux`/`--version`,
/// with no CLI framework at this layer.
struct Args {
    port: Option<u16>,
    bind: Option<IpAddr>,
    tmux: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        port: None,
        bind: None,
        tmux: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" => {
                println!("cmux-remote {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--port" => {
                if let Some(v) = iter.next() {
                    args.port = v.parse().ok();
                }
            }
            "--listen" => {
                if let Some(v) = iter.next() {
                    args.bind = v.parse().ok();
                }
            }
            "--tmux" => args.tmux = true,
            other => {
                eprintln!("warning: ignoring unrecognized argument {other}");
            }
        }
    }
    args
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let parsed = parse_args();
    let mut config = Config::from_env();
    config.enabled = true;
    if let Some(port) = parsed.port {
        config.port = port;
    }
    if let Some(bind) = parsed.bind {
        config.bind_addr = bind;
    }
    if parsed.tmux {
        config.tmux_mode = true;
    }

    // No host application is attached when running this binary
    // standalone; `StaticHostBridge` answers commands with `{ok:true}`
    // and serves a single demo workspace so the HTTP/WS surface has
    // something to exercise.
    let host = Arc::new(StaticHostBridge::demo());

    let server = match RemoteServer::start(config, host).await {
        Ok(server) => server,
        Err(e) => {
            log::error!("failed to start remote server: {e}");
            std::process::exit(1);
        }
    };

    log::info!("cmux-remote listening on {}", server.local_addr);

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for ctrl-c: {e}");
    }
    server.stop();
}
