use std::process::ExitCode;

use tracing::error;

use roomcast::{Reactor, ServerConfig};

const USAGE: &str = "\
roomcast: multi-room chat server

USAGE:
    roomcast --server <host:port> --admin <name:passwd> [OPTIONS]

OPTIONS:
    -s, --server <host:port>      address to listen on
    -a, --admin <name:passwd>     administrator credentials
    -m, --roommates <list>        preset roommates, e.g. alice:p1,bob:p2
    -R, --rooms <list>            preset memberships, e.g. lobby:alice,lobby:*
    -h, --help                    print this help

Admin console commands (on stdin):
    :roommates add|del|clear|show ...
    :rooms addmates|delmates <room> <name>...
    :status
    :quit
";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomcast=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match ServerConfig::from_args(std::env::args().skip(1)) {
        Ok(Some(config)) => config,
        Ok(None) => {
            print!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("try --help for usage");
            return ExitCode::FAILURE;
        }
    };

    let mut reactor = match Reactor::bind(&config).await {
        Ok(reactor) => reactor,
        Err(e) => {
            error!("setup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match reactor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
