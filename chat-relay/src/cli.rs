use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Line-oriented TCP chat relay", long_about = None)]
pub struct Cli {
    /// Port to listen on (bound on 127.0.0.1), or a full socket address.
    /// Use 0 for an ephemeral port.
    #[arg(value_name = "ADDR", value_parser = parse_listen_addr)]
    pub listen: SocketAddr,
}

/// Accepts either a bare port, bound on loopback, or a complete `host:port`.
pub fn parse_listen_addr(value: &str) -> Result<SocketAddr, String> {
    if let Ok(port) = value.parse::<u16>() {
        return Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
    }
    value
        .parse()
        .map_err(|_| format!("'{value}' is neither a port nor a socket address"))
}
