use clap::Parser;

use crate::utils::types::Address;

#[derive(Parser, Debug)]
#[command(name = "chordd", about = "Chord overlay routing node")]
pub struct Cli {
    /// ip:port the gRPC service listens on
    #[arg(short, long)]
    pub grpc: Address,

    /// ip:port of a node in an existing ring; omit to form a new ring
    #[arg(short, long)]
    pub peer: Option<Address>,

    /// path to an ini configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// ip:port to serve the status dashboard on; omit to disable it
    #[arg(short, long)]
    pub web: Option<Address>,
}
