use std::error::Error;
use std::process::exit;
use std::sync::{Arc, Mutex};

use clap::Parser;
use log::{error, info, LevelFilter};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use chordd::node::node_info::NodeInfo;
use chordd::threads::chord::chord_proto::chord_server::ChordServer;
use chordd::threads::chord::chord_proto::FILE_DESCRIPTOR_SET;
use chordd::threads::chord::{ChordService, JoinedSignal};
use chordd::threads::{join, maintenance, shutdown, web};
use chordd::utils::cli::Cli;
use chordd::utils::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    simple_logger::SimpleLogger::new().env().with_level(LevelFilter::Info).init().unwrap();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config from {:?}: {}", args.config, e);
            exit(1);
        }
    };

    let self_info = match NodeInfo::from_address(&args.grpc) {
        Some(info) => info,
        None => {
            error!("Invalid listen address: {}", args.grpc);
            exit(1);
        }
    };
    info!("Node {} occupies ring position {}", self_info.address(), self_info.pos());

    // bind before anything else so an occupied port fails the startup cleanly
    let listener = match TcpListener::bind(&args.grpc).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", args.grpc, e);
            exit(1);
        }
    };

    let state = match join::setup(args.peer.clone(), &self_info, &config).await {
        Ok(state) => Arc::new(Mutex::new(state)),
        Err(status) => {
            error!("Bootstrap failed: {}", status);
            exit(1);
        }
    };

    let (joined_tx, joined_rx) = oneshot::channel();
    let joined_signal: JoinedSignal = Arc::new(Mutex::new(Some(joined_tx)));

    let mut thread_handles = Vec::new();

    info!("Starting up gRPC service on {}", args.grpc);
    let chord_service =
        ChordService::new(self_info.clone(), state.clone(), joined_signal.clone(), &config);
    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build()?;
    thread_handles.push(tokio::spawn(async move {
        Server::builder()
            .add_service(ChordServer::new(chord_service))
            .add_service(reflection_service)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    }));

    thread_handles.push(tokio::spawn(async move {
        if joined_rx.await.is_ok() {
            info!("Join signal received, higher layers may start handing off keys");
        }
    }));

    info!("Starting up maintenance loop");
    thread_handles.push(tokio::spawn(maintenance::run(
        self_info.clone(),
        state.clone(),
        joined_signal.clone(),
        config.clone(),
    )));

    if let Some(web_address) = args.web.clone() {
        info!("Starting up dashboard on {}", web_address);
        web::spawn_dashboard(web_address, state.clone(), self_info.clone(), config.clone());
    }

    signal::ctrl_c().await?;
    info!("Shutting down");
    shutdown::leave(&self_info, &state).await;
    exit(0);
}
