use std::error::Error;
use std::process::exit;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, LevelFilter};

use chordkv::node::membership;
use chordkv::node::state::Node;
use chordkv::threads;
use chordkv::utils::cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    if let Err(e) = args.validate() {
        eprintln!("{e}");
        exit(1);
    }

    simple_logger::SimpleLogger::new()
        .env()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    let node = Arc::new(build_node(&args).await?);

    let mut thread_handles = Vec::new();

    info!("Starting up request dispatcher on {}", node.self_ref.addr());
    let dispatcher_node = Arc::clone(&node);
    thread_handles.push(tokio::spawn(async move {
        if let Err(e) = threads::dispatcher::run(dispatcher_node).await {
            error!("dispatcher terminated: {e}");
        }
    }));

    info!("Starting up shutdown signal handler");
    let shutdown_node = Arc::clone(&node);
    thread_handles.push(tokio::spawn(async move {
        threads::shutdown::wait_and_depart(shutdown_node).await;
    }));

    for handle in thread_handles {
        handle.await?;
    }

    Ok(())
}

/// Builds the `Node` aggregate and, for a joiner, walks the full join
/// protocol against the given bootstrap before the dispatcher ever starts
/// accepting connections, so the node never serves a request before its ring
/// pointers are in place.
async fn build_node(args: &Cli) -> Result<Node, Box<dyn Error>> {
    if args.bootstrap {
        let k = args.replication_factor.expect("validated by Cli::validate");
        let mode = args.consistency.expect("validated by Cli::validate");
        info!("Starting as bootstrap node with replication factor {k}, {mode} consistency");
        return Ok(Node::new(args.ip.clone(), args.port, true, k, mode));
    }

    let bootstrap_ip = args.bootstrap_ip.clone().expect("validated by Cli::validate");
    let bootstrap_port = args.bootstrap_port.expect("validated by Cli::validate");
    let bootstrap_addr = format!("{bootstrap_ip}:{bootstrap_port}");

    info!("Joining ring via bootstrap {bootstrap_addr}");
    let (k, mode) = membership::fetch_network_config(&bootstrap_addr).await?;
    let node = Node::new(args.ip.clone(), args.port, false, k, mode);
    membership::join_ring(&node, &bootstrap_addr).await?;
    Ok(node)
}
