use std::env;
use std::sync::Arc;

use clap::Parser;
use modelgate::engine::{default_models, demo_data, MemRegistry, Persistence};
use modelgate::server::{serve, AppState};
use modelgate::{EntityStore, Principal};
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    data_dir: Option<String>,

    #[arg(short, long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let data_dir = args
        .data_dir
        .or_else(|| env::var("MODELGATE_DATA_DIR").ok())
        .unwrap_or_else(|| "data".to_string());

    let addr = args
        .addr
        .or_else(|| env::var("MODELGATE_ADDR").ok())
        .unwrap_or_else(|| "0.0.0.0:8069".to_string());

    let persistence = Arc::new(Persistence::new(&data_dir)?);
    let mut initial_data = persistence.load_all()?;
    if initial_data.is_empty() {
        initial_data = demo_data();
    }
    let store = Arc::new(MemRegistry::new(
        initial_data,
        default_models(),
        Some(persistence),
    ));

    let state = Arc::new(AppState::new(store.clone()));
    let token = state
        .sessions
        .issue_random(Principal::new(1, "admin", &["erp.group_admin"]));

    println!("Starting Modelgate Gateway Daemon...");
    println!("Registered {} models.", store.models().await.len());
    println!("Demo session token: {}", token);
    println!("Gateway listening on {} (HTTP)", addr);

    tokio::select! {
        res = serve(&addr, state) => {
            if let Err(e) = res {
                eprintln!("HTTP server failed: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            println!("\nShutdown signal received. Finalizing disk writes...");
            store.wait().await;
            println!("Persistence complete. Exiting.");
        }
    }

    Ok(())
}
