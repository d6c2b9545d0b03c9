//! Entry point: loads configuration, sets up logging, and runs the DHCP,
//! TFTP, NFS, and DNS servers concurrently until the process is killed.
//! Each server's own main loop already catches and logs its per-datagram
//! errors (spec.md §7); a task returning `Err` here means its listening
//! socket itself failed to bind, which is logged while the other three
//! servers keep running.

use log::error;

mod config;
mod core;
mod dhcp;
mod dns;
mod hooks;
mod logging;
mod nfs;
mod tftp;

use config::AppConfig;
use core::errors::ServerError;

fn load_config() -> AppConfig {
    match std::env::args().nth(1) {
        Some(path) => match AppConfig::load(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("failed to load config {}: {}, using defaults", path, e);
                AppConfig::default()
            }
        },
        None => AppConfig::default(),
    }
}

async fn run_logged(name: &'static str, result: Result<(), ServerError>) {
    if let Err(e) = result {
        error!("{} server exited: {}", name, e);
    }
}

#[tokio::main]
async fn main() {
    let cfg = load_config();
    logging::init_logger("pxecore", cfg.log_verbosity).expect("failed to initialize logger");

    let dhcp_cfg = cfg.dhcp.clone();
    let tftp_cfg = cfg.tftp.clone();
    let nfs_cfg = cfg.nfs.clone();
    let dns_cfg = cfg.dns.clone();

    let dhcp_task = tokio::spawn(async move { run_logged("dhcp", dhcp::server::run(dhcp_cfg).await).await });
    let tftp_task = tokio::spawn(async move { run_logged("tftp", tftp::server::run(tftp_cfg).await).await });
    let nfs_task = tokio::spawn(async move { run_logged("nfs", nfs::server::run(nfs_cfg).await).await });
    let dns_task = tokio::spawn(async move { run_logged("dns", dns::server::run(dns_cfg).await).await });

    let _ = tokio::join!(dhcp_task, tftp_task, nfs_task, dns_task);
}
