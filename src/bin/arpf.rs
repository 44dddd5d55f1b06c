//! List MAC and IP addresses on the local network.
//!
//! Every interface that is up, is not a loopback, and has an IPv4 address is
//! scanned concurrently. Needs raw socket access.
//!
//! ```bash
//! sudo arpf
//! sudo arpf -v -i eth0 --scan-duration 5s
//! sudo arpf -i eth0 -t 192.168.0.250-192.168.1.5
//! ```
use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use log::*;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use arpf::{
    find_interfaces, inclusive_sequence, range::to_ipv4, LocalInterface, NoResolver,
    ScanConfigBuilder, Scanner, Subnet,
};

/// Largest number of addresses probed on one interface, a /16.
const MAX_CANDIDATES: u32 = 1 << 16;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
/// List MAC and IP addresses on the local network
struct Args {
    /// Print debug messages
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Length of the scan window for each interface, e.g. 10s or 1500ms
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    scan_duration: Duration,

    /// How often addresses that have not answered are probed again
    #[arg(long, default_value = "3s", value_parser = humantime::parse_duration)]
    retransmit_interval: Duration,

    /// Only scan this interface, may be repeated
    #[arg(short, long)]
    interface: Vec<String>,

    /// Probe an inclusive range such as 192.168.0.250-192.168.1.5 instead of
    /// the interface subnet
    #[arg(short, long, value_parser = parse_targets)]
    targets: Option<Targets>,

    /// Skip reverse DNS lookups
    #[arg(long, default_value_t = false)]
    no_names: bool,
}

#[derive(Clone, Debug)]
struct Targets(Vec<Ipv4Addr>);

fn parse_targets(s: &str) -> std::result::Result<Targets, String> {
    let (from, to) = s
        .split_once('-')
        .ok_or_else(|| format!("expected FROM-TO, got {}", s))?;
    let parse = |ip: &str| {
        ip.trim()
            .parse::<IpAddr>()
            .map_err(|err| format!("invalid address {}: {}", ip, err))
    };
    let (from, to) = (parse(from)?, parse(to)?);
    let (first, last) = match (to_ipv4(from), to_ipv4(to)) {
        (Ok(first), Ok(last)) => (u32::from(first), u32::from(last)),
        (Err(err), _) | (_, Err(err)) => return Err(err.to_string()),
    };
    if last >= first && last - first >= MAX_CANDIDATES {
        return Err(format!(
            "{} holds more than {} addresses",
            s, MAX_CANDIDATES
        ));
    }
    let ips = inclusive_sequence(from, to).map_err(|err| err.to_string())?;
    if ips.is_empty() {
        return Err(format!("{} does not contain any address", s));
    }
    Ok(Targets(ips))
}

/// The host addresses of `subnet`, or `None` when there are too many to scan.
fn subnet_candidates(subnet: &Subnet) -> Option<Vec<Ipv4Addr>> {
    (subnet.host_count() <= MAX_CANDIDATES).then(|| subnet.hosts())
}

#[doc(hidden)]
fn initialize_logger(args: &Args) -> Result<()> {
    let filter = if args.verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    simplelog::TermLogger::init(
        filter,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    Ok(())
}

#[doc(hidden)]
fn selected_interfaces(args: &Args) -> Vec<LocalInterface> {
    find_interfaces()
        .into_iter()
        .filter(|local| {
            args.interface.is_empty() || args.interface.contains(&local.interface.name)
        })
        .collect()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    initialize_logger(&args)?;

    let config = ScanConfigBuilder::new()
        .with_scan_duration(args.scan_duration)
        .with_retransmit_interval(args.retransmit_interval)
        .build()?;
    let mut scanner = Scanner::new(config);
    if args.no_names {
        scanner = scanner.with_resolver(NoResolver);
    }

    let locals = selected_interfaces(&args);
    if locals.is_empty() {
        return Err(eyre!("no usable network interface found"));
    }

    let scans = locals.iter().filter_map(|local| {
        let scanner = &scanner;
        let candidates = match &args.targets {
            Some(targets) => targets.0.clone(),
            None => match subnet_candidates(&local.subnet) {
                Some(candidates) => candidates,
                None => {
                    warn!(
                        "skipping {}: {} holds {} addresses, use --targets to pick a range",
                        local.interface.name,
                        local.subnet,
                        local.subnet.host_count()
                    );
                    return None;
                }
            },
        };
        Some(async move {
            info!("{}", local);
            match (candidates.first(), candidates.last()) {
                (Some(first), Some(last)) => info!(
                    "sending ARPs: src {} dst {} ... {}",
                    local.subnet.addr(),
                    first,
                    last
                ),
                _ => warn!("no candidate addresses on {}", local.interface.name),
            }
            let result = scanner
                .scan(&local.interface, local.subnet.addr().into(), &candidates)
                .await;
            (local, result)
        })
    });

    for (local, result) in futures::future::join_all(scans).await {
        match result {
            Ok(hosts) => {
                info!("{}: {} hosts", local.interface.name, hosts.len());
                for host in hosts {
                    info!("{}", host);
                }
            }
            Err(err) => error!("arp scan: {}", err),
        }
    }

    Ok(())
}
