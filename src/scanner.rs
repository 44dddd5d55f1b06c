use std::{
    collections::HashSet,
    future::Future,
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};

use futures::stream::{FuturesUnordered, StreamExt};
use pnet::packet::arp::Arp;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    constants::REPLY_QUEUE_LEN,
    error::{ConfigError, Error, Result},
    interface::Interface,
    link::{self, FrameReader, FrameWriter},
    range::to_ipv4,
    request::ArpRequestBuilder,
    resolver::{Resolver, SystemResolver},
    response::{ArpResponse, Listener},
};

pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(3);

/// Timing of a single interface scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Total length of the scan window.
    pub scan_duration: Duration,
    /// How often unanswered candidates are probed again.
    pub retransmit_interval: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_duration: DEFAULT_SCAN_DURATION,
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfigBuilder {
    scan_duration: Duration,
    retransmit_interval: Duration,
}

impl Default for ScanConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanConfigBuilder {
    pub fn new() -> Self {
        Self {
            scan_duration: DEFAULT_SCAN_DURATION,
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
        }
    }

    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    pub fn with_retransmit_interval(mut self, interval: Duration) -> Self {
        self.retransmit_interval = interval;
        self
    }

    pub fn build(self) -> std::result::Result<ScanConfig, ConfigError> {
        if self.retransmit_interval.is_zero() {
            return Err(ConfigError::ZeroRetransmitInterval);
        }
        Ok(ScanConfig {
            scan_duration: self.scan_duration,
            retransmit_interval: self.retransmit_interval,
        })
    }
}

/// Scans one interface at a time for hosts that answer ARP requests.
///
/// A `Scanner` holds no per-scan state, so one instance can drive scans of
/// several interfaces concurrently.
///
/// # Example
/// ```no_run
/// use arpf::{Interface, ScanConfigBuilder, Scanner, Subnet};
/// use pnet::util::MacAddr;
/// use std::net::Ipv4Addr;
/// use std::time::Duration;
///
/// let interface = Interface::new("eth0", MacAddr::new(0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E));
/// let subnet: Subnet = "192.168.86.31/24".parse().unwrap();
/// let config = ScanConfigBuilder::new()
///     .with_scan_duration(Duration::from_secs(5))
///     .build()
///     .unwrap();
/// tokio_test::block_on(async {
///     let scanner = Scanner::new(config);
///     let hosts = scanner
///         .scan(&interface, subnet.addr().into(), &subnet.hosts())
///         .await
///         .unwrap();
///     for host in hosts {
///         println!("{}", host);
///     }
/// })
/// ```
#[derive(Clone)]
pub struct Scanner {
    config: ScanConfig,
    resolver: Arc<dyn Resolver>,
}

impl Scanner {
    /// Creates a scanner that resolves names through the system resolver.
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            resolver: Arc::new(SystemResolver),
        }
    }

    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Probes `candidates` from `source` on `interface` and returns every host
    /// that answered, in the order their first reply arrived.
    ///
    /// The scan always lasts the full scan window unless it fails. Names are
    /// looked up while the scan runs, a host whose lookup has not finished
    /// when the window closes is returned without names.
    ///
    /// # Errors
    /// Fails before any I/O if `source` is not IPv4. Fails if the raw socket
    /// cannot be opened, if a request cannot be written, or if reading from
    /// the link fails.
    pub async fn scan(
        &self,
        interface: &Interface,
        source: IpAddr,
        candidates: &[Ipv4Addr],
    ) -> Result<Vec<ArpResponse>> {
        let source = to_ipv4(source)?;
        let stream = link::open(&interface.name)?;
        self.run(stream.clone(), stream, interface, source, candidates)
            .await
    }

    /// Same as [`Scanner::scan`] over a caller supplied link.
    pub async fn scan_with<R, W>(
        &self,
        reader: R,
        writer: W,
        interface: &Interface,
        source: IpAddr,
        candidates: &[Ipv4Addr],
    ) -> Result<Vec<ArpResponse>>
    where
        R: FrameReader,
        W: FrameWriter,
    {
        let source = to_ipv4(source)?;
        self.run(reader, writer, interface, source, candidates).await
    }

    async fn run<R, W>(
        &self,
        reader: R,
        writer: W,
        interface: &Interface,
        source: Ipv4Addr,
        candidates: &[Ipv4Addr],
    ) -> Result<Vec<ArpResponse>>
    where
        R: FrameReader,
        W: FrameWriter,
    {
        let deadline_at = Instant::now() + self.config.scan_duration;
        let deadline = time::sleep_until(deadline_at);
        tokio::pin!(deadline);

        let (replies_tx, mut replies) = mpsc::channel(REPLY_QUEUE_LEN);
        let mut listener = BackgroundTaskSpawner::new();
        listener.spawn(Listener::new(
            &interface.name,
            interface.mac,
            reader,
            replies_tx,
        ));

        let mut probe = Probe {
            interface,
            source,
            candidates,
            writer,
            state: ScanState::new(source),
        };
        probe.send_requests().await?;

        log::info!(
            "sending arp requests on {} for {:?} in {:?} intervals",
            interface.name,
            self.config.scan_duration,
            self.config.retransmit_interval
        );

        let period = self.config.retransmit_interval;
        let mut retransmit = time::interval_at(Instant::now() + period, period);
        retransmit.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut out = Vec::new();
        let mut lookups = FuturesUnordered::new();
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                reply = replies.recv() => match reply {
                    Some(arp) => {
                        if let Some(response) = record(&mut probe.state, arp) {
                            lookups.push(self.resolve(out.len(), response.ip));
                            out.push(response);
                        }
                    }
                    None => {
                        log::debug!("arp listener on {} closed", interface.name);
                        break;
                    }
                },
                Some((index, names)) = lookups.next(), if !lookups.is_empty() => {
                    out[index].names = names;
                }
                _ = retransmit.tick() => probe.send_requests().await?,
            }
        }

        listener.finish().await?;
        // replies queued before the listener stopped still count
        while let Ok(arp) = replies.try_recv() {
            if let Some(response) = record(&mut probe.state, arp) {
                out.push(response);
            }
        }

        // names that are not ready by the deadline are left empty
        let pending = async {
            while let Some((index, names)) = lookups.next().await {
                out[index].names = names;
            }
        };
        if time::timeout_at(deadline_at, pending).await.is_err() {
            log::debug!(
                "reverse lookups on {} did not finish within the scan window",
                interface.name
            );
        }

        log::debug!(
            "scan on {} finished with {} hosts",
            interface.name,
            out.len()
        );
        Ok(out)
    }

    /// Looks up the names of `ip` on the blocking pool, tagged with the
    /// position of its response.
    fn resolve(
        &self,
        index: usize,
        ip: Ipv4Addr,
    ) -> impl Future<Output = (usize, Vec<String>)> + Send + 'static {
        let resolver = Arc::clone(&self.resolver);
        async move {
            let names = tokio::task::spawn_blocking(move || resolver.lookup(ip))
                .await
                .unwrap_or_else(|err| {
                    log::debug!("reverse lookup for {} did not complete: {}", ip, err);
                    Vec::new()
                });
            (index, names)
        }
    }
}

/// Marks the sender of `arp` and builds its response, unless it was already
/// seen. Names are filled in later.
fn record(state: &mut ScanState, arp: Arp) -> Option<ArpResponse> {
    let ip = arp.sender_proto_addr;
    log::debug!("read arp dst {} src {}", arp.target_proto_addr, ip);
    if !state.mark(ip) {
        return None;
    }
    log::debug!("arp src {} not saved yet", ip);
    Some(ArpResponse::new(ip, arp.sender_hw_addr, Vec::new()))
}

/// Scans `candidates` with the default timing and the system resolver.
pub async fn scan(
    interface: &Interface,
    source: IpAddr,
    candidates: &[Ipv4Addr],
) -> Result<Vec<ArpResponse>> {
    Scanner::new(ScanConfig::default())
        .scan(interface, source, candidates)
        .await
}

/// The sending half of a running scan.
struct Probe<'a, W> {
    interface: &'a Interface,
    source: Ipv4Addr,
    candidates: &'a [Ipv4Addr],
    writer: W,
    state: ScanState,
}

impl<W: FrameWriter> Probe<'_, W> {
    async fn send_requests(&mut self) -> Result<()> {
        let mut count = 0;
        for &target in self.candidates {
            if self.state.is_marked(target) {
                continue;
            }
            let frame = ArpRequestBuilder::new()
                .with_sender_mac(self.interface.mac)
                .with_sender_ip(self.source)
                .with_target_ip(target)
                .build()?
                .to_bytes()?;
            self.writer
                .write_frame(&frame)
                .await
                .map_err(|source| Error::Transmit {
                    interface: self.interface.name.clone(),
                    target,
                    source,
                })?;
            count += 1;
        }
        log::debug!("sent arp to {} IPs on {}", count, self.interface.name);
        Ok(())
    }
}

/// Addresses that need no further requests: our own and every one that
/// already replied. Only ever grows.
#[derive(Debug)]
struct ScanState {
    answered: HashSet<Ipv4Addr>,
}

impl ScanState {
    fn new(source: Ipv4Addr) -> Self {
        Self {
            answered: HashSet::from([source]),
        }
    }

    /// Returns `true` the first time `ip` is marked.
    fn mark(&mut self, ip: Ipv4Addr) -> bool {
        self.answered.insert(ip)
    }

    fn is_marked(&self, ip: Ipv4Addr) -> bool {
        self.answered.contains(&ip)
    }
}

#[derive(Debug)]
struct BackgroundTaskSpawner {
    token: CancellationToken,
    handle: Option<JoinHandle<Result<()>>>,
}

impl BackgroundTaskSpawner {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handle: None,
        }
    }

    fn spawn<R: FrameReader>(&mut self, mut listener: Listener<R>) {
        let token = self.token.clone();
        let handle = tokio::task::spawn(async move {
            tokio::select! {
                result = listener.listen() => result,
                _ = token.cancelled() => Ok(()),
            }
        });
        self.handle = Some(handle);
    }

    /// Stops the listener and waits for it to release the link.
    async fn finish(mut self) -> Result<()> {
        self.token.cancel();
        match self.handle.take() {
            Some(handle) => handle.await.map_err(|err| {
                Error::Opaque(format!("arp listener task failed, reason: {}", err).into())
            })?,
            None => Ok(()),
        }
    }
}

impl Drop for BackgroundTaskSpawner {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.token.cancel();
        }
    }
}
