use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, trace};

use crate::error::Result;
use crate::packet::{ProbeKind, ProbePacket};
use crate::transmit::PacketTransmitter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IterationLimit {
    #[default]
    Unbounded,
    Count(u64),
}

impl IterationLimit {
    fn reached(&self, iterations: u64) -> bool {
        match self {
            IterationLimit::Unbounded => false,
            IterationLimit::Count(count) => iterations >= *count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeTally {
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitterStats {
    pub iterations: u64,
    pub igmp: ProbeTally,
    pub icmpv6: ProbeTally,
}

impl EmitterStats {
    fn record(&mut self, kind: ProbeKind, bytes: usize) {
        let tally = match kind {
            ProbeKind::Igmp => &mut self.igmp,
            ProbeKind::Icmpv6EchoRequest => &mut self.icmpv6,
        };
        tally.packets += 1;
        tally.bytes += bytes as u64;
    }
}

impl fmt::Display for EmitterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} iterations, igmp {} packets/{} bytes, icmpv6 {} packets/{} bytes",
            self.iterations,
            self.igmp.packets,
            self.igmp.bytes,
            self.icmpv6.packets,
            self.icmpv6.bytes
        )
    }
}

pub struct Emitter<T: PacketTransmitter> {
    transmitter: T,
    stop: Arc<AtomicBool>,
    stats: EmitterStats,
}

impl<T: PacketTransmitter> Emitter<T> {
    pub fn new(transmitter: T) -> Self {
        Emitter {
            transmitter,
            stop: Arc::new(AtomicBool::new(false)),
            stats: EmitterStats::default(),
        }
    }

    /// Flag that ends `run` before the next iteration once set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn stats(&self) -> &EmitterStats {
        &self.stats
    }

    /// Builds and sends one IGMP probe followed by one ICMPv6 echo request.
    pub async fn emit_once(&mut self) -> Result<()> {
        let igmp = ProbePacket::igmp();
        self.send(&igmp).await?;

        let icmpv6 = ProbePacket::icmpv6_echo_request()?;
        self.send(&icmpv6).await?;

        self.stats.iterations += 1;
        Ok(())
    }

    async fn send(&mut self, packet: &ProbePacket) -> Result<()> {
        let size = self.transmitter.transmit(packet).await?;
        trace!(
            "transmitted {} probe to {} ({} bytes)",
            packet.kind(),
            packet.destination(),
            size
        );
        self.stats.record(packet.kind(), size);
        Ok(())
    }

    /// Emits until `limit` is reached or the stop flag is raised. The first
    /// transmit error ends the run.
    pub async fn run(&mut self, limit: IterationLimit) -> Result<EmitterStats> {
        info!("emitting probes ({:?})", limit);
        while !limit.reached(self.stats.iterations) && !self.stop.load(Ordering::Relaxed) {
            self.emit_once().await?;
        }
        info!("emitter finished: {}", self.stats);
        Ok(self.stats.clone())
    }

    pub fn into_transmitter(self) -> T {
        self.transmitter
    }
}
