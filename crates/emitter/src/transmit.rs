use async_trait::async_trait;

use crate::error::Result;
use crate::packet::ProbePacket;

/// Hands a probe to the network. Returns the number of payload bytes the
/// kernel accepted.
#[async_trait]
pub trait PacketTransmitter: Send + Sync {
    async fn transmit(&self, packet: &ProbePacket) -> Result<usize>;
}
