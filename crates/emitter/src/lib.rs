pub mod emitter;
pub mod error;
pub mod packet;
pub mod raw_socket;
pub mod transmit;

pub use emitter::{Emitter, EmitterStats, IterationLimit};
pub use packet::{ProbeKind, ProbePacket, ICMPV6_DESTINATION, IGMP_DESTINATION};
pub use raw_socket::RawSocketTransmitter;
pub use transmit::PacketTransmitter;
