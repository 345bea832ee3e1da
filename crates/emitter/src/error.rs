use std::{io, net::IpAddr};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io issue encountered")]
    Io(#[from] io::Error),
    #[error("failed to write packet: {0}")]
    PacketWrite(String),
    #[error("malformed igmp message: {0}")]
    MalformedIgmp(String),
    #[error("address {local} does not match the address family of destination {destination}")]
    AddressFamilyMismatch { local: IpAddr, destination: IpAddr },
}

pub type Result<T> = std::result::Result<T, Error>;
