//! LAN announcement of a fresh send
//!
//! One UDP multicast datagram so nearby receivers can show the code without
//! it being typed. Nothing depends on it arriving.

use std::net::{Ipv4Addr, SocketAddrV4};

use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::debug;
use wormhole_core::{TransferCode, TransferDescriptor};

/// Multicast group for announcements
pub const ANNOUNCE_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);

/// Port for announcements
pub const ANNOUNCE_PORT: u16 = 42424;

#[derive(Debug, Serialize)]
struct Announcement<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    code: &'a str,
    filename: &'a str,
    size: u64,
    timestamp: i64,
}

fn payload(code: &TransferCode, descriptor: &TransferDescriptor) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&Announcement {
        kind: "wormhole-send",
        code: code.as_str(),
        filename: &descriptor.filename,
        size: descriptor.size,
        timestamp: descriptor.created_at,
    })
}

/// Send the announcement. Failures are logged at debug level and dropped.
pub async fn announce(code: &TransferCode, descriptor: &TransferDescriptor) {
    match try_announce(code, descriptor).await {
        Ok(()) => debug!(code = %code, "LAN announcement sent"),
        Err(e) => debug!(code = %code, error = %e, "LAN announcement skipped"),
    }
}

async fn try_announce(code: &TransferCode, descriptor: &TransferDescriptor) -> std::io::Result<()> {
    let bytes = payload(code, descriptor).map_err(std::io::Error::other)?;
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_multicast_ttl_v4(1)?;
    socket
        .send_to(&bytes, SocketAddrV4::new(ANNOUNCE_GROUP, ANNOUNCE_PORT))
        .await?;
    Ok(())
}
