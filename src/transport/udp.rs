//! UDP transport for the authoritative responder.
//!
//! Each datagram is answered independently from the record table; there is
//! no upstream and no pending state.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::authority::{self, RecordTable};
use crate::dns::HEADER_LEN;
use crate::error::{Error, Result};

use super::MAX_DNS_PACKET_SIZE;

/// UDP transport for the responder.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start answering on the current `LocalSet`.
    pub fn start(self, table: Rc<RecordTable>) -> JoinHandle<()> {
        tokio::task::spawn_local(run(self.socket, table))
    }
}

async fn run(socket: UdpSocket, table: Rc<RecordTable>) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "UDP recv error");
                continue;
            }
        };

        if len < HEADER_LEN {
            continue;
        }

        let Some(response) = authority::handle_datagram(&buf[..len], &table) else {
            debug!(%src, "no reply for datagram");
            continue;
        };

        if let Err(e) = socket.send_to(&response, src).await {
            warn!(error = %e, %src, "UDP response error");
        }
    }
}
