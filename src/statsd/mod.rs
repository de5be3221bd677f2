//! statsd client construction.
//!
//! Each poll cycle gets its own [`StatsdClient`] writing through an
//! unbuffered [`UdpMetricSink`], so every gauge is one datagram
//! `<prefix>.<name>:<value>|g`.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use anyhow::{Context, Result};
use cadence::{StatsdClient, UdpMetricSink};

/// Resolved statsd destination and the socket that writes to it.
pub struct Endpoint {
    peer: SocketAddr,
    socket: UdpSocket,
}

impl Endpoint {
    /// Resolves `addr` and binds an ephemeral local port of the same family.
    /// Sends block for at most `timeout`.
    pub async fn open(addr: &str, timeout: Duration) -> Result<Self> {
        let peer = tokio::net::lookup_host(addr)
            .await
            .with_context(|| format!("resolving statsd address {addr}"))?
            .next()
            .with_context(|| format!("statsd address {addr} resolved to nothing"))?;

        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).context("binding statsd socket")?;
        socket
            .set_write_timeout(Some(timeout))
            .context("setting statsd send timeout")?;

        Ok(Self { peer, socket })
    }

    /// Resolved statsd address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Builds a client for `prefix`. An empty prefix sends bare names and a
    /// trailing `.` is not doubled.
    pub fn client(self, prefix: &str) -> Result<StatsdClient> {
        let sink = UdpMetricSink::from(self.peer, self.socket)
            .with_context(|| format!("creating statsd sink for {}", self.peer))?;
        Ok(StatsdClient::from_sink(prefix, sink))
    }
}
