// SPDX-License-Identifier: LGPL-3.0-only
// SPDX-FileCopyrightText: 2023 Denis Drakhnia <numas13@gmail.com>

use std::{future::Future, io, time::Duration};

use log::{debug, trace};
use tacops_protocol::{
    decode, server::ServerAddress, types::Str, Decoded, Query, ServerRecord,
};
use tokio::{
    net::UdpSocket,
    time::{self, Instant},
};

use crate::Error;

/// Time to wait for the `info` answer.
pub const INFO_TIMEOUT: Duration = Duration::from_millis(1500);
/// Time to wait for the next datagram of a multi-packet answer.
pub const PACKET_GAP: Duration = Duration::from_millis(500);
/// Time budget to collect one multi-packet answer.
pub const DETAILS_TIMEOUT: Duration = Duration::from_secs(3);

const MAX_PACKET_SIZE: usize = 2048;

/// Answers to the `status` and `players` queries.
#[derive(Clone, Debug, Default)]
pub struct Details {
    /// Decoded datagrams in the order they were received.
    pub packets: Vec<Decoded>,
    /// `true` if any datagram carried the `final` key.
    pub terminated: bool,
}

impl Details {
    /// Merges the answers into `record`.
    pub fn apply(&self, record: &mut ServerRecord) {
        for packet in &self.packets {
            record.update(packet);
        }
    }
}

/// Game server queries.
pub trait ServerQuery: Send + Sync + 'static {
    /// Sends `info` and builds a record from the answer.
    ///
    /// Fails with [`Error::Protocol`] if the server runs an unsupported game.
    fn query_info(
        &self,
        id: u32,
        address: &ServerAddress,
    ) -> impl Future<Output = Result<ServerRecord, Error>> + Send;

    /// Sends `status` and `players` if needed.
    fn query_details(
        &self,
        address: &ServerAddress,
    ) -> impl Future<Output = Result<Details, Error>> + Send;
}

/// Queries game servers over UDP, one socket per query.
#[derive(Copy, Clone, Debug)]
pub struct UdpQuery {
    info_timeout: Duration,
    packet_gap: Duration,
    details_timeout: Duration,
}

impl Default for UdpQuery {
    fn default() -> Self {
        Self {
            info_timeout: INFO_TIMEOUT,
            packet_gap: PACKET_GAP,
            details_timeout: DETAILS_TIMEOUT,
        }
    }
}

impl UdpQuery {
    /// Creates a new `UdpQuery` with default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time to wait for the `info` answer.
    pub fn info_timeout(mut self, value: Duration) -> Self {
        self.info_timeout = value;
        self
    }

    /// Sets the idle gap that ends a multi-packet answer.
    pub fn packet_gap(mut self, value: Duration) -> Self {
        self.packet_gap = value;
        self
    }

    /// Sets the cap for collecting one multi-packet answer.
    pub fn details_timeout(mut self, value: Duration) -> Self {
        self.details_timeout = value;
        self
    }

    async fn connect(&self, address: &ServerAddress) -> io::Result<UdpSocket> {
        let sock = UdpSocket::bind("0.0.0.0:0").await?;
        sock.connect((address.host(), address.port())).await?;
        Ok(sock)
    }

    async fn send(&self, sock: &UdpSocket, query: Query) -> io::Result<()> {
        let mut buf = Vec::new();
        let n = query.encode(&mut buf);
        sock.send(&buf[..n]).await?;
        Ok(())
    }

    /// Reads datagrams until the idle gap or the cap elapses.
    ///
    /// Returns the number of received bytes. A socket error is returned only
    /// if nothing was received before it.
    async fn collect(&self, sock: &UdpSocket, out: &mut Vec<Decoded>) -> io::Result<usize> {
        let deadline = Instant::now() + self.details_timeout;
        let mut buf = [0; MAX_PACKET_SIZE];
        let mut received = 0;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = self.packet_gap.min(deadline - now);
            match time::timeout(wait, sock.recv(&mut buf)).await {
                Ok(Ok(n)) => {
                    trace!("recv \"{}\"", Str(&buf[..n]));
                    received += n;
                    out.push(decode(&buf[..n]));
                }
                Ok(Err(e)) if received == 0 => return Err(e),
                Ok(Err(e)) => {
                    debug!("recv failed: {e}");
                    break;
                }
                Err(_) => break,
            }
        }
        Ok(received)
    }
}

impl ServerQuery for UdpQuery {
    async fn query_info(&self, id: u32, address: &ServerAddress) -> Result<ServerRecord, Error> {
        let sock = self.connect(address).await?;
        let mut buf = [0; MAX_PACKET_SIZE];

        let start = Instant::now();
        self.send(&sock, Query::Info).await?;
        let n = time::timeout(self.info_timeout, sock.recv(&mut buf)).await??;
        let elapsed = start.elapsed().as_millis();

        trace!("{address}: info \"{}\"", Str(&buf[..n]));
        let round_trip = u32::try_from(elapsed).unwrap_or(u32::MAX).max(1);
        let record = ServerRecord::new(id, address.clone(), round_trip, &decode(&buf[..n]))?;
        Ok(record)
    }

    async fn query_details(&self, address: &ServerAddress) -> Result<Details, Error> {
        let sock = self.connect(address).await?;
        let mut packets = Vec::new();

        self.send(&sock, Query::Status).await?;
        let received = self.collect(&sock, &mut packets).await?;
        if received == 0 {
            return Err(Error::Timeout);
        }

        if !packets.iter().any(|i| i.terminated) {
            trace!("{address}: status is not terminated, query players");
            self.send(&sock, Query::Players).await?;
            if let Err(e) = self.collect(&sock, &mut packets).await {
                debug!("{address}: players failed: {e}");
            }
        }

        let terminated = packets.iter().any(|i| i.terminated);
        Ok(Details {
            packets,
            terminated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use tacops_protocol::{Error as ProtocolError, GameVariant};

    /// Answers queries with the datagrams from `answer`.
    async fn fake_server<F>(answer: F) -> ServerAddress
    where
        F: Fn(&[u8]) -> &'static [&'static [u8]] + Send + 'static,
    {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = sock.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0; 512];
            loop {
                let (n, from) = sock.recv_from(&mut buf).await.unwrap();
                for packet in answer(&buf[..n]).iter() {
                    sock.send_to(packet, from).await.unwrap();
                }
            }
        });
        ServerAddress::new("127.0.0.1", port).unwrap()
    }

    fn fast() -> UdpQuery {
        UdpQuery::new()
            .info_timeout(Duration::from_millis(300))
            .packet_gap(Duration::from_millis(150))
            .details_timeout(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn info() {
        let addr = fake_server(|_| {
            &[b"\\hostname\\Loopback\\gametype\\TO340\\numplayers\\0\\maxplayers\\12\\final\\"]
        })
        .await;
        let record = fast().query_info(3, &addr).await.unwrap();
        assert_eq!(record.id(), 3);
        assert_eq!(record.host_name(), "Loopback");
        assert_eq!(record.game_variant(), GameVariant::TO340);
        assert!(record.round_trip() >= 1);
        assert_eq!(record.address(), &addr);
    }

    #[tokio::test]
    async fn info_unsupported() {
        let addr = fake_server(|_| &[b"\\gametype\\CTFGame\\final\\"]).await;
        let err = fast().query_info(0, &addr).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnsupportedGame(ref s)) if s == "CTFGame"
        ));
    }

    #[tokio::test]
    async fn info_timeout() {
        let addr = fake_server(|_| &[]).await;
        let err = fast().query_info(0, &addr).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn details_multi_packet() {
        let addr = fake_server(|query| match query {
            b"\\info\\" => &[b"\\gametype\\TO350\\numplayers\\1\\final\\"],
            b"\\status\\" => &[
                b"\\hostname\\Split\\numplayers\\1",
                b"\\player_0\\Alice\\ping_0\\45\\queryid\\2.1",
            ],
            b"\\players\\" => &[b"\\player_1\\Bot\\ping_1\\0\\final\\"],
            _ => &[],
        })
        .await;

        let query = fast();
        let mut record = query.query_info(0, &addr).await.unwrap();
        let details = query.query_details(&addr).await.unwrap();
        assert_eq!(details.packets.len(), 3);
        assert!(details.terminated);

        details.apply(&mut record);
        assert_eq!(record.host_name(), "Split");
        assert_eq!(record.players().len(), 2);
        assert_eq!(record.bot_count(), 1);
        assert_eq!(record.num_players(), 2);
    }

    #[tokio::test]
    async fn details_terminated_status_skips_players() {
        let addr = fake_server(|query| match query {
            b"\\status\\" => &[b"\\hostname\\One\\final\\"],
            b"\\players\\" => &[b"\\player_0\\Late\\final\\"],
            _ => &[],
        })
        .await;
        let details = fast().query_details(&addr).await.unwrap();
        assert_eq!(details.packets.len(), 1);
        assert!(details.terminated);
    }

    #[tokio::test]
    async fn details_silent_server() {
        let addr = fake_server(|_| &[]).await;
        let err = fast().query_details(&addr).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn details_endless_answer_is_capped() {
        let sock = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let port = sock.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0; 512];
            loop {
                let (_, from) = sock.recv_from(&mut buf).await.unwrap();
                let sock = sock.clone();
                // a datagram every 50ms for 2s, never terminated
                tokio::spawn(async move {
                    for i in 0..40 {
                        let packet = format!("\\player_{i}\\Spam");
                        if sock.send_to(packet.as_bytes(), from).await.is_err() {
                            break;
                        }
                        time::sleep(Duration::from_millis(50)).await;
                    }
                });
            }
        });
        let addr = ServerAddress::new("127.0.0.1", port).unwrap();

        let query = UdpQuery::new()
            .packet_gap(Duration::from_millis(200))
            .details_timeout(Duration::from_millis(600));
        let start = Instant::now();
        let details = query.query_details(&addr).await.unwrap();
        let elapsed = start.elapsed();

        // status and players are capped separately
        assert!(elapsed >= Duration::from_millis(1200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1900), "{elapsed:?}");
        assert!(!details.packets.is_empty());
        assert!(!details.terminated);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn details_refused() {
        // bind and drop to get a closed port
        let port = {
            let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            sock.local_addr().unwrap().port()
        };
        let addr = ServerAddress::new("127.0.0.1", port).unwrap();
        let err = fast().query_details(&addr).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "{err:?}");
    }
}
