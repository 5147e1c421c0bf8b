use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::AuthStatus;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::packet::TftpPacket;
use crate::session::{resolve_path, segment, Session, TransferReport};
use crate::transport::{recv_timeout, send_with_retry, Datagram};
use crate::{DEF_MODE, MAX_PACKET_SIZE};

pub struct Client<D = UdpSocket> {
    socket: D,
    server: SocketAddr,
    directory: PathBuf,
    config: Config,
}

impl Client<UdpSocket> {
    /// Creates the local storage directory and binds an ephemeral port.
    pub async fn bind(
        server: SocketAddr,
        directory: impl Into<PathBuf>,
        config: Config,
    ) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).await?;

        let local = match server {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self::with_socket(socket, server, directory, config))
    }
}

impl<D: Datagram> Client<D> {
    pub fn with_socket(
        socket: D,
        server: SocketAddr,
        directory: impl Into<PathBuf>,
        config: Config,
    ) -> Self {
        Self {
            socket,
            server,
            directory: directory.into(),
            config,
        }
    }

    /// Single attempt: a timeout or any reply other than `AUTH_SUCCESS`
    /// counts as rejection.
    ///
    /// Leftover protocol packets (such as ACKs from an earlier upload) and
    /// datagrams from other senders are skipped within the same timeout.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        let auth = TftpPacket::AUTH {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.send(&auth, self.server).await?;

        let deadline = Instant::now() + self.config.timeout;
        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let reply = recv_timeout(&self.socket, &mut buf, remaining).await?;
            let Some((n, from)) = reply else {
                warn!("authentication timeout");
                return Ok(false);
            };
            if from != self.server {
                debug!("{from} ignored while waiting for auth reply");
                continue;
            }
            if let Ok(pkt) = TftpPacket::deserialize(&buf[..n]) {
                debug!("{from} stale packet, opcode {}", pkt.opcode());
                continue;
            }

            let status = AuthStatus::from_reply(&buf[..n]);
            info!("{from} auth {username}: {}", status.as_str());
            return Ok(status.is_success());
        }
    }

    /// Fetches `filename` into the local directory. On abort, blocks already
    /// written stay on disk.
    pub async fn download(&self, filename: &str) -> Result<TransferReport> {
        let path = resolve_path(&self.directory, filename)?;
        let rrq = TftpPacket::RRQ {
            filename: filename.to_string(),
            mode: DEF_MODE.to_string(),
        };
        self.send(&rrq, self.server).await?;
        info!("RRQ {filename} -> {}", self.server);

        let mut file = File::create(&path).await?;
        let mut session = Session::new();
        let mut report = TransferReport::default();
        let mut buf = [0u8; MAX_PACKET_SIZE];

        while !session.is_finished() {
            let (block, data, from) = match self.recv_block(&mut session, &mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    session.abort();
                    warn!("download of {filename} aborted after {} blocks: {e}", report.blocks);
                    return Err(e);
                }
            };

            file.write_all(&data).await?;
            file.flush().await?;
            report.blocks += 1;
            report.bytes += data.len() as u64;
            debug!("block #{block}: {} bytes", data.len());

            self.send(&TftpPacket::ACK(block), from).await?;
            report.acks += 1;

            session.written(data.len())?;
        }

        info!("downloaded {filename}: {} bytes in {} blocks", report.bytes, report.blocks);
        Ok(report)
    }

    /// Pushes `filename` without waiting for acknowledgments.
    pub async fn upload(&self, filename: &str) -> Result<TransferReport> {
        let path = resolve_path(&self.directory, filename)?;
        let contents = fs::read(&path).await?;
        if segment(&contents).count() > usize::from(u16::MAX) {
            return Err(Error::BlockOverflow);
        }

        let wrq = TftpPacket::WRQ {
            filename: filename.to_string(),
            mode: DEF_MODE.to_string(),
        };
        self.send(&wrq, self.server).await?;
        info!("WRQ {filename} -> {}", self.server);

        let mut report = TransferReport::default();
        for (block, chunk) in (1..=u16::MAX).zip(segment(&contents)) {
            let data = TftpPacket::DATA {
                block,
                data: chunk.to_vec(),
            };
            self.send(&data, self.server).await?;
            report.blocks += 1;
            report.bytes += chunk.len() as u64;
            debug!("block #{block}: {} bytes", chunk.len());
        }

        info!("uploaded {filename}: {} bytes in {} blocks", report.bytes, report.blocks);
        Ok(report)
    }

    // Waits for the block the session expects. Only silence uses up the
    // retry budget; wrong blocks, foreign peers and garbage are skipped.
    async fn recv_block(
        &self,
        session: &mut Session,
        buf: &mut [u8],
    ) -> Result<(u16, Vec<u8>, SocketAddr)> {
        let mut timeouts: u8 = 0;
        loop {
            let reply = recv_timeout(&self.socket, buf, self.config.timeout).await?;
            let Some((n, from)) = reply else {
                timeouts += 1;
                warn!(
                    "timeout waiting for block #{:?} ({timeouts}/{})",
                    session.expected(),
                    self.config.max_retries
                );
                if timeouts >= self.config.max_retries {
                    return Err(Error::ReceiveTimeout { attempts: timeouts });
                }
                continue;
            };

            let (block, data) = match TftpPacket::deserialize(&buf[..n]) {
                Ok(TftpPacket::DATA { block, data }) => (block, data),
                Ok(pkt) => {
                    debug!("{from} unexpected packet, opcode {}", pkt.opcode());
                    continue;
                }
                Err(e) => {
                    debug!("{from} discarded: {e}");
                    continue;
                }
            };

            if !session.accept(block, from) {
                warn!(
                    "expected block #{:?} from {:?}, got #{block} from {from}",
                    session.expected(),
                    session.peer()
                );
                continue;
            }
            return Ok((block, data, from));
        }
    }

    async fn send(&self, pkt: &TftpPacket, dest: SocketAddr) -> Result<()> {
        send_with_retry(&self.socket, &pkt.serialize(), dest, self.config.max_retries).await
    }
}
