use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::{debug, info, warn};

use crate::auth::{AuthStatus, Authenticator};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::packet::{is_final_block, TftpPacket};
use crate::session::{resolve_path, Session, TransferReport};
use crate::transport::{recv_timeout, send_with_retry, Datagram};
use crate::{BLOCK_SIZE, MAX_PACKET_SIZE};

/// What one dispatched datagram turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    Read(TransferReport),
    Write(TransferReport),
    Auth(AuthStatus),
    Ignored,
}

/// Serves one request at a time: a transfer runs to completion before the
/// next datagram is read from the socket.
///
/// While a transfer is running, datagrams from any other address are read
/// and dropped, not queued. A second client's request that arrives
/// mid-transfer is lost, and that client has to retry after its own timeout.
pub struct Server<A, D = UdpSocket> {
    socket: D,
    root: PathBuf,
    authenticator: A,
    config: Config,
}

impl<A: Authenticator> Server<A, UdpSocket> {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        root: impl Into<PathBuf>,
        authenticator: A,
        config: Config,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::with_socket(socket, root, authenticator, config))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl<A: Authenticator, D: Datagram> Server<A, D> {
    pub fn with_socket(
        socket: D,
        root: impl Into<PathBuf>,
        authenticator: A,
        config: Config,
    ) -> Self {
        Self {
            socket,
            root: root.into(),
            authenticator,
            config,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            let (n, addr) = self.socket.recv_from(&mut buf).await?;
            match self.dispatch(&buf[..n], addr).await {
                Ok(Served::Ignored) => (),
                Ok(served) => info!("{addr} {served:?}"),
                Err(e) => warn!("{addr} request failed: {e}"),
            }
        }
    }

    /// Receives and handles exactly one datagram.
    pub async fn serve_one(&self) -> Result<Served> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let (n, addr) = self.socket.recv_from(&mut buf).await?;
        self.dispatch(&buf[..n], addr).await
    }

    pub async fn dispatch(&self, buf: &[u8], addr: SocketAddr) -> Result<Served> {
        let pkt = match TftpPacket::deserialize(buf) {
            Ok(pkt) => pkt,
            Err(e) => {
                warn!("{addr} discarded: {e}");
                return Ok(Served::Ignored);
            }
        };

        match pkt {
            TftpPacket::RRQ { filename, mode } => {
                info!("{addr} RRQ {filename} ({mode})");
                self.handle_read(&filename, addr).await.map(Served::Read)
            }
            TftpPacket::WRQ { filename, mode } => {
                info!("{addr} WRQ {filename} ({mode})");
                self.handle_write(&filename, addr).await.map(Served::Write)
            }
            TftpPacket::AUTH { username, password } => {
                self.handle_auth(&username, &password, addr).await.map(Served::Auth)
            }
            pkt => {
                debug!("{addr} stray packet, opcode {}", pkt.opcode());
                Ok(Served::Ignored)
            }
        }
    }

    async fn handle_auth(
        &self,
        username: &str,
        password: &str,
        addr: SocketAddr,
    ) -> Result<AuthStatus> {
        let status = AuthStatus::from(self.authenticator.verify(username, password));
        info!("{addr} auth {username}: {}", status.as_str());
        send_with_retry(&self.socket, status.as_bytes(), addr, self.config.max_retries).await?;
        Ok(status)
    }

    async fn handle_read(&self, filename: &str, addr: SocketAddr) -> Result<TransferReport> {
        let start = Instant::now();
        let path = resolve_path(&self.root, filename)?;
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("file not found: {}", path.display());
                return Err(Error::FileNotFound(path));
            }
            Err(e) => return Err(e.into()),
        };

        let mut report = TransferReport::default();
        let mut chunk = vec![0u8; BLOCK_SIZE];
        let mut block: u16 = 1;
        loop {
            let size = read_block(&mut file, &mut chunk).await?;
            let data = TftpPacket::DATA {
                block,
                data: chunk[..size].to_vec(),
            };
            self.send_and_wait_ack(&data.serialize(), block, addr, &mut report).await?;
            report.blocks += 1;
            report.bytes += size as u64;

            if is_final_block(size) {
                break;
            }
            block = block.checked_add(1).ok_or(Error::BlockOverflow)?;
        }

        let cost = start.elapsed();
        info!(
            "sent {filename} to {addr}: {} bytes, {} blocks, cost: {:.3}s",
            report.bytes,
            report.blocks,
            cost.as_secs_f64()
        );
        Ok(report)
    }

    // Any ACK from the peer releases the block unless strict_ack is set,
    // in which case a mismatched one triggers a resend like a timeout does.
    async fn send_and_wait_ack(
        &self,
        data: &[u8],
        block: u16,
        addr: SocketAddr,
        report: &mut TransferReport,
    ) -> Result<()> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let mut retries: u8 = 0;
        send_with_retry(&self.socket, data, addr, self.config.max_retries).await?;
        debug!("block #{block}: {} bytes", data.len() - 4);

        loop {
            let reply = recv_timeout(&self.socket, &mut buf, self.config.timeout).await?;
            let Some((n, from)) = reply else {
                retries += 1;
                warn!("timeout waiting for ack #{block} ({retries}/{})", self.config.max_retries);
                if retries >= self.config.max_retries {
                    return Err(Error::ReceiveTimeout { attempts: retries });
                }
                send_with_retry(&self.socket, data, addr, self.config.max_retries).await?;
                continue;
            };
            if from != addr {
                debug!("{from} ignored during transfer with {addr}");
                continue;
            }

            match TftpPacket::deserialize(&buf[..n]) {
                Ok(TftpPacket::ACK(ack)) if !self.config.strict_ack || ack == block => {
                    report.acks += 1;
                    return Ok(());
                }
                Ok(TftpPacket::ACK(ack)) => {
                    retries += 1;
                    warn!("expect ack #{block}, but #{ack}");
                    if retries >= self.config.max_retries {
                        return Err(Error::ReceiveTimeout { attempts: retries });
                    }
                    send_with_retry(&self.socket, data, addr, self.config.max_retries).await?;
                }
                Ok(pkt) => debug!("{from} unexpected packet, opcode {}", pkt.opcode()),
                Err(e) => debug!("{from} discarded: {e}"),
            }
        }
    }

    async fn handle_write(&self, filename: &str, addr: SocketAddr) -> Result<TransferReport> {
        let start = Instant::now();
        let path = resolve_path(&self.root, filename)?;
        let mut file = File::create(&path).await?;

        let mut report = TransferReport::default();
        let mut session = Session::with_peer(addr);
        let mut last_ack = TftpPacket::ACK(0).serialize();
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let mut retries: u8 = 0;

        send_with_retry(&self.socket, &last_ack, addr, self.config.max_retries).await?;
        report.acks += 1;

        while !session.is_finished() {
            let reply = recv_timeout(&self.socket, &mut buf, self.config.timeout).await?;
            let Some((n, from)) = reply else {
                retries += 1;
                warn!(
                    "timeout waiting for block #{:?} ({retries}/{})",
                    session.expected(),
                    self.config.max_retries
                );
                if retries >= self.config.max_retries {
                    session.abort();
                    return Err(Error::ReceiveTimeout { attempts: retries });
                }
                send_with_retry(&self.socket, &last_ack, addr, self.config.max_retries).await?;
                report.acks += 1;
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
                    "unexpected block: expected #{:?}, but got #{block} from {from}",
                    session.expected()
                );
                continue;
            }

            file.write_all(&data).await?;
            file.flush().await?;
            retries = 0;
            report.blocks += 1;
            report.bytes += data.len() as u64;
            debug!("written block #{block}: {} bytes", data.len());

            last_ack = TftpPacket::ACK(block).serialize();
            send_with_retry(&self.socket, &last_ack, addr, self.config.max_retries).await?;
            report.acks += 1;

            session.written(data.len())?;
        }

        let cost = start.elapsed();
        info!(
            "received {filename} from {addr}: {} bytes, {} blocks, cost: {:.3}s",
            report.bytes,
            report.blocks,
            cost.as_secs_f64()
        );
        Ok(report)
    }
}

// Fills buf unless EOF comes first; a short result is the final block.
async fn read_block<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
