//! Stream transport to the AgentX master.
//!
//! AgentX runs over a reliable byte stream: TCP port 705 by default, or the
//! master's Unix-domain socket where one is exposed. Frames are delimited
//! by the fixed 20-byte header's payload length field: the reader pulls the
//! header, learns the payload length, then reads exactly that many more
//! bytes before decoding.
//!
//! A decode failure after a well-framed read leaves the stream consistent,
//! so the session logs the PDU and keeps serving. Only I/O failures tear
//! the connection down.

use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::error::{ProtocolErrorKind, Error, Result};
use crate::pdu::{HEADER_LEN, Header, Pdu};

/// Default AgentX TCP port (RFC 2741 Section 8.2).
pub const DEFAULT_PORT: u16 = 705;

/// Conventional master socket path on Unix hosts.
#[cfg(unix)]
pub const DEFAULT_SOCKET_PATH: &str = "/var/agentx/master";

/// Maximum payload length accepted from the master.
///
/// The header field allows 4 GiB; accepting that at face value would let a
/// broken peer trigger unbounded allocation. Real AgentX payloads are a few
/// KiB.
const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// Where the master agent listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP, conventionally port 705 on localhost.
    Tcp(SocketAddr),
    /// Unix-domain stream socket, conventionally `/var/agentx/master`.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Endpoint {
    /// The conventional Unix master socket.
    #[cfg(unix)]
    pub fn unix_default() -> Self {
        Self::Unix(PathBuf::from(DEFAULT_SOCKET_PATH))
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Tcp(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{}", addr),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    /// Parse `"host:port"` as TCP, or an absolute path as a Unix socket.
    fn from_str(s: &str) -> Result<Self> {
        #[cfg(unix)]
        if s.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(s)));
        }
        let addr: SocketAddr = s.parse().map_err(|_| {
            Error::connection(
                Some(s.to_string()),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a socket address"),
            )
        })?;
        Ok(Self::Tcp(addr))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::Tcp(addr)
    }
}

/// A connected AgentX stream, split into framed reader and writer halves.
pub struct Connection {
    reader: PduReader,
    writer: PduWriter,
}

impl Connection {
    /// Connect to the master.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        let io_err = |e| Error::connection(Some(endpoint.to_string()), e);
        let (read, write): (BoxedRead, BoxedWrite) = match endpoint {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await.map_err(io_err)?;
                // One write per PDU; coalescing only adds latency.
                stream.set_nodelay(true).map_err(io_err)?;
                let (r, w) = stream.into_split();
                (Box::new(r), Box::new(w))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).await.map_err(io_err)?;
                let (r, w) = stream.into_split();
                (Box::new(r), Box::new(w))
            }
        };

        let endpoint_name = endpoint.to_string();
        Ok(Self {
            reader: PduReader {
                stream: read,
                endpoint: endpoint_name.clone(),
            },
            writer: PduWriter {
                stream: write,
                endpoint: endpoint_name,
            },
        })
    }

    pub async fn read_pdu(&mut self) -> Result<Pdu> {
        self.reader.read_pdu().await
    }

    pub async fn write_pdu(&mut self, pdu: &Pdu) -> Result<()> {
        self.writer.write_pdu(pdu).await
    }

    /// Split into independently owned halves so reading can proceed on its
    /// own task while the session loop writes responses.
    pub fn split(self) -> (PduReader, PduWriter) {
        (self.reader, self.writer)
    }
}

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Framed read half of a master connection.
pub struct PduReader {
    stream: BoxedRead,
    endpoint: String,
}

impl PduReader {
    /// Read one PDU.
    ///
    /// On a [`Error::Protocol`] return the stream is still framed (the
    /// whole payload was consumed), so the caller may log and continue.
    /// [`Error::Connection`] means the stream is gone.
    pub async fn read_pdu(&mut self) -> Result<Pdu> {
        let mut raw = [0u8; HEADER_LEN];
        self.stream
            .read_exact(&mut raw)
            .await
            .map_err(|e| Error::connection(Some(self.endpoint.clone()), e))?;

        let payload_len = Header::raw_payload_length(&raw) as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            // Cannot skip gigabytes to stay framed; give up on the stream.
            return Err(Error::connection(
                Some(self.endpoint.clone()),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    ProtocolErrorKind::PayloadTooLarge {
                        length: payload_len as u32,
                        max: MAX_PAYLOAD_LEN,
                    }
                    .to_string(),
                ),
            ));
        }

        let mut payload = vec![0u8; payload_len];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| Error::connection(Some(self.endpoint.clone()), e))?;

        // Header and body validation happen after the frame is fully
        // consumed, keeping the stream usable on protocol errors.
        let header = Header::decode(&raw)?;
        Pdu::decode_parts(header, &payload)
    }
}

/// Framed write half of a master connection.
pub struct PduWriter {
    stream: BoxedWrite,
    endpoint: String,
}

impl PduWriter {
    /// Write one PDU as a single frame.
    pub async fn write_pdu(&mut self, pdu: &Pdu) -> Result<()> {
        let frame = pdu.encode();
        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| Error::connection(Some(self.endpoint.clone()), e))?;
        self.stream
            .flush()
            .await
            .map_err(|e| Error::connection(Some(self.endpoint.clone()), e))
    }

    /// Gracefully shut the write side down.
    pub async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
