use crate::codec::{decode, encode};
use crate::config::{ListenConfig, SendConfig};
use crate::entry::Manifest;
use crate::error::{DecodeError, RelocError, Result};
use crate::fs_enum::walk;
use crate::logger::Logger;
use crate::materialize::{MaterializeStats, Materializer};
use crate::protocol::IO_CHUNK;
use indicatif::ProgressBar;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What one `transmit` call put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub name: String,
    pub is_dir: bool,
    pub entries: usize,
    pub wire_bytes: u64,
}

impl SendReport {
    pub(crate) fn for_manifest(manifest: &Manifest, wire_bytes: usize) -> Self {
        let first = manifest.first();
        SendReport {
            name: first.map(|e| e.display_name().to_string()).unwrap_or_default(),
            is_dir: first.map(|e| e.is_dir()).unwrap_or(false),
            entries: manifest.len(),
            wire_bytes: wire_bytes as u64,
        }
    }
}

/// Result of `transmit`: either finished inline, or handed to a worker thread
/// that the caller may join or drop.
#[derive(Debug)]
pub enum Transmission {
    Sent(SendReport),
    Detached(JoinHandle<Result<SendReport>>),
}

impl Transmission {
    /// Block until the bytes are flushed (immediate for inline sends).
    pub fn wait(self) -> Result<SendReport> {
        match self {
            Transmission::Sent(report) => Ok(report),
            Transmission::Detached(handle) => handle.join().unwrap_or_else(|_| {
                Err(RelocError::Transport(io::Error::new(
                    io::ErrorKind::Other,
                    "send worker panicked",
                )))
            }),
        }
    }
}

pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream> {
    let target = format!("{}:{}", host, port);
    let connect_err = |source: io::Error| RelocError::Connect {
        addr: target.clone(),
        source,
    };
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs().map_err(connect_err)?.collect();
    let mut last = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
    for addr in addrs {
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(&addr, t),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                stream.set_write_timeout(timeout).map_err(connect_err)?;
                stream.set_read_timeout(timeout).map_err(connect_err)?;
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => last = e,
        }
    }
    Err(connect_err(last))
}

/// Write the encoded manifest and close the write half. The close is the
/// only end-of-message marker the receiver gets.
pub fn send_manifest(stream: &mut TcpStream, payload: &[u8], progress: Option<&ProgressBar>) -> Result<()> {
    for chunk in payload.chunks(IO_CHUNK) {
        stream.write_all(chunk).map_err(RelocError::Transport)?;
        if let Some(pb) = progress {
            pb.inc(chunk.len() as u64);
        }
    }
    stream.flush().map_err(RelocError::Transport)?;
    stream.shutdown(Shutdown::Write).map_err(RelocError::Transport)?;
    Ok(())
}

pub struct Client {
    config: SendConfig,
    progress: Option<ProgressBar>,
}

impl Client {
    pub fn new(config: SendConfig) -> Self {
        Client {
            config,
            progress: None,
        }
    }

    /// Advance `pb` by bytes written. Its length is set to the payload size.
    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    pub fn config(&self) -> &SendConfig {
        &self.config
    }

    pub fn connect(&self) -> Result<TcpStream> {
        connect(&self.config.host, self.config.port, self.config.connect_timeout()?)
    }

    /// Send one file or directory tree over a fresh connection.
    ///
    /// Walking, encoding and connecting happen on the caller's thread, so a
    /// missing path or unreachable host is reported here. With `is_async`
    /// set, the write itself runs on a worker thread.
    pub fn transmit(&self, path: &Path) -> Result<Transmission> {
        let manifest = walk(path)?;
        self.transmit_manifest(&manifest)
    }

    pub fn transmit_manifest(&self, manifest: &Manifest) -> Result<Transmission> {
        let payload = encode(manifest)?;
        let report = SendReport::for_manifest(manifest, payload.len());
        let mut stream = self.connect()?;
        if let Some(pb) = &self.progress {
            pb.set_length(payload.len() as u64);
        }

        if self.config.is_async {
            let progress = self.progress.clone();
            let handle = thread::spawn(move || -> Result<SendReport> {
                send_manifest(&mut stream, &payload, progress.as_ref())?;
                Ok(report)
            });
            return Ok(Transmission::Detached(handle));
        }

        send_manifest(&mut stream, &payload, self.progress.as_ref())?;
        Ok(Transmission::Sent(report))
    }
}

/// Read until the peer closes. Anything past `limit` aborts the connection.
pub fn read_to_eof<R: Read>(reader: &mut R, limit: u64) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut chunk = vec![0u8; IO_CHUNK];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RelocError::Transport(e)),
        };
        if data.len() as u64 + n as u64 > limit {
            return Err(DecodeError::TooLarge { limit }.into());
        }
        data.extend_from_slice(&chunk[..n]);
    }
    Ok(data)
}

/// Outcome of one accepted connection.
#[derive(Debug, Clone)]
pub struct ReceiveReport {
    pub transfer_id: String,
    pub peer: String,
    pub entries: usize,
    pub stats: MaterializeStats,
    pub elapsed: Duration,
}

/// Decode and apply one complete connection payload. An empty payload means
/// the peer connected and left without sending; nothing is written.
pub(crate) fn apply_payload(materializer: &Materializer, data: &[u8]) -> Result<(usize, MaterializeStats)> {
    if data.is_empty() {
        return Ok((0, MaterializeStats::default()));
    }
    let manifest = decode(data)?;
    let stats = materializer.apply(&manifest)?;
    Ok((manifest.len(), stats))
}

/// One status line per finished connection, shared by both receive loops.
pub(crate) fn outcome_line(peer: &str, outcome: &Result<ReceiveReport>) -> String {
    match outcome {
        Ok(r) if r.entries == 0 => format!("{}: empty transfer, nothing written", peer),
        Ok(r) => format!(
            "{}: {} entries, {} files, {} bytes in {:.2}s",
            peer,
            r.entries,
            r.stats.files,
            r.stats.bytes,
            r.elapsed.as_secs_f64()
        ),
        Err(e) => format!("transfer from {} dropped: {}", peer, e),
    }
}

pub struct Server {
    listener: TcpListener,
    materializer: Materializer,
    logger: Arc<dyn Logger>,
    max_manifest_bytes: u64,
    is_async: bool,
}

impl Server {
    pub fn bind(config: &ListenConfig, logger: Arc<dyn Logger>) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .map_err(RelocError::Transport)?;
        let materializer = Materializer::new(config.root.clone())
            .preserve_mtime(config.preserve_mtime)
            .with_logger(logger.clone());
        let server = Server {
            listener,
            materializer,
            logger,
            max_manifest_bytes: config.max_manifest_bytes,
            is_async: config.is_async,
        };
        let addr = server
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| config.bind_addr());
        server.logger.listening(&addr, server.materializer.root());
        Ok(server)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(RelocError::Transport)
    }

    pub fn root(&self) -> &Path {
        self.materializer.root()
    }

    /// Accept a single connection and process it to completion.
    pub fn accept_one(&self) -> Result<ReceiveReport> {
        let (mut stream, peer) = self.listener.accept().map_err(RelocError::Transport)?;
        self.handle_conn(&mut stream, &peer.to_string())
    }

    fn handle_conn(&self, stream: &mut TcpStream, peer: &str) -> Result<ReceiveReport> {
        let started = Instant::now();
        let transfer_id = uuid::Uuid::new_v4().to_string();
        self.logger.connected(&transfer_id, peer);

        let outcome = read_to_eof(stream, self.max_manifest_bytes)
            .and_then(|data| apply_payload(&self.materializer, &data));
        let _ = stream.shutdown(Shutdown::Both);

        let (entries, stats) = outcome.map_err(|e| {
            self.logger.error(&format!("transfer {} from {}", transfer_id, peer), &e.to_string());
            e
        })?;
        let elapsed = started.elapsed();
        self.logger
            .done(&transfer_id, stats.files, stats.bytes, elapsed.as_secs_f64());
        Ok(ReceiveReport {
            transfer_id,
            peer: peer.to_string(),
            entries,
            stats,
            elapsed,
        })
    }

    /// Accept connections forever, one at a time. A failing connection is
    /// reported and dropped; the loop keeps going.
    pub fn serve(&self) -> Result<()> {
        eprintln!("Saving files to path: {}", self.root().display());
        for conn in self.listener.incoming() {
            match conn {
                Ok(mut stream) => {
                    let peer = stream
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| "unknown".to_string());
                    eprintln!("Connected by client {}", peer);
                    let outcome = self.handle_conn(&mut stream, &peer);
                    eprintln!("{}", outcome_line(&peer, &outcome));
                }
                Err(e) => {
                    eprintln!("accept error: {}", e);
                    self.logger.error("accept", &e.to_string());
                }
            }
        }
        Ok(())
    }

    /// Serve on the caller's thread, or on a worker thread when configured
    /// asynchronous; in that case the handle is returned and the call does
    /// not block.
    pub fn receive(self) -> Result<Option<JoinHandle<Result<()>>>> {
        if self.is_async {
            Ok(Some(thread::spawn(move || self.serve())))
        } else {
            self.serve()?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_to_eof_collects_everything() {
        let input: Vec<u8> = (0..3 * IO_CHUNK + 17).map(|i| i as u8).collect();
        let out = read_to_eof(&mut Cursor::new(input.clone()), u64::MAX).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_read_to_eof_enforces_limit() {
        let err = read_to_eof(&mut Cursor::new(vec![0u8; 100]), 99).unwrap_err();
        assert!(matches!(err, RelocError::Decode(DecodeError::TooLarge { limit: 99 })));
    }

    #[test]
    fn test_apply_empty_payload_is_noop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let m = Materializer::new(tmp.path());
        assert_eq!(apply_payload(&m, &[]).unwrap(), (0, MaterializeStats::default()));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_outcome_line_variants() {
        let mut report = ReceiveReport {
            transfer_id: "t".into(),
            peer: "10.0.0.2:5000".into(),
            entries: 0,
            stats: MaterializeStats::default(),
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(
            outcome_line("10.0.0.2:5000", &Ok(report.clone())),
            "10.0.0.2:5000: empty transfer, nothing written"
        );

        report.entries = 3;
        report.stats = MaterializeStats { directories: 1, files: 2, bytes: 10 };
        assert_eq!(
            outcome_line("10.0.0.2:5000", &Ok(report)),
            "10.0.0.2:5000: 3 entries, 2 files, 10 bytes in 1.50s"
        );

        let err = Err(RelocError::PathViolation("../x".into()));
        assert_eq!(
            outcome_line("10.0.0.2:5000", &err),
            "transfer from 10.0.0.2:5000 dropped: path escapes destination root: ../x"
        );
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let err = connect("127.0.0.1", port, Some(Duration::from_millis(500))).unwrap_err();
        assert!(matches!(err, RelocError::Connect { .. }));
    }
}
