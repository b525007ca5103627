//! Tokio transport. Same wire behavior as `net`: one manifest per connection,
//! terminated by the sender closing its write half.

use crate::error::{RelocError, Result};
use std::io;

fn join_error(e: tokio::task::JoinError) -> RelocError {
    RelocError::Transport(io::Error::new(io::ErrorKind::Other, e.to_string()))
}

pub mod server {
    use super::*;
    use crate::config::ListenConfig;
    use crate::error::DecodeError;
    use crate::logger::Logger;
    use crate::materialize::Materializer;
    use crate::net::{apply_payload, outcome_line, ReceiveReport};
    use crate::protocol::IO_CHUNK;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Read until EOF, rejecting anything larger than `limit`.
    pub async fn read_to_eof<S>(stream: &mut S, limit: u64) -> Result<Vec<u8>>
    where
        S: AsyncRead + Unpin,
    {
        let mut data = Vec::new();
        let mut chunk = vec![0u8; IO_CHUNK];
        loop {
            let n = stream.read(&mut chunk).await.map_err(RelocError::Transport)?;
            if n == 0 {
                break;
            }
            if data.len() as u64 + n as u64 > limit {
                return Err(DecodeError::TooLarge { limit }.into());
            }
            data.extend_from_slice(&chunk[..n]);
        }
        Ok(data)
    }

    pub struct Server {
        listener: TcpListener,
        materializer: Arc<Materializer>,
        logger: Arc<dyn Logger>,
        max_manifest_bytes: u64,
    }

    impl Server {
        pub async fn bind(config: &ListenConfig, logger: Arc<dyn Logger>) -> Result<Self> {
            config.validate()?;
            let listener = TcpListener::bind((config.host.as_str(), config.port))
                .await
                .map_err(RelocError::Transport)?;
            let materializer = Materializer::new(config.root.clone())
                .preserve_mtime(config.preserve_mtime)
                .with_logger(logger.clone());
            let addr = listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| config.bind_addr());
            logger.listening(&addr, &config.root);
            Ok(Server {
                listener,
                materializer: Arc::new(materializer),
                logger,
                max_manifest_bytes: config.max_manifest_bytes,
            })
        }

        pub fn local_addr(&self) -> Result<SocketAddr> {
            self.listener.local_addr().map_err(RelocError::Transport)
        }

        pub async fn accept_one(&self) -> Result<ReceiveReport> {
            let (mut stream, peer) = self.listener.accept().await.map_err(RelocError::Transport)?;
            self.handle_conn(&mut stream, &peer.to_string()).await
        }

        async fn handle_conn(&self, stream: &mut TcpStream, peer: &str) -> Result<ReceiveReport> {
            let started = Instant::now();
            let transfer_id = uuid::Uuid::new_v4().to_string();
            self.logger.connected(&transfer_id, peer);

            let outcome = match read_to_eof(stream, self.max_manifest_bytes).await {
                Ok(data) => {
                    let materializer = self.materializer.clone();
                    tokio::task::spawn_blocking(move || apply_payload(&materializer, &data))
                        .await
                        .map_err(join_error)
                        .and_then(|r| r)
                }
                Err(e) => Err(e),
            };
            let _ = stream.shutdown().await;

            let (entries, stats) = outcome.map_err(|e| {
                self.logger
                    .error(&format!("transfer {} from {}", transfer_id, peer), &e.to_string());
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

        /// Accept forever. Connections are handled one after another, never
        /// concurrently, and a failed one does not stop the loop.
        pub async fn serve(&self) -> Result<()> {
            eprintln!("Saving files to path: {}", self.materializer.root().display());
            loop {
                let (mut stream, peer) = match self.listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        eprintln!("accept error: {}", e);
                        self.logger.error("accept", &e.to_string());
                        continue;
                    }
                };
                let _ = stream.set_nodelay(true);
                let peer = peer.to_string();
                eprintln!("Connected by client {}", peer);
                let outcome = self.handle_conn(&mut stream, &peer).await;
                eprintln!("{}", outcome_line(&peer, &outcome));
            }
        }
    }
}

pub mod client {
    use super::*;
    use crate::codec::encode;
    use crate::config::SendConfig;
    use crate::fs_enum::walk;
    use crate::entry::Manifest;
    use crate::net::SendReport;
    use std::path::Path;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    pub async fn connect(host: &str, port: u16, limit: Option<Duration>) -> Result<TcpStream> {
        let addr = format!("{}:{}", host, port);
        let attempt = TcpStream::connect((host, port));
        let result = match limit {
            Some(t) => match timeout(t, attempt).await {
                Ok(r) => r,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
            },
            None => attempt.await,
        };
        let stream = result.map_err(|source| RelocError::Connect { addr, source })?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    /// Write the payload and shut down the write half.
    pub async fn send_manifest(stream: &mut TcpStream, payload: &[u8], limit: Option<Duration>) -> Result<()> {
        let write = async {
            stream.write_all(payload).await?;
            stream.flush().await?;
            stream.shutdown().await
        };
        match limit {
            Some(t) => match timeout(t, write).await {
                Ok(r) => r.map_err(RelocError::Transport),
                Err(_) => Err(RelocError::Transport(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "write timed out",
                ))),
            },
            None => write.await.map_err(RelocError::Transport),
        }
    }

    pub async fn transmit_manifest(config: &SendConfig, manifest: &Manifest) -> Result<SendReport> {
        let limit = config.connect_timeout()?;
        let payload = encode(manifest)?;
        let report = SendReport::for_manifest(manifest, payload.len());
        let mut stream = connect(&config.host, config.port, limit).await?;
        send_manifest(&mut stream, &payload, limit).await?;
        Ok(report)
    }

    /// Walk `path` off the runtime, then send it. The returned future resolves
    /// once the write half is closed.
    pub async fn transmit(config: &SendConfig, path: &Path) -> Result<SendReport> {
        let owned = path.to_path_buf();
        let manifest = tokio::task::spawn_blocking(move || walk(&owned))
            .await
            .map_err(join_error)??;
        transmit_manifest(config, &manifest).await
    }
}
