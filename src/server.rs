//! 파일 공유 서버
//!
//! - 단일 accept 루프 (기본: 연결 하나를 끝까지 처리한 뒤 다음 accept)
//! - 동시 모드: 연결마다 태스크 하나, 세션 키 저장소는 공유
//! - 연결 단위 오류는 기록만 하고 계속 수신 (바인드 실패만 치명적)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::chunk::TransferPlan;
use crate::crypto::SessionCipher;
use crate::frame::FramedStream;
use crate::keystore::{PeerAddress, SessionKeyStore};
use crate::message::Opcode;
use crate::stats::ServerStats;
use crate::{handshake, listing, sender, Config, Error, Result};

/// accept 실패 후 재시도 간격
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// 서버
///
/// 세션 키 저장소와 통계는 `Arc`로 공유되며 각 요청 처리기에 참조로 전달된다.
#[derive(Clone)]
pub struct Server {
    config: Arc<Config>,
    keys: Arc<SessionKeyStore>,
    stats: Arc<Mutex<ServerStats>>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            keys: Arc::new(SessionKeyStore::new()),
            stats: Arc::new(Mutex::new(ServerStats::default())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_keys(&self) -> Arc<SessionKeyStore> {
        self.keys.clone()
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> ServerStats {
        self.stats.lock().clone()
    }

    /// 설정 검증, 공유 디렉토리 준비, 바인드
    pub async fn bind(&self) -> Result<TcpListener> {
        self.config.validate()?;

        if tokio::fs::metadata(&self.config.shared_dir).await.is_err() {
            tokio::fs::create_dir_all(&self.config.shared_dir).await?;
            info!(
                "Shared directory created: {}",
                self.config.shared_dir.display()
            );
        }

        Ok(TcpListener::bind(self.config.bind_addr).await?)
    }

    /// 바인드 후 준비 신호(바인드된 주소)를 한 번 보내고 accept 루프 실행
    pub async fn run(
        self,
        ready: oneshot::Sender<SocketAddr>,
        shutdown: oneshot::Receiver<()>,
    ) -> Result<()> {
        let listener = self.bind().await?;
        let local_addr = listener.local_addr()?;

        info!("Server listening on {}", local_addr);
        info!("Shared directory: {}", self.config.shared_dir.display());
        info!(
            "Max message size: {} bytes (chunk {} bytes)",
            self.config.max_message_size,
            self.config.chunk_size()
        );

        if ready.send(local_addr).is_err() {
            debug!("준비 신호 수신자 없음");
        }

        self.serve(listener, shutdown).await
    }

    /// accept 루프
    ///
    /// `shutdown`이 신호를 받거나 송신측이 drop되면 종료하며,
    /// 처리 중인 연결은 중단된다.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<()> {
        let mut connections: JoinSet<()> = JoinSet::new();

        loop {
            let (stream, transport) = tokio::select! {
                _ = &mut shutdown => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => continue,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept 에러: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            self.stats.lock().connections += 1;
            debug!("Connection from {}", transport);

            if self.config.concurrent_connections {
                let server = self.clone();
                connections.spawn(async move { server.handle_connection(stream, transport).await });
            } else {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = self.handle_connection(stream, transport) => {}
                }
            }
        }

        connections.shutdown().await;
        info!("Server stopped");
        Ok(())
    }

    /// 연결 하나 처리 (요청 하나 후 연결 종료)
    async fn handle_connection(&self, stream: TcpStream, transport: SocketAddr) {
        let peer = PeerAddress::from_transport(transport);
        let mut framed = FramedStream::new(
            stream,
            self.config.max_message_size,
            Some(self.config.io_timeout()),
        );

        if let Err(e) = self.handle_request(&mut framed, peer).await {
            self.record_failure(&e);
            warn!("{} 요청 처리 실패: {}", transport, e);
        }
    }

    async fn handle_request(
        &self,
        framed: &mut FramedStream<TcpStream>,
        peer: PeerAddress,
    ) -> Result<()> {
        let msg = framed.recv_message().await?;
        debug!("{:?} from {}", msg.opcode, peer);

        match msg.opcode {
            Opcode::Handshake => {
                let response = handshake::respond(&self.keys, peer, msg.payload.as_deref())?;
                self.stats.lock().handshakes += 1;
                framed.send(&response).await?;
                info!("Handshake complete: {}", peer);
            }

            Opcode::ListFiles => {
                let Some(cipher) = self.authenticated(peer) else {
                    return Ok(());
                };
                let sent = listing::send_listing(
                    framed,
                    &cipher,
                    &self.config.shared_dir,
                    self.config.chunk_size(),
                )
                .await?;
                self.stats.lock().listings += 1;
                debug!("Listing sent to {}: {} files", peer, sent);
            }

            Opcode::GetFile => {
                let Some(cipher) = self.authenticated(peer) else {
                    return Ok(());
                };
                let encrypted_name = msg.payload.ok_or_else(|| {
                    Error::MalformedMessage("GetFile without filename".into())
                })?;
                let name = String::from_utf8(cipher.decrypt(&encrypted_name)?)
                    .map_err(|_| Error::MalformedMessage("filename is not UTF-8".into()))?;

                let plan = TransferPlan::resolve(
                    &self.config.shared_dir,
                    &name,
                    self.config.chunk_size(),
                )
                .await;
                info!(
                    "File request from {}: {:?} (size={:?}, {} chunks)",
                    peer, name, plan.file_size, plan.chunk_count
                );

                let report = sender::send_file(framed, &cipher, &plan).await?;
                let mut stats = self.stats.lock();
                if report.is_completed() {
                    stats.transfers_completed += 1;
                } else {
                    stats.transfers_aborted += 1;
                }
            }
        }

        Ok(())
    }

    /// 세션 키가 없는 피어의 요청은 응답 없이 버린다
    fn authenticated(&self, peer: PeerAddress) -> Option<SessionCipher> {
        match self.keys.cipher_for(&peer) {
            Ok(cipher) => Some(cipher),
            Err(_) => {
                debug!("세션 키 없는 피어 {} 요청 무시", peer);
                self.stats.lock().dropped_unknown_peer += 1;
                None
            }
        }
    }

    fn record_failure(&self, err: &Error) {
        let mut stats = self.stats.lock();
        match err {
            Error::MalformedMessage(_) | Error::FrameTooLarge { .. } => {
                stats.malformed_messages += 1
            }
            e if e.is_decryption_failure() => stats.decryption_failures += 1,
            _ => stats.connection_errors += 1,
        }
    }
}

/// 별도 태스크로 실행 중인 서버
///
/// 핸들을 drop하면 종료 신호 송신측도 drop되어 서버가 멈춘다.
pub struct ServerHandle {
    local_addr: SocketAddr,
    server: Server,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    /// 서버 태스크를 띄우고 준비 신호를 `ready_timeout` 동안 기다림
    ///
    /// 바인드 실패는 그 에러 그대로, 신호 없이 시간이 지나면 `ServerNotReady`.
    pub async fn start(config: Config) -> Result<Self> {
        let ready_timeout = config.ready_timeout();
        let server = Server::new(config);

        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(server.clone().run(ready_tx, shutdown_rx));

        match tokio::time::timeout(ready_timeout, ready_rx).await {
            Ok(Ok(local_addr)) => Ok(Self {
                local_addr,
                server,
                shutdown: Some(shutdown_tx),
                task,
            }),
            // 신호 전에 워커가 끝남
            Ok(Err(_)) => match task.await {
                Ok(Err(e)) => Err(e),
                _ => Err(Error::ServerNotReady),
            },
            Err(_) => {
                task.abort();
                Err(Error::ServerNotReady)
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> ServerStats {
        self.server.stats()
    }

    pub fn session_keys(&self) -> Arc<SessionKeyStore> {
        self.server.session_keys()
    }

    /// 종료 신호 후 태스크 join
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        }
    }
}
