//! 파일 공유 클라이언트
//!
//! 활성 세션(대상 서버 + 세션 키)은 최대 하나. 요청마다 새 연결을 연다.
//! 세션 키로 복호화에 실패하면 서버측 키가 바뀐 것으로 보고 세션을 버린다.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::chunk::TransferReport;
use crate::crypto::{SessionCipher, SessionKey};
use crate::frame::FramedStream;
use crate::message::Message;
use crate::{handshake, listing, receiver, Config, Error, Result};

struct ActiveSession {
    server: SocketAddr,
    key: SessionKey,
    cipher: SessionCipher,
}

impl ActiveSession {
    fn new(server: SocketAddr, key: SessionKey) -> Self {
        let cipher = SessionCipher::new(&key);
        Self {
            server,
            key,
            cipher,
        }
    }
}

/// 클라이언트
pub struct Client {
    config: Config,
    session: Option<ActiveSession>,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// 현재 세션의 대상 서버
    pub fn target(&self) -> Option<SocketAddr> {
        self.session.as_ref().map(|s| s.server)
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session.as_ref().map(|s| &s.key)
    }

    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("세션 종료: {}", session.server);
        }
    }

    /// 핸드쉐이크
    ///
    /// 기존 세션은 결과와 관계없이 버려진다. 실패하면 `HandshakeFailed`이고
    /// 활성 세션은 남지 않는다.
    pub async fn connect(&mut self, server: SocketAddr) -> Result<()> {
        self.disconnect();

        let key = match self.handshake(server).await {
            Ok(key) => key,
            Err(e) => {
                warn!("{} 핸드쉐이크 실패: {}", server, e);
                return Err(Error::HandshakeFailed(e.to_string()));
            }
        };

        self.session = Some(ActiveSession::new(server, key));
        info!("Connected to {}", server);
        Ok(())
    }

    async fn handshake(&self, server: SocketAddr) -> Result<SessionKey> {
        let mut framed = self.open(server).await?;
        handshake::initiate(&mut framed).await
    }

    async fn open(&self, server: SocketAddr) -> Result<FramedStream<TcpStream>> {
        let stream = tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(server))
            .await
            .map_err(|_| Error::Timeout("connect"))??;
        Ok(FramedStream::new(
            stream,
            self.config.max_message_size,
            Some(self.config.io_timeout()),
        ))
    }

    fn active(&self) -> Result<(SocketAddr, SessionCipher)> {
        self.session
            .as_ref()
            .map(|s| (s.server, s.cipher.clone()))
            .ok_or(Error::NotConnected)
    }

    /// 서버 공유 디렉토리의 파일 이름 목록
    pub async fn list_files(&mut self) -> Result<Vec<String>> {
        let (server, cipher) = self.active()?;

        let result = async {
            let mut framed = self.open(server).await?;
            framed.send_message(&Message::list_files()).await?;
            listing::receive_listing(&mut framed, &cipher).await
        }
        .await;

        self.drop_session_on_stale_key(result)
    }

    /// 다운로드된 파일이 저장될 경로 (`download_dir/<파일 이름>`)
    pub fn download_path(&self, name: &str) -> Result<PathBuf> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| Error::InvalidFileName(name.to_owned()))?;
        Ok(self.config.download_dir.join(file_name))
    }

    /// 파일 다운로드
    ///
    /// 서버가 청크 0개를 알리면(없는 파일 포함) 아무 파일도 만들지 않는다.
    /// 중간에 중단되면 이미 받은 앞부분이 출력 파일에 남는다.
    pub async fn fetch_file(&mut self, name: &str) -> Result<TransferReport> {
        let output = self.download_path(name)?;
        let (server, cipher) = self.active()?;
        let encrypted_name = cipher.encrypt(name.as_bytes())?;

        let result = async {
            tokio::fs::create_dir_all(&self.config.download_dir).await?;
            let mut framed = self.open(server).await?;
            framed
                .send_message(&Message::get_file(encrypted_name))
                .await?;
            receiver::receive_file(&mut framed, &cipher, &output).await
        }
        .await;

        let report = self.drop_session_on_stale_key(result)?;
        if report.chunk_count == 0 {
            info!("{:?}: 서버에 없는 파일", name);
        } else {
            info!(
                "{:?} -> {} ({:?}, {} bytes)",
                name,
                output.display(),
                report.state,
                report.bytes_transferred()
            );
        }
        Ok(report)
    }

    fn drop_session_on_stale_key<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_decryption_failure() {
                warn!("세션 키 불일치, 재핸드쉐이크 필요");
                self.session = None;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_requires_session() {
        let mut client = Client::new(Config::default());
        assert!(matches!(client.list_files().await, Err(Error::NotConnected)));
        assert!(matches!(client.fetch_file("a.txt").await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_handshake_to_closed_port_clears_state() {
        // 바인드 후 바로 닫아서 빈 포트 확보
        let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = Client::new(Config::default());
        let err = client.connect(addr).await.unwrap_err();

        assert!(matches!(err, Error::HandshakeFailed(_)));
        assert!(!client.is_connected());
        assert!(client.target().is_none());
        assert!(client.session_key().is_none());
    }

    #[test]
    fn test_download_path_uses_file_name() {
        let config = Config {
            download_dir: PathBuf::from("/tmp/downloads"),
            ..Config::default()
        };
        let client = Client::new(config);

        assert_eq!(
            client.download_path("nested/report.pdf").unwrap(),
            PathBuf::from("/tmp/downloads/report.pdf")
        );
        assert!(matches!(
            client.download_path(""),
            Err(Error::InvalidFileName(_))
        ));
        assert!(matches!(
            client.download_path(".."),
            Err(Error::InvalidFileName(_))
        ));
    }
}
