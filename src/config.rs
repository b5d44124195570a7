//! 프로토콜 설정

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::SEAL_OVERHEAD;
use crate::{Error, Result, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PORT, DEFAULT_SHARED_DIR};

/// 허용되는 최소 메시지 크기 (핸드쉐이크 응답이 한 프레임에 들어가야 함)
pub const MIN_MESSAGE_SIZE: usize = 128;

/// SFS 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 서버 바인드 주소
    pub bind_addr: SocketAddr,

    /// 프레임 하나의 최대 크기 (바이트)
    /// 청크 크기는 이 값의 절반
    pub max_message_size: usize,

    /// 공유 디렉토리 (서버)
    pub shared_dir: PathBuf,

    /// 다운로드 저장 디렉토리 (클라이언트)
    pub download_dir: PathBuf,

    /// 프레임 단위 읽기/쓰기 타임아웃 (밀리초)
    pub io_timeout_ms: u64,

    /// 클라이언트 연결 타임아웃 (밀리초)
    pub connect_timeout_ms: u64,

    /// 서버 준비 신호 대기 타임아웃 (밀리초)
    pub ready_timeout_ms: u64,

    /// 연결마다 별도 태스크로 처리할지 여부
    /// false면 연결 하나를 끝까지 처리한 뒤 다음 accept
    pub concurrent_connections: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            shared_dir: PathBuf::from(DEFAULT_SHARED_DIR),
            download_dir: default_download_dir(),
            io_timeout_ms: 30_000,     // 30초
            connect_timeout_ms: 10_000, // 10초
            ready_timeout_ms: 5_000,   // 5초
            concurrent_connections: false,
        }
    }
}

fn default_download_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 동시 접속 처리용 설정
    pub fn concurrent() -> Self {
        Self {
            io_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            concurrent_connections: true,
            ..Self::default()
        }
    }

    /// 청크 크기 (최대 메시지 크기의 절반)
    pub fn chunk_size(&self) -> usize {
        self.max_message_size >> 1
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.max_message_size < MIN_MESSAGE_SIZE {
            return Err(Error::Config(format!(
                "max_message_size {} < {}",
                self.max_message_size, MIN_MESSAGE_SIZE
            )));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(Error::Config(format!(
                "max_message_size {} exceeds u32 frame length",
                self.max_message_size
            )));
        }
        // 암호화된 청크가 한 프레임에 들어가야 함
        if self.chunk_size() + SEAL_OVERHEAD > self.max_message_size {
            return Err(Error::Config(format!(
                "encrypted chunk ({} bytes) does not fit in {} bytes",
                self.chunk_size() + SEAL_OVERHEAD,
                self.max_message_size
            )));
        }
        if self.io_timeout_ms == 0 || self.connect_timeout_ms == 0 || self.ready_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunk_size() {
        let config = Config::default();
        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.chunk_size(), 2048);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_tiny_message_size() {
        let config = Config {
            max_message_size: 64,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_concurrent_preset() {
        let config = Config::concurrent();
        assert!(config.concurrent_connections);
        assert!(config.validate().is_ok());
    }
}
