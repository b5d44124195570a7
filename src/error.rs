//! 에러 타입 정의

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::keystore::PeerAddress;

/// SFS 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("암호 에러: {0}")]
    Crypto(#[from] CryptoError),

    #[error("핸드쉐이크 실패: {0}")]
    HandshakeFailed(String),

    #[error("잘못된 메시지: {0}")]
    MalformedMessage(String),

    #[error("프레임 크기 초과: {len} > {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("세션 키 없음: peer={0}")]
    KeyNotFound(PeerAddress),

    #[error("청크 I/O 실패: chunk={index}, {reason}")]
    ChunkIo { index: u64, reason: String },

    #[error("유효하지 않은 파일 이름: {0:?}")]
    InvalidFileName(String),

    #[error("세션이 수립되지 않음")]
    NotConnected,

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("타임아웃: {0}")]
    Timeout(&'static str),

    #[error("서버가 준비 신호를 보내지 않음")]
    ServerNotReady,

    #[error("잘못된 설정: {0}")]
    Config(String),
}

impl Error {
    /// 세션 키 불일치/변조로 인한 복호화 실패 여부
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, Error::Crypto(CryptoError::DecryptionFailed))
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
