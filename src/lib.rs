//! # SFS (Sealed File Share)
//!
//! TCP 기반 암호화 파일 공유 프로토콜 (pull 방식)
//!
//! ## 핵심 특징
//! - **길이 접두 프레임**: u32 빅엔디안 길이 + 본문, 프레임 크기 상한 적용
//! - **비대칭 핸드쉐이크**: X25519로 봉인된 세션 키를 피어 주소별로 보관
//! - **대칭 채널**: ChaCha20-Poly1305, 메시지마다 무작위 nonce
//! - **청크 전송**: 청크 하나 전송 후 1바이트 ACK 대기, 거부 시 즉시 중단
//! - **공유 디렉토리 격리**: 공유 루트 밖의 경로는 존재하지 않는 파일로 취급

pub mod chunk;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod keystore;
pub mod listing;
pub mod message;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod stats;

pub use chunk::{AbortReason, Ack, TransferPlan, TransferReport, TransferState};
pub use client::Client;
pub use config::Config;
pub use crypto::{CryptoError, SessionCipher, SessionKey};
pub use error::{Error, Result};
pub use frame::FramedStream;
pub use keystore::{PeerAddress, SessionKeyStore};
pub use message::{Message, Opcode};
pub use server::{Server, ServerHandle};
pub use stats::{ServerStats, TransferStats};

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 1337;

/// 기본 최대 메시지 크기 (바이트)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// 파일 목록 구분자
pub const LISTING_DELIMITER: &str = ", ";

/// 기본 공유 디렉토리
pub const DEFAULT_SHARED_DIR: &str = "sharedfolder";
