//! 세션 키 저장소 (서버측)
//!
//! 피어 주소 → 세션 키 매핑. 재핸드쉐이크 시 덮어씀, 만료 없음.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use dashmap::DashMap;

use crate::crypto::{SessionCipher, SessionKey};
use crate::{Error, Result};

/// 피어 주소 (키 저장소 인덱스)
///
/// 전송 계층에서 관찰한 IP일 뿐 인증된 주체가 아님.
/// 같은 IP 뒤의 다른 클라이언트는 같은 피어로 취급되며,
/// 공개키 외의 신원 확인은 하지 않는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress(IpAddr);

impl PeerAddress {
    pub fn new(ip: IpAddr) -> Self {
        Self(ip)
    }

    /// 전송 계층 주소에서 피어 식별자 추출 (포트는 연결마다 바뀌므로 제외)
    pub fn from_transport(addr: SocketAddr) -> Self {
        Self(addr.ip())
    }

    pub fn ip(&self) -> IpAddr {
        self.0
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::from_transport(addr)
    }
}

impl From<IpAddr> for PeerAddress {
    fn from(ip: IpAddr) -> Self {
        Self(ip)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 세션 키 저장소
///
/// 호출 단위로 원자적인 동시성 맵. 연결 처리기가 소유하고 `Arc`로 각 요청에 전달.
#[derive(Debug, Default)]
pub struct SessionKeyStore {
    keys: DashMap<PeerAddress, SessionKey>,
}

impl SessionKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 키 저장 (기존 키는 덮어쓰고 반환)
    pub fn put(&self, addr: PeerAddress, key: SessionKey) -> Option<SessionKey> {
        self.keys.insert(addr, key)
    }

    /// 키 조회
    pub fn get(&self, addr: &PeerAddress) -> Result<SessionKey> {
        self.keys
            .get(addr)
            .map(|entry| entry.value().clone())
            .ok_or(Error::KeyNotFound(*addr))
    }

    /// 피어의 현재 세션 키로 대칭 채널 생성
    pub fn cipher_for(&self, addr: &PeerAddress) -> Result<SessionCipher> {
        self.get(addr).map(|key| SessionCipher::new(&key))
    }

    pub fn contains(&self, addr: &PeerAddress) -> bool {
        self.keys.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
