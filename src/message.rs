//! 프로토콜 메시지 정의
//!
//! 요청 본문 형식 (빅엔디안):
//! ```text
//! opcode(1) | presence(1) | [payload_len(4) | payload]
//! ```
//! presence가 0이면 페이로드 없음. 디코딩은 전함수이며
//! 알 수 없는 opcode, 잘린 길이, 남는 바이트는 모두 거부한다.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// opcode + presence 바이트
pub const HEADER_LEN: usize = 2;

/// 페이로드 길이 필드 크기
pub const LENGTH_FIELD_LEN: usize = 4;

/// 메시지 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// 세션 키 요청 (페이로드: 클라이언트 공개키, 평문)
    Handshake = 1,

    /// 공유 디렉토리 목록 요청 (페이로드 없음)
    ListFiles = 2,

    /// 파일 요청 (페이로드: 암호화된 파일 이름)
    GetFile = 3,
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Opcode::Handshake),
            2 => Ok(Opcode::ListFiles),
            3 => Ok(Opcode::GetFile),
            other => Err(Error::MalformedMessage(format!("unknown opcode {}", other))),
        }
    }
}

/// 요청 메시지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub opcode: Opcode,
    pub payload: Option<Bytes>,
}

impl Message {
    pub fn new(opcode: Opcode, payload: Option<Bytes>) -> Self {
        Self { opcode, payload }
    }

    pub fn handshake(public_key: &[u8]) -> Self {
        Self::new(Opcode::Handshake, Some(Bytes::copy_from_slice(public_key)))
    }

    pub fn list_files() -> Self {
        Self::new(Opcode::ListFiles, None)
    }

    pub fn get_file(encrypted_name: Vec<u8>) -> Self {
        Self::new(Opcode::GetFile, Some(Bytes::from(encrypted_name)))
    }

    /// 인코딩된 크기
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + self
                .payload
                .as_ref()
                .map_or(0, |p| LENGTH_FIELD_LEN + p.len())
    }

    /// 바이트로 직렬화
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.opcode as u8);
        match &self.payload {
            Some(payload) => {
                buf.put_u8(1);
                buf.put_u32(payload.len() as u32);
                buf.put_slice(payload);
            }
            None => buf.put_u8(0),
        }
        buf.freeze()
    }

    /// 바이트에서 역직렬화
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        if buf.remaining() < HEADER_LEN {
            return Err(Error::MalformedMessage(format!(
                "header truncated: {} bytes",
                buf.remaining()
            )));
        }

        let opcode = Opcode::try_from(buf.get_u8())?;
        let payload = match buf.get_u8() {
            0 => None,
            1 => {
                if buf.remaining() < LENGTH_FIELD_LEN {
                    return Err(Error::MalformedMessage("length field truncated".into()));
                }
                let len = buf.get_u32() as usize;
                if buf.remaining() < len {
                    return Err(Error::MalformedMessage(format!(
                        "payload truncated: expected {}, got {}",
                        len,
                        buf.remaining()
                    )));
                }
                Some(buf.copy_to_bytes(len))
            }
            other => {
                return Err(Error::MalformedMessage(format!(
                    "invalid presence flag {}",
                    other
                )))
            }
        };

        if buf.has_remaining() {
            return Err(Error::MalformedMessage(format!(
                "{} trailing bytes",
                buf.remaining()
            )));
        }

        Ok(Self { opcode, payload })
    }
}
