//! 청크 전송 공통 타입
//!
//! - TransferPlan: 요청 파일의 경로, 크기, 청크 크기, 청크 수
//! - Chunk: chunk_size 이하의 파일 조각 (0..chunk_count 순서)
//! - Ack: 청크마다 정확히 하나씩 오가는 1바이트 응답

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::stats::TransferStats;
use crate::{Error, Result};

/// 청크 인덱스 (파일 내 순서)
pub type ChunkIndex = u64;

/// 청크 수 계산: ceil(file_size / chunk_size)
pub fn chunk_count(file_size: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    file_size.div_ceil(chunk_size as u64)
}

/// 공유 디렉토리 안의 경로로 해석
///
/// `..`, 절대 경로, 공유 루트 밖을 가리키는 심볼릭 링크는 모두 None.
pub async fn resolve_shared_path(shared_dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains('\0') {
        return None;
    }

    let relative = Path::new(name);
    let lexically_inside = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !lexically_inside {
        return None;
    }

    let root = tokio::fs::canonicalize(shared_dir).await.ok()?;
    confine(&root, &root.join(relative)).await
}

/// `path`를 실제 경로로 바꿨을 때 이미 정규화된 `root` 안에 있으면 그 경로
pub async fn confine(root: &Path, path: &Path) -> Option<PathBuf> {
    let candidate = tokio::fs::canonicalize(path).await.ok()?;
    candidate.starts_with(root).then_some(candidate)
}

/// 일반 파일의 크기 (없거나 읽을 수 없으면 None)
pub async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

/// 전송 계획
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// 대상 파일 경로
    pub target_path: PathBuf,

    /// 파일 크기 (None = 파일 없음/읽기 불가)
    pub file_size: Option<u64>,

    /// 청크 크기
    pub chunk_size: usize,

    /// 청크 수 (크기가 None이거나 0이면 0)
    pub chunk_count: u64,
}

impl TransferPlan {
    pub fn new(target_path: PathBuf, file_size: Option<u64>, chunk_size: usize) -> Self {
        let chunk_count = file_size.map_or(0, |size| chunk_count(size, chunk_size));
        Self {
            target_path,
            file_size,
            chunk_size,
            chunk_count,
        }
    }

    /// 요청된 이름을 공유 디렉토리 기준으로 해석해 계획 수립
    pub async fn resolve(shared_dir: &Path, name: &str, chunk_size: usize) -> Self {
        match resolve_shared_path(shared_dir, name).await {
            Some(path) => {
                let size = file_size(&path).await;
                Self::new(path, size, chunk_size)
            }
            None => Self::new(PathBuf::from(name), None, chunk_size),
        }
    }

    pub fn is_available(&self) -> bool {
        self.file_size.is_some()
    }

    /// 보낼 청크가 없는지 (파일 없음 또는 빈 파일)
    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }
}

/// 청크 ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ack {
    Rejected = 0,
    Accepted = 1,
}

impl Ack {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// 1이 아닌 값은 모두 거부로 취급
    pub fn from_byte(byte: u8) -> Self {
        if byte == Ack::Accepted as u8 {
            Ack::Accepted
        } else {
            Ack::Rejected
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Ack::Accepted
    }
}

/// 청크 (평문)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: ChunkIndex,
    pub data: Bytes,
}

/// 파일을 chunk_size 단위로 순차 읽기 (마지막 청크는 짧을 수 있음)
pub struct ChunkReader {
    file: File,
    chunk_size: usize,
    next_index: ChunkIndex,
    chunk_count: u64,
}

impl ChunkReader {
    pub async fn open(plan: &TransferPlan) -> Result<Self> {
        let file = File::open(&plan.target_path)
            .await
            .map_err(|e| Error::ChunkIo {
                index: 0,
                reason: format!("open {}: {}", plan.target_path.display(), e),
            })?;

        Ok(Self {
            file,
            chunk_size: plan.chunk_size,
            next_index: 0,
            chunk_count: plan.chunk_count,
        })
    }

    /// 다음 청크 읽기, 모든 청크를 읽었으면 None
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.next_index >= self.chunk_count {
            return Ok(None);
        }

        let index = self.next_index;
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;

        // read 한 번이 창을 다 채운다는 보장이 없음
        while filled < self.chunk_size {
            let n = self
                .file
                .read(&mut buf[filled..])
                .await
                .map_err(|e| Error::ChunkIo {
                    index,
                    reason: e.to_string(),
                })?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Err(Error::ChunkIo {
                index,
                reason: "file shorter than planned".into(),
            });
        }

        buf.truncate(filled);
        self.next_index += 1;
        Ok(Some(Chunk {
            index,
            data: Bytes::from(buf),
        }))
    }
}

/// 전송 상태
///
/// `Idle → CountNegotiated → Transferring(i) → {Transferring(i+1) | Aborted | Completed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    CountNegotiated { chunk_count: u64 },
    Transferring { index: ChunkIndex },
    Completed,
    Aborted,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Aborted)
    }
}

/// 전송 중단 사유
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbortReason {
    #[error("수신측이 청크 {index} 거부")]
    Rejected { index: ChunkIndex },

    #[error("청크 {index} 로컬 처리 실패: {reason}")]
    LocalFailure { index: ChunkIndex, reason: String },

    #[error("청크 {index} 처리 중 연결 끊김: {reason}")]
    ConnectionLost { index: ChunkIndex, reason: String },
}

/// 전송 결과
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// 최종 상태 (Completed 또는 Aborted)
    pub state: TransferState,

    /// 협상된 청크 수
    pub chunk_count: u64,

    /// 중단 사유 (Aborted일 때만)
    pub abort_reason: Option<AbortReason>,

    /// 송신/기록된 청크와 바이트 통계
    pub stats: TransferStats,
}

impl TransferReport {
    pub fn completed(chunk_count: u64, stats: TransferStats) -> Self {
        Self {
            state: TransferState::Completed,
            chunk_count,
            abort_reason: None,
            stats,
        }
    }

    pub fn aborted(chunk_count: u64, reason: AbortReason, stats: TransferStats) -> Self {
        Self {
            state: TransferState::Aborted,
            chunk_count,
            abort_reason: Some(reason),
            stats,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == TransferState::Completed
    }

    pub fn is_aborted(&self) -> bool {
        self.state == TransferState::Aborted
    }

    /// 송신(송신측) 또는 기록(수신측)된 청크 수
    pub fn chunks_transferred(&self) -> u64 {
        self.stats.chunks
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.stats.bytes
    }
}
