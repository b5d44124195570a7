//! 전송 통계

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 처리율 계산 윈도우 (청크 수)
pub const DEFAULT_WINDOW_SIZE: usize = 64;

/// 청크 처리 기록
#[derive(Debug, Clone, Copy)]
struct ChunkRecord {
    timestamp: Instant,
    size: usize,
}

/// 전송 하나의 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 처리된 청크 수
    pub chunks: u64,

    /// 처리된 바이트
    pub bytes: u64,

    /// 시작 시간
    started_at: Instant,

    /// 최근 청크 기록
    recent: VecDeque<ChunkRecord>,

    /// 윈도우 크기
    window_size: usize,
}

impl TransferStats {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(2);
        Self {
            chunks: 0,
            bytes: 0,
            started_at: Instant::now(),
            recent: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// 청크 처리 기록
    pub fn record_chunk(&mut self, size: usize) {
        if self.recent.len() >= self.window_size {
            self.recent.pop_front();
        }
        self.recent.push_back(ChunkRecord {
            timestamp: Instant::now(),
            size,
        });

        self.chunks += 1;
        self.bytes += size as u64;
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 전체 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }

    /// 최근 윈도우 처리율 (bytes/sec)
    pub fn recent_throughput(&self) -> f64 {
        let (Some(first), Some(last)) = (self.recent.front(), self.recent.back()) else {
            return 0.0;
        };
        if self.recent.len() < 2 {
            return 0.0;
        }

        let duration = last.timestamp.duration_since(first.timestamp);
        if duration.is_zero() {
            return 0.0;
        }

        // 첫 기록은 구간 시작점
        let total: usize = self.recent.iter().skip(1).map(|r| r.size).sum();
        total as f64 / duration.as_secs_f64()
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

/// 서버 누적 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// 수락한 연결 수
    pub connections: u64,

    /// 완료된 핸드쉐이크 수
    pub handshakes: u64,

    /// 응답한 목록 요청 수
    pub listings: u64,

    /// 완료된 파일 전송 수
    pub transfers_completed: u64,

    /// 중단된 파일 전송 수
    pub transfers_aborted: u64,

    /// 세션 키가 없어 무응답 처리한 요청 수
    pub dropped_unknown_peer: u64,

    /// 프레이밍/코덱 위반 수
    pub malformed_messages: u64,

    /// 복호화 실패 수
    pub decryption_failures: u64,

    /// 그 밖의 연결 단위 오류 수
    pub connection_errors: u64,
}
