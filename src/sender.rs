//! 송신자 (서버측)
//!
//! - 암호화된 청크 수 전송
//! - 청크 하나 전송 후 ACK 대기 (전송 중인 청크는 항상 하나)
//! - ACK 0, 읽기/암호화/송신 실패 시 즉시 중단, 재시도 없음

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, trace, warn};

use crate::chunk::{AbortReason, Ack, ChunkReader, TransferPlan, TransferReport, TransferState};
use crate::crypto::SessionCipher;
use crate::frame::FramedStream;
use crate::stats::TransferStats;
use crate::Result;

/// 진행 로그 주기 (청크 수)
const PROGRESS_INTERVAL: u64 = 256;

/// 암호화된 청크 수 전송 (8바이트 빅엔디안)
pub async fn send_chunk_count<S>(
    framed: &mut FramedStream<S>,
    cipher: &SessionCipher,
    chunk_count: u64,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let encrypted = cipher.encrypt(&chunk_count.to_be_bytes())?;
    framed.send(&encrypted).await
}

/// 파일 전송
///
/// 청크 수 전송 실패만 `Err`로 반환한다. 그 이후의 실패는
/// `TransferState::Aborted` 보고서로 반환된다.
pub async fn send_file<S>(
    framed: &mut FramedStream<S>,
    cipher: &SessionCipher,
    plan: &TransferPlan,
) -> Result<TransferReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stats = TransferStats::default();
    let chunk_count = plan.chunk_count;

    send_chunk_count(framed, cipher, chunk_count).await?;

    let mut state = TransferState::CountNegotiated { chunk_count };
    trace!("송신 상태: {:?}", state);

    if plan.is_empty() {
        debug!(
            "{}: 보낼 청크 없음 (size={:?})",
            plan.target_path.display(),
            plan.file_size
        );
        return Ok(TransferReport::completed(0, stats));
    }

    let mut reader = match ChunkReader::open(plan).await {
        Ok(reader) => reader,
        Err(e) => {
            let reason = AbortReason::LocalFailure {
                index: 0,
                reason: e.to_string(),
            };
            return Ok(abort(state, chunk_count, reason, stats));
        }
    };

    let mut next_index = 0;
    loop {
        let chunk = match reader.next_chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                let reason = AbortReason::LocalFailure {
                    index: next_index,
                    reason: e.to_string(),
                };
                return Ok(abort(state, chunk_count, reason, stats));
            }
        };
        let index = chunk.index;
        next_index = index + 1;
        state = TransferState::Transferring { index };
        trace!("송신 상태: {:?}", state);

        let encrypted = match cipher.encrypt(&chunk.data) {
            Ok(encrypted) => encrypted,
            Err(e) => {
                let reason = AbortReason::LocalFailure {
                    index,
                    reason: e.to_string(),
                };
                return Ok(abort(state, chunk_count, reason, stats));
            }
        };

        if let Err(e) = framed.send(&encrypted).await {
            let reason = AbortReason::ConnectionLost {
                index,
                reason: e.to_string(),
            };
            return Ok(abort(state, chunk_count, reason, stats));
        }
        stats.record_chunk(chunk.data.len());

        match framed.recv_ack().await {
            Ok(Ack::Accepted) => {}
            Ok(Ack::Rejected) => {
                return Ok(abort(state, chunk_count, AbortReason::Rejected { index }, stats));
            }
            Err(e) => {
                let reason = AbortReason::ConnectionLost {
                    index,
                    reason: e.to_string(),
                };
                return Ok(abort(state, chunk_count, reason, stats));
            }
        }

        if next_index % PROGRESS_INTERVAL == 0 {
            debug!(
                "Progress: chunk {}/{} ({:.1} KB/s)",
                next_index,
                chunk_count,
                stats.recent_throughput() / 1024.0
            );
        }
    }

    info!(
        "Transfer complete: {} ({} chunks, {} bytes, {:.2}s)",
        plan.target_path.display(),
        stats.chunks,
        stats.bytes,
        stats.elapsed().as_secs_f64()
    );
    Ok(TransferReport::completed(chunk_count, stats))
}

fn abort(
    state: TransferState,
    chunk_count: u64,
    reason: AbortReason,
    stats: TransferStats,
) -> TransferReport {
    warn!("전송 중단 ({:?}): {}", state, reason);
    TransferReport::aborted(chunk_count, reason, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SessionKey;
    use crate::Error;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    async fn write_source(dir: &tempfile::TempDir, data: &[u8]) -> TransferPlan {
        let path = dir.path().join("source.bin");
        std::fs::write(&path, data).unwrap();
        TransferPlan::resolve(dir.path(), "source.bin", 2048).await
    }

    fn spawn_sender(
        io: DuplexStream,
        cipher: SessionCipher,
        plan: TransferPlan,
    ) -> tokio::task::JoinHandle<TransferReport> {
        tokio::spawn(async move {
            let mut framed = FramedStream::new(io, 4096, TIMEOUT);
            send_file(&mut framed, &cipher, &plan).await.unwrap()
        })
    }

    async fn read_count(framed: &mut FramedStream<DuplexStream>, cipher: &SessionCipher) -> u64 {
        let plain = cipher.decrypt(&framed.recv().await.unwrap()).unwrap();
        u64::from_be_bytes(plain.try_into().unwrap())
    }

    #[tokio::test]
    async fn test_sends_all_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample(10_000);
        let plan = write_source(&dir, &data).await;
        let cipher = SessionCipher::new(&SessionKey::generate());

        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let sender = spawn_sender(server_io, cipher.clone(), plan);

        let mut client = FramedStream::new(client_io, 4096, TIMEOUT);
        let count = read_count(&mut client, &cipher).await;
        assert_eq!(count, 5);

        let mut received = Vec::new();
        for _ in 0..count {
            let chunk = cipher.decrypt(&client.recv().await.unwrap()).unwrap();
            received.extend_from_slice(&chunk);
            client.send_ack(Ack::Accepted).await.unwrap();
        }

        let report = sender.await.unwrap();
        assert!(report.is_completed());
        assert_eq!(report.chunks_transferred(), 5);
        assert_eq!(report.bytes_transferred(), 10_000);
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_stops_after_rejected_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample(10_000);
        let plan = write_source(&dir, &data).await;
        let cipher = SessionCipher::new(&SessionKey::generate());

        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let sender = spawn_sender(server_io, cipher.clone(), plan);

        let mut client = FramedStream::new(client_io, 4096, TIMEOUT);
        assert_eq!(read_count(&mut client, &cipher).await, 5);

        // 청크 0, 1은 수락, 청크 2는 기록 후 거부
        let mut artifact = Vec::new();
        for ack in [Ack::Accepted, Ack::Accepted, Ack::Rejected] {
            let chunk = cipher.decrypt(&client.recv().await.unwrap()).unwrap();
            artifact.extend_from_slice(&chunk);
            client.send_ack(ack).await.unwrap();
        }

        let report = sender.await.unwrap();
        assert!(report.is_aborted());
        assert_eq!(report.abort_reason, Some(AbortReason::Rejected { index: 2 }));
        assert_eq!(report.chunks_transferred(), 3);

        // 송신측이 더 이상 보내지 않고 연결을 닫음
        assert!(matches!(client.recv().await, Err(Error::ConnectionClosed)));
        assert_eq!(artifact, &data[..3 * 2048]);
    }

    #[tokio::test]
    async fn test_unavailable_file_sends_zero_count() {
        let dir = tempfile::tempdir().unwrap();
        let plan = TransferPlan::resolve(dir.path(), "missing.bin", 2048).await;
        let cipher = SessionCipher::new(&SessionKey::generate());

        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let sender = spawn_sender(server_io, cipher.clone(), plan);

        let mut client = FramedStream::new(client_io, 4096, TIMEOUT);
        assert_eq!(read_count(&mut client, &cipher).await, 0);

        let report = sender.await.unwrap();
        assert!(report.is_completed());
        assert_eq!(report.chunk_count, 0);
        assert!(matches!(client.recv().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_receiver_disconnect_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let plan = write_source(&dir, &sample(5_000)).await;
        let cipher = SessionCipher::new(&SessionKey::generate());

        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let sender = spawn_sender(server_io, cipher.clone(), plan);

        let mut client = FramedStream::new(client_io, 4096, TIMEOUT);
        read_count(&mut client, &cipher).await;
        client.recv().await.unwrap();
        drop(client);

        let report = sender.await.unwrap();
        assert!(report.is_aborted());
        assert!(matches!(
            report.abort_reason,
            Some(AbortReason::ConnectionLost { index: 0, .. })
        ));
    }
}
