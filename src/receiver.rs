//! 수신자 (클라이언트측)
//!
//! - 청크 수 수신 (0이면 출력 파일을 만들지 않음)
//! - 청크를 복호화해 순서대로 이어 쓰고 ACK 1 응답
//! - 복호화/쓰기 실패 시 ACK 0 응답 후 중단

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::chunk::{AbortReason, Ack, TransferReport, TransferState};
use crate::crypto::SessionCipher;
use crate::frame::FramedStream;
use crate::stats::TransferStats;
use crate::{Error, Result};

/// 암호화된 청크 수 수신
pub async fn receive_chunk_count<S>(
    framed: &mut FramedStream<S>,
    cipher: &SessionCipher,
) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let encrypted = framed.recv().await?;
    let plaintext = cipher.decrypt(&encrypted)?;
    let bytes: [u8; 8] = plaintext.as_slice().try_into().map_err(|_| {
        Error::MalformedMessage(format!("chunk count must be 8 bytes, got {}", plaintext.len()))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

/// `chunk_count`개 청크를 받아 `sink`에 순서대로 기록
///
/// 각 청크는 flush까지 성공한 뒤에 수락된다. 실패해도 `sink`에는 원본의
/// 연속된 앞부분만 남는다.
pub async fn receive_chunks<S, W>(
    framed: &mut FramedStream<S>,
    cipher: &SessionCipher,
    chunk_count: u64,
    sink: &mut W,
) -> Result<TransferReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = TransferStats::default();

    for index in 0..chunk_count {
        let state = TransferState::Transferring { index };
        trace!("수신 상태: {:?}", state);

        let encrypted = match framed.recv().await {
            Ok(encrypted) => encrypted,
            Err(e) => {
                let reason = AbortReason::ConnectionLost {
                    index,
                    reason: e.to_string(),
                };
                return Ok(abort(chunk_count, reason, stats));
            }
        };

        let written = match cipher.decrypt(&encrypted) {
            Ok(data) => write_through(sink, &data).await.map(|_| data.len()),
            Err(e) => Err(Error::from(e)),
        };

        match written {
            Ok(len) => {
                stats.record_chunk(len);
                if let Err(e) = framed.send_ack(Ack::Accepted).await {
                    let reason = AbortReason::ConnectionLost {
                        index,
                        reason: e.to_string(),
                    };
                    return Ok(abort(chunk_count, reason, stats));
                }
            }
            Err(e) => {
                if let Err(ack_err) = framed.send_ack(Ack::Rejected).await {
                    debug!("거부 ACK 전송 실패: {}", ack_err);
                }
                let reason = AbortReason::LocalFailure {
                    index,
                    reason: e.to_string(),
                };
                return Ok(abort(chunk_count, reason, stats));
            }
        }
    }

    debug!(
        "수신 완료: {} chunks, {} bytes, {:.2}s",
        stats.chunks,
        stats.bytes,
        stats.elapsed().as_secs_f64()
    );
    Ok(TransferReport::completed(chunk_count, stats))
}

/// 파일 수신
///
/// 청크 수가 0이면 `output_path`를 만들지 않는다. 청크 수를 받지 못하거나
/// 복호화하지 못하면 `Err`, 그 이후의 실패는 Aborted 보고서.
pub async fn receive_file<S>(
    framed: &mut FramedStream<S>,
    cipher: &SessionCipher,
    output_path: &Path,
) -> Result<TransferReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let chunk_count = receive_chunk_count(framed, cipher).await?;
    debug!("청크 {}개 예정", chunk_count);

    if chunk_count == 0 {
        return Ok(TransferReport::completed(0, TransferStats::default()));
    }

    let mut file = match File::create(output_path).await {
        Ok(file) => file,
        Err(e) => {
            // 송신측은 첫 청크의 ACK를 기다리고 있음
            if framed.recv().await.is_ok() {
                let _ = framed.send_ack(Ack::Rejected).await;
            }
            let reason = AbortReason::LocalFailure {
                index: 0,
                reason: format!("create {}: {}", output_path.display(), e),
            };
            return Ok(abort(chunk_count, reason, TransferStats::default()));
        }
    };

    receive_chunks(framed, cipher, chunk_count, &mut file).await
}

/// 쓰기와 flush가 모두 끝나야 기록된 것으로 본다 (ACK 1은 그 다음)
async fn write_through<W>(sink: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(data).await?;
    sink.flush().await?;
    Ok(())
}

fn abort(chunk_count: u64, reason: AbortReason, stats: TransferStats) -> TransferReport {
    warn!("수신 중단: {}", reason);
    TransferReport::aborted(chunk_count, reason, stats)
}
