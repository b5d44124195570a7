//! 공유 디렉토리 목록 서비스
//!
//! 목록은 `", "`로 이어 붙인 뒤 `segment_size` 단위로 나눠 보낸다.
//! 형식: 암호화된 세그먼트 수(u64) + 암호화된 세그먼트들 (ACK 없음)

use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::chunk::{confine, file_size};
use crate::crypto::SessionCipher;
use crate::frame::FramedStream;
use crate::{receiver, sender, Result, LISTING_DELIMITER};

/// 공유 디렉토리 바로 아래의 일반 파일 이름 (비재귀, 정렬됨)
///
/// 심볼릭 링크는 공유 루트 안의 일반 파일을 가리킬 때만 포함된다.
pub async fn list_shared_files(shared_dir: &Path) -> Result<Vec<String>> {
    let root = tokio::fs::canonicalize(shared_dir).await?;
    let mut entries = tokio::fs::read_dir(&root).await?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let Some(target) = confine(&root, &entry.path()).await else {
            debug!("공유 루트 밖을 가리키는 항목 제외: {:?}", entry.file_name());
            continue;
        };
        if file_size(&target).await.is_none() {
            continue;
        }

        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => debug!("UTF-8이 아닌 파일 이름 제외: {:?}", raw),
        }
    }

    names.sort();
    Ok(names)
}

pub fn join_listing(names: &[String]) -> String {
    names.join(LISTING_DELIMITER)
}

/// 빈 문자열은 빈 목록
pub fn split_listing(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(LISTING_DELIMITER).map(str::to_owned).collect()
}

/// 서버측: 목록을 만들어 세그먼트 단위로 암호화 전송, 보낸 이름 수 반환
pub async fn send_listing<S>(
    framed: &mut FramedStream<S>,
    cipher: &SessionCipher,
    shared_dir: &Path,
    segment_size: usize,
) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let names = list_shared_files(shared_dir).await?;
    let joined = join_listing(&names);
    let segments: Vec<&[u8]> = joined.as_bytes().chunks(segment_size.max(1)).collect();

    sender::send_chunk_count(framed, cipher, segments.len() as u64).await?;
    for segment in &segments {
        framed.send(&cipher.encrypt(segment)?).await?;
    }

    debug!(
        "공유 파일 {}개 목록 전송 ({} segments, {} bytes)",
        names.len(),
        segments.len(),
        joined.len()
    );
    Ok(names.len())
}

/// 클라이언트측: 세그먼트를 모두 받아 복호화 후 분리
pub async fn receive_listing<S>(
    framed: &mut FramedStream<S>,
    cipher: &SessionCipher,
) -> Result<Vec<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let segment_count = receiver::receive_chunk_count(framed, cipher).await?;

    let mut joined = Vec::new();
    for _ in 0..segment_count {
        let encrypted = framed.recv().await?;
        joined.extend_from_slice(&cipher.decrypt(&encrypted)?);
    }

    Ok(split_listing(&String::from_utf8_lossy(&joined)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SessionKey;
    use std::time::Duration;

    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

    /// duplex 위에서 목록 송수신
    async fn exchange(
        dir: &Path,
        server_cipher: SessionCipher,
        client_cipher: &SessionCipher,
        segment_size: usize,
    ) -> Result<Vec<String>> {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let dir = dir.to_path_buf();
        let server = tokio::spawn(async move {
            let mut framed = FramedStream::new(server_io, 4096, TIMEOUT);
            send_listing(&mut framed, &server_cipher, &dir, segment_size).await
        });

        let mut framed = FramedStream::new(client_io, 4096, TIMEOUT);
        let names = receive_listing(&mut framed, client_cipher).await;
        server.await.unwrap().unwrap();
        names
    }

    #[tokio::test]
    async fn test_lists_regular_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"bbb").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.txt"), b"ccc").unwrap();

        let names = list_shared_files(dir.path()).await.unwrap();
        assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_outside_share_are_hidden() {
        let base = tempfile::tempdir().unwrap();
        let shared = base.path().join("shared");
        std::fs::create_dir(&shared).unwrap();
        std::fs::write(base.path().join("secret.txt"), b"top secret").unwrap();
        std::fs::write(shared.join("real.txt"), b"fine").unwrap();
        std::os::unix::fs::symlink(base.path().join("secret.txt"), shared.join("escape.txt"))
            .unwrap();
        std::os::unix::fs::symlink(shared.join("real.txt"), shared.join("alias.txt")).unwrap();

        let names = list_shared_files(&shared).await.unwrap();
        assert_eq!(names, vec!["alias.txt", "real.txt"]);
    }

    #[tokio::test]
    async fn test_listing_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"").unwrap();

        let cipher = SessionCipher::new(&SessionKey::generate());
        let names = exchange(dir.path(), cipher.clone(), &cipher, 2048).await.unwrap();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_listing_larger_than_one_frame() {
        let dir = tempfile::tempdir().unwrap();
        let expected: Vec<String> = (0..300)
            .map(|i| format!("document_number_{:04}.txt", i))
            .collect();
        for name in &expected {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert!(join_listing(&expected).len() > 4096);

        let cipher = SessionCipher::new(&SessionKey::generate());
        let names = exchange(dir.path(), cipher.clone(), &cipher, 2048).await.unwrap();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cipher = SessionCipher::new(&SessionKey::generate());

        let names = exchange(dir.path(), cipher.clone(), &cipher, 2048).await.unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn test_listing_under_wrong_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();

        let server = SessionCipher::new(&SessionKey::generate());
        let stale = SessionCipher::new(&SessionKey::generate());
        let err = exchange(dir.path(), server, &stale, 2048).await.unwrap_err();
        assert!(err.is_decryption_failure());
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_shared_files(&dir.path().join("gone")).await.is_err());
    }

    #[test]
    fn test_split_and_join() {
        let names = vec!["a.txt".to_string(), "b c.txt".to_string()];
        assert_eq!(join_listing(&names), "a.txt, b c.txt");
        assert_eq!(split_listing("a.txt, b c.txt"), names);
        assert!(split_listing("").is_empty());
    }
}
