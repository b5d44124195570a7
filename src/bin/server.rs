//! SFS 서버 - Sealed File Share
//!
//! 공유 디렉토리의 파일을 암호화해 제공하는 서버
//! - X25519 핸드쉐이크로 피어별 세션 키 발급
//! - ChaCha20-Poly1305 청크 전송 + 청크별 ACK
//!
//! 사용법:
//!   cargo run --release --bin sfs-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 실행 (0.0.0.0:1337, ./sharedfolder)
//!   cargo run --release --bin sfs-server
//!
//!   # 다른 공유 디렉토리 + 동시 접속 처리
//!   cargo run --release --bin sfs-server -- --shared /srv/files --concurrent

use std::error::Error;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use sfs::{Config, ServerHandle};

/// 바이너리 공통 에러 (tracing-subscriber 초기화 에러가 Send + Sync)
type BoxError = Box<dyn Error + Send + Sync>;

/// 서버 실행 옵션
struct ServerOptions {
    debug: bool,
    config: Config,
}

fn parse_args() -> Result<ServerOptions, BoxError> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = ServerOptions {
        debug: false,
        config: Config::default(),
    };

    let mut i = 1;
    while i < args.len() {
        let value = |i: usize| {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} 옵션에 값이 필요합니다", args[i]))
        };

        match args[i].as_str() {
            "--concurrent" | "-c" => {
                let base = options.config.clone();
                options.config = Config {
                    bind_addr: base.bind_addr,
                    max_message_size: base.max_message_size,
                    shared_dir: base.shared_dir,
                    ..Config::concurrent()
                };
            }
            "--bind" | "-b" => {
                options.config.bind_addr = value(i)?.parse()?;
                i += 1;
            }
            "--shared" | "-s" => {
                options.config.shared_dir = PathBuf::from(value(i)?);
                i += 1;
            }
            "--max-message-size" | "-m" => {
                options.config.max_message_size = value(i)?.parse()?;
                i += 1;
            }
            "--debug" | "-d" => options.debug = true,
            "--help" | "-h" => {
                println!(
                    r#"SFS Server - Sealed File Share 서버

공유 디렉토리의 파일을 암호화 채널로 제공
- X25519 핸드쉐이크 + ChaCha20-Poly1305 암호화
- 청크 하나마다 ACK, 거부 시 즉시 중단

사용법:
  cargo run --release --bin sfs-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>              바인드 주소 (기본: 0.0.0.0:1337)
  -s, --shared <DIR>             공유 디렉토리 (기본: ./sharedfolder)
  -m, --max-message-size <SIZE>  최대 메시지 크기 바이트 (기본: 4096)
  -c, --concurrent               연결마다 별도 태스크로 처리
  -d, --debug                    디버그 로그 출력
  -h, --help                     이 도움말 출력

환경 변수:
  RUST_LOG                       로그 필터 (예: sfs=trace)
"#
                );
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {}", other).into()),
        }
        i += 1;
    }

    Ok(options)
}

fn init_logging(debug: bool) -> Result<(), BoxError> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let options = parse_args()?;
    init_logging(options.debug)?;

    info!("SFS Server starting...");
    let handle = ServerHandle::start(options.config).await?;
    info!("Ready on {} (Ctrl+C로 종료)", handle.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    let stats = handle.stats();
    handle.shutdown().await?;

    info!("  Connections: {}", stats.connections);
    info!("  Handshakes: {}", stats.handshakes);
    info!("  Listings: {}", stats.listings);
    info!(
        "  Transfers: {} completed, {} aborted",
        stats.transfers_completed, stats.transfers_aborted
    );
    info!(
        "  Dropped: {} unknown peer, {} malformed, {} decryption failures",
        stats.dropped_unknown_peer, stats.malformed_messages, stats.decryption_failures
    );
    Ok(())
}
