//! SFS 클라이언트 - Sealed File Share
//!
//! 서버와 핸드쉐이크 후 파일 목록 조회 또는 파일 다운로드
//!
//! 사용법:
//!   cargo run --release --bin sfs-client -- [OPTIONS]
//!
//! 예시:
//!   # 파일 목록
//!   cargo run --release --bin sfs-client -- --server 127.0.0.1:1337 --list
//!
//!   # 다운로드 (기본: ~/Downloads)
//!   cargo run --release --bin sfs-client -- -s 127.0.0.1:1337 --get report.pdf -o ./received

use std::error::Error;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sfs::{Client, Config, DEFAULT_PORT};

/// 바이너리 공통 에러 (tracing-subscriber 초기화 에러가 Send + Sync)
type BoxError = Box<dyn Error + Send + Sync>;

/// 클라이언트 실행 옵션
struct ClientOptions {
    server_addr: SocketAddr,
    list: bool,
    get: Vec<String>,
    debug: bool,
    config: Config,
}

fn parse_args() -> Result<ClientOptions, BoxError> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = ClientOptions {
        server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
        list: false,
        get: Vec::new(),
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
            "--server" | "-s" => {
                options.server_addr = value(i)?.parse()?;
                i += 1;
            }
            "--list" | "-l" => options.list = true,
            "--get" | "-g" => {
                options.get.push(value(i)?);
                i += 1;
            }
            "--output" | "-o" => {
                options.config.download_dir = PathBuf::from(value(i)?);
                i += 1;
            }
            "--max-message-size" | "-m" => {
                options.config.max_message_size = value(i)?.parse()?;
                i += 1;
            }
            "--debug" | "-d" => options.debug = true,
            "--help" | "-h" => {
                println!(
                    r#"SFS Client - Sealed File Share 클라이언트

서버와 핸드쉐이크 후 파일 목록 조회/다운로드

사용법:
  cargo run --release --bin sfs-client -- [OPTIONS]

옵션:
  -s, --server <ADDR>            서버 주소 (기본: 127.0.0.1:1337)
  -l, --list                     공유 파일 목록 출력
  -g, --get <NAME>               파일 다운로드 (여러 번 지정 가능)
  -o, --output <DIR>             다운로드 디렉토리 (기본: ~/Downloads)
  -m, --max-message-size <SIZE>  최대 메시지 크기 바이트 (기본: 4096, 서버와 같아야 함)
  -d, --debug                    디버그 로그 출력
  -h, --help                     이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {}", other).into()),
        }
        i += 1;
    }

    if !options.list && options.get.is_empty() {
        options.list = true;
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
    options.config.validate()?;

    let mut client = Client::new(options.config);
    client.connect(options.server_addr).await?;

    if options.list {
        let names = client.list_files().await?;
        if names.is_empty() {
            println!("(공유 파일 없음)");
        }
        for name in &names {
            println!("{}", name);
        }
    }

    for name in &options.get {
        let report = client.fetch_file(name).await?;
        if report.chunk_count == 0 {
            warn!("{}: 서버에 없는 파일", name);
        } else if let Some(reason) = &report.abort_reason {
            warn!("{}: 전송 중단 ({})", name, reason);
        } else {
            info!(
                "{}: {} bytes, {:.2}s ({:.1} KB/s)",
                name,
                report.bytes_transferred(),
                report.stats.elapsed().as_secs_f64(),
                report.stats.throughput() / 1024.0
            );
        }
    }

    client.disconnect();
    Ok(())
}
