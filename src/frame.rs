//! 길이 접두사 프레이밍
//!
//! TCP는 스트림이므로 `recv` 한 번이 논리 메시지 하나라고 가정할 수 없다.
//! 모든 프레임은 `length(u32, BE) | body` 형식이며 body는 최대 메시지 크기를 넘지 않는다.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::chunk::Ack;
use crate::message::Message;
use crate::{Error, Result};

/// 길이 접두사 크기
pub const FRAME_HEADER_LEN: usize = 4;

/// 프레임 단위 송수신기
#[derive(Debug)]
pub struct FramedStream<S> {
    stream: S,
    max_frame: usize,
    io_timeout: Option<Duration>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// `io_timeout`이 None이면 읽기/쓰기가 무기한 블록됨
    pub fn new(stream: S, max_frame: usize, io_timeout: Option<Duration>) -> Self {
        Self {
            stream,
            max_frame,
            io_timeout,
        }
    }

    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// 프레임 송신
    pub async fn send(&mut self, body: &[u8]) -> Result<()> {
        if body.len() > self.max_frame {
            return Err(Error::FrameTooLarge {
                len: body.len(),
                max: self.max_frame,
            });
        }

        let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(body);

        let timeout = self.io_timeout;
        let stream = &mut self.stream;
        timed(timeout, "frame write", async move {
            stream.write_all(&buf).await?;
            stream.flush().await
        })
        .await
    }

    /// 프레임 수신
    pub async fn recv(&mut self) -> Result<Bytes> {
        let timeout = self.io_timeout;

        let mut header = [0u8; FRAME_HEADER_LEN];
        timed(timeout, "frame header read", self.stream.read_exact(&mut header))
            .await
            .map_err(eof_as_closed)?;

        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_frame {
            return Err(Error::FrameTooLarge {
                len,
                max: self.max_frame,
            });
        }

        let mut body = vec![0u8; len];
        timed(timeout, "frame body read", self.stream.read_exact(&mut body))
            .await
            .map_err(eof_as_closed)?;

        Ok(Bytes::from(body))
    }

    pub async fn send_message(&mut self, msg: &Message) -> Result<()> {
        self.send(&msg.encode()).await
    }

    pub async fn recv_message(&mut self) -> Result<Message> {
        let body = self.recv().await?;
        Message::decode(&body)
    }

    /// 1바이트 평문 ACK 송신
    pub async fn send_ack(&mut self, ack: Ack) -> Result<()> {
        self.send(&[ack.to_byte()]).await
    }

    /// ACK 수신 (1바이트가 아니면 잘못된 메시지)
    pub async fn recv_ack(&mut self) -> Result<Ack> {
        let body = self.recv().await?;
        match &body[..] {
            [byte] => Ok(Ack::from_byte(*byte)),
            other => Err(Error::MalformedMessage(format!(
                "ack must be 1 byte, got {}",
                other.len()
            ))),
        }
    }
}

async fn timed<T, F>(timeout: Option<Duration>, what: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(what))?
            .map_err(Error::from),
        None => fut.await.map_err(Error::from),
    }
}

fn eof_as_closed(err: Error) -> Error {
    match err {
        Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
        other => other,
    }
}
