//! MySQL 프로토콜 패킷 채널
//!
//! 모든 패킷을 감싸는 3바이트 길이 + 1바이트 시퀀스 헤더를 읽고 씁니다.

use crate::error::{RelayError, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// 수신 버퍼 기본 용량 (u24 헤더가 표현할 수 있는 최대 페이로드)
pub const DEFAULT_BUFFER_CAPACITY: usize = (1 << 24) - 1;

/// 패킷 헤더 (페이로드 길이 + 시퀀스 번호)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// 페이로드 길이 (헤더 제외, 와이어에서는 u24)
    pub length: u32,
    /// 시퀀스 번호, 요청/응답 쌍마다 1씩 증가
    pub sequence: u8,
}

/// MySQL 패킷 채널
#[derive(Debug)]
pub struct PacketChannel<S> {
    stream: S,
    capacity: usize,
}

impl PacketChannel<TcpStream> {
    /// 새 패킷 채널 생성 (TCP 연결)
    pub async fn connect(hostname: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", hostname, port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            RelayError::ConnectionError(format!("Failed to connect to {}: {}", addr, e))
        })?;

        debug!("Connected to MySQL at {}", addr);

        Ok(PacketChannel::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PacketChannel<S> {
    pub fn new(stream: S) -> Self {
        PacketChannel::with_capacity(stream, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(stream: S, capacity: usize) -> Self {
        PacketChannel { stream, capacity }
    }

    /// 패킷 하나 읽기 (헤더 + 페이로드)
    ///
    /// 선언된 길이가 채널 용량을 넘으면 `PacketTooLarge`로 거부합니다.
    pub async fn read_packet(&mut self) -> Result<(PacketHeader, Vec<u8>)> {
        let mut head = [0u8; 4];
        self.stream
            .read_exact(&mut head)
            .await
            .map_err(|e| RelayError::IoError(format!("Failed to read packet header: {}", e)))?;
        let length = u32::from_le_bytes([head[0], head[1], head[2], 0]);
        let sequence = head[3];

        if length as usize > self.capacity {
            return Err(RelayError::PacketTooLarge {
                length: length as usize,
                max: self.capacity,
            });
        }

        let mut payload = vec![0u8; length as usize];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| RelayError::IoError(format!("Failed to read packet body: {}", e)))?;

        Ok((PacketHeader { length, sequence }, payload))
    }

    /// 패킷 하나 쓰기
    pub async fn write_packet(&mut self, payload: &[u8], sequence: u8) -> Result<()> {
        let mut header = Vec::with_capacity(4);
        WriteBytesExt::write_u24::<LittleEndian>(&mut header, payload.len() as u32)?;
        WriteBytesExt::write_u8(&mut header, sequence)?;

        self.stream
            .write_all(&header)
            .await
            .map_err(|e| RelayError::IoError(format!("Failed to write header: {}", e)))?;
        self.stream
            .write_all(payload)
            .await
            .map_err(|e| RelayError::IoError(format!("Failed to write payload: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| RelayError::IoError(format!("Failed to flush: {}", e)))?;

        Ok(())
    }
}
