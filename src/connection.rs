//! 업스트림 MySQL 연결 수립 및 릴레이 명령 표면
//!
//! 핸드셰이크 → 인증 → 슬레이브 등록 → binlog 덤프 순서로 진행하며,
//! 각 단계는 이전 단계의 응답을 기다린 뒤에만 진행합니다.
//! 연결 하나가 채널과 시퀀스 상태를 단독 소유하므로 잠금이 없습니다.

use crate::auth;
use crate::command::{self, Command};
use crate::error::{RelayError, Result};
use crate::handshake::{self, HandshakePacket};
use crate::protocol::{PacketChannel, PacketHeader};
use crate::response::OkPacket;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

/// MySQL 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub server_id: u32,
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            hostname: "localhost".to_string(),
            port: 3306,
            username: "repl".to_string(),
            password: String::new(),
            database: None,
            server_id: 1,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectionConfig {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        ConnectionConfig {
            hostname: hostname.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    /// JSON 파일에서 설정 읽기
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// 복제 슬레이브로 인증된 업스트림 연결
#[derive(Debug)]
pub struct RelayConnection<S> {
    channel: PacketChannel<S>,
    handshake: HandshakePacket,
    server_id: u32,
}

impl RelayConnection<TcpStream> {
    /// TCP 연결 후 핸드셰이크와 인증까지 수행
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let channel = timeout(
            config.timeout,
            PacketChannel::connect(&config.hostname, config.port),
        )
        .await
        .map_err(|_| RelayError::Timeout)??;

        Self::establish(channel, config).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> RelayConnection<S> {
    /// 이미 열린 채널 위에서 핸드셰이크와 인증 수행
    pub async fn establish(mut channel: PacketChannel<S>, config: &ConnectionConfig) -> Result<Self> {
        let handshake = handshake::read_handshake(&mut channel).await?;
        info!(
            "MySQL server {} (connection id {})",
            handshake.server_version, handshake.connection_id
        );

        let auth_packet = auth::build_auth_packet(&config.username, &config.password, &handshake)?;
        let ok = auth::authenticate(&mut channel, &auth_packet).await?;
        debug!("Authenticated, server status {:#06x}", ok.status_flags);

        Ok(RelayConnection {
            channel,
            handshake,
            server_id: config.server_id,
        })
    }

    /// COM_REGISTER_SLAVE 전송
    pub async fn register_slave(&mut self) -> Result<OkPacket> {
        let command = Command::RegisterSlave {
            server_id: self.server_id,
        };
        command::send_command(&mut self.channel, &command).await
    }

    /// COM_BINLOG_DUMP 전송, 이후 `next_event_packet`으로 스트림을 읽는다
    pub async fn start_binlog_dump(
        &mut self,
        filename: &str,
        position: u32,
        flags: u16,
    ) -> Result<OkPacket> {
        let command = Command::BinlogDump {
            binlog_pos: position,
            flags,
            server_id: self.server_id,
            filename: filename.to_string(),
        };
        command::send_command(&mut self.channel, &command).await
    }

    /// binlog 스트림에서 다음 이벤트 패킷 읽기 (내용은 해석하지 않음)
    pub async fn next_event_packet(&mut self) -> Result<(PacketHeader, Vec<u8>)> {
        self.channel.read_packet().await
    }

    pub fn handshake(&self) -> &HandshakePacket {
        &self.handshake
    }
}
