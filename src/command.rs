//! 복제 명령 인코딩 및 전송
//!
//! 명령 집합은 프로토콜이 고정한 닫힌 집합이므로 enum으로 표현합니다.

use crate::error::Result;
use crate::protocol::PacketChannel;
use crate::response::{GenericResponse, OkPacket};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// COM_BINLOG_DUMP 명령어 코드
pub const COM_BINLOG_DUMP: u8 = 0x12;

/// COM_REGISTER_SLAVE 명령어 코드
pub const COM_REGISTER_SLAVE: u8 = 0x15;

/// 복제 명령
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /*
    http://dev.mysql.com/doc/internals/en/com-register-slave.html
    1              [15] COM_REGISTER_SLAVE
    4              server-id
    1              slaves hostname length
    string[$len]   slaves hostname
    1              slaves user len
    string[$len]   slaves user
    1              slaves password len
    string[$len]   slaves password
    2              slaves mysql-port
    4              replication rank
    4              master-id
    */
    /// 복제 슬레이브 등록. hostname/user/password/port/rank/master-id는
    /// 0으로 채워 보낸다 (최소 릴레이 구성).
    RegisterSlave { server_id: u32 },

    /*
    http://dev.mysql.com/doc/internals/en/com-binlog-dump.html
    1              [12] COM_BINLOG_DUMP
    4              binlog-pos
    2              flags
    4              server-id
    string[EOF]    binlog-filename
    */
    /// Binlog 덤프 요청. 파일명은 패킷 끝까지, 종료 바이트 없음.
    BinlogDump {
        binlog_pos: u32,
        flags: u16,
        server_id: u32,
        filename: String,
    },
}

impl Command {
    pub fn command_type(&self) -> u8 {
        match self {
            Command::RegisterSlave { .. } => COM_REGISTER_SLAVE,
            Command::BinlogDump { .. } => COM_BINLOG_DUMP,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        match self {
            Command::RegisterSlave { server_id } => {
                buffer.write_u8(COM_REGISTER_SLAVE)?;
                buffer.write_u32::<LittleEndian>(*server_id)?;
                buffer.write_all(&[0u8; 12])?;
            }
            Command::BinlogDump {
                binlog_pos,
                flags,
                server_id,
                filename,
            } => {
                buffer.write_u8(COM_BINLOG_DUMP)?;
                buffer.write_u32::<LittleEndian>(*binlog_pos)?;
                buffer.write_u16::<LittleEndian>(*flags)?;
                buffer.write_u32::<LittleEndian>(*server_id)?;
                buffer.write_all(filename.as_bytes())?;
            }
        }
        Ok(buffer)
    }
}

/// 명령 전송 및 서버 응답 분류
///
/// 명령 단계는 시퀀스 번호를 0부터 다시 시작합니다. 이 계층은
/// 재시도하지 않습니다 (재시도 정책은 호출자 몫).
pub async fn send_command<S>(channel: &mut PacketChannel<S>, command: &Command) -> Result<OkPacket>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let payload = command.encode()?;
    debug!(
        "Sending command {:#04x} ({} bytes)",
        command.command_type(),
        payload.len()
    );
    channel.write_packet(&payload, 0).await?;

    let (_header, response) = channel.read_packet().await?;
    GenericResponse::parse(&response)?.into_ok()
}
