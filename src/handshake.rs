//! MySQL 서버 핸드셰이크 (greeting) 디코딩
//!
//! v10 레이아웃은 capability 비트에 따라 필드 존재 여부가 달라지고,
//! 20바이트 인증 챌린지는 두 조각으로 나뉘어 전송됩니다.

use crate::auth::capabilities;
use crate::codec;
use crate::error::{RelayError, Result};
use crate::protocol::PacketChannel;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// 서버 핸드셰이크 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub character_set: u8,
    pub status_flags: u16,
    pub capability_flags: u32,
    /// 인증 챌린지 (scramble), 검증 후 항상 정확히 20바이트
    pub auth_challenge: Vec<u8>,
    pub auth_plugin_name: String,
    pub sequence: u8,
}

impl HandshakePacket {
    /// 핸드셰이크 페이로드 파싱
    ///
    /// 버전 10만 완전히 지원합니다. 버전 9는 필수 접두부(서버 버전,
    /// 연결 ID)만 파싱하며 챌린지가 없어 인증에는 쓸 수 없습니다.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let protocol_version = codec::read_u8(&mut cursor)?;
        match protocol_version {
            10 => Self::parse_v10(cursor),
            9 => Self::parse_v9(cursor),
            other => Err(RelayError::UnsupportedProtocolVersion(other)),
        }
    }

    /*
    http://dev.mysql.com/doc/internals/en/connection-phase-packets.html#packet-Protocol::HandshakeV10
    1              [0a] protocol version
    string[NUL]    server version
    4              connection id
    string[8]      auth-plugin-data-part-1
    1              [00] filler
    2              capability flags (lower 2 bytes)
      if more data in the packet:
    1              character set
    2              status flags
    2              capability flags (upper 2 bytes)
      if capabilities & CLIENT_PLUGIN_AUTH {
    1              length of auth-plugin-data
      } else {
    1              [00]
      }
    string[10]     reserved (all [00])
      if capabilities & CLIENT_SECURE_CONNECTION {
    string[$len]   auth-plugin-data-part-2 ($len=MAX(13, length of auth-plugin-data - 8))
      if capabilities & CLIENT_PLUGIN_AUTH {
    string[NUL]    auth-plugin name
      }
    */
    fn parse_v10(mut cursor: Cursor<&[u8]>) -> Result<Self> {
        let server_version = codec::read_nul_string(&mut cursor)?;

        // 고정 길이 필드를 읽기 전에 잘린 패킷을 걸러낸다
        let left = codec::remaining(&cursor);
        if left < 24 {
            return Err(RelayError::MalformedHandshake(format!(
                "v10 body too short after server version: {} bytes left",
                left
            )));
        }

        let connection_id = codec::read_u32_le(&mut cursor)?;
        let mut auth_challenge = codec::read_bytes(&mut cursor, 8)?;

        let filler = codec::read_u8(&mut cursor)?;
        if filler != 0 {
            return Err(RelayError::MalformedHandshake(format!(
                "nonzero filler byte {:#04x}",
                filler
            )));
        }

        let mut capability_flags = codec::read_u16_le(&mut cursor)? as u32;
        let mut character_set = 0u8;
        let mut status_flags = 0u16;

        // 일부 서버 구성은 확장 필드 없이 여기서 패킷이 끝난다
        if codec::remaining(&cursor) > 0 {
            character_set = codec::read_u8(&mut cursor)?;
            status_flags = codec::read_u16_le(&mut cursor)?;
            capability_flags |= (codec::read_u16_le(&mut cursor)? as u32) << 16;
        }

        let auth_data_len = if codec::remaining(&cursor) > 0 {
            codec::read_u8(&mut cursor)?
        } else {
            0
        };
        if capability_flags & capabilities::PLUGIN_AUTH == 0 && auth_data_len != 0 {
            return Err(RelayError::MalformedHandshake(format!(
                "auth plugin data length {} without CLIENT_PLUGIN_AUTH",
                auth_data_len
            )));
        }

        if codec::remaining(&cursor) > 0 {
            codec::skip(&mut cursor, 10)?; // reserved
        }

        if capability_flags & capabilities::SECURE_CONNECTION != 0 {
            let part2_len = std::cmp::max(13, auth_data_len.saturating_sub(8) as usize);
            let part2 = codec::read_bytes(&mut cursor, part2_len)?;
            // 두 번째 조각은 NUL 종료 바이트를 제외하고 이어붙인다
            auth_challenge.extend_from_slice(&part2[..part2.len() - 1]);
        }

        let mut auth_plugin_name = String::new();
        if capability_flags & capabilities::PLUGIN_AUTH != 0 {
            auth_plugin_name = codec::read_nul_string(&mut cursor)?;
        }

        Ok(HandshakePacket {
            protocol_version: 10,
            server_version,
            connection_id,
            character_set,
            status_flags,
            capability_flags,
            auth_challenge,
            auth_plugin_name,
            sequence: 0,
        })
    }

    /*
    http://dev.mysql.com/doc/internals/en/connection-phase-packets.html#packet-Protocol::HandshakeV9
    1              [09] protocol_version
    string[NUL]    server_version
    4              connection_id
    string[NUL]    scramble
    */
    fn parse_v9(mut cursor: Cursor<&[u8]>) -> Result<Self> {
        let server_version = codec::read_nul_string(&mut cursor)?;
        let connection_id = codec::read_u32_le(&mut cursor)?;

        // v9 scramble은 secure auth에 쓸 수 없으므로 챌린지는 비워둔다
        Ok(HandshakePacket {
            protocol_version: 9,
            server_version,
            connection_id,
            character_set: 0,
            status_flags: 0,
            capability_flags: 0,
            auth_challenge: Vec::new(),
            auth_plugin_name: String::new(),
            sequence: 0,
        })
    }
}

/// 핸드셰이크 수신 및 검증
///
/// 핸드셰이크는 새 연결의 첫 패킷이므로 시퀀스 번호는 항상 0이어야 하고,
/// 조립된 챌린지는 정확히 20바이트여야 합니다.
pub async fn read_handshake<S>(channel: &mut PacketChannel<S>) -> Result<HandshakePacket>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (header, payload) = channel.read_packet().await?;

    if header.sequence != 0 {
        return Err(RelayError::UnexpectedSequence {
            expected: 0,
            actual: header.sequence,
        });
    }

    let mut handshake = HandshakePacket::parse(&payload)?;
    handshake.sequence = header.sequence;

    if handshake.auth_challenge.len() != 20 {
        return Err(RelayError::MalformedHandshake(format!(
            "auth challenge length {} (expected 20)",
            handshake.auth_challenge.len()
        )));
    }

    debug!(
        "Handshake: server {} (protocol v{}), connection id {}",
        handshake.server_version, handshake.protocol_version, handshake.connection_id
    );

    Ok(handshake)
}
