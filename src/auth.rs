//! MySQL 인증 처리
//!
//! Native password (SHA1 challenge-response) 인증 구현

use crate::codec;
use crate::error::{RelayError, Result};
use crate::handshake::HandshakePacket;
use crate::protocol::PacketChannel;
use crate::response::{GenericResponse, OkPacket};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Cursor, Write};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Client capability flags
pub mod capabilities {
    pub const LONG_PASSWORD: u32 = 1;
    pub const FOUND_ROWS: u32 = 2;
    pub const LONG_FLAG: u32 = 4;
    pub const CONNECT_WITH_DB: u32 = 8;
    pub const NO_SCHEMA: u32 = 16;
    pub const COMPRESS: u32 = 32;
    pub const ODBC: u32 = 64;
    pub const LOCAL_FILES: u32 = 128;
    pub const IGNORE_SPACE: u32 = 256;
    pub const PROTOCOL_41: u32 = 512;
    pub const INTERACTIVE: u32 = 1024;
    pub const SSL: u32 = 2048;
    pub const IGNORE_SIGPIPE: u32 = 4096;
    pub const TRANSACTIONS: u32 = 8192;
    pub const SECURE_CONNECTION: u32 = 32768;
    pub const MULTI_STATEMENTS: u32 = 1 << 16;
    pub const MULTI_RESULTS: u32 = 1 << 17;
    pub const PS_MULTI_RESULTS: u32 = 1 << 18;
    pub const PLUGIN_AUTH: u32 = 1 << 19;
    pub const CONNECT_ATTRS: u32 = 1 << 20;
}

/// 릴레이 클라이언트가 요구하는 capability 마스크
///
/// 서버가 이 마스크를 전부 제공하지 않으면 인증을 시작하지 않습니다.
pub const RELAY_CLIENT_CAP: u32 =
    capabilities::LONG_PASSWORD | capabilities::PROTOCOL_41 | capabilities::SECURE_CONNECTION;

/// Native password 인증 응답 계산
///
/// SHA1(password) XOR SHA1(challenge + SHA1(SHA1(password)))
/// 빈 비밀번호도 길이 0 입력으로 동일하게 계산합니다.
pub fn scramble_password(challenge: &[u8], password: &str) -> Vec<u8> {
    // SHA1(password)
    let stage1 = sha1(password.as_bytes());

    // SHA1(SHA1(password))
    let stage2 = sha1(&stage1);

    // SHA1(challenge + SHA1(SHA1(password)))
    let mut combined = challenge.to_vec();
    combined.extend_from_slice(&stage2);
    let stage3 = sha1(&combined);

    stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

fn sha1(data: &[u8]) -> Vec<u8> {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// 클라이언트 인증 응답 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPacket {
    pub capability_flags: u32,
    pub max_packet_size: u32,
    pub character_set: u8,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    pub auth_plugin_name: Option<String>,
    pub sequence: u8,
}

/// 핸드셰이크와 자격 증명으로 인증 패킷 생성
///
/// 서버가 `RELAY_CLIENT_CAP`을 전부 광고하지 않으면
/// `InsufficientServerCapability`로 즉시 실패합니다 (다운그레이드 없음).
pub fn build_auth_packet(
    username: &str,
    password: &str,
    handshake: &HandshakePacket,
) -> Result<AuthPacket> {
    if handshake.capability_flags & RELAY_CLIENT_CAP != RELAY_CLIENT_CAP {
        return Err(RelayError::InsufficientServerCapability {
            required: RELAY_CLIENT_CAP,
            advertised: handshake.capability_flags,
        });
    }

    Ok(AuthPacket {
        // 서버의 전체 마스크가 아니라 실제로 사용할 비트만 선언한다
        capability_flags: RELAY_CLIENT_CAP,
        max_packet_size: 0,
        character_set: handshake.character_set,
        username: username.to_string(),
        auth_response: scramble_password(&handshake.auth_challenge, password),
        database: None,
        auth_plugin_name: if handshake.auth_plugin_name.is_empty() {
            None
        } else {
            Some(handshake.auth_plugin_name.clone())
        },
        sequence: handshake.sequence.wrapping_add(1),
    })
}

impl AuthPacket {
    /*
    http://dev.mysql.com/doc/internals/en/connection-phase-packets.html#packet-Protocol::HandshakeResponse
    4              capability flags, CLIENT_PROTOCOL_41 always set
    4              max-packet size
    1              character set
    string[23]     reserved (all [0])
    string[NUL]    username
    1              length of auth-response
    string[n]      auth-response
      if capabilities & CLIENT_CONNECT_WITH_DB {
    string[NUL]    database
      }
      if capabilities & CLIENT_PLUGIN_AUTH {
    string[NUL]    auth plugin name
      }
    */
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.capability_flags & RELAY_CLIENT_CAP != RELAY_CLIENT_CAP {
            return Err(RelayError::InsufficientServerCapability {
                required: RELAY_CLIENT_CAP,
                advertised: self.capability_flags,
            });
        }

        let mut buffer = Vec::new();
        buffer.write_u32::<LittleEndian>(self.capability_flags)?;
        buffer.write_u32::<LittleEndian>(self.max_packet_size)?;
        buffer.write_u8(self.character_set)?;
        buffer.write_all(&[0u8; 23])?;

        codec::write_nul_string(&mut buffer, &self.username);
        codec::write_len_prefixed_bytes(&mut buffer, &self.auth_response)?;

        if self.capability_flags & capabilities::CONNECT_WITH_DB != 0 {
            codec::write_nul_string(&mut buffer, self.database.as_deref().unwrap_or(""));
        }
        if self.capability_flags & capabilities::PLUGIN_AUTH != 0 {
            codec::write_nul_string(&mut buffer, self.auth_plugin_name.as_deref().unwrap_or(""));
        }

        Ok(buffer)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(payload);
        let capability_flags = codec::read_u32_le(&mut cursor)?;
        let max_packet_size = codec::read_u32_le(&mut cursor)?;
        let character_set = codec::read_u8(&mut cursor)?;
        codec::skip(&mut cursor, 23)?;

        let username = codec::read_nul_string(&mut cursor)?;
        let auth_response = codec::read_len_prefixed_bytes(&mut cursor)?;

        let database = if capability_flags & capabilities::CONNECT_WITH_DB != 0 {
            Some(codec::read_nul_string(&mut cursor)?)
        } else {
            None
        };
        let auth_plugin_name = if capability_flags & capabilities::PLUGIN_AUTH != 0 {
            Some(codec::read_nul_string(&mut cursor)?)
        } else {
            None
        };

        Ok(AuthPacket {
            capability_flags,
            max_packet_size,
            character_set,
            username,
            auth_response,
            database,
            auth_plugin_name,
            sequence: 0,
        })
    }
}

/// 인증 패킷 전송 및 서버 응답 확인
///
/// 응답 시퀀스는 정확히 요청 시퀀스 + 1이어야 합니다.
pub async fn authenticate<S>(
    channel: &mut PacketChannel<S>,
    packet: &AuthPacket,
) -> Result<OkPacket>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let payload = packet.encode()?;
    channel.write_packet(&payload, packet.sequence).await?;

    let (header, response) = channel.read_packet().await?;
    let expected = packet.sequence.wrapping_add(1);
    if header.sequence != expected {
        return Err(RelayError::SequenceMismatch {
            expected,
            actual: header.sequence,
        });
    }

    let ok = GenericResponse::parse(&response)?.into_ok()?;
    debug!("Authentication accepted for {}", packet.username);
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: [u8; 20] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20,
    ];

    fn handshake_with_caps(caps: u32) -> HandshakePacket {
        HandshakePacket {
            protocol_version: 10,
            server_version: "5.7.35-log".to_string(),
            connection_id: 1234,
            character_set: 33,
            status_flags: 2,
            capability_flags: caps,
            auth_challenge: CHALLENGE.to_vec(),
            auth_plugin_name: "mysql_native_password".to_string(),
            sequence: 0,
        }
    }

    #[test]
    fn test_scramble_known_vector() {
        // SHA1 공식으로 미리 계산한 값
        let expected: [u8; 20] = [
            0xb3, 0x2b, 0xb3, 0xa5, 0x83, 0xe1, 0x34, 0x0c, 0x0a, 0x11, 0x08, 0xd5, 0x8b, 0x1b,
            0xe4, 0x97, 0x81, 0xad, 0x8c, 0x2f,
        ];
        assert_eq!(scramble_password(&CHALLENGE, "secret"), expected.to_vec());
    }

    #[test]
    fn test_scramble_empty_password() {
        // 빈 비밀번호도 특별 취급 없이 동일한 공식을 통과한다
        let expected: [u8; 20] = [
            0x60, 0x25, 0x2d, 0xe9, 0xf0, 0xfb, 0xe9, 0xf1, 0x52, 0x6e, 0xc3, 0xec, 0x39, 0x68,
            0x22, 0x3e, 0x50, 0xa0, 0x72, 0xf8,
        ];
        assert_eq!(scramble_password(&CHALLENGE, ""), expected.to_vec());
    }

    #[test]
    fn test_scramble_sensitive_to_challenge() {
        let mut other = CHALLENGE;
        other[0] = 2;
        let expected: [u8; 20] = [
            0xe7, 0xea, 0x57, 0x29, 0xa0, 0x7b, 0x9c, 0x68, 0x15, 0xa8, 0xcd, 0xbf, 0x3c, 0x63,
            0xca, 0xf8, 0x32, 0x4a, 0xb8, 0xf9,
        ];
        assert_eq!(scramble_password(&other, "secret"), expected.to_vec());
        assert_ne!(
            scramble_password(&other, "secret"),
            scramble_password(&CHALLENGE, "secret")
        );
    }

    #[test]
    fn test_scramble_deterministic() {
        assert_eq!(
            scramble_password(&CHALLENGE, "secret"),
            scramble_password(&CHALLENGE, "secret")
        );
    }

    #[test]
    fn test_build_auth_packet() {
        let handshake = handshake_with_caps(RELAY_CLIENT_CAP | capabilities::PLUGIN_AUTH);
        let packet = build_auth_packet("repl", "secret", &handshake).unwrap();

        assert_eq!(packet.capability_flags, RELAY_CLIENT_CAP);
        assert_eq!(packet.max_packet_size, 0);
        assert_eq!(packet.character_set, 33);
        assert_eq!(packet.username, "repl");
        assert_eq!(packet.auth_response, scramble_password(&CHALLENGE, "secret"));
        assert_eq!(
            packet.auth_plugin_name.as_deref(),
            Some("mysql_native_password")
        );
        assert_eq!(packet.sequence, 1);
    }

    #[test]
    fn test_build_auth_packet_capability_gate() {
        // RELAY_CLIENT_CAP에서 한 비트라도 빠지면 실패해야 한다
        let handshake = handshake_with_caps(RELAY_CLIENT_CAP & !capabilities::LONG_PASSWORD);
        assert!(matches!(
            build_auth_packet("repl", "secret", &handshake),
            Err(RelayError::InsufficientServerCapability { .. })
        ));
    }

    #[test]
    fn test_encode_exact_layout() {
        let auth_response = scramble_password(&CHALLENGE, "secret");
        let packet = AuthPacket {
            capability_flags: RELAY_CLIENT_CAP,
            max_packet_size: 0,
            character_set: 33,
            username: "repl".to_string(),
            auth_response: auth_response.clone(),
            database: None,
            auth_plugin_name: Some("mysql_native_password".to_string()),
            sequence: 1,
        };

        let mut expected = vec![0x01, 0x82, 0x00, 0x00]; // RELAY_CLIENT_CAP = 0x8201
        expected.extend_from_slice(&[0, 0, 0, 0]); // max packet size
        expected.push(33);
        expected.extend_from_slice(&[0u8; 23]);
        expected.extend_from_slice(b"repl\0");
        expected.push(20);
        expected.extend_from_slice(&auth_response);
        // PLUGIN_AUTH를 요청하지 않았으므로 플러그인 이름은 와이어에 없다

        assert_eq!(packet.encode().unwrap(), expected);
    }

    #[test]
    fn test_encode_capability_gate() {
        let packet = AuthPacket {
            capability_flags: capabilities::PROTOCOL_41,
            max_packet_size: 0,
            character_set: 33,
            username: "repl".to_string(),
            auth_response: vec![0; 20],
            database: None,
            auth_plugin_name: None,
            sequence: 1,
        };
        assert!(matches!(
            packet.encode(),
            Err(RelayError::InsufficientServerCapability { .. })
        ));
    }

    #[test]
    fn test_round_trip_all_optional_field_combinations() {
        let combos = [
            (0u32, None, None),
            (
                capabilities::CONNECT_WITH_DB,
                Some("relaydb".to_string()),
                None,
            ),
            (
                capabilities::PLUGIN_AUTH,
                None,
                Some("mysql_native_password".to_string()),
            ),
            (
                capabilities::CONNECT_WITH_DB | capabilities::PLUGIN_AUTH,
                Some("relaydb".to_string()),
                Some("mysql_native_password".to_string()),
            ),
        ];

        for (extra, database, auth_plugin_name) in combos {
            let packet = AuthPacket {
                capability_flags: RELAY_CLIENT_CAP | extra,
                max_packet_size: 0,
                character_set: 33,
                username: "repl".to_string(),
                auth_response: scramble_password(&CHALLENGE, "secret"),
                database,
                auth_plugin_name,
                sequence: 0,
            };

            let decoded = AuthPacket::decode(&packet.encode().unwrap()).unwrap();
            assert_eq!(decoded, packet);
        }
    }
}
