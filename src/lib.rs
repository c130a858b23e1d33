//! MySQL 복제 릴레이 프로토콜 핵심 구현
//!
//! 이 라이브러리는 MySQL 서버에 복제 슬레이브로 접속하는 클라이언트 측
//! 와이어 프로토콜을 구현합니다.
//! 주요 기능:
//! - 핸드셰이크(greeting) 패킷 디코딩
//! - Native password 인증 (SHA1 challenge-response)
//! - 복제 명령 인코딩 (COM_REGISTER_SLAVE / COM_BINLOG_DUMP)
//! - 서버 응답 분류 (OK / ERROR)

pub mod auth;
pub mod codec;
pub mod command;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod response;
pub mod util;

pub use auth::AuthPacket;
pub use command::Command;
pub use connection::{ConnectionConfig, RelayConnection};
pub use error::{RelayError, Result};
pub use handshake::HandshakePacket;
pub use protocol::{PacketChannel, PacketHeader};
pub use response::{GenericResponse, OkPacket};
