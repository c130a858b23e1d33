//! 릴레이 관련 에러 타입

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("MySQL 연결 에러: {0}")]
    ConnectionError(String),

    #[error("패킷이 버퍼 끝을 넘어 잘렸습니다")]
    TruncatedPacket,

    #[error("패킷이 너무 큽니다: {length} bytes (최대 {max})")]
    PacketTooLarge { length: usize, max: usize },

    #[error("지원하지 않는 프로토콜 버전: {0}")]
    UnsupportedProtocolVersion(u8),

    #[error("유효하지 않은 핸드셰이크 패킷: {0}")]
    MalformedHandshake(String),

    #[error("서버 capability 부족: 필요 {required:#x}, 제공 {advertised:#x}")]
    InsufficientServerCapability { required: u32, advertised: u32 },

    #[error("핸드셰이크 시퀀스 번호 오류: 기대 {expected}, 수신 {actual}")]
    UnexpectedSequence { expected: u8, actual: u8 },

    #[error("응답 시퀀스 번호 오류: 기대 {expected}, 수신 {actual}")]
    SequenceMismatch { expected: u8, actual: u8 },

    #[error("인식할 수 없는 응답 패킷: 첫 바이트 {0:#04x}")]
    UnrecognizedResponse(u8),

    #[error("MySQL 서버 에러 {code}: {message}")]
    ServerError { code: u16, message: String },

    #[error("프로토콜 에러: {0}")]
    ProtocolError(String),

    #[error("I/O 에러: {0}")]
    IoError(String),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Timeout 에러")]
    Timeout,

    #[error("예상치 못한 에러: {0}")]
    Other(String),
}

impl From<io::Error> for RelayError {
    fn from(err: io::Error) -> Self {
        RelayError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
