//! 서버 일반 응답 패킷 분류 (OK / ERROR)

use crate::codec;
use crate::error::{RelayError, Result};
use bytes::Buf;
use std::io::Cursor;

/// OK 패킷 (첫 바이트 0x00)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
}

/// ERROR 패킷 (첫 바이트 0xFF)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub code: u16,
    pub sql_state: Option<String>,
    pub message: String,
}

/// 서버 응답을 첫 바이트로 분류한 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericResponse {
    Ok(OkPacket),
    Err(ErrPacket),
}

impl GenericResponse {
    /// 응답 페이로드 분류
    ///
    /// 0x00 = OK, 0xFF = ERROR. 그 외 선두 바이트(EOF, 결과 셋 등)는
    /// 이 릴레이가 쿼리를 내보내지 않으므로 `UnrecognizedResponse`입니다.
    pub fn parse(payload: &[u8]) -> Result<GenericResponse> {
        let Some(&first) = payload.first() else {
            return Err(RelayError::TruncatedPacket);
        };
        match first {
            0x00 => Ok(GenericResponse::Ok(OkPacket::parse(&payload[1..])?)),
            0xff => Ok(GenericResponse::Err(ErrPacket::parse(&payload[1..])?)),
            other => Err(RelayError::UnrecognizedResponse(other)),
        }
    }

    /// OK 패킷으로 변환, ERROR는 `ServerError`가 된다
    pub fn into_ok(self) -> Result<OkPacket> {
        match self {
            GenericResponse::Ok(ok) => Ok(ok),
            GenericResponse::Err(err) => Err(RelayError::ServerError {
                code: err.code,
                message: err.message,
            }),
        }
    }
}

impl OkPacket {
    fn parse(body: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(body);
        let affected_rows = codec::read_lenenc_uint(&mut cursor)?;
        let last_insert_id = codec::read_lenenc_uint(&mut cursor)?;
        let status_flags = codec::read_u16_le(&mut cursor)?;
        let warnings = codec::read_u16_le(&mut cursor)?;

        Ok(OkPacket {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
        })
    }
}

impl ErrPacket {
    fn parse(mut body: &[u8]) -> Result<Self> {
        if body.remaining() < 2 {
            return Err(RelayError::TruncatedPacket);
        }
        let code = body.get_u16_le();

        // 프로토콜 4.1 이후 '#' 마커 + 5바이트 SQL state가 붙을 수 있다
        let mut sql_state = None;
        if body.remaining() >= 6 && body[0] == b'#' {
            body.advance(1);
            let mut state = [0u8; 5];
            body.copy_to_slice(&mut state);
            sql_state = Some(String::from_utf8_lossy(&state).into_owned());
        }

        let message = String::from_utf8_lossy(body).into_owned();
        Ok(ErrPacket {
            code,
            sql_state,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok_minimal() {
        let payload = [0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
        let response = GenericResponse::parse(&payload).unwrap();

        assert_eq!(
            response,
            GenericResponse::Ok(OkPacket {
                affected_rows: 0,
                last_insert_id: 0,
                status_flags: 2,
                warnings: 0,
            })
        );
    }

    #[test]
    fn test_parse_ok_lenenc_fields() {
        let payload = [0x00, 0xfc, 0x10, 0x27, 0x05, 0x02, 0x00, 0x01, 0x00];
        let ok = GenericResponse::parse(&payload).unwrap().into_ok().unwrap();

        assert_eq!(ok.affected_rows, 10000);
        assert_eq!(ok.last_insert_id, 5);
        assert_eq!(ok.status_flags, 2);
        assert_eq!(ok.warnings, 1);
    }

    #[test]
    fn test_parse_error_with_sql_state() {
        let mut payload = vec![0xff, 0x15, 0x04];
        payload.extend_from_slice(b"#28000");
        payload.extend_from_slice(b"Access denied");

        let response = GenericResponse::parse(&payload).unwrap();
        assert_eq!(
            response,
            GenericResponse::Err(ErrPacket {
                code: 1045,
                sql_state: Some("28000".to_string()),
                message: "Access denied".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_error_without_sql_state() {
        let mut payload = vec![0xff, 0x15, 0x04];
        payload.extend_from_slice(b"Access denied");

        let response = GenericResponse::parse(&payload).unwrap();
        assert_eq!(
            response,
            GenericResponse::Err(ErrPacket {
                code: 1045,
                sql_state: None,
                message: "Access denied".to_string(),
            })
        );
    }

    #[test]
    fn test_into_ok_surfaces_server_error() {
        let mut payload = vec![0xff, 0x15, 0x04];
        payload.extend_from_slice(b"Access denied");

        let err = GenericResponse::parse(&payload)
            .unwrap()
            .into_ok()
            .unwrap_err();
        assert!(matches!(err, RelayError::ServerError { code: 1045, .. }));
    }

    #[test]
    fn test_parse_unrecognized_leading_byte() {
        let payload = [0xfe, 0x00, 0x00];
        assert!(matches!(
            GenericResponse::parse(&payload),
            Err(RelayError::UnrecognizedResponse(0xfe))
        ));
    }

    #[test]
    fn test_parse_empty_payload() {
        assert!(matches!(
            GenericResponse::parse(&[]),
            Err(RelayError::TruncatedPacket)
        ));
    }

    #[test]
    fn test_parse_truncated_error() {
        let payload = [0xff, 0x15];
        assert!(matches!(
            GenericResponse::parse(&payload),
            Err(RelayError::TruncatedPacket)
        ));
    }
}
