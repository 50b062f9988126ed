//! セッション層のSPDU（Session Protocol Data Unit）。

use crate::error::CiError;
use crate::resource::ResourceId;

const TAG_SESSION_NUMBER: u8 = 0x90;
const TAG_OPEN_SESSION_REQUEST: u8 = 0x91;
const TAG_OPEN_SESSION_RESPONSE: u8 = 0x92;
const TAG_CREATE_SESSION: u8 = 0x93;
const TAG_CREATE_SESSION_RESPONSE: u8 = 0x94;
const TAG_CLOSE_SESSION_REQUEST: u8 = 0x95;
const TAG_CLOSE_SESSION_RESPONSE: u8 = 0x96;

/// セッションの開設・切断の結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// 成功。
    Ok,
    /// リソースが存在しない。
    NoResource,
    /// リソースは存在するが使用できない。
    Unavailable,
    /// リソースのバージョンが要求より低い。
    LowVersion,
    /// リソースが使用中である。
    Busy,
    /// 未定義の値。
    Other(u8),
}

impl From<u8> for SessionStatus {
    fn from(value: u8) -> SessionStatus {
        match value {
            0x00 => SessionStatus::Ok,
            0xF0 => SessionStatus::NoResource,
            0xF1 => SessionStatus::Unavailable,
            0xF2 => SessionStatus::LowVersion,
            0xF3 => SessionStatus::Busy,
            v => SessionStatus::Other(v),
        }
    }
}

impl From<SessionStatus> for u8 {
    fn from(value: SessionStatus) -> u8 {
        match value {
            SessionStatus::Ok => 0x00,
            SessionStatus::NoResource => 0xF0,
            SessionStatus::Unavailable => 0xF1,
            SessionStatus::LowVersion => 0xF2,
            SessionStatus::Busy => 0xF3,
            SessionStatus::Other(v) => v,
        }
    }
}

/// SPDU。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spdu<'a> {
    /// session_number。後続にAPDUを伴う。
    SessionNumber {
        /// セッション番号。
        session_nb: u16,
        /// 後続のAPDU。
        body: &'a [u8],
    },
    /// open_session_request。
    OpenSessionRequest {
        /// 要求されたリソース。
        resource_id: ResourceId,
    },
    /// open_session_response。
    OpenSessionResponse {
        /// 結果。
        status: SessionStatus,
        /// 割り当てたリソース。
        resource_id: ResourceId,
        /// セッション番号。
        session_nb: u16,
    },
    /// create_session。
    CreateSession {
        /// 要求するリソース。
        resource_id: ResourceId,
        /// セッション番号。
        session_nb: u16,
    },
    /// create_session_response。
    CreateSessionResponse {
        /// 結果。
        status: SessionStatus,
        /// リソース。
        resource_id: ResourceId,
        /// セッション番号。
        session_nb: u16,
    },
    /// close_session_request。
    CloseSessionRequest {
        /// セッション番号。
        session_nb: u16,
    },
    /// close_session_response。
    CloseSessionResponse {
        /// 結果。
        status: SessionStatus,
        /// セッション番号。
        session_nb: u16,
    },
}

impl<'a> Spdu<'a> {
    /// トランスポート層で受け取ったデータからSPDUを読み取る。
    pub fn read(data: &'a [u8]) -> Result<Spdu<'a>, CiError> {
        let [tag, len, ref rest @ ..] = *data else {
            return Err(CiError::TruncatedData);
        };
        let Some((body, trailing)) = rest.split_at_checked(len as usize) else {
            log::debug!("invalid spdu: length {} exceeds {} bytes", len, rest.len());
            return Err(CiError::TruncatedData);
        };

        let spdu = match (tag, body) {
            (TAG_SESSION_NUMBER, &[hi, lo]) => Spdu::SessionNumber {
                session_nb: u16::from_be_bytes([hi, lo]),
                body: trailing,
            },
            (TAG_OPEN_SESSION_REQUEST, &[a, b, c, d]) => Spdu::OpenSessionRequest {
                resource_id: ResourceId::from_bytes([a, b, c, d]),
            },
            (TAG_OPEN_SESSION_RESPONSE, &[s, a, b, c, d, hi, lo]) => Spdu::OpenSessionResponse {
                status: s.into(),
                resource_id: ResourceId::from_bytes([a, b, c, d]),
                session_nb: u16::from_be_bytes([hi, lo]),
            },
            (TAG_CREATE_SESSION, &[a, b, c, d, hi, lo]) => Spdu::CreateSession {
                resource_id: ResourceId::from_bytes([a, b, c, d]),
                session_nb: u16::from_be_bytes([hi, lo]),
            },
            (TAG_CREATE_SESSION_RESPONSE, &[s, a, b, c, d, hi, lo]) => {
                Spdu::CreateSessionResponse {
                    status: s.into(),
                    resource_id: ResourceId::from_bytes([a, b, c, d]),
                    session_nb: u16::from_be_bytes([hi, lo]),
                }
            }
            (TAG_CLOSE_SESSION_REQUEST, &[hi, lo]) => Spdu::CloseSessionRequest {
                session_nb: u16::from_be_bytes([hi, lo]),
            },
            (TAG_CLOSE_SESSION_RESPONSE, &[s, hi, lo]) => Spdu::CloseSessionResponse {
                status: s.into(),
                session_nb: u16::from_be_bytes([hi, lo]),
            },
            (
                TAG_SESSION_NUMBER
                | TAG_OPEN_SESSION_REQUEST
                | TAG_OPEN_SESSION_RESPONSE
                | TAG_CREATE_SESSION
                | TAG_CREATE_SESSION_RESPONSE
                | TAG_CLOSE_SESSION_REQUEST
                | TAG_CLOSE_SESSION_RESPONSE,
                _,
            ) => {
                log::debug!("invalid spdu {:#04X}: length {}", tag, len);
                return Err(CiError::LengthMismatch);
            }
            _ => {
                log::debug!("unknown spdu tag: {:#04X}", tag);
                return Err(CiError::ProtocolViolation("spdu tag"));
            }
        };

        if !matches!(spdu, Spdu::SessionNumber { .. }) && !trailing.is_empty() {
            log::debug!("invalid spdu {:#04X}: {} trailing bytes", tag, trailing.len());
            return Err(CiError::LengthMismatch);
        }
        Ok(spdu)
    }

    /// SPDUを書き込んだバイト列を返す。
    ///
    /// `SessionNumber`の場合は`body`も続けて書き込む。
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9);
        match *self {
            Spdu::SessionNumber { session_nb, body } => {
                buf.extend_from_slice(&[TAG_SESSION_NUMBER, 2]);
                buf.extend_from_slice(&session_nb.to_be_bytes());
                buf.extend_from_slice(body);
            }
            Spdu::OpenSessionRequest { resource_id } => {
                buf.extend_from_slice(&[TAG_OPEN_SESSION_REQUEST, 4]);
                buf.extend_from_slice(&resource_id.to_bytes());
            }
            Spdu::OpenSessionResponse {
                status,
                resource_id,
                session_nb,
            } => {
                buf.extend_from_slice(&[TAG_OPEN_SESSION_RESPONSE, 7, status.into()]);
                buf.extend_from_slice(&resource_id.to_bytes());
                buf.extend_from_slice(&session_nb.to_be_bytes());
            }
            Spdu::CreateSession {
                resource_id,
                session_nb,
            } => {
                buf.extend_from_slice(&[TAG_CREATE_SESSION, 6]);
                buf.extend_from_slice(&resource_id.to_bytes());
                buf.extend_from_slice(&session_nb.to_be_bytes());
            }
            Spdu::CreateSessionResponse {
                status,
                resource_id,
                session_nb,
            } => {
                buf.extend_from_slice(&[TAG_CREATE_SESSION_RESPONSE, 7, status.into()]);
                buf.extend_from_slice(&resource_id.to_bytes());
                buf.extend_from_slice(&session_nb.to_be_bytes());
            }
            Spdu::CloseSessionRequest { session_nb } => {
                buf.extend_from_slice(&[TAG_CLOSE_SESSION_REQUEST, 2]);
                buf.extend_from_slice(&session_nb.to_be_bytes());
            }
            Spdu::CloseSessionResponse { status, session_nb } => {
                buf.extend_from_slice(&[TAG_CLOSE_SESSION_RESPONSE, 3, status.into()]);
                buf.extend_from_slice(&session_nb.to_be_bytes());
            }
        }
        buf
    }
}
