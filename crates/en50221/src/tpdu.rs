//! トランスポート層のTPDU（Transport Protocol Data Unit）。

use smallvec::SmallVec;

use crate::asn1;
use crate::error::CiError;

/// TPDUのタグ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TpduTag {
    /// T_SB。
    Sb,
    /// T_RCV。
    Rcv,
    /// T_CREATE_T_C。
    CreateTc,
    /// T_C_T_C_REPLY。
    CreateTcReply,
    /// T_DELETE_T_C。
    DeleteTc,
    /// T_D_T_C_REPLY。
    DeleteTcReply,
    /// T_REQUEST_T_C。
    RequestTc,
    /// T_NEW_T_C。
    NewTc,
    /// T_T_C_ERROR。
    TcError,
    /// T_DATA_LAST。
    DataLast,
    /// T_DATA_MORE。
    DataMore,
}

impl TpduTag {
    /// タグの値を返す。
    #[inline]
    pub fn value(self) -> u8 {
        match self {
            TpduTag::Sb => 0x80,
            TpduTag::Rcv => 0x81,
            TpduTag::CreateTc => 0x82,
            TpduTag::CreateTcReply => 0x83,
            TpduTag::DeleteTc => 0x84,
            TpduTag::DeleteTcReply => 0x85,
            TpduTag::RequestTc => 0x86,
            TpduTag::NewTc => 0x87,
            TpduTag::TcError => 0x88,
            TpduTag::DataLast => 0xA0,
            TpduTag::DataMore => 0xA1,
        }
    }
}

impl TryFrom<u8> for TpduTag {
    type Error = CiError;

    fn try_from(value: u8) -> Result<TpduTag, CiError> {
        let tag = match value {
            0x80 => TpduTag::Sb,
            0x81 => TpduTag::Rcv,
            0x82 => TpduTag::CreateTc,
            0x83 => TpduTag::CreateTcReply,
            0x84 => TpduTag::DeleteTc,
            0x85 => TpduTag::DeleteTcReply,
            0x86 => TpduTag::RequestTc,
            0x87 => TpduTag::NewTc,
            0x88 => TpduTag::TcError,
            0xA0 => TpduTag::DataLast,
            0xA1 => TpduTag::DataMore,
            _ => {
                log::debug!("unknown tpdu tag: {:#04X}", value);
                return Err(CiError::ProtocolViolation("tpdu tag"));
            }
        };
        Ok(tag)
    }
}

/// T_SBのデータ到着（DA）ビット。
pub const SB_DATA_AVAILABLE: u8 = 0x80;

/// モジュールから受け取ったTPDU。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tpdu<'a> {
    /// タグ。
    pub tag: TpduTag,
    /// トランスポートコネクション識別。
    pub tcid: u8,
    /// コネクション識別に続くデータ。
    pub data: &'a [u8],
}

impl<'a> Tpdu<'a> {
    /// `data`の先頭からTPDUを1つ読み取り、残りのデータと共に返す。
    pub fn read(data: &'a [u8]) -> Result<(Tpdu<'a>, &'a [u8]), CiError> {
        let [tag, ref rest @ ..] = *data else {
            return Err(CiError::TruncatedData);
        };
        let tag = TpduTag::try_from(tag)?;
        let (body, rest) = asn1::split_body(rest)?;
        let [tcid, ref data @ ..] = *body else {
            log::debug!("invalid tpdu: missing tcid");
            return Err(CiError::LengthMismatch);
        };

        Ok((Tpdu { tag, tcid, data }, rest))
    }

    /// モジュールの応答に含まれるTPDUをすべて読み取る。
    ///
    /// 応答は高々1つのデータまたは返信のTPDUと、それに続くT_SBからなる。
    pub fn read_response(mut data: &'a [u8]) -> Result<Response<'a>, CiError> {
        let mut tpdus = Response::new();
        while !data.is_empty() {
            let (tpdu, rest) = Tpdu::read(data)?;
            tpdus.push(tpdu);
            data = rest;
        }
        Ok(tpdus)
    }

    /// T_SBの場合、データ到着ビットが立っているかどうかを返す。
    #[inline]
    pub fn data_available(&self) -> Option<bool> {
        match (self.tag, self.data) {
            (TpduTag::Sb, &[sb_value, ..]) => Some(sb_value & SB_DATA_AVAILABLE != 0),
            _ => None,
        }
    }
}

/// 1回の読み取りで得られるTPDUの列。
pub type Response<'a> = SmallVec<[Tpdu<'a>; 2]>;

/// ホストから送るTPDUを`buf`に書き込む。
pub fn write(buf: &mut Vec<u8>, tag: TpduTag, tcid: u8, data: &[u8]) -> Result<(), CiError> {
    buf.push(tag.value());
    asn1::write_length(buf, 1 + data.len())?;
    buf.push(tcid);
    buf.extend_from_slice(data);
    Ok(())
}

/// ホストから送るTPDUを生成する。
#[inline]
pub fn encode(tag: TpduTag, tcid: u8, data: &[u8]) -> Result<Vec<u8>, CiError> {
    let mut buf = Vec::with_capacity(data.len() + 4);
    write(&mut buf, tag, tcid, data)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn test_encode() {
        assert_eq!(encode(TpduTag::CreateTc, 1, &[]).unwrap(), hex!("82 01 01"));
        assert_eq!(
            encode(TpduTag::DataLast, 1, &hex!("91 04 00 01 00 41")).unwrap(),
            hex!("A0 07 01 91 04 00 01 00 41")
        );

        let data = [0xAB; 200];
        let tpdu = encode(TpduTag::DataMore, 2, &data).unwrap();
        assert_eq!(&tpdu[..4], hex!("A1 81 C9 02"));
        assert_eq!(tpdu.len(), 4 + 200);
    }

    #[test]
    fn test_read_response() {
        let data = hex!("A0 07 01 91 04 00 01 00 41 80 02 01 80");
        let tpdus = Tpdu::read_response(&data).unwrap();
        assert_eq!(tpdus.len(), 2);
        assert_eq!(tpdus[0].tag, TpduTag::DataLast);
        assert_eq!(tpdus[0].tcid, 1);
        assert_eq!(tpdus[0].data, hex!("91 04 00 01 00 41"));
        assert_eq!(tpdus[0].data_available(), None);
        assert_eq!(tpdus[1].tag, TpduTag::Sb);
        assert_eq!(tpdus[1].data_available(), Some(true));
    }

    #[test]
    fn test_read_errors() {
        assert_matches!(Tpdu::read(&[]), Err(CiError::TruncatedData));
        assert_matches!(Tpdu::read(&hex!("A0 07 01 91")), Err(CiError::TruncatedData));
        assert_matches!(Tpdu::read(&hex!("A0 00")), Err(CiError::LengthMismatch));
        assert_matches!(Tpdu::read(&hex!("99 01 01")), Err(CiError::ProtocolViolation(_)));
    }
}
