//! アプリケーション層のAPDU（Application Protocol Data Unit）。

use std::fmt;

use crate::asn1;
use crate::error::CiError;

/// APDU。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Apdu<'a> {
    /// 24ビットのタグ。
    pub tag: u32,
    /// 長さフィールドに続くデータ。
    pub data: &'a [u8],
}

impl<'a> Apdu<'a> {
    /// `data`の先頭からAPDUを1つ読み取り、残りのデータと共に返す。
    pub fn read(data: &'a [u8]) -> Result<(Apdu<'a>, &'a [u8]), CiError> {
        let [t1, t2, t3, ref rest @ ..] = *data else {
            return Err(CiError::TruncatedData);
        };
        let tag = u32::from_be_bytes([0, t1, t2, t3]);
        let (data, rest) = asn1::split_body(rest)?;
        Ok((Apdu { tag, data }, rest))
    }

    /// `data`に含まれるAPDUを順に読み取るイテレーターを返す。
    #[inline]
    pub fn iter(data: &'a [u8]) -> ApduIter<'a> {
        ApduIter(data)
    }
}

impl<'a> fmt::Debug for Apdu<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Apdu")
            .field("tag", &format_args!("{:#08X}", self.tag))
            .field("data", &self.data)
            .finish()
    }
}

/// [`Apdu::iter`]で返されるイテレーター。
///
/// 不正なAPDUを読み取るとエラーを返して終了する。
#[derive(Debug, Clone)]
pub struct ApduIter<'a>(&'a [u8]);

impl<'a> Iterator for ApduIter<'a> {
    type Item = Result<Apdu<'a>, CiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_empty() {
            return None;
        }

        match Apdu::read(self.0) {
            Ok((apdu, rest)) => {
                self.0 = rest;
                Some(Ok(apdu))
            }
            Err(e) => {
                self.0 = &[];
                Some(Err(e))
            }
        }
    }
}

impl<'a> std::iter::FusedIterator for ApduIter<'a> {}

/// APDUを`buf`に書き込む。
pub fn write(buf: &mut Vec<u8>, tag: u32, data: &[u8]) -> Result<(), CiError> {
    if tag > 0xFF_FFFF {
        return Err(CiError::ProtocolViolation("apdu tag"));
    }

    buf.extend_from_slice(&tag.to_be_bytes()[1..]);
    asn1::write_length(buf, data.len())?;
    buf.extend_from_slice(data);
    Ok(())
}

/// APDUを生成する。
#[inline]
pub fn encode(tag: u32, data: &[u8]) -> Result<Vec<u8>, CiError> {
    let mut buf = Vec::with_capacity(data.len() + 4);
    write(&mut buf, tag, data)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn test_encode() {
        assert_eq!(encode(0x9F8010, &[]).unwrap(), hex!("9F 80 10 00"));

        let apdu = encode(0x9F8011, &[0x5A; 130]).unwrap();
        assert_eq!(apdu[..5], hex!("9F 80 11 81 82"));
        assert_eq!(apdu.len(), 5 + 130);

        assert_matches!(encode(0x0100_0000, &[]), Err(CiError::ProtocolViolation(_)));
    }

    #[test]
    fn test_iter() {
        let data = hex!("9F 80 10 00 9F 80 11 04 00 01 00 41");
        let apdus: Vec<_> = Apdu::iter(&data).collect::<Result<_, _>>().unwrap();
        assert_eq!(apdus.len(), 2);
        assert_eq!(apdus[0].tag, 0x9F8010);
        assert!(apdus[0].data.is_empty());
        assert_eq!(apdus[1].tag, 0x9F8011);
        assert_eq!(apdus[1].data, hex!("00 01 00 41"));

        let mut iter = Apdu::iter(&data[..10]);
        assert_matches!(iter.next(), Some(Ok(_)));
        assert_matches!(iter.next(), Some(Err(CiError::TruncatedData)));
        assert_matches!(iter.next(), None);
    }
}
