//! TPDU・SPDU・APDUの長さフィールドに使われるASN.1 BER形式の長さ。

use arrayvec::ArrayVec;

use crate::error::CiError;

/// 長さの符号化で使われる最大バイト数。
pub const MAX_LENGTH_BYTES: usize = 5;

/// `len`を長さフィールドとして符号化する。
///
/// 127以下は1バイト、それ以上は`0x80 | バイト数`に続けて最小のバイト数で表す。
pub fn encode_length(len: usize) -> Result<ArrayVec<u8, MAX_LENGTH_BYTES>, CiError> {
    let len = u32::try_from(len).map_err(|_| CiError::LengthMismatch)?;

    let mut buf = ArrayVec::new();
    if len < 0x80 {
        buf.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        buf.push(0x80 | (4 - skip) as u8);
        buf.extend(bytes[skip..].iter().copied());
    }
    Ok(buf)
}

/// `len`を長さフィールドとして`buf`に追記する。
#[inline]
pub fn write_length(buf: &mut Vec<u8>, len: usize) -> Result<(), CiError> {
    buf.extend_from_slice(&encode_length(len)?);
    Ok(())
}

/// `data`の先頭にある長さフィールドを読み取り、長さとフィールドのバイト数を返す。
///
/// 長さのバイト数が0または4を超える場合は[`CiError::ProtocolViolation`]を返す。
pub fn decode_length(data: &[u8]) -> Result<(usize, usize), CiError> {
    let Some(&first) = data.first() else {
        return Err(CiError::TruncatedData);
    };
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let count = (first & 0x7F) as usize;
    if count == 0 || count > 4 {
        log::debug!("invalid asn.1 length: {} bytes", count);
        return Err(CiError::ProtocolViolation("asn.1 length"));
    }
    let Some(bytes) = data.get(1..=count) else {
        return Err(CiError::TruncatedData);
    };

    let len = bytes.iter().fold(0usize, |acc, &b| acc << 8 | b as usize);
    Ok((len, 1 + count))
}

/// 長さフィールドに続く本体を読み取り、本体と残りのデータを返す。
pub fn split_body(data: &[u8]) -> Result<(&[u8], &[u8]), CiError> {
    let (len, header) = decode_length(data)?;
    data[header..]
        .split_at_checked(len)
        .ok_or(CiError::TruncatedData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_encode() {
        assert_eq!(&*encode_length(0).unwrap(), [0x00]);
        assert_eq!(&*encode_length(0x7F).unwrap(), [0x7F]);
        assert_eq!(&*encode_length(0x80).unwrap(), [0x81, 0x80]);
        assert_eq!(&*encode_length(130).unwrap(), [0x81, 0x82]);
        assert_eq!(&*encode_length(0x100).unwrap(), [0x82, 0x01, 0x00]);
        assert_eq!(&*encode_length(0x12345).unwrap(), [0x83, 0x01, 0x23, 0x45]);
        assert_eq!(
            &*encode_length(0xFFFF_FFFF).unwrap(),
            [0x84, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode_length(&[0x81, 0x82]).unwrap(), (130, 2));
        assert_eq!(decode_length(&[0x05, 0xFF]).unwrap(), (5, 1));
        assert_eq!(decode_length(&[0x82, 0x01, 0x00]).unwrap(), (0x100, 3));

        assert_matches!(decode_length(&[]), Err(CiError::TruncatedData));
        assert_matches!(decode_length(&[0x82, 0x01]), Err(CiError::TruncatedData));
        assert_matches!(decode_length(&[0x80]), Err(CiError::ProtocolViolation(_)));
        assert_matches!(
            decode_length(&[0x85, 0, 0, 0, 0, 1]),
            Err(CiError::ProtocolViolation(_))
        );
    }

    #[test]
    fn test_bijective() {
        let mut len = 0;
        while len < 1 << 24 {
            let encoded = encode_length(len).unwrap();
            assert_eq!(decode_length(&encoded).unwrap(), (len, encoded.len()));
            len = if len < 0x400 { len + 1 } else { len * 3 / 2 + 7 };
        }
        for len in [0xFF, 0x100, 0xFFFF, 0x1_0000, 0xFF_FFFF] {
            let encoded = encode_length(len).unwrap();
            assert_eq!(decode_length(&encoded).unwrap(), (len, encoded.len()));
        }
    }

    #[test]
    fn test_split_body() {
        let data = [0x03, 1, 2, 3, 4];
        assert_eq!(split_body(&data).unwrap(), (&[1, 2, 3][..], &[4][..]));
        assert_matches!(split_body(&[0x03, 1, 2]), Err(CiError::TruncatedData));
    }
}
