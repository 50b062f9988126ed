use std::fmt;

/// バイト列から数値を読み取るための拡張トレイト。
///
/// 各メソッドは長さが事前に確認されたスライスに対してのみ使用する。
pub trait BytesExt {
    /// ビッグエンディアンで16ビット符号無し整数を読み込む。
    fn read_be_16(&self) -> u16;

    /// ビッグエンディアンで24ビット符号無し整数を読み込む。
    fn read_be_24(&self) -> u32;

    /// ビッグエンディアンで32ビット符号無し整数を読み込む。
    fn read_be_32(&self) -> u32;

    /// 先頭から`digits`桁の2進化10進数を読み込む。
    fn read_bcd(&self, digits: usize) -> u32;
}

impl BytesExt for [u8] {
    #[inline]
    fn read_be_16(&self) -> u16 {
        u16::from_be_bytes([self[0], self[1]])
    }

    #[inline]
    fn read_be_24(&self) -> u32 {
        u32::from_be_bytes([0, self[0], self[1], self[2]])
    }

    #[inline]
    fn read_be_32(&self) -> u32 {
        u32::from_be_bytes([self[0], self[1], self[2], self[3]])
    }

    fn read_bcd(&self, digits: usize) -> u32 {
        (0..digits).fold(0, |acc, i| {
            let b = self[i / 2];
            let digit = if i % 2 == 0 { b >> 4 } else { b & 0x0F };
            acc * 10 + digit as u32
        })
    }
}

/// 2桁の2進化10進数を読み込む。
#[inline]
pub fn read_bcd_digit(b: u8) -> u8 {
    (b >> 4) * 10 + (b & 0x0F)
}

/// 2桁の数値を2進化10進数にする。
#[inline]
pub fn to_bcd_digit(n: u8) -> u8 {
    ((n / 10) << 4) | (n % 10)
}

/// `Debug`で16進数表記するためのラッパー。
pub struct UpperHex<T>(pub T);

impl<T: fmt::UpperHex> fmt::Debug for UpperHex<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_be() {
        assert_eq!(b"\x12\x34\x56\x78"[..].read_be_16(), 0x1234);
        assert_eq!(b"\x12\x34\x56\x78"[..].read_be_24(), 0x123456);
        assert_eq!(b"\x12\x34\x56\x78\x9A\xBC\xDE"[..].read_be_32(), 0x12345678);
    }

    #[test]
    fn test_read_bcd() {
        assert_eq!(b"\x01\x23\x45\x67"[..].read_bcd(8), 1234567);
        assert_eq!(b"\x12\x34\x56\x7F"[..].read_bcd(7), 1234567);
        assert_eq!(read_bcd_digit(0x59), 59);
        assert_eq!(to_bcd_digit(59), 0x59);
    }
}
