//! 境界検査付きのバイト列カーソル。
//!
//! セクションや記述子の各フィールドは[`Reader`]を通して読み取る。
//! `Reader`は元のスライスを越えて進むことができず、
//! 長さの足りない読み取りはすべて[`PsiError::TruncatedData`]となる。

use crate::psi::desc::DescriptorBlock;
use crate::psi::PsiError;
use crate::utils::BytesExt;

/// ビッグエンディアンで値を読み進めるカーソル。
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    /// `data`を先頭から読み進める`Reader`を生成する。
    #[inline]
    pub fn new(data: &'a [u8]) -> Reader<'a> {
        Reader { data }
    }

    /// 未読のバイト数を返す。
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// 未読のデータが残っていないかどうかを返す。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 未読のデータを消費せずに返す。
    #[inline]
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// 次の1バイトを消費せずに返す。
    #[inline]
    pub fn peek_u8(&self) -> Result<u8, PsiError> {
        self.data.first().copied().ok_or(PsiError::TruncatedData)
    }

    /// `len`バイトを読み取る。
    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PsiError> {
        let (head, tail) = self
            .data
            .split_at_checked(len)
            .ok_or(PsiError::TruncatedData)?;
        self.data = tail;
        Ok(head)
    }

    /// `N`バイトを固定長配列として読み取る。
    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PsiError> {
        let bytes = self.read_bytes(N)?;
        // `read_bytes`により長さは`N`である
        let mut array = [0; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }

    /// 8ビット符号無し整数を読み取る。
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, PsiError> {
        let [b, ref rem @ ..] = *self.data else {
            return Err(PsiError::TruncatedData);
        };
        self.data = rem;
        Ok(b)
    }

    /// 16ビット符号無し整数を読み取る。
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, PsiError> {
        Ok(self.read_bytes(2)?.read_be_16())
    }

    /// 24ビット符号無し整数を読み取る。
    #[inline]
    pub fn read_u24(&mut self) -> Result<u32, PsiError> {
        Ok(self.read_bytes(3)?.read_be_24())
    }

    /// 32ビット符号無し整数を読み取る。
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, PsiError> {
        Ok(self.read_bytes(4)?.read_be_32())
    }

    /// 48ビット符号無し整数を読み取る。
    #[inline]
    pub fn read_u48(&mut self) -> Result<u64, PsiError> {
        let bytes = self.read_bytes(6)?;
        Ok(bytes
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    /// 上位4ビットが予約で下位12ビットが長さであるフィールドを読み取る。
    #[inline]
    pub fn read_length_12(&mut self) -> Result<u16, PsiError> {
        Ok(self.read_u16()? & 0x0FFF)
    }

    /// `len`バイトを切り出し、それを読み進める`Reader`を返す。
    #[inline]
    pub fn read_sub(&mut self, len: usize) -> Result<Reader<'a>, PsiError> {
        self.read_bytes(len).map(Reader::new)
    }

    /// 12ビットの長さで始まる記述子群を読み取る。
    #[inline]
    pub fn read_descriptors(&mut self) -> Result<DescriptorBlock<'a>, PsiError> {
        let length = self.read_length_12()?;
        self.read_descriptors_with_len(length as usize)
    }

    /// `len`バイトの記述子群を読み取る。
    #[inline]
    pub fn read_descriptors_with_len(&mut self, len: usize) -> Result<DescriptorBlock<'a>, PsiError> {
        let block = self.read_bytes(len)?;
        DescriptorBlock::new(block)
    }

    /// 未読のデータをすべて読み取る。
    #[inline]
    pub fn read_rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    /// すべてのデータが読み取られたことを確認する。
    ///
    /// 未読のデータが残っている場合は[`PsiError::LengthMismatch`]を返す。
    #[inline]
    pub fn finish(self) -> Result<(), PsiError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(PsiError::LengthMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_read_fields() {
        let mut r = Reader::new(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A]);
        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.read_u16().unwrap(), 0x0203);
        assert_eq!(r.read_u24().unwrap(), 0x040506);
        assert_eq!(r.remaining(), 4);
        assert_eq!(r.read_u32().unwrap(), 0x0708090A);
        assert!(r.is_empty());
        assert_matches!(r.finish(), Ok(()));
    }

    #[test]
    fn test_read_u48() {
        let mut r = Reader::new(&[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
        assert_eq!(r.read_u48().unwrap(), 0x123456789ABC);
    }

    #[test]
    fn test_truncated() {
        let mut r = Reader::new(&[0x01, 0x02, 0x03]);
        assert_matches!(r.read_u32(), Err(PsiError::TruncatedData));
        // 失敗した読み取りは位置を進めない
        assert_eq!(r.remaining(), 3);
        assert_matches!(r.read_bytes(4), Err(PsiError::TruncatedData));
        assert_eq!(r.read_bytes(3).unwrap(), &[0x01, 0x02, 0x03]);
        assert_matches!(r.read_u8(), Err(PsiError::TruncatedData));
        assert_matches!(r.peek_u8(), Err(PsiError::TruncatedData));
    }

    #[test]
    fn test_sub_reader() {
        let mut r = Reader::new(&[0xF0, 0x02, 0xAA, 0xBB, 0xCC]);
        let len = r.read_length_12().unwrap();
        assert_eq!(len, 2);
        let mut sub = r.read_sub(len as usize).unwrap();
        assert_eq!(sub.read_u16().unwrap(), 0xAABB);
        assert_matches!(sub.read_u8(), Err(PsiError::TruncatedData));
        assert_matches!(r.clone().finish(), Err(PsiError::LengthMismatch));
        assert_eq!(r.read_rest(), &[0xCC]);
        assert_matches!(r.finish(), Ok(()));
    }
}
