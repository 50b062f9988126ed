//! セクションの書き込み。

use crate::psi::desc::DescriptorBlock;
use crate::psi::{PsiError, SectionInfo, MAX_SECTION_LENGTH};

/// 12ビットの長さフィールドの位置。
///
/// [`SectionWriter::begin_length_12`]で確保し、[`SectionWriter::end_length_12`]で埋める。
#[derive(Debug)]
#[must_use]
pub struct LengthMark(usize);

/// セクション長とCRCを自動で埋めながらセクションを組み立てる。
#[derive(Debug, Clone)]
pub struct SectionWriter {
    buf: Vec<u8>,
    has_crc: bool,
}

impl SectionWriter {
    /// 拡張形式のセクションを開始する。
    pub fn extended(
        table_id: u8,
        private_indicator: bool,
        table_id_extension: u16,
        info: &SectionInfo,
    ) -> SectionWriter {
        let [ext_hi, ext_lo] = table_id_extension.to_be_bytes();
        let buf = vec![
            table_id,
            0b1011_0000 | (private_indicator as u8) << 6,
            0,
            ext_hi,
            ext_lo,
            0b1100_0000 | (info.version_number & 0x1F) << 1 | info.current_next_indicator as u8,
            info.section_number,
            info.last_section_number,
        ];
        SectionWriter { buf, has_crc: true }
    }

    /// 短形式のセクションを開始する。`has_crc`が`true`の場合は末尾にCRCを付ける。
    pub fn short(table_id: u8, private_indicator: bool, has_crc: bool) -> SectionWriter {
        let buf = vec![table_id, 0b0011_0000 | (private_indicator as u8) << 6, 0];
        SectionWriter { buf, has_crc }
    }

    /// 8ビットの値を書き込む。
    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// 16ビットの値を書き込む。
    #[inline]
    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// 24ビットの値を書き込む。上位8ビットは無視される。
    #[inline]
    pub fn put_u24(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes()[1..]);
    }

    /// 32ビットの値を書き込む。
    #[inline]
    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// バイト列をそのまま書き込む。
    #[inline]
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 予約4ビットと12ビットの長さに続けて記述子群を書き込む。
    pub fn put_descriptors(&mut self, descriptors: &DescriptorBlock) -> Result<(), PsiError> {
        let mark = self.begin_length_12();
        self.put_bytes(descriptors.as_bytes());
        self.end_length_12(mark)
    }

    /// 12ビットの長さフィールドを確保する。
    #[inline]
    pub fn begin_length_12(&mut self) -> LengthMark {
        let mark = LengthMark(self.buf.len());
        self.buf.extend_from_slice(&[0xF0, 0x00]);
        mark
    }

    /// `mark`以降に書き込んだバイト数を長さフィールドに埋める。
    ///
    /// 長さが12ビットに収まらない場合は[`PsiError::LengthMismatch`]を返す。
    pub fn end_length_12(&mut self, mark: LengthMark) -> Result<(), PsiError> {
        let len = self.buf.len() - mark.0 - 2;
        if len > 0x0FFF {
            log::debug!("invalid SectionWriter: loop too long");
            return Err(PsiError::LengthMismatch);
        }

        let [hi, lo] = (len as u16).to_be_bytes();
        self.buf[mark.0] = (self.buf[mark.0] & 0xF0) | hi;
        self.buf[mark.0 + 1] = lo;
        Ok(())
    }

    /// 現在までに書き込まれたバイト数を返す。
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// ヘッダを含めて何も書き込まれていないかどうかを返す。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// セクション長とCRCを埋めてセクションを返す。
    ///
    /// セクション長が上限を超える場合は[`PsiError::LengthMismatch`]を返す。
    pub fn finish(mut self) -> Result<Vec<u8>, PsiError> {
        let crc_len = if self.has_crc { 4 } else { 0 };
        let section_length = self.buf.len() - 3 + crc_len;
        if section_length > MAX_SECTION_LENGTH {
            log::debug!("invalid SectionWriter: section too long");
            return Err(PsiError::LengthMismatch);
        }

        let [hi, lo] = (section_length as u16).to_be_bytes();
        self.buf[1] = (self.buf[1] & 0xF0) | hi;
        self.buf[2] = lo;

        if self.has_crc {
            let crc = crate::crc::calc32(&self.buf);
            self.buf.extend_from_slice(&crc.to_be_bytes());
        }
        Ok(self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    use crate::psi::PsiSection;

    #[test]
    fn test_extended() {
        let info = SectionInfo {
            version_number: 0,
            current_next_indicator: true,
            section_number: 0,
            last_section_number: 0,
        };
        let mut w = SectionWriter::extended(0x00, false, 0x0001, &info);
        w.put_u16(0x0001);
        w.put_u16(0xE100);
        let section = w.finish().unwrap();
        assert_eq!(section, hex!("00 B0 0D 00 01 C1 00 00 00 01 E1 00 E8 F9 5E 7D"));
    }

    #[test]
    fn test_short() {
        let mut w = SectionWriter::short(0x70, true, false);
        w.put_bytes(&hex!("C0 79 12 45 00"));
        assert_eq!(w.finish().unwrap(), hex!("70 70 05 C0 79 12 45 00"));

        let mut w = SectionWriter::short(0x73, true, true);
        w.put_bytes(&hex!("C0 79 12 45 00"));
        let mark = w.begin_length_12();
        w.end_length_12(mark).unwrap();
        let section = w.finish().unwrap();
        let (psi, len) = PsiSection::parse(&section, true).unwrap();
        assert_eq!(len, section.len());
        assert_eq!(psi.data, &hex!("C0 79 12 45 00 F0 00"));
    }

    #[test]
    fn test_too_long() {
        let mut w = SectionWriter::short(0x72, true, false);
        w.put_bytes(&[0xFF; MAX_SECTION_LENGTH]);
        assert_matches!(w.clone().finish(), Ok(_));
        w.put_u8(0xFF);
        assert_matches!(w.finish(), Err(PsiError::LengthMismatch));

        let mut w = SectionWriter::short(0x72, true, false);
        let mark = w.begin_length_12();
        w.put_bytes(&[0xFF; 0x1000]);
        assert_matches!(w.end_length_12(mark), Err(PsiError::LengthMismatch));
    }
}
