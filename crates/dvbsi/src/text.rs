//! SIで使われる文字列。
//!
//! DVBの文字列は先頭の文字符号表選択バイトと制御符号を含むバイト列であり、
//! ATSCの文字列は言語ごと・セグメントごとに長さを持つ複数文字列構造である。

use std::fmt;

use crate::lang::LangCode;
use crate::psi::PsiError;
use crate::reader::Reader;

/// EN 300 468 付録Aで規定される文字符号表。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    /// 既定の表（ISO/IEC 6937、ここではISO/IEC 8859-1として扱う）。
    Default,
    /// ISO/IEC 8859の各部（1～15）。
    Iso8859(u8),
    /// ISO/IEC 10646の基本多言語面（UCS-2ビッグエンディアン）。
    Ucs2,
    /// KSX1001-2004。
    KsX1001,
    /// GB-2312-1980。
    Gb2312,
    /// Big5。
    Big5,
    /// UTF-8。
    Utf8,
    /// 未知の表。
    Unknown(u8),
}

/// DVBの文字列を表す型。
///
/// `DvbStr`は借用されたバイト列で、先頭に文字符号表選択バイトを含む。
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DvbStr([u8]);

impl DvbStr {
    /// バイト列から`DvbStr`を生成する。
    #[must_use]
    #[inline]
    pub const fn from_bytes(bytes: &[u8]) -> &DvbStr {
        // Safety: `DvbStr`は`[u8]`の透過的なラッパーである
        unsafe { &*(bytes as *const [u8] as *const DvbStr) }
    }

    /// バイト列を返す。
    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// この文字列の長さ（バイト数）を返す。
    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// この文字列が空であるかどうかを返す。
    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 文字符号表と、選択バイトを除いた本文を返す。
    pub fn charset(&self) -> (Charset, &[u8]) {
        match self.0 {
            [] => (Charset::Default, &self.0),
            [b @ 0x01..=0x0B, ref rem @ ..] => (Charset::Iso8859(b + 4), rem),
            [0x10, _, n, ref rem @ ..] => (Charset::Iso8859(n), rem),
            [0x11, ref rem @ ..] => (Charset::Ucs2, rem),
            [0x12, ref rem @ ..] => (Charset::KsX1001, rem),
            [0x13, ref rem @ ..] => (Charset::Gb2312, rem),
            [0x14, ref rem @ ..] => (Charset::Big5, rem),
            [0x15, ref rem @ ..] => (Charset::Utf8, rem),
            [0x1F, _, ref rem @ ..] => (Charset::Unknown(0x1F), rem),
            [b @ 0x00..=0x1F, ref rem @ ..] => (Charset::Unknown(b), rem),
            _ => (Charset::Default, &self.0),
        }
    }

    /// 文字列を`String`に変換する。`to_string`と同じ。
    ///
    /// 強調の開始・終了は取り除かれ、改行はLFに変換される。
    /// 変換できない文字は[`U+FFFD REPLACEMENT CHARACTER`][`char::REPLACEMENT_CHARACTER`]になる。
    pub fn decode(&self) -> String {
        let (charset, body) = self.charset();
        let mut buf = String::with_capacity(body.len());

        match charset {
            Charset::Utf8 => {
                for c in String::from_utf8_lossy(body).chars() {
                    push_char(&mut buf, c as u32);
                }
            }
            Charset::Ucs2 => {
                for pair in body.chunks(2) {
                    match *pair {
                        [h, l] => push_char(&mut buf, u16::from_be_bytes([h, l]) as u32),
                        _ => buf.push(char::REPLACEMENT_CHARACTER),
                    }
                }
            }
            Charset::Default | Charset::Iso8859(1) => {
                for &b in body {
                    push_char(&mut buf, b as u32);
                }
            }
            _ => {
                // ASCII範囲以外の表は未対応
                for &b in body {
                    match b {
                        0x00..=0x7F | 0x80..=0x9F => push_char(&mut buf, b as u32),
                        _ => buf.push(char::REPLACEMENT_CHARACTER),
                    }
                }
            }
        }

        buf
    }
}

/// 制御符号を解釈しながら`c`を追加する。
fn push_char(buf: &mut String, c: u32) {
    match c {
        // 強調の開始・終了
        0x86 | 0x87 | 0xE086 | 0xE087 => {}
        // 改行
        0x8A | 0xE08A => buf.push('\n'),
        // その他のC1制御符号
        0x80..=0x9F | 0xE080..=0xE09F => {}
        _ => buf.push(char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER)),
    }
}

impl fmt::Debug for DvbStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.decode(), f)
    }
}

impl fmt::Display for DvbStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.decode())
    }
}

impl<'a> From<&'a [u8]> for &'a DvbStr {
    #[inline]
    fn from(bytes: &'a [u8]) -> &'a DvbStr {
        DvbStr::from_bytes(bytes)
    }
}

/// ATSCの複数文字列構造におけるセグメント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringSegment<'a> {
    /// 圧縮形式（0は非圧縮、1・2はハフマン符号）。
    pub compression_type: u8,
    /// 文字の上位バイト、または0x3EでSCSU、0x3FでUTF-16。
    pub mode: u8,
    /// セグメントのバイト列。
    pub bytes: &'a [u8],
}

impl<'a> StringSegment<'a> {
    /// セグメントを`buf`に追加する。
    ///
    /// 圧縮されたセグメントやSCSUは[`U+FFFD REPLACEMENT
    /// CHARACTER`][`char::REPLACEMENT_CHARACTER`]として扱われる。
    pub fn decode_into(&self, buf: &mut String) {
        match (self.compression_type, self.mode) {
            (0x00, 0x3F) => {
                let units = self
                    .bytes
                    .chunks_exact(2)
                    .map(|p| u16::from_be_bytes([p[0], p[1]]));
                buf.extend(char::decode_utf16(units).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)));
            }
            (0x00, mode @ (0x00..=0x06 | 0x09..=0x10 | 0x20..=0x27 | 0x30..=0x33)) => {
                buf.extend(self.bytes.iter().map(|&b| {
                    char::from_u32(((mode as u32) << 8) | b as u32)
                        .unwrap_or(char::REPLACEMENT_CHARACTER)
                }));
            }
            _ => buf.push(char::REPLACEMENT_CHARACTER),
        }
    }
}

/// 複数文字列構造における言語ごとの文字列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtscString<'a> {
    /// 言語コード。
    pub lang_code: LangCode,
    /// セグメントを格納する配列。
    pub segments: Vec<StringSegment<'a>>,
}

impl<'a> AtscString<'a> {
    /// 全セグメントを連結して`String`に変換する。
    pub fn decode(&self) -> String {
        let mut buf = String::new();
        for segment in &self.segments {
            segment.decode_into(&mut buf);
        }
        buf
    }
}

impl<'a> fmt::Display for AtscString<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.decode())
    }
}

/// ATSC A/65で規定される複数文字列構造（multiple_string_structure）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipleString<'a> {
    /// 言語ごとの文字列を格納する配列。
    pub strings: Vec<AtscString<'a>>,
}

impl<'a> MultipleString<'a> {
    /// `data`全体を複数文字列構造として読み取る。
    ///
    /// すべてのセグメント長が`data`の範囲に収まり、
    /// かつ`data`をちょうど使い切る場合に限り成功する。
    pub fn read(data: &'a [u8]) -> Result<MultipleString<'a>, PsiError> {
        if data.is_empty() {
            return Ok(MultipleString::default());
        }

        let mut r = Reader::new(data);
        let number_strings = r.read_u8()?;
        let mut strings = Vec::with_capacity(number_strings as usize);
        for _ in 0..number_strings {
            let lang_code = LangCode(r.read_array()?);
            let number_segments = r.read_u8()?;
            let mut segments = Vec::with_capacity(number_segments as usize);
            for _ in 0..number_segments {
                let compression_type = r.read_u8()?;
                let mode = r.read_u8()?;
                let number_bytes = r.read_u8()?;
                let bytes = r.read_bytes(number_bytes as usize)?;
                segments.push(StringSegment {
                    compression_type,
                    mode,
                    bytes,
                });
            }
            strings.push(AtscString {
                lang_code,
                segments,
            });
        }
        r.finish()?;

        Ok(MultipleString { strings })
    }

    /// `lang_code`の文字列、なければ最初の文字列を返す。
    pub fn get(&self, lang_code: LangCode) -> Option<&AtscString<'a>> {
        self.strings
            .iter()
            .find(|s| s.lang_code == lang_code)
            .or_else(|| self.strings.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_dvb_str_default() {
        assert_eq!(DvbStr::from_bytes(b"ACME").to_string(), "ACME");
        assert_eq!(DvbStr::from_bytes(b"").to_string(), "");
        assert_eq!(
            DvbStr::from_bytes(b"\x86News\x87 at\x8Aten").to_string(),
            "News at\nten"
        );
    }

    #[test]
    fn test_dvb_str_charsets() {
        let s = DvbStr::from_bytes(b"\x10\x00\x01Caf\xE9");
        assert_eq!(s.charset().0, Charset::Iso8859(1));
        assert_eq!(s.to_string(), "Café");

        let s = DvbStr::from_bytes("\x15Grüße".as_bytes());
        assert_eq!(s.charset().0, Charset::Utf8);
        assert_eq!(s.to_string(), "Grüße");

        let s = DvbStr::from_bytes(b"\x11\x00A\x00\xE9\xE0\x8A\x00B");
        assert_eq!(s.charset().0, Charset::Ucs2);
        assert_eq!(s.to_string(), "Aé\nB");

        let s = DvbStr::from_bytes(b"\x05ABC");
        assert_eq!(s.charset().0, Charset::Iso8859(9));
        assert_eq!(s.to_string(), "ABC");
    }

    #[test]
    fn test_multiple_string() {
        let data = hex_literal::hex!(
            "02"
            "65 6E 67 01 00 00 04 44 65 6D 6F"
            "73 70 61 02 00 00 02 48 6F 00 00 01 6C"
        );
        let ms = MultipleString::read(&data).unwrap();
        assert_eq!(ms.strings.len(), 2);
        assert_eq!(ms.strings[0].lang_code, LangCode::ENG);
        assert_eq!(ms.strings[0].to_string(), "Demo");
        assert_eq!(ms.get(LangCode::SPA).unwrap().to_string(), "Hol");
        assert_eq!(ms.get(LangCode::FRA).unwrap().to_string(), "Demo");
    }

    #[test]
    fn test_multiple_string_bounds() {
        // セグメント長が外側の長さを超える
        let data = hex_literal::hex!("01 65 6E 67 01 00 00 05 44 65 6D 6F");
        assert_matches!(MultipleString::read(&data), Err(PsiError::TruncatedData));

        // 余分なバイトがある
        let data = hex_literal::hex!("01 65 6E 67 01 00 00 01 44 FF");
        assert_matches!(MultipleString::read(&data), Err(PsiError::LengthMismatch));

        for len in 1..11 {
            let data = hex_literal::hex!("01 65 6E 67 01 00 00 03 44 65 6D");
            assert!(MultipleString::read(&data[..len]).is_err());
        }
    }
}
