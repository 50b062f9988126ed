//! 言語コードの定義。

use std::fmt;

/// ISO 639-2で規定される3文字の言語コード。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LangCode(pub [u8; 3]);

impl LangCode {
    /// 英語。
    pub const ENG: LangCode = LangCode(*b"eng");
    /// ドイツ語。
    pub const DEU: LangCode = LangCode(*b"deu");
    /// ドイツ語（書誌用コード）。
    pub const GER: LangCode = LangCode(*b"ger");
    /// フランス語。
    pub const FRA: LangCode = LangCode(*b"fra");
    /// スペイン語。
    pub const SPA: LangCode = LangCode(*b"spa");
    /// 未定義。
    pub const UND: LangCode = LangCode(*b"und");
    /// 音声の原語（EN 300 468で規定）。
    pub const QAA: LangCode = LangCode(*b"qaa");

    /// 3バイトの配列から`LangCode`を生成する。
    #[inline]
    pub const fn new(code: [u8; 3]) -> LangCode {
        LangCode(code)
    }
}

impl fmt::Display for LangCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}
