//! PSI/SIセクション用のモジュール。

pub mod buffer;
pub mod desc;
pub mod table;
pub mod writer;

use fxhash::FxHashMap;
use thiserror::Error;

use crate::utils::BytesExt;

/// セクション長の最大値。
pub const MAX_SECTION_LENGTH: usize = 4093;

/// セクションや記述子の読み取りで発生するエラー。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PsiError {
    /// データ長が足りない。
    #[error("truncated data")]
    TruncatedData,

    /// 宣言された長さと実際のデータ長が一致しない。
    #[error("length mismatch")]
    LengthMismatch,

    /// 記述子が記述子ループの範囲を越えている。
    #[error("descriptor overruns its loop")]
    DescriptorTruncated,

    /// CRC32が一致しない。
    #[error("crc32 mismatch")]
    CrcMismatch,

    /// 対応していないテーブルIDである。
    #[error("unsupported table id 0x{0:02X}")]
    UnsupportedTableId(u8),

    /// PSIの終端（スタッフィング）に到達した。
    #[error("reached to end of PSI sections")]
    EndOfPsi,

    /// フィールドの値が不正である。
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
}

/// 拡張形式セクションのバージョン等の情報。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionInfo {
    /// バージョン番号（5ビット）。
    pub version_number: u8,
    /// カレントネクスト指示。
    pub current_next_indicator: bool,
    /// セクション番号。
    pub section_number: u8,
    /// 最終セクション番号。
    pub last_section_number: u8,
}

/// PSIのセクション。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsiSection<'a> {
    /// テーブル識別。
    pub table_id: u8,
    /// プライベート指示。
    pub private_indicator: bool,
    /// セクションシンタクス。拡張形式でない場合は`None`。
    pub syntax: Option<PsiSectionSyntax>,
    /// セクションヘッダとCRCを除いたデータ。
    pub data: &'a [u8],
    /// CRC。CRCを持たない短形式セクションでは`None`。
    pub crc32: Option<u32>,
}

impl<'a> PsiSection<'a> {
    /// 短形式でもCRCを持つテーブルID（TOT）。
    const SHORT_WITH_CRC: u8 = 0x73;

    /// PSIセクションをパースし、[`PsiSection`]とセクション全体の長さを返す。
    ///
    /// `verify_crc`が`true`の場合、CRCを持つセクションのCRC32を検証する。
    /// `buf`はセクションより長くても良く、後続のデータは無視される。
    pub fn parse(buf: &'a [u8], verify_crc: bool) -> Result<(PsiSection<'a>, usize), PsiError> {
        let [table_id, b1, b2, ..] = *buf else {
            return Err(PsiError::TruncatedData);
        };
        if table_id == 0xFF {
            return Err(PsiError::EndOfPsi);
        }

        let section_syntax_indicator = b1 & 0b10000000 != 0;
        let private_indicator = b1 & 0b01000000 != 0;
        let section_length = (u16::from_be_bytes([b1, b2]) & 0x0FFF) as usize;
        if section_length > MAX_SECTION_LENGTH {
            log::debug!("invalid PsiSection::section_length");
            return Err(PsiError::LengthMismatch);
        }

        let psi = buf
            .get(..3 + section_length)
            .ok_or(PsiError::TruncatedData)?;

        let has_crc = section_syntax_indicator || table_id == Self::SHORT_WITH_CRC;
        let crc32 = if has_crc {
            if section_length < 4 {
                log::debug!("invalid PsiSection::crc32");
                return Err(PsiError::LengthMismatch);
            }
            if verify_crc && !crate::crc::verify(psi) {
                log::debug!("invalid PsiSection::crc32");
                return Err(PsiError::CrcMismatch);
            }
            Some(psi[psi.len() - 4..].read_be_32())
        } else {
            None
        };

        let (syntax, data) = if section_syntax_indicator {
            // table_id_extension(16)..last_section_number(8)とCRC
            if section_length < 5 + 4 {
                log::debug!("invalid PsiSectionSyntax");
                return Err(PsiError::LengthMismatch);
            }

            let ss = PsiSectionSyntax {
                table_id_extension: psi[3..=4].read_be_16(),
                version_number: (psi[5] & 0b00111110) >> 1,
                current_next_indicator: psi[5] & 0b00000001 != 0,
                section_number: psi[6],
                last_section_number: psi[7],
            };
            (Some(ss), &psi[8..psi.len() - 4])
        } else if has_crc {
            (None, &psi[3..psi.len() - 4])
        } else {
            (None, &psi[3..])
        };

        Ok((
            PsiSection {
                table_id,
                private_indicator,
                syntax,
                data,
                crc32,
            },
            psi.len(),
        ))
    }

    /// セクションシンタクスを返す。短形式の場合は[`PsiError::InvalidValue`]を返す。
    #[inline]
    pub fn syntax(&self) -> Result<&PsiSectionSyntax, PsiError> {
        self.syntax
            .as_ref()
            .ok_or(PsiError::InvalidValue("section_syntax_indicator"))
    }

    /// `table_id`が`ids`に含まれることを確認する。
    #[inline]
    pub fn expect_table_id(&self, ids: impl IntoIterator<Item = u8>) -> Result<u8, PsiError> {
        if ids.into_iter().any(|id| id == self.table_id) {
            Ok(self.table_id)
        } else {
            Err(PsiError::UnsupportedTableId(self.table_id))
        }
    }
}

/// PSIセクションのシンタクス。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PsiSectionSyntax {
    /// テーブル識別拡張。
    pub table_id_extension: u16,
    /// バージョン番号（5ビット）。
    pub version_number: u8,
    /// カレントネクスト指示。
    pub current_next_indicator: bool,
    /// セクション番号。
    pub section_number: u8,
    /// 最終セクション番号。
    pub last_section_number: u8,
}

impl PsiSectionSyntax {
    /// テーブル識別拡張以外の情報を返す。
    #[inline]
    pub fn info(&self) -> SectionInfo {
        SectionInfo {
            version_number: self.version_number,
            current_next_indicator: self.current_next_indicator,
            section_number: self.section_number,
            last_section_number: self.last_section_number,
        }
    }
}

/// PSIテーブルを表すトレイト。
pub trait PsiTable<'a>: Sized {
    /// パース済みのセクションからテーブルを読み取る。
    fn read(psi: &PsiSection<'a>) -> Result<Self, PsiError>;

    /// `buf`の先頭にあるセクションをパースしてテーブルを読み取る。
    ///
    /// `verify_crc`が`true`の場合はCRC32も検証する。
    fn decode(buf: &'a [u8], verify_crc: bool) -> Result<Self, PsiError> {
        let (psi, _) = PsiSection::parse(buf, verify_crc)?;
        Self::read(&psi).inspect_err(|e| {
            log::debug!("invalid {}: {}", std::any::type_name::<Self>(), e);
        })
    }
}

/// PSIテーブルのバージョン管理。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Repository {
    // サブテーブルごとの、セクション番号と対応するバージョン番号の配列。
    subtable_versions: FxHashMap<(u8, u16), Vec<u8>>,
}

impl Repository {
    /// バージョン管理のための`Repository`を生成する。
    #[inline]
    pub fn new() -> Repository {
        Repository::default()
    }

    /// `psi`から`T`で指定したテーブルを読み取る。
    ///
    /// サブテーブルのバージョンが更新されている場合や
    /// （セクションシンタクスがないために）バージョン管理が必要ない場合には
    /// `T`を使ってサブテーブルを読み込む。
    ///
    /// サブテーブルのバージョンが同一であり更新がない場合は`Ok(None)`を返す。
    /// 読み取りに失敗したセクションのバージョンは記録しない。
    pub fn read<'a, T: PsiTable<'a>>(&mut self, psi: &PsiSection<'a>) -> Result<Option<T>, PsiError> {
        let Some(syntax) = psi.syntax.as_ref() else {
            return T::read(psi).map(Some);
        };

        let len = syntax.last_section_number as usize + 1;
        let idx = syntax.section_number as usize;
        if idx >= len {
            log::debug!("invalid PsiSectionSyntax::section_number");
            return Err(PsiError::InvalidValue("section_number"));
        }

        let versions = self
            .subtable_versions
            .entry((psi.table_id, syntax.table_id_extension))
            .or_default();
        if versions.len() != len {
            // バージョン番号は5ビットであるため0x20以上は無効値
            versions.clear();
            versions.resize(len, 0xFF);
        }
        if versions[idx] == syntax.version_number {
            return Ok(None);
        }

        let table = T::read(psi)?;
        versions[idx] = syntax.version_number;
        Ok(Some(table))
    }

    /// `psi`が示すセクションのバージョンを未読み取りとする。
    ///
    /// `read`で読み取ったテーブルがまだ処理出来る段階にない場合（PAT前のPMTなど）に、
    /// このメソッドを使用して未読み取りとすることで再度処理出来るようにする。
    pub fn unset(&mut self, psi: &PsiSection) {
        let Some(syntax) = psi.syntax.as_ref() else {
            return;
        };

        if let Some(version) = self
            .subtable_versions
            .get_mut(&(psi.table_id, syntax.table_id_extension))
            .and_then(|versions| versions.get_mut(syntax.section_number as usize))
        {
            *version = 0xFF;
        }
    }

    /// `Repository`の内容を消去して初期化する。
    #[inline]
    pub fn clear(&mut self) {
        self.subtable_versions.clear();
    }
}
