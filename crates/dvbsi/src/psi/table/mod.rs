//! PSI/SIテーブルの定義。

mod atsc;
mod dvb;
mod mpeg;

pub use atsc::*;
pub use dvb::*;
pub use mpeg::*;

use super::{PsiError, PsiSection, PsiTable};

/// `table_id`により種類を判別したテーブル。
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AnyTable<'a> {
    Pat(Pat),
    Cat(Cat<'a>),
    Pmt(Pmt<'a>),
    Tsdt(Tsdt<'a>),
    Nit(Nit<'a>),
    Sdt(Sdt<'a>),
    Bat(Bat<'a>),
    Eit(Eit<'a>),
    Tdt(Tdt),
    Rst(Rst),
    St(St<'a>),
    Tot(Tot<'a>),
    Dit(Dit),
    Sit(Sit<'a>),
    Mgt(Mgt<'a>),
    Vct(Vct<'a>),
    Rrt(Rrt<'a>),
    AtscEit(AtscEit<'a>),
    Ett(Ett<'a>),
    Stt(Stt<'a>),
}

impl<'a> AnyTable<'a> {
    /// セクションの`table_id`に応じたテーブルとして読み取る。
    ///
    /// 対応しない`table_id`の場合は[`PsiError::UnsupportedTableId`]を返す。
    pub fn read(psi: &PsiSection<'a>) -> Result<AnyTable<'a>, PsiError> {
        let table = match psi.table_id {
            0x00 => AnyTable::Pat(Pat::read(psi)?),
            0x01 => AnyTable::Cat(Cat::read(psi)?),
            0x02 => AnyTable::Pmt(Pmt::read(psi)?),
            0x03 => AnyTable::Tsdt(Tsdt::read(psi)?),
            0x40 | 0x41 => AnyTable::Nit(Nit::read(psi)?),
            0x42 | 0x46 => AnyTable::Sdt(Sdt::read(psi)?),
            0x4A => AnyTable::Bat(Bat::read(psi)?),
            0x4E..=0x6F => AnyTable::Eit(Eit::read(psi)?),
            0x70 => AnyTable::Tdt(Tdt::read(psi)?),
            0x71 => AnyTable::Rst(Rst::read(psi)?),
            0x72 => AnyTable::St(St::read(psi)?),
            0x73 => AnyTable::Tot(Tot::read(psi)?),
            0x7E => AnyTable::Dit(Dit::read(psi)?),
            0x7F => AnyTable::Sit(Sit::read(psi)?),
            0xC7 => AnyTable::Mgt(Mgt::read(psi)?),
            0xC8 | 0xC9 => AnyTable::Vct(Vct::read(psi)?),
            0xCA => AnyTable::Rrt(Rrt::read(psi)?),
            0xCB => AnyTable::AtscEit(AtscEit::read(psi)?),
            0xCC => AnyTable::Ett(Ett::read(psi)?),
            0xCD => AnyTable::Stt(Stt::read(psi)?),
            table_id => {
                log::debug!("unsupported table_id: {:#04X}", table_id);
                return Err(PsiError::UnsupportedTableId(table_id));
            }
        };
        Ok(table)
    }

    /// 先頭のセクションを解析し、種類を判別して読み取る。
    ///
    /// 読み取ったテーブルとセクションのバイト数を返す。
    pub fn decode(buf: &'a [u8], verify_crc: bool) -> Result<(AnyTable<'a>, usize), PsiError> {
        let (psi, len) = PsiSection::parse(buf, verify_crc)?;
        Ok((AnyTable::read(&psi)?, len))
    }

    /// テーブルの名前を返す。
    pub fn name(&self) -> &'static str {
        match self {
            AnyTable::Pat(_) => "PAT",
            AnyTable::Cat(_) => "CAT",
            AnyTable::Pmt(_) => "PMT",
            AnyTable::Tsdt(_) => "TSDT",
            AnyTable::Nit(_) => "NIT",
            AnyTable::Sdt(_) => "SDT",
            AnyTable::Bat(_) => "BAT",
            AnyTable::Eit(_) => "EIT",
            AnyTable::Tdt(_) => "TDT",
            AnyTable::Rst(_) => "RST",
            AnyTable::St(_) => "ST",
            AnyTable::Tot(_) => "TOT",
            AnyTable::Dit(_) => "DIT",
            AnyTable::Sit(_) => "SIT",
            AnyTable::Mgt(_) => "MGT",
            AnyTable::Vct(Vct {
                kind: VctKind::Terrestrial,
                ..
            }) => "TVCT",
            AnyTable::Vct(_) => "CVCT",
            AnyTable::Rrt(_) => "RRT",
            AnyTable::AtscEit(_) => "ATSC EIT",
            AnyTable::Ett(_) => "ETT",
            AnyTable::Stt(_) => "STT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn test_any_table() {
        let buf = hex!(
            "00 B0 0D 00 01 C1 00 00 00 01 E1 00 E8 F9 5E 7D"
            "70 70 05 C0 79 12 45 00"
            "FF FF FF"
        );

        let (table, len) = AnyTable::decode(&buf, true).unwrap();
        assert_matches!(&table, AnyTable::Pat(pat) if pat.programs.len() == 1);
        assert_eq!(table.name(), "PAT");
        assert_eq!(len, 16);

        let (table, len) = AnyTable::decode(&buf[16..], true).unwrap();
        assert_matches!(table, AnyTable::Tdt(_));
        assert_eq!(len, 8);

        assert_matches!(AnyTable::decode(&buf[24..], true), Err(PsiError::EndOfPsi));
    }

    #[test]
    fn test_any_table_unsupported() {
        assert_matches!(
            AnyTable::decode(&hex!("90 70 01 00"), true),
            Err(PsiError::UnsupportedTableId(0x90))
        );
    }
}
