//! ATSC A/65（PSIP）で規定されるテーブルと関連する型の定義。

use crate::pid::Pid;
use crate::psi::desc::DescriptorBlock;
use crate::psi::{PsiError, PsiSection, PsiTable, SectionInfo};
use crate::reader::Reader;
use crate::text::MultipleString;
use crate::time::GpsTime;

/// PSIPのセクションに共通するヘッダ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsipHeader {
    /// テーブル識別拡張。
    pub table_id_extension: u16,
    /// セクション情報。
    pub info: SectionInfo,
    /// プロトコルバージョン。
    pub protocol_version: u8,
}

/// 拡張形式のヘッダと本体先頭の`protocol_version`を読み取る。
fn read_psip<'a>(psi: &PsiSection<'a>) -> Result<(PsipHeader, Reader<'a>), PsiError> {
    let syntax = psi.syntax()?;
    let mut r = Reader::new(psi.data);
    let protocol_version = r.read_u8()?;
    let header = PsipHeader {
        table_id_extension: syntax.table_id_extension,
        info: syntax.info(),
        protocol_version,
    };
    Ok((header, r))
}

/// 予約6ビットと10ビットの長さに続く記述子群を読み取る。
fn read_descriptors_10<'a>(r: &mut Reader<'a>) -> Result<DescriptorBlock<'a>, PsiError> {
    let len = r.read_u16()? & 0x03FF;
    r.read_descriptors_with_len(len as usize)
}

/// 8ビットの長さに続く複数文字列構造を読み取る。
fn read_text<'a>(r: &mut Reader<'a>) -> Result<MultipleString<'a>, PsiError> {
    let len = r.read_u8()?;
    MultipleString::read(r.read_bytes(len as usize)?)
}

/// MGTを受信した伝送路。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PsipTransmission {
    /// 地上波。
    Terrestrial,
    /// ケーブル。
    Cable,
}

/// MGTで定義されるテーブル。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgtTable<'a> {
    /// テーブル種別。
    pub table_type: u16,
    /// テーブルが伝送されるPID。
    pub table_type_pid: Pid,
    /// テーブルのバージョン番号（5ビット）。
    pub table_type_version_number: u8,
    /// テーブルの総バイト数。
    pub number_bytes: u32,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

/// MGT（Master Guide Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mgt<'a> {
    /// PSIPヘッダ。
    pub header: PsipHeader,
    /// テーブルを格納する配列。要素数は`tables_defined`と等しい。
    pub tables: Vec<MgtTable<'a>>,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> Mgt<'a> {
    /// MGTのテーブルID。
    pub const TABLE_ID: u8 = 0xC7;

    /// 伝送路ごとに必ず定義されるテーブルを除いたテーブル数を返す。
    ///
    /// 地上波ではTVCT・チャンネルETT・EIT-0～3の6つ、ケーブルではCVCTとチャンネルETTの2つを差し引く。
    pub fn tables_defined_adjusted(&self, transmission: PsipTransmission) -> usize {
        let mandatory = match transmission {
            PsipTransmission::Terrestrial => 6,
            PsipTransmission::Cable => 2,
        };
        self.tables.len().saturating_sub(mandatory)
    }
}

impl<'a> PsiTable<'a> for Mgt<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Mgt<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let (header, mut r) = read_psip(psi)?;

        let tables_defined = r.read_u16()?;
        // 1テーブル当たり最低11バイト
        if tables_defined as usize * 11 > r.remaining() {
            log::debug!("invalid Mgt::tables_defined");
            return Err(PsiError::TruncatedData);
        }

        let mut tables = Vec::with_capacity(tables_defined as usize);
        for _ in 0..tables_defined {
            let table_type = r.read_u16()?;
            let table_type_pid = Pid::read(r.read_bytes(2)?);
            let table_type_version_number = r.read_u8()? & 0b00011111;
            let number_bytes = r.read_u32()?;
            let descriptors = r.read_descriptors()?;

            tables.push(MgtTable {
                table_type,
                table_type_pid,
                table_type_version_number,
                number_bytes,
                descriptors,
            });
        }
        let descriptors = r.read_descriptors()?;
        r.finish()?;

        Ok(Mgt {
            header,
            tables,
            descriptors,
        })
    }
}

/// VCTの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VctKind {
    /// 地上波（TVCT）。
    Terrestrial,
    /// ケーブル（CVCT）。
    Cable,
}

/// VCTにおける仮想チャンネル。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualChannel<'a> {
    /// 短いチャンネル名。
    pub short_name: String,
    /// メジャーチャンネル番号（10ビット）。
    pub major_channel_number: u16,
    /// マイナーチャンネル番号（10ビット）。
    pub minor_channel_number: u16,
    /// 変調方式。
    pub modulation_mode: u8,
    /// 搬送波周波数（Hz）。
    pub carrier_frequency: u32,
    /// チャンネルが伝送されるトランスポートストリーム識別。
    pub channel_tsid: u16,
    /// 放送番組番号識別。
    pub program_number: u16,
    /// ETMの位置（2ビット）。
    pub etm_location: u8,
    /// 限定受信。
    pub access_controlled: bool,
    /// 非表示。
    pub hidden: bool,
    /// 伝送路選択（CVCTのみ）。
    pub path_select: bool,
    /// 帯域外伝送（CVCTのみ）。
    pub out_of_band: bool,
    /// 番組表からの非表示。
    pub hide_guide: bool,
    /// サービス種別（6ビット）。
    pub service_type: u8,
    /// ソース識別。
    pub source_id: u16,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

/// VCT（Virtual Channel Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vct<'a> {
    /// TVCTかCVCTか。
    pub kind: VctKind,
    /// PSIPヘッダ。テーブル識別拡張はトランスポートストリーム識別。
    pub header: PsipHeader,
    /// 仮想チャンネルを格納する配列。
    pub channels: Vec<VirtualChannel<'a>>,
    /// 追加記述子の塊。
    pub additional_descriptors: DescriptorBlock<'a>,
}

impl<'a> Vct<'a> {
    /// TVCTのテーブルID。
    pub const TABLE_ID_TERRESTRIAL: u8 = 0xC8;
    /// CVCTのテーブルID。
    pub const TABLE_ID_CABLE: u8 = 0xC9;

    /// トランスポートストリーム識別を返す。
    #[inline]
    pub fn transport_stream_id(&self) -> u16 {
        self.header.table_id_extension
    }
}

impl<'a> PsiTable<'a> for Vct<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Vct<'a>, PsiError> {
        let table_id =
            psi.expect_table_id([Self::TABLE_ID_TERRESTRIAL, Self::TABLE_ID_CABLE])?;
        let kind = if table_id == Self::TABLE_ID_TERRESTRIAL {
            VctKind::Terrestrial
        } else {
            VctKind::Cable
        };
        let (header, mut r) = read_psip(psi)?;

        let num_channels_in_section = r.read_u8()?;
        let mut channels = Vec::with_capacity(num_channels_in_section as usize);
        for _ in 0..num_channels_in_section {
            let name = r.read_array::<14>()?;
            let units = name.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
            let short_name: String = char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .take_while(|&c| c != '\0')
                .collect();

            let numbers = r.read_u24()?;
            let modulation_mode = r.read_u8()?;
            let carrier_frequency = r.read_u32()?;
            let channel_tsid = r.read_u16()?;
            let program_number = r.read_u16()?;
            let flags = r.read_u16()?;
            let source_id = r.read_u16()?;
            let descriptors = read_descriptors_10(&mut r)?;

            channels.push(VirtualChannel {
                short_name,
                major_channel_number: ((numbers >> 10) & 0x03FF) as u16,
                minor_channel_number: (numbers & 0x03FF) as u16,
                modulation_mode,
                carrier_frequency,
                channel_tsid,
                program_number,
                etm_location: (flags >> 14) as u8,
                access_controlled: flags & 0x2000 != 0,
                hidden: flags & 0x1000 != 0,
                path_select: kind == VctKind::Cable && flags & 0x0800 != 0,
                out_of_band: kind == VctKind::Cable && flags & 0x0400 != 0,
                hide_guide: flags & 0x0200 != 0,
                service_type: (flags & 0x003F) as u8,
                source_id,
                descriptors,
            });
        }
        let additional_descriptors = read_descriptors_10(&mut r)?;
        r.finish()?;

        Ok(Vct {
            kind,
            header,
            channels,
            additional_descriptors,
        })
    }
}

/// RRTにおける評価値。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingValue<'a> {
    /// 略称。
    pub abbrev_rating_value: MultipleString<'a>,
    /// 評価値の名前。
    pub rating_value: MultipleString<'a>,
}

/// RRTにおける評価次元。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingDimension<'a> {
    /// 次元の名前。
    pub dimension_name: MultipleString<'a>,
    /// 段階的な尺度かどうか。
    pub graduated_scale: bool,
    /// 評価値を格納する配列。
    pub values: Vec<RatingValue<'a>>,
}

/// RRT（Rating Region Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rrt<'a> {
    /// PSIPヘッダ。テーブル識別拡張の下位8ビットは評価地域。
    pub header: PsipHeader,
    /// 評価地域の名前。
    pub rating_region_name: MultipleString<'a>,
    /// 評価次元を格納する配列。
    pub dimensions: Vec<RatingDimension<'a>>,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> Rrt<'a> {
    /// RRTのテーブルID。
    pub const TABLE_ID: u8 = 0xCA;

    /// 評価地域を返す。
    #[inline]
    pub fn rating_region(&self) -> u8 {
        self.header.table_id_extension as u8
    }
}

impl<'a> PsiTable<'a> for Rrt<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Rrt<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let (header, mut r) = read_psip(psi)?;

        let rating_region_name = read_text(&mut r)?;
        let dimensions_defined = r.read_u8()?;
        let mut dimensions = Vec::with_capacity(dimensions_defined as usize);
        for _ in 0..dimensions_defined {
            let dimension_name = read_text(&mut r)?;
            let b = r.read_u8()?;
            let values_defined = b & 0x0F;

            let mut values = Vec::with_capacity(values_defined as usize);
            for _ in 0..values_defined {
                let abbrev_rating_value = read_text(&mut r)?;
                let rating_value = read_text(&mut r)?;
                values.push(RatingValue {
                    abbrev_rating_value,
                    rating_value,
                });
            }

            dimensions.push(RatingDimension {
                dimension_name,
                graduated_scale: b & 0b00010000 != 0,
                values,
            });
        }
        let descriptors = read_descriptors_10(&mut r)?;
        r.finish()?;

        Ok(Rrt {
            header,
            rating_region_name,
            dimensions,
            descriptors,
        })
    }
}

/// ATSC EITのイベント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtscEvent<'a> {
    /// イベント識別（14ビット）。
    pub event_id: u16,
    /// 開始時間。
    pub start_time: GpsTime,
    /// ETMの位置（2ビット）。
    pub etm_location: u8,
    /// 継続時間（秒、20ビット）。
    pub length_in_seconds: u32,
    /// 番組名。
    pub title: MultipleString<'a>,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

/// ATSC EIT（Event Information Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtscEit<'a> {
    /// PSIPヘッダ。テーブル識別拡張はソース識別。
    pub header: PsipHeader,
    /// イベントを格納する配列。
    pub events: Vec<AtscEvent<'a>>,
}

impl<'a> AtscEit<'a> {
    /// ATSC EITのテーブルID。
    pub const TABLE_ID: u8 = 0xCB;

    /// ソース識別を返す。
    #[inline]
    pub fn source_id(&self) -> u16 {
        self.header.table_id_extension
    }
}

impl<'a> PsiTable<'a> for AtscEit<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<AtscEit<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let (header, mut r) = read_psip(psi)?;

        let num_events_in_section = r.read_u8()?;
        let mut events = Vec::with_capacity(num_events_in_section as usize);
        for _ in 0..num_events_in_section {
            let event_id = r.read_u16()? & 0x3FFF;
            let start_time = GpsTime(r.read_u32()?);
            let length = r.read_u24()?;
            let title = read_text(&mut r)?;
            let descriptors = r.read_descriptors()?;

            events.push(AtscEvent {
                event_id,
                start_time,
                etm_location: ((length >> 20) & 0b11) as u8,
                length_in_seconds: length & 0x000F_FFFF,
                title,
                descriptors,
            });
        }
        r.finish()?;

        Ok(AtscEit { header, events })
    }
}

/// ETT（Extended Text Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ett<'a> {
    /// PSIPヘッダ。
    pub header: PsipHeader,
    /// ETM識別。上位16ビットがソース識別、続く14ビットがイベント識別。
    pub etm_id: u32,
    /// 拡張テキスト。
    pub extended_text_message: MultipleString<'a>,
}

impl<'a> Ett<'a> {
    /// ETTのテーブルID。
    pub const TABLE_ID: u8 = 0xCC;

    /// ETM識別のソース識別部分を返す。
    #[inline]
    pub fn source_id(&self) -> u16 {
        (self.etm_id >> 16) as u16
    }

    /// ETM識別がイベントを指す場合はイベント識別を返す。
    #[inline]
    pub fn event_id(&self) -> Option<u16> {
        (self.etm_id & 0b10 != 0).then(|| ((self.etm_id >> 2) & 0x3FFF) as u16)
    }
}

impl<'a> PsiTable<'a> for Ett<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Ett<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let (header, mut r) = read_psip(psi)?;

        let etm_id = r.read_u32()?;
        let extended_text_message = MultipleString::read(r.read_rest())?;

        Ok(Ett {
            header,
            etm_id,
            extended_text_message,
        })
    }
}

/// STT（System Time Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stt<'a> {
    /// PSIPヘッダ。
    pub header: PsipHeader,
    /// 現在時刻。
    pub system_time: GpsTime,
    /// GPS・UTC間のうるう秒差。
    pub gps_utc_offset: u8,
    /// 夏時間の状態。
    pub daylight_saving: u16,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> Stt<'a> {
    /// STTのテーブルID。
    pub const TABLE_ID: u8 = 0xCD;

    /// 現在時刻をUnix時間で返す。
    #[inline]
    pub fn to_unix(&self) -> i64 {
        self.system_time.to_unix(self.gps_utc_offset)
    }
}

impl<'a> PsiTable<'a> for Stt<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Stt<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let (header, mut r) = read_psip(psi)?;

        let system_time = GpsTime(r.read_u32()?);
        let gps_utc_offset = r.read_u8()?;
        let daylight_saving = r.read_u16()?;
        let descriptors = DescriptorBlock::new(r.read_rest())?;

        Ok(Stt {
            header,
            system_time,
            gps_utc_offset,
            daylight_saving,
            descriptors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    use crate::psi::desc::atsc::ServiceLocationDescriptor;
    use crate::psi::writer::SectionWriter;

    fn info() -> SectionInfo {
        SectionInfo {
            version_number: 1,
            current_next_indicator: true,
            section_number: 0,
            last_section_number: 0,
        }
    }

    fn assert_prefixes_fail<'a, T: PsiTable<'a>>(section: &'a [u8]) {
        for len in 0..section.len() {
            assert!(T::decode(&section[..len], true).is_err(), "len = {}", len);
        }
    }

    #[test]
    fn test_mgt() {
        let mut w = SectionWriter::extended(Mgt::TABLE_ID, true, 0x0000, &info());
        w.put_u8(0); // protocol_version
        w.put_u16(2);
        // TVCT
        w.put_bytes(&hex!("00 00 FF FB E1 00 00 00 40 F0 00"));
        // EIT-0
        w.put_bytes(&hex!("01 00 FD 00 E3 00 00 01 00 F0 03 80 01 00"));
        w.put_u16(0xF000);
        let section = w.finish().unwrap();

        let mgt = Mgt::decode(&section, true).unwrap();
        assert_eq!(mgt.header.protocol_version, 0);
        assert_eq!(mgt.tables.len(), 2);
        assert_eq!(mgt.tables[0].table_type, 0x0000);
        assert_eq!(mgt.tables[0].table_type_pid, Pid::PSIP);
        assert_eq!(mgt.tables[0].table_type_version_number, 1);
        assert_eq!(mgt.tables[0].number_bytes, 0x40);
        assert_eq!(mgt.tables[1].table_type, 0x0100);
        assert_eq!(mgt.tables[1].table_type_pid, Pid::new(0x1D00));
        assert_eq!(mgt.tables[1].table_type_version_number, 3);
        assert_eq!(mgt.tables[1].descriptors.len(), 3);
        assert!(mgt.descriptors.is_empty());

        assert_eq!(mgt.tables_defined_adjusted(PsipTransmission::Cable), 0);
        assert_eq!(mgt.tables_defined_adjusted(PsipTransmission::Terrestrial), 0);

        assert_prefixes_fail::<Mgt>(&section);
    }

    #[test]
    fn test_mgt_tables_defined_overrun() {
        let mut w = SectionWriter::extended(Mgt::TABLE_ID, true, 0x0000, &info());
        w.put_u8(0);
        w.put_u16(0xFFFF);
        w.put_bytes(&hex!("00 00 FF FB E1 00 00 00 40 F0 00"));
        w.put_u16(0xF000);
        let section = w.finish().unwrap();
        assert_matches!(Mgt::decode(&section, true), Err(PsiError::TruncatedData));
    }

    #[test]
    fn test_tvct() {
        let sld = hex!("A1 0F E0 31 02 02 E0 31 65 6E 67 81 E0 34 65 6E 67");
        let mut w = SectionWriter::extended(Vct::TABLE_ID_TERRESTRIAL, true, 0x0ABC, &info());
        w.put_u8(0);
        w.put_u8(1);
        w.put_bytes(&hex!("00 57 00 41 00 54 00 43 00 00 00 00 00 00"));
        // major 7, minor 1
        w.put_u24(0xF0_1C01);
        w.put_u8(0x04);
        w.put_u32(177_000_000);
        w.put_u16(0x0ABC);
        w.put_u16(3);
        // ETM_location 1, access_controlled 0, hidden 0, hide_guide 0, service_type 2
        w.put_u16(0x4DC2);
        w.put_u16(0x0010);
        w.put_u16(0xFC00 | sld.len() as u16);
        w.put_bytes(&sld);
        w.put_u16(0xFC00);
        let section = w.finish().unwrap();

        let vct = Vct::decode(&section, true).unwrap();
        assert_eq!(vct.kind, VctKind::Terrestrial);
        assert_eq!(vct.transport_stream_id(), 0x0ABC);
        let ch = &vct.channels[0];
        assert_eq!(ch.short_name, "WATC");
        assert_eq!(ch.major_channel_number, 7);
        assert_eq!(ch.minor_channel_number, 1);
        assert_eq!(ch.carrier_frequency, 177_000_000);
        assert_eq!(ch.program_number, 3);
        assert_eq!(ch.etm_location, 1);
        assert!(!ch.access_controlled);
        assert!(!ch.hidden);
        assert!(!ch.path_select);
        assert_eq!(ch.service_type, 2);
        assert_eq!(ch.source_id, 0x10);
        let sl = ch.descriptors.get::<ServiceLocationDescriptor>().unwrap().unwrap();
        assert_eq!(sl.elements.len(), 2);

        assert_prefixes_fail::<Vct>(&section);
    }

    #[test]
    fn test_rrt() {
        let mut w = SectionWriter::extended(Rrt::TABLE_ID, true, 0xFF01, &info());
        w.put_u8(0);
        w.put_bytes(&hex!("0C 01 65 6E 67 01 00 00 04 55 53 20 28"));
        w.put_u8(1);
        w.put_bytes(&hex!("0A 01 65 6E 67 01 00 00 02 54 56"));
        w.put_u8(0xF1);
        w.put_bytes(&hex!("00"));
        w.put_bytes(&hex!("0C 01 65 6E 67 01 00 00 04 54 56 2D 47"));
        w.put_u16(0xFC00);
        let section = w.finish().unwrap();

        let rrt = Rrt::decode(&section, true).unwrap();
        assert_eq!(rrt.rating_region(), 1);
        assert_eq!(rrt.rating_region_name.strings[0].to_string(), "US (");
        assert_eq!(rrt.dimensions.len(), 1);
        assert!(rrt.dimensions[0].graduated_scale);
        assert_eq!(rrt.dimensions[0].dimension_name.strings[0].to_string(), "TV");
        let value = &rrt.dimensions[0].values[0];
        assert!(value.abbrev_rating_value.strings.is_empty());
        assert_eq!(value.rating_value.strings[0].to_string(), "TV-G");

        assert_prefixes_fail::<Rrt>(&section);
    }

    #[test]
    fn test_atsc_eit() {
        let mut w = SectionWriter::extended(AtscEit::TABLE_ID, true, 0x0010, &info());
        w.put_u8(0);
        w.put_u8(1);
        w.put_u16(0xC123);
        w.put_u32(1_000_000_000);
        // ETM_location 1, 3600秒
        w.put_u24(0xD0_0E10);
        w.put_bytes(&hex!("0C 01 65 6E 67 01 00 00 04 4E 65 77 73"));
        w.put_u16(0xF000);
        let section = w.finish().unwrap();

        let eit = AtscEit::decode(&section, true).unwrap();
        assert_eq!(eit.source_id(), 0x10);
        let event = &eit.events[0];
        assert_eq!(event.event_id, 0x0123);
        assert_eq!(event.start_time, GpsTime(1_000_000_000));
        assert_eq!(event.etm_location, 1);
        assert_eq!(event.length_in_seconds, 3600);
        assert_eq!(event.title.strings[0].to_string(), "News");

        assert_prefixes_fail::<AtscEit>(&section);
    }

    #[test]
    fn test_ett() {
        let mut w = SectionWriter::extended(Ett::TABLE_ID, true, 0x0000, &info());
        w.put_u8(0);
        w.put_u32(0x0010_048E);
        w.put_bytes(&hex!("01 65 6E 67 01 00 00 05 48 65 6C 6C 6F"));
        let section = w.finish().unwrap();

        let ett = Ett::decode(&section, true).unwrap();
        assert_eq!(ett.source_id(), 0x10);
        assert_eq!(ett.event_id(), Some(0x0123));
        assert_eq!(ett.extended_text_message.strings[0].to_string(), "Hello");
    }

    #[test]
    fn test_stt() {
        let mut w = SectionWriter::extended(Stt::TABLE_ID, true, 0x0000, &info());
        w.put_u8(0);
        w.put_u32(0);
        w.put_u8(0);
        w.put_u16(0x6000);
        let section = w.finish().unwrap();

        let stt = Stt::decode(&section, true).unwrap();
        assert_eq!(stt.system_time, GpsTime(0));
        // 1980-01-06 00:00:00 UTC
        assert_eq!(stt.to_unix(), 315_964_800);
        assert!(stt.descriptors.is_empty());

        assert_prefixes_fail::<Stt>(&section);
    }
}
