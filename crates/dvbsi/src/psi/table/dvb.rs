//! EN 300 468で規定されるテーブルと関連する型の定義。

use crate::psi::desc::DescriptorBlock;
use crate::psi::writer::SectionWriter;
use crate::psi::{PsiError, PsiSection, PsiTable, SectionInfo};
use crate::reader::Reader;
use crate::time::{read_bcd_duration, to_bcd_duration, DateTime};

/// 進行状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunningStatus {
    /// 未定義。
    Undefined,
    /// 非実行中。
    NotRunning,
    /// 数秒以内に開始（例：映像記録用）。
    StartsSoon,
    /// 停止中。
    Pausing,
    /// 実行中。
    Running,
    /// サービスが休止中。
    OffAir,
    /// 予約。
    Reserved(u8),
}

impl From<u8> for RunningStatus {
    #[inline]
    fn from(value: u8) -> RunningStatus {
        match value {
            0 => RunningStatus::Undefined,
            1 => RunningStatus::NotRunning,
            2 => RunningStatus::StartsSoon,
            3 => RunningStatus::Pausing,
            4 => RunningStatus::Running,
            5 => RunningStatus::OffAir,
            v => RunningStatus::Reserved(v),
        }
    }
}

impl From<RunningStatus> for u8 {
    #[inline]
    fn from(value: RunningStatus) -> u8 {
        match value {
            RunningStatus::Undefined => 0,
            RunningStatus::NotRunning => 1,
            RunningStatus::StartsSoon => 2,
            RunningStatus::Pausing => 3,
            RunningStatus::Running => 4,
            RunningStatus::OffAir => 5,
            RunningStatus::Reserved(v) => v & 0b111,
        }
    }
}

/// 進行状態（3ビット）・スクランブル（1ビット）・12ビットの長さに続く記述子群を読み取る。
fn read_status_and_descriptors<'a>(
    r: &mut Reader<'a>,
) -> Result<(RunningStatus, bool, DescriptorBlock<'a>), PsiError> {
    let status = r.peek_u8()?;
    let running_status = RunningStatus::from(status >> 5);
    let free_ca_mode = status & 0b00010000 != 0;
    let descriptors = r.read_descriptors()?;
    Ok((running_status, free_ca_mode, descriptors))
}

/// 進行状態・スクランブル・記述子群を書き込む。
fn write_status_and_descriptors(
    w: &mut SectionWriter,
    running_status: RunningStatus,
    free_ca_mode: bool,
    descriptors: &DescriptorBlock,
) -> Result<(), PsiError> {
    let len = descriptors.len();
    if len > 0x0FFF {
        return Err(PsiError::LengthMismatch);
    }
    let status = u8::from(running_status) << 5 | (free_ca_mode as u8) << 4;
    w.put_u16((status as u16) << 8 | len as u16);
    w.put_bytes(descriptors.as_bytes());
    Ok(())
}

/// トランスポートストリームの物理的構成に関する情報。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStreamConfig<'a> {
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// オリジナルネットワーク識別。
    pub original_network_id: u16,
    /// トランスポート記述子の塊。
    pub transport_descriptors: DescriptorBlock<'a>,
}

/// 記述子群に続くトランスポートストリームのループを読み取る。
fn read_transport_streams<'a>(
    r: &mut Reader<'a>,
) -> Result<Vec<TransportStreamConfig<'a>>, PsiError> {
    let transport_stream_loop_length = r.read_length_12()?;
    let mut r = r.read_sub(transport_stream_loop_length as usize)?;

    let mut transport_streams = Vec::new();
    while !r.is_empty() {
        let transport_stream_id = r.read_u16()?;
        let original_network_id = r.read_u16()?;
        let transport_descriptors = r.read_descriptors()?;

        transport_streams.push(TransportStreamConfig {
            transport_stream_id,
            original_network_id,
            transport_descriptors,
        });
    }

    Ok(transport_streams)
}

fn write_transport_streams(
    w: &mut SectionWriter,
    transport_streams: &[TransportStreamConfig],
) -> Result<(), PsiError> {
    let mark = w.begin_length_12();
    for ts in transport_streams {
        w.put_u16(ts.transport_stream_id);
        w.put_u16(ts.original_network_id);
        w.put_descriptors(&ts.transport_descriptors)?;
    }
    w.end_length_12(mark)
}

/// NIT（Network Information Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nit<'a> {
    /// 自ネットワークのNITかどうか。
    pub actual: bool,
    /// ネットワーク識別。
    pub network_id: u16,
    /// セクション情報。
    pub info: SectionInfo,
    /// ネットワーク記述子の塊。
    pub network_descriptors: DescriptorBlock<'a>,
    /// TSの物理的構成を格納する配列。
    pub transport_streams: Vec<TransportStreamConfig<'a>>,
}

impl<'a> Nit<'a> {
    /// 自ネットワークにおけるNITのテーブルID。
    pub const TABLE_ID_ACTUAL: u8 = 0x40;
    /// 他ネットワークにおけるNITのテーブルID。
    pub const TABLE_ID_OTHER: u8 = 0x41;

    /// セクションとして書き込む。
    pub fn write(&self) -> Result<Vec<u8>, PsiError> {
        let table_id = if self.actual {
            Self::TABLE_ID_ACTUAL
        } else {
            Self::TABLE_ID_OTHER
        };
        let mut w = SectionWriter::extended(table_id, true, self.network_id, &self.info);
        w.put_descriptors(&self.network_descriptors)?;
        write_transport_streams(&mut w, &self.transport_streams)?;
        w.finish()
    }
}

impl<'a> PsiTable<'a> for Nit<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Nit<'a>, PsiError> {
        let table_id = psi.expect_table_id([Self::TABLE_ID_ACTUAL, Self::TABLE_ID_OTHER])?;
        let syntax = psi.syntax()?;

        let mut r = Reader::new(psi.data);
        let network_descriptors = r.read_descriptors()?;
        let transport_streams = read_transport_streams(&mut r)?;
        r.finish()?;

        Ok(Nit {
            actual: table_id == Self::TABLE_ID_ACTUAL,
            network_id: syntax.table_id_extension,
            info: syntax.info(),
            network_descriptors,
            transport_streams,
        })
    }
}

/// BAT（Bouquet Association Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bat<'a> {
    /// ブーケ識別。
    pub bouquet_id: u16,
    /// セクション情報。
    pub info: SectionInfo,
    /// ブーケ記述子の塊。
    pub bouquet_descriptors: DescriptorBlock<'a>,
    /// TSの物理的構成を格納する配列。
    pub transport_streams: Vec<TransportStreamConfig<'a>>,
}

impl<'a> Bat<'a> {
    /// BATのテーブルID。
    pub const TABLE_ID: u8 = 0x4A;
}

impl<'a> PsiTable<'a> for Bat<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Bat<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let syntax = psi.syntax()?;

        let mut r = Reader::new(psi.data);
        let bouquet_descriptors = r.read_descriptors()?;
        let transport_streams = read_transport_streams(&mut r)?;
        r.finish()?;

        Ok(Bat {
            bouquet_id: syntax.table_id_extension,
            info: syntax.info(),
            bouquet_descriptors,
            transport_streams,
        })
    }
}

/// 特定のトランスポートストリームに含まれるサービス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdtService<'a> {
    /// サービス識別。
    pub service_id: u16,
    /// EIT［スケジュール］フラグ。
    pub eit_schedule_flag: bool,
    /// EIT［現在／次］フラグ。
    pub eit_present_following_flag: bool,
    /// 進行状態。
    pub running_status: RunningStatus,
    /// スクランブル。
    pub free_ca_mode: bool,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

/// SDT（Service Description Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sdt<'a> {
    /// 現在のTSにおけるSDTかどうか。
    pub actual: bool,
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// セクション情報。
    pub info: SectionInfo,
    /// オリジナルネットワーク識別。
    pub original_network_id: u16,
    /// TSのサービスを格納する配列。
    pub services: Vec<SdtService<'a>>,
}

impl<'a> Sdt<'a> {
    /// 現在のTSにおけるSDTのテーブルID。
    pub const TABLE_ID_ACTUAL: u8 = 0x42;
    /// 他のTSにおけるSDTのテーブルID。
    pub const TABLE_ID_OTHER: u8 = 0x46;

    /// セクションとして書き込む。
    pub fn write(&self) -> Result<Vec<u8>, PsiError> {
        let table_id = if self.actual {
            Self::TABLE_ID_ACTUAL
        } else {
            Self::TABLE_ID_OTHER
        };
        let mut w = SectionWriter::extended(table_id, true, self.transport_stream_id, &self.info);
        w.put_u16(self.original_network_id);
        w.put_u8(0xFF);
        for service in &self.services {
            w.put_u16(service.service_id);
            w.put_u8(
                0b11111100
                    | (service.eit_schedule_flag as u8) << 1
                    | service.eit_present_following_flag as u8,
            );
            write_status_and_descriptors(
                &mut w,
                service.running_status,
                service.free_ca_mode,
                &service.descriptors,
            )?;
        }
        w.finish()
    }
}

impl<'a> PsiTable<'a> for Sdt<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Sdt<'a>, PsiError> {
        let table_id = psi.expect_table_id([Self::TABLE_ID_ACTUAL, Self::TABLE_ID_OTHER])?;
        let syntax = psi.syntax()?;

        let mut r = Reader::new(psi.data);
        let original_network_id = r.read_u16()?;
        let _reserved_future_use = r.read_u8()?;

        let mut services = Vec::new();
        while !r.is_empty() {
            let service_id = r.read_u16()?;
            let flags = r.read_u8()?;
            let (running_status, free_ca_mode, descriptors) = read_status_and_descriptors(&mut r)?;

            services.push(SdtService {
                service_id,
                eit_schedule_flag: flags & 0b00000010 != 0,
                eit_present_following_flag: flags & 0b00000001 != 0,
                running_status,
                free_ca_mode,
                descriptors,
            });
        }

        Ok(Sdt {
            actual: table_id == Self::TABLE_ID_ACTUAL,
            transport_stream_id: syntax.table_id_extension,
            info: syntax.info(),
            original_network_id,
            services,
        })
    }
}

/// EITの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EitKind {
    /// 現在のTSにおける現在／次のイベント（0x4E）。
    ActualPresentFollowing,
    /// 他のTSにおける現在／次のイベント（0x4F）。
    OtherPresentFollowing,
    /// 現在のTSにおけるスケジュール（0x50～0x5F）。
    ActualSchedule,
    /// 他のTSにおけるスケジュール（0x60～0x6F）。
    OtherSchedule,
}

impl EitKind {
    /// `table_id`からEITの種類を返す。EITでない場合は`None`を返す。
    pub fn from_table_id(table_id: u8) -> Option<EitKind> {
        match table_id {
            0x4E => Some(EitKind::ActualPresentFollowing),
            0x4F => Some(EitKind::OtherPresentFollowing),
            0x50..=0x5F => Some(EitKind::ActualSchedule),
            0x60..=0x6F => Some(EitKind::OtherSchedule),
            _ => None,
        }
    }

    /// 現在のTSのEITかどうかを返す。
    #[inline]
    pub fn is_actual(self) -> bool {
        matches!(self, EitKind::ActualPresentFollowing | EitKind::ActualSchedule)
    }
}

/// EITのイベント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EitEvent<'a> {
    /// イベント識別。
    pub event_id: u16,
    /// 開始時間。未定義の場合は`None`。
    pub start_time: Option<DateTime>,
    /// 継続時間（秒）。
    pub duration: u32,
    /// 進行状態。
    pub running_status: RunningStatus,
    /// スクランブル。
    pub free_ca_mode: bool,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

/// EIT（Event Information Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eit<'a> {
    /// テーブル識別（0x4E～0x6F）。
    pub table_id: u8,
    /// サービス識別。
    pub service_id: u16,
    /// セクション情報。
    pub info: SectionInfo,
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// オリジナルネットワーク識別。
    pub original_network_id: u16,
    /// セグメント最終セクション番号。
    pub segment_last_section_number: u8,
    /// 最終テーブル識別。
    pub last_table_id: u8,
    /// イベントを格納する配列。
    pub events: Vec<EitEvent<'a>>,
}

impl<'a> Eit<'a> {
    /// EITのテーブルIDの範囲。
    pub const TABLE_IDS: std::ops::RangeInclusive<u8> = 0x4E..=0x6F;

    /// EITの種類を返す。
    #[inline]
    pub fn kind(&self) -> Option<EitKind> {
        EitKind::from_table_id(self.table_id)
    }

    /// セクションとして書き込む。
    pub fn write(&self) -> Result<Vec<u8>, PsiError> {
        if !Self::TABLE_IDS.contains(&self.table_id) {
            return Err(PsiError::UnsupportedTableId(self.table_id));
        }

        let mut w = SectionWriter::extended(self.table_id, true, self.service_id, &self.info);
        w.put_u16(self.transport_stream_id);
        w.put_u16(self.original_network_id);
        w.put_u8(self.segment_last_section_number);
        w.put_u8(self.last_table_id);
        for event in &self.events {
            w.put_u16(event.event_id);
            match &event.start_time {
                Some(start_time) => w.put_bytes(&start_time.to_bytes()),
                None => w.put_bytes(&[0xFF; 5]),
            }
            w.put_bytes(&to_bcd_duration(event.duration));
            write_status_and_descriptors(
                &mut w,
                event.running_status,
                event.free_ca_mode,
                &event.descriptors,
            )?;
        }
        w.finish()
    }
}

impl<'a> PsiTable<'a> for Eit<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Eit<'a>, PsiError> {
        let table_id = psi.expect_table_id(Self::TABLE_IDS)?;
        let syntax = psi.syntax()?;

        let mut r = Reader::new(psi.data);
        let transport_stream_id = r.read_u16()?;
        let original_network_id = r.read_u16()?;
        let segment_last_section_number = r.read_u8()?;
        let last_table_id = r.read_u8()?;

        let mut events = Vec::new();
        while !r.is_empty() {
            let event_id = r.read_u16()?;
            let start_time = r.read_array::<5>()?;
            let start_time = (start_time != [0xFF; 5]).then(|| DateTime::read(&start_time));
            let duration = read_bcd_duration(&r.read_array()?);
            let (running_status, free_ca_mode, descriptors) = read_status_and_descriptors(&mut r)?;

            events.push(EitEvent {
                event_id,
                start_time,
                duration,
                running_status,
                free_ca_mode,
                descriptors,
            });
        }

        Ok(Eit {
            table_id,
            service_id: syntax.table_id_extension,
            info: syntax.info(),
            transport_stream_id,
            original_network_id,
            segment_last_section_number,
            last_table_id,
            events,
        })
    }
}

/// TDT（Time and Date Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tdt {
    /// 現在日付、現在時刻（UTC）。
    pub utc_time: DateTime,
}

impl Tdt {
    /// TDTのテーブルID。
    pub const TABLE_ID: u8 = 0x70;

    /// セクションとして書き込む。
    pub fn write(&self) -> Result<Vec<u8>, PsiError> {
        let mut w = SectionWriter::short(Self::TABLE_ID, true, false);
        w.put_bytes(&self.utc_time.to_bytes());
        w.finish()
    }
}

impl<'a> PsiTable<'a> for Tdt {
    fn read(psi: &PsiSection<'a>) -> Result<Tdt, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;

        let mut r = Reader::new(psi.data);
        let utc_time = DateTime::read(&r.read_array()?);
        r.finish()?;

        Ok(Tdt { utc_time })
    }
}

/// RSTにおけるイベントの進行状態。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RstEntry {
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// オリジナルネットワーク識別。
    pub original_network_id: u16,
    /// サービス識別。
    pub service_id: u16,
    /// イベント識別。
    pub event_id: u16,
    /// 進行状態。
    pub running_status: RunningStatus,
}

/// RST（Running Status Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rst {
    /// 進行状態を格納する配列。
    pub entries: Vec<RstEntry>,
}

impl Rst {
    /// RSTのテーブルID。
    pub const TABLE_ID: u8 = 0x71;
}

impl<'a> PsiTable<'a> for Rst {
    fn read(psi: &PsiSection<'a>) -> Result<Rst, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        if psi.data.len() % 9 != 0 {
            log::debug!("invalid Rst::entries");
            return Err(PsiError::LengthMismatch);
        }

        let mut r = Reader::new(psi.data);
        let mut entries = Vec::with_capacity(psi.data.len() / 9);
        while !r.is_empty() {
            entries.push(RstEntry {
                transport_stream_id: r.read_u16()?,
                original_network_id: r.read_u16()?,
                service_id: r.read_u16()?,
                event_id: r.read_u16()?,
                running_status: RunningStatus::from(r.read_u8()? & 0b111),
            });
        }

        Ok(Rst { entries })
    }
}

/// ST（Stuffing Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct St<'a> {
    /// 詰め込みバイト。
    pub data: &'a [u8],
}

impl<'a> St<'a> {
    /// STのテーブルID。
    pub const TABLE_ID: u8 = 0x72;
}

impl<'a> PsiTable<'a> for St<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<St<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        Ok(St { data: psi.data })
    }
}

/// TOT（Time Offset Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tot<'a> {
    /// 現在日付、現在時刻（UTC）。
    pub utc_time: DateTime,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> Tot<'a> {
    /// TOTのテーブルID。
    pub const TABLE_ID: u8 = 0x73;

    /// セクションとして書き込む。
    pub fn write(&self) -> Result<Vec<u8>, PsiError> {
        let mut w = SectionWriter::short(Self::TABLE_ID, true, true);
        w.put_bytes(&self.utc_time.to_bytes());
        w.put_descriptors(&self.descriptors)?;
        w.finish()
    }
}

impl<'a> PsiTable<'a> for Tot<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Tot<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;

        let mut r = Reader::new(psi.data);
        let utc_time = DateTime::read(&r.read_array()?);
        let descriptors = r.read_descriptors()?;
        r.finish()?;

        Ok(Tot {
            utc_time,
            descriptors,
        })
    }
}

/// DIT（Discontinuity Information Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dit {
    /// 遷移フラグ。
    pub transition_flag: bool,
}

impl Dit {
    /// DITのテーブルID。
    pub const TABLE_ID: u8 = 0x7E;
}

impl<'a> PsiTable<'a> for Dit {
    fn read(psi: &PsiSection<'a>) -> Result<Dit, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;

        let &[b] = psi.data else {
            log::debug!("invalid Dit");
            return Err(PsiError::LengthMismatch);
        };

        Ok(Dit {
            transition_flag: b & 0b10000000 != 0,
        })
    }
}

/// SITにおけるサービス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitService<'a> {
    /// サービス識別。
    pub service_id: u16,
    /// 進行状態。
    pub running_status: RunningStatus,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

/// SIT（Selection Information Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sit<'a> {
    /// セクション情報。
    pub info: SectionInfo,
    /// 伝送情報記述子の塊。
    pub transmission_info_descriptors: DescriptorBlock<'a>,
    /// サービスを格納する配列。
    pub services: Vec<SitService<'a>>,
}

impl<'a> Sit<'a> {
    /// SITのテーブルID。
    pub const TABLE_ID: u8 = 0x7F;
}

impl<'a> PsiTable<'a> for Sit<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Sit<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let syntax = psi.syntax()?;

        let mut r = Reader::new(psi.data);
        let transmission_info_descriptors = r.read_descriptors()?;

        let mut services = Vec::new();
        while !r.is_empty() {
            let service_id = r.read_u16()?;
            let running_status = RunningStatus::from((r.peek_u8()? & 0b01110000) >> 4);
            let descriptors = r.read_descriptors()?;
            services.push(SitService {
                service_id,
                running_status,
                descriptors,
            });
        }

        Ok(Sit {
            info: syntax.info(),
            transmission_info_descriptors,
            services,
        })
    }
}
