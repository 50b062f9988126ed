//! EN 300 468で規定される記述子および関連する型の定義。

use crate::lang::LangCode;
use crate::psi::PsiError;
use crate::reader::Reader;
use crate::text::DvbStr;
use crate::time::{read_bcd_hhmm, DateTime};
use crate::utils::BytesExt;

use super::base::Descriptor;

/// 記述子の内容を`buf`に書き込む。
///
/// 内容が255バイトを超える場合は[`PsiError::InvalidValue`]を返す。
fn write_descriptor(
    buf: &mut Vec<u8>,
    tag: u8,
    f: impl FnOnce(&mut Vec<u8>),
) -> Result<(), PsiError> {
    let start = buf.len();
    buf.extend_from_slice(&[tag, 0]);
    f(buf);

    let len = buf.len() - start - 2;
    let Ok(len) = u8::try_from(len) else {
        buf.truncate(start);
        return Err(PsiError::InvalidValue("descriptor_length"));
    };
    buf[start + 1] = len;
    Ok(())
}

/// 長さ1バイトに続く文字列を書き込む。
fn put_str(buf: &mut Vec<u8>, s: &DvbStr) {
    // 記述子全体の長さで弾かれるため、ここでは切り詰めるだけ
    let bytes = &s.as_bytes()[..s.len().min(0xFF)];
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
}

/// サービス形式種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceType(pub u8);

impl ServiceType {
    /// デジタルテレビジョンサービス。
    pub const DIGITAL_TV: ServiceType = ServiceType(0x01);
    /// デジタルラジオサービス。
    pub const DIGITAL_RADIO: ServiceType = ServiceType(0x02);
    /// テレテキストサービス。
    pub const TELETEXT: ServiceType = ServiceType(0x03);
    /// NVOD参照サービス。
    pub const NVOD_REFERENCE: ServiceType = ServiceType(0x04);
    /// NVODタイムシフトサービス。
    pub const NVOD_TIME_SHIFTED: ServiceType = ServiceType(0x05);
    /// モザイクサービス。
    pub const MOSAIC: ServiceType = ServiceType(0x06);
    /// データ放送サービス。
    pub const DATA_BROADCAST: ServiceType = ServiceType(0x0C);
    /// MPEG-2 HDデジタルテレビジョンサービス。
    pub const MPEG2_HD_TV: ServiceType = ServiceType(0x11);
    /// H.264/AVC SDデジタルテレビジョンサービス。
    pub const AVC_SD_TV: ServiceType = ServiceType(0x16);
    /// H.264/AVC HDデジタルテレビジョンサービス。
    pub const AVC_HD_TV: ServiceType = ServiceType(0x19);
    /// HEVCデジタルテレビジョンサービス。
    pub const HEVC_TV: ServiceType = ServiceType(0x1F);

    /// テレビジョンサービスかどうかを返す。
    #[inline]
    pub fn is_tv(&self) -> bool {
        matches!(self.0, 0x01 | 0x11 | 0x16 | 0x19 | 0x1F)
    }
}

/// ネットワーク名記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkNameDescriptor<'a> {
    /// ネットワーク名。
    pub network_name: &'a DvbStr,
}

impl<'a> Descriptor<'a> for NetworkNameDescriptor<'a> {
    const TAG: u8 = 0x40;

    fn read(data: &'a [u8]) -> Result<NetworkNameDescriptor<'a>, PsiError> {
        Ok(NetworkNameDescriptor {
            network_name: DvbStr::from_bytes(data),
        })
    }
}

/// サービスリスト記述子におけるサービス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    /// サービス識別。
    pub service_id: u16,
    /// サービス形式種別。
    pub service_type: ServiceType,
}

/// サービスリスト記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceListDescriptor {
    /// サービスを格納する配列。
    pub services: Vec<ServiceEntry>,
}

impl Descriptor<'_> for ServiceListDescriptor {
    const TAG: u8 = 0x41;

    fn read(data: &[u8]) -> Result<ServiceListDescriptor, PsiError> {
        if data.len() % 3 != 0 {
            log::debug!("invalid ServiceListDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        let services = data
            .chunks_exact(3)
            .map(|chunk| ServiceEntry {
                service_id: chunk[0..=1].read_be_16(),
                service_type: ServiceType(chunk[2]),
            })
            .collect();

        Ok(ServiceListDescriptor { services })
    }
}

/// 偏波。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Polarization {
    /// 水平。
    LinearHorizontal,
    /// 垂直。
    LinearVertical,
    /// 左旋。
    CircularLeft,
    /// 右旋。
    CircularRight,
}

/// 衛星分配システム記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatelliteDeliverySystemDescriptor {
    /// 周波数（単位は10kHz）。
    pub frequency: u32,
    /// 軌道（単位は0.1度）。
    pub orbital_position: u16,
    /// 東経西経フラグ（`true`で東経）。
    pub west_east_flag: bool,
    /// 偏波。
    pub polarization: Polarization,
    /// ロールオフ率（2ビット、DVB-S2のみ）。
    pub roll_off: u8,
    /// 変調方式（`false`でDVB-S、`true`でDVB-S2）。
    pub modulation_system: bool,
    /// 変調（2ビット）。
    pub modulation_type: u8,
    /// シンボルレート（単位は100シンボル毎秒）。
    pub symbol_rate: u32,
    /// FEC（内符号、4ビット）。
    pub fec_inner: u8,
}

impl Descriptor<'_> for SatelliteDeliverySystemDescriptor {
    const TAG: u8 = 0x43;

    fn read(data: &[u8]) -> Result<SatelliteDeliverySystemDescriptor, PsiError> {
        if data.len() != 11 {
            log::debug!("invalid SatelliteDeliverySystemDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        let frequency = data[0..=3].read_bcd(8);
        let orbital_position = data[4..=5].read_bcd(4) as u16;
        let west_east_flag = data[6] & 0b10000000 != 0;
        let polarization = match (data[6] & 0b01100000) >> 5 {
            0b00 => Polarization::LinearHorizontal,
            0b01 => Polarization::LinearVertical,
            0b10 => Polarization::CircularLeft,
            _ => Polarization::CircularRight,
        };
        let roll_off = (data[6] & 0b00011000) >> 3;
        let modulation_system = data[6] & 0b00000100 != 0;
        let modulation_type = data[6] & 0b00000011;
        let symbol_rate = data[7..=10].read_bcd(7);
        let fec_inner = data[10] & 0b00001111;

        Ok(SatelliteDeliverySystemDescriptor {
            frequency,
            orbital_position,
            west_east_flag,
            polarization,
            roll_off,
            modulation_system,
            modulation_type,
            symbol_rate,
            fec_inner,
        })
    }
}

/// ケーブル分配システム記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CableDeliverySystemDescriptor {
    /// 周波数（単位は100Hz）。
    pub frequency: u32,
    /// FEC（外符号、4ビット）。
    pub fec_outer: u8,
    /// 変調（1＝16QAM～5＝256QAM）。
    pub modulation: u8,
    /// シンボルレート（単位は100シンボル毎秒）。
    pub symbol_rate: u32,
    /// FEC（内符号、4ビット）。
    pub fec_inner: u8,
}

impl Descriptor<'_> for CableDeliverySystemDescriptor {
    const TAG: u8 = 0x44;

    fn read(data: &[u8]) -> Result<CableDeliverySystemDescriptor, PsiError> {
        if data.len() != 11 {
            log::debug!("invalid CableDeliverySystemDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        Ok(CableDeliverySystemDescriptor {
            frequency: data[0..=3].read_bcd(8),
            fec_outer: data[5] & 0b00001111,
            modulation: data[6],
            symbol_rate: data[7..=10].read_bcd(7),
            fec_inner: data[10] & 0b00001111,
        })
    }
}

/// ブーケ名記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BouquetNameDescriptor<'a> {
    /// ブーケ名。
    pub bouquet_name: &'a DvbStr,
}

impl<'a> Descriptor<'a> for BouquetNameDescriptor<'a> {
    const TAG: u8 = 0x47;

    fn read(data: &'a [u8]) -> Result<BouquetNameDescriptor<'a>, PsiError> {
        Ok(BouquetNameDescriptor {
            bouquet_name: DvbStr::from_bytes(data),
        })
    }
}

/// サービス記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor<'a> {
    /// サービス形式種別。
    pub service_type: ServiceType,
    /// 事業者名。
    pub service_provider_name: &'a DvbStr,
    /// サービス名。
    pub service_name: &'a DvbStr,
}

impl<'a> ServiceDescriptor<'a> {
    /// タグと長さを含めて`buf`に書き込む。
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<(), PsiError> {
        write_descriptor(buf, Self::TAG, |buf| {
            buf.push(self.service_type.0);
            put_str(buf, self.service_provider_name);
            put_str(buf, self.service_name);
        })
    }
}

impl<'a> Descriptor<'a> for ServiceDescriptor<'a> {
    const TAG: u8 = 0x48;

    fn read(data: &'a [u8]) -> Result<ServiceDescriptor<'a>, PsiError> {
        let mut r = Reader::new(data);
        let service_type = ServiceType(r.read_u8()?);
        let len = r.read_u8()?;
        let service_provider_name = DvbStr::from_bytes(r.read_bytes(len as usize)?);
        let len = r.read_u8()?;
        let service_name = DvbStr::from_bytes(r.read_bytes(len as usize)?);
        r.finish()?;

        Ok(ServiceDescriptor {
            service_type,
            service_provider_name,
            service_name,
        })
    }
}

/// リンク記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkageDescriptor<'a> {
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// オリジナルネットワーク識別。
    pub original_network_id: u16,
    /// サービス識別。
    pub service_id: u16,
    /// リンク種別。
    pub linkage_type: u8,
    /// プライベートデータ。
    pub private_data: &'a [u8],
}

impl<'a> Descriptor<'a> for LinkageDescriptor<'a> {
    const TAG: u8 = 0x4A;

    fn read(data: &'a [u8]) -> Result<LinkageDescriptor<'a>, PsiError> {
        if data.len() < 7 {
            log::debug!("invalid LinkageDescriptor");
            return Err(PsiError::TruncatedData);
        }

        Ok(LinkageDescriptor {
            transport_stream_id: data[0..=1].read_be_16(),
            original_network_id: data[2..=3].read_be_16(),
            service_id: data[4..=5].read_be_16(),
            linkage_type: data[6],
            private_data: &data[7..],
        })
    }
}

/// 短形式イベント記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortEventDescriptor<'a> {
    /// 言語コード。
    pub lang_code: LangCode,
    /// 番組名。
    pub event_name: &'a DvbStr,
    /// 番組記述。
    pub text: &'a DvbStr,
}

impl<'a> ShortEventDescriptor<'a> {
    /// タグと長さを含めて`buf`に書き込む。
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<(), PsiError> {
        write_descriptor(buf, Self::TAG, |buf| {
            buf.extend_from_slice(&self.lang_code.0);
            put_str(buf, self.event_name);
            put_str(buf, self.text);
        })
    }
}

impl<'a> Descriptor<'a> for ShortEventDescriptor<'a> {
    const TAG: u8 = 0x4D;

    fn read(data: &'a [u8]) -> Result<ShortEventDescriptor<'a>, PsiError> {
        let mut r = Reader::new(data);
        let lang_code = LangCode(r.read_array()?);
        let len = r.read_u8()?;
        let event_name = DvbStr::from_bytes(r.read_bytes(len as usize)?);
        let len = r.read_u8()?;
        let text = DvbStr::from_bytes(r.read_bytes(len as usize)?);
        r.finish()?;

        Ok(ShortEventDescriptor {
            lang_code,
            event_name,
            text,
        })
    }
}

/// 拡張形式イベント記述子における項目。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedEventItem<'a> {
    /// 項目名。
    pub item_description: &'a DvbStr,
    /// 項目記述。
    pub item: &'a DvbStr,
}

/// 拡張形式イベント記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedEventDescriptor<'a> {
    /// 記述子番号（4ビット）。
    pub descriptor_number: u8,
    /// 最終記述子番号（4ビット）。
    pub last_descriptor_number: u8,
    /// 言語コード。
    pub lang_code: LangCode,
    /// 項目を格納する配列。
    pub items: Vec<ExtendedEventItem<'a>>,
    /// 拡張記述。
    pub text: &'a DvbStr,
}

impl<'a> Descriptor<'a> for ExtendedEventDescriptor<'a> {
    const TAG: u8 = 0x4E;

    fn read(data: &'a [u8]) -> Result<ExtendedEventDescriptor<'a>, PsiError> {
        let mut r = Reader::new(data);
        let numbers = r.read_u8()?;
        let lang_code = LangCode(r.read_array()?);

        let length_of_items = r.read_u8()?;
        let mut items_reader = r.read_sub(length_of_items as usize)?;
        let mut items = Vec::new();
        while !items_reader.is_empty() {
            let len = items_reader.read_u8()?;
            let item_description = DvbStr::from_bytes(items_reader.read_bytes(len as usize)?);
            let len = items_reader.read_u8()?;
            let item = DvbStr::from_bytes(items_reader.read_bytes(len as usize)?);
            items.push(ExtendedEventItem {
                item_description,
                item,
            });
        }

        let len = r.read_u8()?;
        let text = DvbStr::from_bytes(r.read_bytes(len as usize)?);
        r.finish()?;

        Ok(ExtendedEventDescriptor {
            descriptor_number: numbers >> 4,
            last_descriptor_number: numbers & 0x0F,
            lang_code,
            items,
            text,
        })
    }
}

/// コンポーネント記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor<'a> {
    /// コンポーネント内容拡張（4ビット）。
    pub stream_content_ext: u8,
    /// コンポーネント内容（4ビット）。
    pub stream_content: u8,
    /// コンポーネント種別。
    pub component_type: u8,
    /// コンポーネントタグ。
    pub component_tag: u8,
    /// 言語コード。
    pub lang_code: LangCode,
    /// コンポーネント記述。
    pub text: &'a DvbStr,
}

impl<'a> Descriptor<'a> for ComponentDescriptor<'a> {
    const TAG: u8 = 0x50;

    fn read(data: &'a [u8]) -> Result<ComponentDescriptor<'a>, PsiError> {
        if data.len() < 6 {
            log::debug!("invalid ComponentDescriptor");
            return Err(PsiError::TruncatedData);
        }

        Ok(ComponentDescriptor {
            stream_content_ext: data[0] >> 4,
            stream_content: data[0] & 0x0F,
            component_type: data[1],
            component_tag: data[2],
            lang_code: LangCode([data[3], data[4], data[5]]),
            text: DvbStr::from_bytes(&data[6..]),
        })
    }
}

/// ストリーム識別記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamIdentifierDescriptor {
    /// コンポーネントタグ。
    pub component_tag: u8,
}

impl Descriptor<'_> for StreamIdentifierDescriptor {
    const TAG: u8 = 0x52;

    fn read(data: &[u8]) -> Result<StreamIdentifierDescriptor, PsiError> {
        let &[component_tag] = data else {
            log::debug!("invalid StreamIdentifierDescriptor");
            return Err(PsiError::LengthMismatch);
        };

        Ok(StreamIdentifierDescriptor { component_tag })
    }
}

/// CA識別記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaIdentifierDescriptor {
    /// 限定受信方式識別を格納する配列。
    pub ca_system_ids: Vec<u16>,
}

impl Descriptor<'_> for CaIdentifierDescriptor {
    const TAG: u8 = 0x53;

    fn read(data: &[u8]) -> Result<CaIdentifierDescriptor, PsiError> {
        if data.len() % 2 != 0 {
            log::debug!("invalid CaIdentifierDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        let ca_system_ids = data.chunks_exact(2).map(<[u8]>::read_be_16).collect();
        Ok(CaIdentifierDescriptor { ca_system_ids })
    }
}

/// コンテント記述子におけるジャンル。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentGenre {
    /// ジャンル1（4ビット）。
    pub content_nibble_level_1: u8,
    /// ジャンル2（4ビット）。
    pub content_nibble_level_2: u8,
    /// ユーザージャンル。
    pub user_byte: u8,
}

/// コンテント記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor {
    /// ジャンルを格納する配列。
    pub genres: Vec<ContentGenre>,
}

impl Descriptor<'_> for ContentDescriptor {
    const TAG: u8 = 0x54;

    fn read(data: &[u8]) -> Result<ContentDescriptor, PsiError> {
        if data.len() % 2 != 0 {
            log::debug!("invalid ContentDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        let genres = data
            .chunks_exact(2)
            .map(|chunk| ContentGenre {
                content_nibble_level_1: chunk[0] >> 4,
                content_nibble_level_2: chunk[0] & 0x0F,
                user_byte: chunk[1],
            })
            .collect();

        Ok(ContentDescriptor { genres })
    }
}

/// パレンタルレート記述子における国ごとのレート。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentalRating {
    /// 国コード（ISO 3166）。
    pub country_code: [u8; 3],
    /// レート（0x01～0x0Fで最小年齢から3を引いた値）。
    pub rating: u8,
}

impl ParentalRating {
    /// 視聴可能な最小年齢を返す。定義されていない値では`None`を返す。
    #[inline]
    pub fn minimum_age(&self) -> Option<u8> {
        matches!(self.rating, 0x01..=0x0F).then_some(self.rating + 3)
    }
}

/// パレンタルレート記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentalRatingDescriptor {
    /// レートを格納する配列。
    pub ratings: Vec<ParentalRating>,
}

impl Descriptor<'_> for ParentalRatingDescriptor {
    const TAG: u8 = 0x55;

    fn read(data: &[u8]) -> Result<ParentalRatingDescriptor, PsiError> {
        if data.len() % 4 != 0 {
            log::debug!("invalid ParentalRatingDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        let ratings = data
            .chunks_exact(4)
            .map(|chunk| ParentalRating {
                country_code: [chunk[0], chunk[1], chunk[2]],
                rating: chunk[3],
            })
            .collect();

        Ok(ParentalRatingDescriptor { ratings })
    }
}

/// テレテキスト記述子におけるページ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeletextPage {
    /// 言語コード。
    pub lang_code: LangCode,
    /// テレテキスト種別（5ビット）。
    pub teletext_type: u8,
    /// マガジン番号（3ビット）。
    pub magazine_number: u8,
    /// ページ番号（BCD2桁）。
    pub page_number: u8,
}

/// テレテキスト記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeletextDescriptor {
    /// ページを格納する配列。
    pub pages: Vec<TeletextPage>,
}

impl Descriptor<'_> for TeletextDescriptor {
    const TAG: u8 = 0x56;

    fn read(data: &[u8]) -> Result<TeletextDescriptor, PsiError> {
        if data.len() % 5 != 0 {
            log::debug!("invalid TeletextDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        let pages = data
            .chunks_exact(5)
            .map(|chunk| TeletextPage {
                lang_code: LangCode([chunk[0], chunk[1], chunk[2]]),
                teletext_type: chunk[3] >> 3,
                magazine_number: chunk[3] & 0b00000111,
                page_number: chunk[4],
            })
            .collect();

        Ok(TeletextDescriptor { pages })
    }
}

/// ローカル時間オフセット記述子における地域ごとのオフセット。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTimeOffset {
    /// 国コード（ISO 3166）。
    pub country_code: [u8; 3],
    /// 国内の地域識別（6ビット）。
    pub country_region_id: u8,
    /// オフセットの極性（`true`でUTCより遅れる）。
    pub local_time_offset_polarity: bool,
    /// 現在のオフセット（分）。
    pub local_time_offset: u16,
    /// オフセットが変わる日時。
    pub time_of_change: DateTime,
    /// 変更後のオフセット（分）。
    pub next_time_offset: u16,
}

impl LocalTimeOffset {
    /// 極性を考慮した現在のオフセットを分で返す。
    #[inline]
    pub fn offset_minutes(&self) -> i32 {
        if self.local_time_offset_polarity {
            -(self.local_time_offset as i32)
        } else {
            self.local_time_offset as i32
        }
    }
}

/// ローカル時間オフセット記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTimeOffsetDescriptor {
    /// オフセットを格納する配列。
    pub offsets: Vec<LocalTimeOffset>,
}

impl Descriptor<'_> for LocalTimeOffsetDescriptor {
    const TAG: u8 = 0x58;

    fn read(data: &[u8]) -> Result<LocalTimeOffsetDescriptor, PsiError> {
        if data.len() % 13 != 0 {
            log::debug!("invalid LocalTimeOffsetDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        let offsets = data
            .chunks_exact(13)
            .map(|chunk| LocalTimeOffset {
                country_code: [chunk[0], chunk[1], chunk[2]],
                country_region_id: chunk[3] >> 2,
                local_time_offset_polarity: chunk[3] & 0b00000001 != 0,
                local_time_offset: read_bcd_hhmm(&[chunk[4], chunk[5]]),
                time_of_change: DateTime::read(&[chunk[6], chunk[7], chunk[8], chunk[9], chunk[10]]),
                next_time_offset: read_bcd_hhmm(&[chunk[11], chunk[12]]),
            })
            .collect();

        Ok(LocalTimeOffsetDescriptor { offsets })
    }
}

/// 字幕記述子における字幕。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtitling {
    /// 言語コード。
    pub lang_code: LangCode,
    /// 字幕種別。
    pub subtitling_type: u8,
    /// コンポジションページ識別。
    pub composition_page_id: u16,
    /// 補助ページ識別。
    pub ancillary_page_id: u16,
}

/// 字幕記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitlingDescriptor {
    /// 字幕を格納する配列。
    pub subtitles: Vec<Subtitling>,
}

impl Descriptor<'_> for SubtitlingDescriptor {
    const TAG: u8 = 0x59;

    fn read(data: &[u8]) -> Result<SubtitlingDescriptor, PsiError> {
        if data.len() % 8 != 0 {
            log::debug!("invalid SubtitlingDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        let subtitles = data
            .chunks_exact(8)
            .map(|chunk| Subtitling {
                lang_code: LangCode([chunk[0], chunk[1], chunk[2]]),
                subtitling_type: chunk[3],
                composition_page_id: chunk[4..=5].read_be_16(),
                ancillary_page_id: chunk[6..=7].read_be_16(),
            })
            .collect();

        Ok(SubtitlingDescriptor { subtitles })
    }
}

/// 地上分配システム記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerrestrialDeliverySystemDescriptor {
    /// 中心周波数（単位は10Hz）。
    pub centre_frequency: u32,
    /// 帯域幅（3ビット、0＝8MHz～3＝5MHz）。
    pub bandwidth: u8,
    /// 優先度（`true`で高優先度）。
    pub priority: bool,
    /// タイムスライシング指示（`true`で未使用）。
    pub time_slicing_indicator: bool,
    /// MPE-FEC指示（`true`で未使用）。
    pub mpe_fec_indicator: bool,
    /// 変調（2ビット、0＝QPSK～2＝64QAM）。
    pub constellation: u8,
    /// 階層情報（3ビット）。
    pub hierarchy_information: u8,
    /// 高優先度ストリームの符号化率（3ビット）。
    pub code_rate_hp_stream: u8,
    /// 低優先度ストリームの符号化率（3ビット）。
    pub code_rate_lp_stream: u8,
    /// ガードインターバル（2ビット、0＝1/32～3＝1/4）。
    pub guard_interval: u8,
    /// 伝送モード（2ビット、0＝2k、1＝8k、2＝4k）。
    pub transmission_mode: u8,
    /// 他の周波数を使用しているかどうか。
    pub other_frequency_flag: bool,
}

impl Descriptor<'_> for TerrestrialDeliverySystemDescriptor {
    const TAG: u8 = 0x5A;

    fn read(data: &[u8]) -> Result<TerrestrialDeliverySystemDescriptor, PsiError> {
        if data.len() != 11 {
            log::debug!("invalid TerrestrialDeliverySystemDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        Ok(TerrestrialDeliverySystemDescriptor {
            centre_frequency: data[0..=3].read_be_32(),
            bandwidth: data[4] >> 5,
            priority: data[4] & 0b00010000 != 0,
            time_slicing_indicator: data[4] & 0b00001000 != 0,
            mpe_fec_indicator: data[4] & 0b00000100 != 0,
            constellation: data[5] >> 6,
            hierarchy_information: (data[5] & 0b00111000) >> 3,
            code_rate_hp_stream: data[5] & 0b00000111,
            code_rate_lp_stream: data[6] >> 5,
            guard_interval: (data[6] & 0b00011000) >> 3,
            transmission_mode: (data[6] & 0b00000110) >> 1,
            other_frequency_flag: data[6] & 0b00000001 != 0,
        })
    }
}

/// プライベートデータ指定記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateDataSpecifierDescriptor {
    /// プライベートデータ指定子。
    pub private_data_specifier: u32,
}

impl Descriptor<'_> for PrivateDataSpecifierDescriptor {
    const TAG: u8 = 0x5F;

    fn read(data: &[u8]) -> Result<PrivateDataSpecifierDescriptor, PsiError> {
        if data.len() != 4 {
            log::debug!("invalid PrivateDataSpecifierDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        Ok(PrivateDataSpecifierDescriptor {
            private_data_specifier: data.read_be_32(),
        })
    }
}

/// 周波数リスト記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyListDescriptor {
    /// 符号化種別（2ビット、1＝衛星、2＝ケーブル、3＝地上）。
    pub coding_type: u8,
    /// 中心周波数を格納する配列。単位は`coding_type`による。
    pub centre_frequencies: Vec<u32>,
}

impl Descriptor<'_> for FrequencyListDescriptor {
    const TAG: u8 = 0x62;

    fn read(data: &[u8]) -> Result<FrequencyListDescriptor, PsiError> {
        let [b0, ref rem @ ..] = *data else {
            log::debug!("invalid FrequencyListDescriptor");
            return Err(PsiError::TruncatedData);
        };
        if rem.len() % 4 != 0 {
            log::debug!("invalid FrequencyListDescriptor::centre_frequencies");
            return Err(PsiError::LengthMismatch);
        }

        let coding_type = b0 & 0b00000011;
        let centre_frequencies = rem
            .chunks_exact(4)
            .map(|chunk| match coding_type {
                // 衛星・ケーブルはBCD
                1 | 2 => chunk.read_bcd(8),
                _ => chunk.read_be_32(),
            })
            .collect();

        Ok(FrequencyListDescriptor {
            coding_type,
            centre_frequencies,
        })
    }
}

/// データ放送識別記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBroadcastIdDescriptor<'a> {
    /// データ放送識別。
    pub data_broadcast_id: u16,
    /// 識別子ごとのセレクターバイト。
    pub id_selector_bytes: &'a [u8],
}

impl<'a> Descriptor<'a> for DataBroadcastIdDescriptor<'a> {
    const TAG: u8 = 0x66;

    fn read(data: &'a [u8]) -> Result<DataBroadcastIdDescriptor<'a>, PsiError> {
        let Some((id, id_selector_bytes)) = data.split_at_checked(2) else {
            log::debug!("invalid DataBroadcastIdDescriptor");
            return Err(PsiError::TruncatedData);
        };

        Ok(DataBroadcastIdDescriptor {
            data_broadcast_id: id.read_be_16(),
            id_selector_bytes,
        })
    }
}

/// AC-3記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ac3Descriptor<'a> {
    /// コンポーネント種別。
    pub component_type: Option<u8>,
    /// ビットストリーム識別。
    pub bsid: Option<u8>,
    /// メイン識別。
    pub mainid: Option<u8>,
    /// 関連サービス。
    pub asvc: Option<u8>,
    /// 追加情報。
    pub additional_info: &'a [u8],
}

impl<'a> Descriptor<'a> for Ac3Descriptor<'a> {
    const TAG: u8 = 0x6A;

    fn read(data: &'a [u8]) -> Result<Ac3Descriptor<'a>, PsiError> {
        let mut r = Reader::new(data);
        let flags = r.read_u8()?;

        let mut read_if = |mask: u8| -> Result<Option<u8>, PsiError> {
            if flags & mask != 0 {
                r.read_u8().map(Some)
            } else {
                Ok(None)
            }
        };
        let component_type = read_if(0b10000000)?;
        let bsid = read_if(0b01000000)?;
        let mainid = read_if(0b00100000)?;
        let asvc = read_if(0b00010000)?;

        Ok(Ac3Descriptor {
            component_type,
            bsid,
            mainid,
            asvc,
            additional_info: r.read_rest(),
        })
    }
}
