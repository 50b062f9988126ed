//! ATSC A/65およびA/52で規定される記述子の定義。

use crate::lang::LangCode;
use crate::pid::Pid;
use crate::psi::PsiError;
use crate::reader::Reader;
use crate::text::MultipleString;

use super::base::Descriptor;
use super::mpeg::StreamType;

/// AC-3オーディオストリーム記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ac3AudioStreamDescriptor<'a> {
    /// サンプリング周波数符号（3ビット）。
    pub sample_rate_code: u8,
    /// ビットストリーム識別（5ビット）。
    pub bsid: u8,
    /// ビットレート符号（6ビット）。
    pub bit_rate_code: u8,
    /// サラウンドモード（2ビット）。
    pub surround_mode: u8,
    /// ビットストリームモード（3ビット）。
    pub bsmod: u8,
    /// チャンネル数符号（4ビット）。
    pub num_channels: u8,
    /// フルサービスフラグ。
    pub full_svc: bool,
    /// 後続の任意フィールド。
    pub additional_info: &'a [u8],
}

impl<'a> Descriptor<'a> for Ac3AudioStreamDescriptor<'a> {
    const TAG: u8 = 0x81;

    fn read(data: &'a [u8]) -> Result<Ac3AudioStreamDescriptor<'a>, PsiError> {
        let [b0, b1, b2, ref additional_info @ ..] = *data else {
            log::debug!("invalid Ac3AudioStreamDescriptor");
            return Err(PsiError::TruncatedData);
        };

        Ok(Ac3AudioStreamDescriptor {
            sample_rate_code: b0 >> 5,
            bsid: b0 & 0b00011111,
            bit_rate_code: b1 >> 2,
            surround_mode: b1 & 0b00000011,
            bsmod: b2 >> 5,
            num_channels: (b2 & 0b00011110) >> 1,
            full_svc: b2 & 0b00000001 != 0,
            additional_info,
        })
    }
}

/// キャプションサービス記述子におけるサービス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionService {
    /// 言語コード。
    pub lang_code: LangCode,
    /// デジタルクローズドキャプションかどうか。
    pub digital_cc: bool,
    /// キャプションサービス番号（6ビット）。`digital_cc`でない場合は
    /// 最下位ビットがline21_fieldである。
    pub caption_service_number: u8,
    /// イージーリーダー。
    pub easy_reader: bool,
    /// ワイドアスペクト比。
    pub wide_aspect_ratio: bool,
}

/// キャプションサービス記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionServiceDescriptor {
    /// サービスを格納する配列。
    pub services: Vec<CaptionService>,
}

impl Descriptor<'_> for CaptionServiceDescriptor {
    const TAG: u8 = 0x86;

    fn read(data: &[u8]) -> Result<CaptionServiceDescriptor, PsiError> {
        let mut r = Reader::new(data);
        let number_of_services = r.read_u8()? & 0b00011111;

        let mut services = Vec::with_capacity(number_of_services as usize);
        for _ in 0..number_of_services {
            let lang_code = LangCode(r.read_array()?);
            let b = r.read_u8()?;
            let flags = r.read_u16()?;
            services.push(CaptionService {
                lang_code,
                digital_cc: b & 0b10000000 != 0,
                caption_service_number: b & 0b00111111,
                easy_reader: flags & 0x8000 != 0,
                wide_aspect_ratio: flags & 0x4000 != 0,
            });
        }
        r.finish()?;

        Ok(CaptionServiceDescriptor { services })
    }
}

/// コンテンツアドバイザリー記述子における評価次元。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatedDimension {
    /// 評価次元（RRTの次元の添字）。
    pub rating_dimension: u8,
    /// 評価値（4ビット）。
    pub rating_value: u8,
}

/// コンテンツアドバイザリー記述子における評価地域ごとの評価。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingRegion<'a> {
    /// 評価地域。
    pub rating_region: u8,
    /// 評価次元を格納する配列。
    pub dimensions: Vec<RatedDimension>,
    /// 評価の説明。
    pub rating_description: MultipleString<'a>,
}

/// コンテンツアドバイザリー記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentAdvisoryDescriptor<'a> {
    /// 評価地域ごとの評価を格納する配列。
    pub regions: Vec<RatingRegion<'a>>,
}

impl<'a> Descriptor<'a> for ContentAdvisoryDescriptor<'a> {
    const TAG: u8 = 0x87;

    fn read(data: &'a [u8]) -> Result<ContentAdvisoryDescriptor<'a>, PsiError> {
        let mut r = Reader::new(data);
        let rating_region_count = r.read_u8()? & 0b00111111;

        let mut regions = Vec::with_capacity(rating_region_count as usize);
        for _ in 0..rating_region_count {
            let rating_region = r.read_u8()?;
            let rated_dimensions = r.read_u8()?;
            let mut dimensions = Vec::with_capacity(rated_dimensions as usize);
            for _ in 0..rated_dimensions {
                let rating_dimension = r.read_u8()?;
                let rating_value = r.read_u8()? & 0x0F;
                dimensions.push(RatedDimension {
                    rating_dimension,
                    rating_value,
                });
            }
            let len = r.read_u8()?;
            let rating_description = MultipleString::read(r.read_bytes(len as usize)?)?;

            regions.push(RatingRegion {
                rating_region,
                dimensions,
                rating_description,
            });
        }
        r.finish()?;

        Ok(ContentAdvisoryDescriptor { regions })
    }
}

/// 拡張チャンネル名記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedChannelNameDescriptor<'a> {
    /// チャンネル名。
    pub long_channel_name: MultipleString<'a>,
}

impl<'a> Descriptor<'a> for ExtendedChannelNameDescriptor<'a> {
    const TAG: u8 = 0xA0;

    fn read(data: &'a [u8]) -> Result<ExtendedChannelNameDescriptor<'a>, PsiError> {
        Ok(ExtendedChannelNameDescriptor {
            long_channel_name: MultipleString::read(data)?,
        })
    }
}

/// サービスロケーション記述子におけるエレメント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLocationElement {
    /// ストリーム形式種別。
    pub stream_type: StreamType,
    /// エレメンタリーPID。
    pub elementary_pid: Pid,
    /// 言語コード。
    pub lang_code: LangCode,
}

/// サービスロケーション記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLocationDescriptor {
    /// PCRのPID。
    pub pcr_pid: Pid,
    /// エレメントを格納する配列。
    pub elements: Vec<ServiceLocationElement>,
}

impl Descriptor<'_> for ServiceLocationDescriptor {
    const TAG: u8 = 0xA1;

    fn read(data: &[u8]) -> Result<ServiceLocationDescriptor, PsiError> {
        let mut r = Reader::new(data);
        let pcr_pid = Pid::read(r.read_bytes(2)?);
        let number_elements = r.read_u8()?;

        let mut elements = Vec::with_capacity(number_elements as usize);
        for _ in 0..number_elements {
            let stream_type = StreamType(r.read_u8()?);
            let elementary_pid = Pid::read(r.read_bytes(2)?);
            let lang_code = LangCode(r.read_array()?);
            elements.push(ServiceLocationElement {
                stream_type,
                elementary_pid,
                lang_code,
            });
        }
        r.finish()?;

        Ok(ServiceLocationDescriptor { pcr_pid, elements })
    }
}

/// コンポーネント名記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentNameDescriptor<'a> {
    /// コンポーネント名。
    pub component_name: MultipleString<'a>,
}

impl<'a> Descriptor<'a> for ComponentNameDescriptor<'a> {
    const TAG: u8 = 0xA3;

    fn read(data: &'a [u8]) -> Result<ComponentNameDescriptor<'a>, PsiError> {
        Ok(ComponentNameDescriptor {
            component_name: MultipleString::read(data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn test_service_location() {
        let data = hex!("E0 31 02 02 E0 31 65 6E 67 81 E0 34 65 6E 67");
        let d = ServiceLocationDescriptor::read(&data).unwrap();
        assert_eq!(d.pcr_pid, Pid::new(0x31));
        assert_eq!(d.elements.len(), 2);
        assert_eq!(d.elements[1].stream_type, StreamType::AC3);
        assert_eq!(d.elements[1].elementary_pid, Pid::new(0x34));
        assert_eq!(d.elements[1].lang_code, LangCode::ENG);

        // number_elementsに対してデータが足りない
        assert_matches!(
            ServiceLocationDescriptor::read(&data[..data.len() - 1]),
            Err(PsiError::TruncatedData)
        );
    }

    #[test]
    fn test_extended_channel_name() {
        let data = hex!("01 65 6E 67 01 00 00 04 57 41 54 43");
        let d = ExtendedChannelNameDescriptor::read(&data).unwrap();
        assert_eq!(d.long_channel_name.strings[0].to_string(), "WATC");

        // セグメント長が外側の長さを越える
        let data = hex!("01 65 6E 67 01 00 00 05 57 41 54 43");
        assert_matches!(ExtendedChannelNameDescriptor::read(&data), Err(PsiError::TruncatedData));
    }

    #[test]
    fn test_content_advisory() {
        let data = hex!("C1 01 01 00 F4 00");
        let d = ContentAdvisoryDescriptor::read(&data).unwrap();
        assert_eq!(d.regions.len(), 1);
        assert_eq!(d.regions[0].rating_region, 1);
        assert_eq!(
            d.regions[0].dimensions,
            [RatedDimension {
                rating_dimension: 0,
                rating_value: 4,
            }]
        );
        assert!(d.regions[0].rating_description.strings.is_empty());
    }

    #[test]
    fn test_caption_service() {
        let data = hex!("C1 65 6E 67 C1 3F FF");
        let d = CaptionServiceDescriptor::read(&data).unwrap();
        assert_eq!(d.services.len(), 1);
        assert!(d.services[0].digital_cc);
        assert_eq!(d.services[0].caption_service_number, 1);
        assert!(!d.services[0].easy_reader);
        assert!(!d.services[0].wide_aspect_ratio);
    }
}
