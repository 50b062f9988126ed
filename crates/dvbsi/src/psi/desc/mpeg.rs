//! MPEG-2 Systems（ISO/IEC 13818-1）で規定される記述子および関連する型の定義。

use crate::lang::LangCode;
use crate::pid::Pid;
use crate::psi::PsiError;
use crate::utils::BytesExt;

use super::base::Descriptor;

/// ストリーム形式種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamType(pub u8);

impl StreamType {
    /// ISO/IEC 11172-2映像。
    pub const MPEG1_VIDEO: StreamType = StreamType(0x01);
    /// ITU-T Rec. H.262|ISO/IEC 13818-2映像。
    pub const MPEG2_VIDEO: StreamType = StreamType(0x02);
    /// ISO/IEC 11172-3音声。
    pub const MPEG1_AUDIO: StreamType = StreamType(0x03);
    /// ISO/IEC 13818-3音声。
    pub const MPEG2_AUDIO: StreamType = StreamType(0x04);
    /// プライベートセクション。
    pub const PRIVATE_SECTIONS: StreamType = StreamType(0x05);
    /// PESパケットに格納されたプライベートデータ。
    pub const PRIVATE_DATA: StreamType = StreamType(0x06);
    /// ISO/IEC 13818-7音声（ADTS）。
    pub const AAC: StreamType = StreamType(0x0F);
    /// ISO/IEC 14496-3音声（LATM）。
    pub const AAC_LATM: StreamType = StreamType(0x11);
    /// ITU-T Rec. H.264|ISO/IEC 14496-10映像。
    pub const H264: StreamType = StreamType(0x1B);
    /// ITU-T Rec. H.265|ISO/IEC 23008-2映像。
    pub const H265: StreamType = StreamType(0x24);
    /// ATSC A/53のAC-3音声。
    pub const AC3: StreamType = StreamType(0x81);

    /// 映像ストリームかどうかを返す。
    #[inline]
    pub fn is_video(&self) -> bool {
        matches!(self.0, 0x01 | 0x02 | 0x1B | 0x24)
    }

    /// 音声ストリームかどうかを返す。
    #[inline]
    pub fn is_audio(&self) -> bool {
        matches!(self.0, 0x03 | 0x04 | 0x0F | 0x11 | 0x81)
    }
}

/// ビデオストリーム記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStreamDescriptor {
    /// 複数フレームレートフラグ。
    pub multiple_frame_rate_flag: bool,
    /// フレームレート符号（4ビット）。
    pub frame_rate_code: u8,
    /// MPEG-1のみフラグ。
    pub mpeg_1_only_flag: bool,
    /// 制約パラメーターフラグ。
    pub constrained_parameter_flag: bool,
    /// 静止画フラグ。
    pub still_picture_flag: bool,
    /// MPEG-2の追加情報。`mpeg_1_only_flag`が立っている場合は`None`。
    pub mpeg_2: Option<VideoStreamMpeg2>,
}

/// ビデオストリーム記述子におけるMPEG-2の追加情報。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStreamMpeg2 {
    /// プロファイルとレベル。
    pub profile_and_level_indication: u8,
    /// 色差フォーマット（2ビット）。
    pub chroma_format: u8,
    /// フレームレート拡張フラグ。
    pub frame_rate_extension_flag: bool,
}

impl Descriptor<'_> for VideoStreamDescriptor {
    const TAG: u8 = 0x02;

    fn read(data: &[u8]) -> Result<VideoStreamDescriptor, PsiError> {
        let [b0, ref rem @ ..] = *data else {
            log::debug!("invalid VideoStreamDescriptor");
            return Err(PsiError::TruncatedData);
        };

        let mpeg_1_only_flag = b0 & 0b00000100 != 0;
        let mpeg_2 = match (mpeg_1_only_flag, rem) {
            (true, []) => None,
            (false, &[profile_and_level_indication, b2]) => Some(VideoStreamMpeg2 {
                profile_and_level_indication,
                chroma_format: (b2 & 0b11000000) >> 6,
                frame_rate_extension_flag: b2 & 0b00100000 != 0,
            }),
            _ => {
                log::debug!("invalid VideoStreamDescriptor::mpeg_2");
                return Err(PsiError::LengthMismatch);
            }
        };

        Ok(VideoStreamDescriptor {
            multiple_frame_rate_flag: b0 & 0b10000000 != 0,
            frame_rate_code: (b0 & 0b01111000) >> 3,
            mpeg_1_only_flag,
            constrained_parameter_flag: b0 & 0b00000010 != 0,
            still_picture_flag: b0 & 0b00000001 != 0,
            mpeg_2,
        })
    }
}

/// オーディオストリーム記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStreamDescriptor {
    /// フリーフォーマットフラグ。
    pub free_format_flag: bool,
    /// ID。
    pub id: bool,
    /// レイヤー（2ビット）。
    pub layer: u8,
    /// 可変レート音声指示。
    pub variable_rate_audio_indicator: bool,
}

impl Descriptor<'_> for AudioStreamDescriptor {
    const TAG: u8 = 0x03;

    fn read(data: &[u8]) -> Result<AudioStreamDescriptor, PsiError> {
        let &[b0] = data else {
            log::debug!("invalid AudioStreamDescriptor");
            return Err(PsiError::LengthMismatch);
        };

        Ok(AudioStreamDescriptor {
            free_format_flag: b0 & 0b10000000 != 0,
            id: b0 & 0b01000000 != 0,
            layer: (b0 & 0b00110000) >> 4,
            variable_rate_audio_indicator: b0 & 0b00001000 != 0,
        })
    }
}

/// 登録記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationDescriptor<'a> {
    /// フォーマット識別子（"AC-3"など）。
    pub format_identifier: [u8; 4],
    /// 追加識別情報。
    pub additional_identification_info: &'a [u8],
}

impl<'a> Descriptor<'a> for RegistrationDescriptor<'a> {
    const TAG: u8 = 0x05;

    fn read(data: &'a [u8]) -> Result<RegistrationDescriptor<'a>, PsiError> {
        let [a, b, c, d, ref additional_identification_info @ ..] = *data else {
            log::debug!("invalid RegistrationDescriptor");
            return Err(PsiError::TruncatedData);
        };

        Ok(RegistrationDescriptor {
            format_identifier: [a, b, c, d],
            additional_identification_info,
        })
    }
}

/// データストリームアライメント記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStreamAlignmentDescriptor {
    /// アライメント種別。
    pub alignment_type: u8,
}

impl Descriptor<'_> for DataStreamAlignmentDescriptor {
    const TAG: u8 = 0x06;

    fn read(data: &[u8]) -> Result<DataStreamAlignmentDescriptor, PsiError> {
        let &[alignment_type] = data else {
            log::debug!("invalid DataStreamAlignmentDescriptor");
            return Err(PsiError::LengthMismatch);
        };

        Ok(DataStreamAlignmentDescriptor { alignment_type })
    }
}

/// 限定受信方式記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalAccessDescriptor<'a> {
    /// 限定受信方式識別。
    pub ca_system_id: u16,
    /// 限定受信PID。
    pub ca_pid: Pid,
    /// プライベートデータ。
    pub private_data: &'a [u8],
}

impl<'a> Descriptor<'a> for ConditionalAccessDescriptor<'a> {
    const TAG: u8 = 0x09;

    fn read(data: &'a [u8]) -> Result<ConditionalAccessDescriptor<'a>, PsiError> {
        if data.len() < 4 {
            log::debug!("invalid ConditionalAccessDescriptor");
            return Err(PsiError::TruncatedData);
        }

        let ca_system_id = data[0..=1].read_be_16();
        let ca_pid = Pid::read(&data[2..=3]);
        let private_data = &data[4..];

        Ok(ConditionalAccessDescriptor {
            ca_system_id,
            ca_pid,
            private_data,
        })
    }
}

/// ISO 639言語記述子における言語。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iso639Language {
    /// 言語コード。
    pub lang_code: LangCode,
    /// 音声種別（0＝未定義、1＝クリーン、2＝聴覚障害者向け、3＝視覚障害者向け解説）。
    pub audio_type: u8,
}

/// ISO 639言語記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iso639LanguageDescriptor {
    /// 言語を格納する配列。
    pub languages: Vec<Iso639Language>,
}

impl Descriptor<'_> for Iso639LanguageDescriptor {
    const TAG: u8 = 0x0A;

    fn read(data: &[u8]) -> Result<Iso639LanguageDescriptor, PsiError> {
        if data.len() % 4 != 0 {
            log::debug!("invalid Iso639LanguageDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        let languages = data
            .chunks_exact(4)
            .map(|chunk| Iso639Language {
                lang_code: LangCode([chunk[0], chunk[1], chunk[2]]),
                audio_type: chunk[3],
            })
            .collect();

        Ok(Iso639LanguageDescriptor { languages })
    }
}

/// 最大ビットレート記述子。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaximumBitrateDescriptor {
    /// 最大ビットレート（単位は50バイト毎秒、22ビット）。
    pub maximum_bitrate: u32,
}

impl MaximumBitrateDescriptor {
    /// 最大ビットレートをビット毎秒で返す。
    #[inline]
    pub fn bits_per_second(&self) -> u64 {
        self.maximum_bitrate as u64 * 50 * 8
    }
}

impl Descriptor<'_> for MaximumBitrateDescriptor {
    const TAG: u8 = 0x0E;

    fn read(data: &[u8]) -> Result<MaximumBitrateDescriptor, PsiError> {
        if data.len() != 3 {
            log::debug!("invalid MaximumBitrateDescriptor");
            return Err(PsiError::LengthMismatch);
        }

        let maximum_bitrate = data.read_be_24() & 0x3F_FFFF;
        Ok(MaximumBitrateDescriptor { maximum_bitrate })
    }
}
