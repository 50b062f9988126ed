//! 限定受信サポート。

use dvbsi::psi::desc::mpeg::ConditionalAccessDescriptor;
use dvbsi::psi::desc::{Descriptor, DescriptorBlock};
use dvbsi::psi::table::Pmt;
use dvbsi::Pid;

use crate::apdu::{self, Apdu};
use crate::app::{unexpected_apdu, AppEvent};
use crate::error::CiError;
use crate::resource::{Context, Resource, ResourceId};
use crate::session::SessionId;

/// ca_info_enqのタグ。
pub const TAG_CA_INFO_ENQ: u32 = 0x9F8030;
/// ca_infoのタグ。
pub const TAG_CA_INFO: u32 = 0x9F8031;
/// ca_pmtのタグ。
pub const TAG_CA_PMT: u32 = 0x9F8032;
/// ca_pmt_replyのタグ。
pub const TAG_CA_PMT_REPLY: u32 = 0x9F8033;

/// 記述子ループ長の上限。
const MAX_INFO_LENGTH: usize = 0x0FFF;

/// CA_PMTのリスト管理（ca_pmt_list_management）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListManagement {
    /// リストの途中。
    More,
    /// リストの先頭。
    First,
    /// リストの末尾。
    Last,
    /// 1つだけのリスト。
    Only,
    /// 既存のリストに追加する。
    Add,
    /// 既存のリストの番組を更新する。
    Update,
}

impl From<ListManagement> for u8 {
    fn from(value: ListManagement) -> u8 {
        match value {
            ListManagement::More => 0x00,
            ListManagement::First => 0x01,
            ListManagement::Last => 0x02,
            ListManagement::Only => 0x03,
            ListManagement::Add => 0x04,
            ListManagement::Update => 0x05,
        }
    }
}

/// CA_PMTのコマンド（ca_pmt_cmd_id）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaPmtCmd {
    /// デスクランブルを開始する。
    OkDescrambling,
    /// MMIによる対話を許可する。
    OkMmi,
    /// デスクランブルの可否を問い合わせる。
    Query,
    /// 選択されていない。
    NotSelected,
}

impl From<CaPmtCmd> for u8 {
    fn from(value: CaPmtCmd) -> u8 {
        match value {
            CaPmtCmd::OkDescrambling => 0x01,
            CaPmtCmd::OkMmi => 0x02,
            CaPmtCmd::Query => 0x03,
            CaPmtCmd::NotSelected => 0x04,
        }
    }
}

/// モジュールに送るCA_PMT。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaPmt(Vec<u8>);

impl CaPmt {
    /// PMTから限定受信方式記述子のみを残したCA_PMTを生成する。
    pub fn new(pmt: &Pmt, list_management: ListManagement, cmd: CaPmtCmd) -> Result<CaPmt, CiError> {
        let mut buf: Vec<u8> = Vec::with_capacity(64);
        buf.push(list_management.into());
        buf.extend_from_slice(&pmt.program_number.to_be_bytes());
        buf.push(0xC0 | (pmt.info.version_number & 0x1F) << 1 | pmt.info.current_next_indicator as u8);
        write_ca_descriptors(&mut buf, &pmt.descriptors, cmd)?;

        for stream in &pmt.streams {
            buf.push(stream.stream_type.0);
            buf.extend_from_slice(&(0xE000 | stream.elementary_pid.get()).to_be_bytes());
            write_ca_descriptors(&mut buf, &stream.descriptors, cmd)?;
        }

        Ok(CaPmt(buf))
    }

    /// CA_PMTの本体。
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// ca_pmtのAPDUを生成する。
    #[inline]
    pub fn to_apdu(&self) -> Result<Vec<u8>, CiError> {
        apdu::encode(TAG_CA_PMT, &self.0)
    }
}

/// 長さフィールドに続けて、コマンドと限定受信方式記述子を書き込む。
///
/// 限定受信方式記述子がない場合は長さ0のみを書き込む。
fn write_ca_descriptors(
    buf: &mut Vec<u8>,
    descriptors: &DescriptorBlock,
    cmd: CaPmtCmd,
) -> Result<(), CiError> {
    let len_pos = buf.len();
    buf.extend_from_slice(&[0xF0, 0x00]);

    let start = buf.len();
    for desc in descriptors {
        if desc.tag != ConditionalAccessDescriptor::TAG {
            continue;
        }
        if buf.len() == start {
            buf.push(cmd.into());
        }
        buf.push(desc.tag);
        buf.push(desc.data.len() as u8);
        buf.extend_from_slice(desc.data);
    }

    let len = buf.len() - start;
    if len > MAX_INFO_LENGTH {
        log::debug!("ca_pmt info too long: {} bytes", len);
        return Err(CiError::LengthMismatch);
    }
    buf[len_pos..start].copy_from_slice(&(0xF000 | len as u16).to_be_bytes());
    Ok(())
}

/// ca_pmt_replyにおけるストリームごとの応答。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaPmtReplyStream {
    /// エレメンタリーPID。
    pub elementary_pid: Pid,
    /// デスクランブルの可否（CA_enable）。
    pub ca_enable: Option<u8>,
}

/// ca_pmt_reply。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaPmtReply {
    /// 番組番号。
    pub program_number: u16,
    /// バージョン番号。
    pub version_number: u8,
    /// カレントネクスト指示。
    pub current_next_indicator: bool,
    /// 番組全体のデスクランブルの可否（CA_enable）。
    pub ca_enable: Option<u8>,
    /// ストリームごとの応答。
    pub streams: Vec<CaPmtReplyStream>,
}

impl CaPmtReply {
    /// デスクランブル可能。
    pub const DESCRAMBLING_POSSIBLE: u8 = 0x01;
    /// 購入の確認を経てデスクランブル可能。
    pub const DESCRAMBLING_POSSIBLE_PURCHASE: u8 = 0x02;
    /// 技術的な対話を経てデスクランブル可能。
    pub const DESCRAMBLING_POSSIBLE_TECHNICAL: u8 = 0x03;
    /// 権利がないためデスクランブル不可。
    pub const DESCRAMBLING_NOT_POSSIBLE_ENTITLEMENT: u8 = 0x71;
    /// 技術的な理由でデスクランブル不可。
    pub const DESCRAMBLING_NOT_POSSIBLE_TECHNICAL: u8 = 0x73;

    /// ca_pmt_replyの内容を読み取る。
    pub fn read(data: &[u8]) -> Result<CaPmtReply, CiError> {
        fn ca_enable(b: u8) -> Option<u8> {
            (b & 0x80 != 0).then_some(b & 0x7F)
        }

        let [p1, p2, version, ref rest @ ..] = *data else {
            log::debug!("invalid CaPmtReply");
            return Err(CiError::TruncatedData);
        };
        let (program_enable, rest) = match *rest {
            [b, ref rest @ ..] => (ca_enable(b), rest),
            [] => (None, rest),
        };

        let chunks = rest.chunks_exact(3);
        if !chunks.remainder().is_empty() {
            log::debug!("invalid CaPmtReply: {} trailing bytes", chunks.remainder().len());
            return Err(CiError::LengthMismatch);
        }
        let streams = chunks
            .map(|c| CaPmtReplyStream {
                elementary_pid: Pid::read(&c[0..2]),
                ca_enable: ca_enable(c[2]),
            })
            .collect();

        Ok(CaPmtReply {
            program_number: u16::from_be_bytes([p1, p2]),
            version_number: (version >> 1) & 0x1F,
            current_next_indicator: version & 0x01 != 0,
            ca_enable: program_enable,
            streams,
        })
    }
}

/// 限定受信サポートのリソース。
#[derive(Debug, Default)]
pub struct CaSupport;

impl CaSupport {
    /// `CaSupport`を生成する。
    pub fn new() -> CaSupport {
        CaSupport
    }
}

impl Resource for CaSupport {
    fn resource_id(&self) -> ResourceId {
        ResourceId::CONDITIONAL_ACCESS
    }

    fn opened(&mut self, ctx: &mut Context, session: SessionId) -> Result<(), CiError> {
        ctx.send(session, TAG_CA_INFO_ENQ, &[])
    }

    fn receive(
        &mut self,
        ctx: &mut Context,
        session: SessionId,
        apdu: &Apdu,
    ) -> Result<(), CiError> {
        match apdu.tag {
            TAG_CA_INFO => {
                let chunks = apdu.data.chunks_exact(2);
                if !chunks.remainder().is_empty() {
                    log::debug!("invalid ca_info: {} bytes", apdu.data.len());
                    return Err(CiError::LengthMismatch);
                }
                let ca_system_ids = chunks.map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
                ctx.emit(AppEvent::CaInfo {
                    session,
                    ca_system_ids,
                });
                Ok(())
            }
            TAG_CA_PMT_REPLY => {
                let reply = CaPmtReply::read(apdu.data)?;
                ctx.emit(AppEvent::CaPmtReply { session, reply });
                Ok(())
            }
            tag => Err(unexpected_apdu("conditional access support", tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::Harness;
    use assert_matches::assert_matches;
    use dvbsi::psi::desc::mpeg::StreamType;
    use dvbsi::psi::table::PmtStream;
    use dvbsi::psi::SectionInfo;
    use hex_literal::hex;

    #[test]
    fn test_ca_pmt() {
        let program_desc = hex!("09 04 0B 00 E1 23 05 04 43 55 45 49");
        let video_desc = hex!("09 04 0B 01 E1 24");
        let audio_desc = hex!("0A 04 65 6E 67 00");
        let pmt = Pmt {
            program_number: 0x0102,
            info: SectionInfo {
                version_number: 3,
                current_next_indicator: true,
                section_number: 0,
                last_section_number: 0,
            },
            pcr_pid: Pid::new(0x0100),
            descriptors: DescriptorBlock::new(&program_desc).unwrap(),
            streams: vec![
                PmtStream {
                    stream_type: StreamType::MPEG2_VIDEO,
                    elementary_pid: Pid::new(0x0101),
                    descriptors: DescriptorBlock::new(&video_desc).unwrap(),
                },
                PmtStream {
                    stream_type: StreamType::MPEG2_AUDIO,
                    elementary_pid: Pid::new(0x0102),
                    descriptors: DescriptorBlock::new(&audio_desc).unwrap(),
                },
            ],
        };

        let ca_pmt = CaPmt::new(&pmt, ListManagement::Only, CaPmtCmd::OkDescrambling).unwrap();
        assert_eq!(
            ca_pmt.as_bytes(),
            hex!(
                "03 01 02 C7 F0 07 01 09 04 0B 00 E1 23"
                "02 E1 01 F0 07 01 09 04 0B 01 E1 24"
                "04 E1 02 F0 00"
            )
        );
        assert_eq!(ca_pmt.to_apdu().unwrap()[..4], hex!("9F 80 32 1E"));
    }

    #[test]
    fn test_ca_pmt_reply() {
        let reply = CaPmtReply::read(&hex!("01 02 C7 81 E1 01 81 E1 02 71")).unwrap();
        assert_eq!(
            reply,
            CaPmtReply {
                program_number: 0x0102,
                version_number: 3,
                current_next_indicator: true,
                ca_enable: Some(CaPmtReply::DESCRAMBLING_POSSIBLE),
                streams: vec![
                    CaPmtReplyStream {
                        elementary_pid: Pid::new(0x0101),
                        ca_enable: Some(CaPmtReply::DESCRAMBLING_POSSIBLE),
                    },
                    CaPmtReplyStream {
                        elementary_pid: Pid::new(0x0102),
                        ca_enable: None,
                    },
                ],
            }
        );

        assert_matches!(CaPmtReply::read(&hex!("01 02")), Err(CiError::TruncatedData));
        assert_matches!(
            CaPmtReply::read(&hex!("01 02 C7 81 E1 01")),
            Err(CiError::LengthMismatch)
        );
    }

    #[test]
    fn test_resource() {
        let mut h = Harness::new(&[]);
        let mut ca = CaSupport::new();

        h.open(&mut ca).unwrap();
        assert_eq!(h.take_outbox(), [hex!("9F 80 30 00").to_vec()]);

        h.receive(&mut ca, &hex!("9F 80 31 04 0B 00 01 00")).unwrap();
        h.receive(&mut ca, &hex!("9F 80 33 04 01 02 C7 00")).unwrap();
        assert_eq!(
            h.events,
            [
                AppEvent::CaInfo {
                    session: h.session,
                    ca_system_ids: vec![0x0B00, 0x0100],
                },
                AppEvent::CaPmtReply {
                    session: h.session,
                    reply: CaPmtReply {
                        program_number: 0x0102,
                        version_number: 3,
                        current_next_indicator: true,
                        ca_enable: None,
                        streams: Vec::new(),
                    },
                },
            ]
        );
        assert_matches!(
            h.receive(&mut ca, &hex!("9F 80 31 01 0B")),
            Err(CiError::LengthMismatch)
        );
    }
}
