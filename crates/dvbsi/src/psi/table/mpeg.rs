//! MPEG-2 Systems（ISO/IEC 13818-1）で規定されるテーブルおよび関連する型の定義。

use crate::pid::Pid;
use crate::psi::desc::mpeg::StreamType;
use crate::psi::desc::DescriptorBlock;
use crate::psi::writer::SectionWriter;
use crate::psi::{PsiError, PsiSection, PsiTable, SectionInfo};
use crate::reader::Reader;

/// PMTのあるPIDの定義。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatProgram {
    /// 放送番組番号識別。
    pub program_number: u16,
    /// PMTのPID。
    pub program_map_pid: Pid,
}

/// PAT（Program Association Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pat {
    /// トランスポートストリーム識別。
    pub transport_stream_id: u16,
    /// セクション情報。
    pub info: SectionInfo,
    /// NITのPID。
    pub network_pid: Option<Pid>,
    /// PMTのPIDを格納する配列。
    pub programs: Vec<PatProgram>,
}

impl Pat {
    /// PATのテーブルID。
    pub const TABLE_ID: u8 = 0x00;

    /// セクションとして書き込む。
    pub fn write(&self) -> Result<Vec<u8>, PsiError> {
        let mut w = SectionWriter::extended(Self::TABLE_ID, false, self.transport_stream_id, &self.info);
        if let Some(pid) = self.network_pid {
            w.put_u16(0);
            w.put_bytes(&pid.to_bytes());
        }
        for program in &self.programs {
            w.put_u16(program.program_number);
            w.put_bytes(&program.program_map_pid.to_bytes());
        }
        w.finish()
    }
}

impl<'a> PsiTable<'a> for Pat {
    fn read(psi: &PsiSection<'a>) -> Result<Pat, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let syntax = psi.syntax()?;
        if psi.data.len() % 4 != 0 {
            log::debug!("invalid Pat::programs");
            return Err(PsiError::LengthMismatch);
        }

        let mut network_pid = None;
        let mut programs = Vec::new();
        for chunk in psi.data.chunks_exact(4) {
            let program_number = u16::from_be_bytes([chunk[0], chunk[1]]);
            let pid = Pid::read(&chunk[2..=3]);

            if program_number == 0 {
                // NIT
                network_pid = Some(pid);
            } else {
                // PMT
                programs.push(PatProgram {
                    program_number,
                    program_map_pid: pid,
                });
            }
        }

        Ok(Pat {
            transport_stream_id: syntax.table_id_extension,
            info: syntax.info(),
            network_pid,
            programs,
        })
    }
}

/// CAT（Conditional Access Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cat<'a> {
    /// セクション情報。
    pub info: SectionInfo,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> Cat<'a> {
    /// CATのテーブルID。
    pub const TABLE_ID: u8 = 0x01;

    /// セクションとして書き込む。
    pub fn write(&self) -> Result<Vec<u8>, PsiError> {
        let mut w = SectionWriter::extended(Self::TABLE_ID, false, 0xFFFF, &self.info);
        w.put_bytes(self.descriptors.as_bytes());
        w.finish()
    }
}

impl<'a> PsiTable<'a> for Cat<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Cat<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let syntax = psi.syntax()?;

        Ok(Cat {
            info: syntax.info(),
            descriptors: DescriptorBlock::new(psi.data)?,
        })
    }
}

/// 各サービスを構成するストリームのPIDの定義。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream<'a> {
    /// ストリーム形式種別。
    pub stream_type: StreamType,
    /// エレメンタリーPID。
    pub elementary_pid: Pid,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

/// PMT（Program Map Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pmt<'a> {
    /// 放送番組番号識別。
    pub program_number: u16,
    /// セクション情報。
    pub info: SectionInfo,
    /// PCRのPID。
    pub pcr_pid: Pid,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
    /// ストリームのPIDを格納する配列。
    pub streams: Vec<PmtStream<'a>>,
}

impl<'a> Pmt<'a> {
    /// PMTのテーブルID。
    pub const TABLE_ID: u8 = 0x02;

    /// セクションとして書き込む。
    pub fn write(&self) -> Result<Vec<u8>, PsiError> {
        let mut w = SectionWriter::extended(Self::TABLE_ID, false, self.program_number, &self.info);
        w.put_bytes(&self.pcr_pid.to_bytes());
        w.put_descriptors(&self.descriptors)?;
        for stream in &self.streams {
            w.put_u8(stream.stream_type.0);
            w.put_bytes(&stream.elementary_pid.to_bytes());
            w.put_descriptors(&stream.descriptors)?;
        }
        w.finish()
    }
}

impl<'a> PsiTable<'a> for Pmt<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Pmt<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let syntax = psi.syntax()?;

        let mut r = Reader::new(psi.data);
        let pcr_pid = Pid::read(r.read_bytes(2)?);
        let descriptors = r.read_descriptors()?;

        let mut streams = Vec::new();
        while !r.is_empty() {
            let stream_type = StreamType(r.read_u8()?);
            let elementary_pid = Pid::read(r.read_bytes(2)?);
            let descriptors = r.read_descriptors()?;

            streams.push(PmtStream {
                stream_type,
                elementary_pid,
                descriptors,
            });
        }

        Ok(Pmt {
            program_number: syntax.table_id_extension,
            info: syntax.info(),
            pcr_pid,
            descriptors,
            streams,
        })
    }
}

/// TSDT（Transport Stream Description Table）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tsdt<'a> {
    /// セクション情報。
    pub info: SectionInfo,
    /// 記述子の塊。
    pub descriptors: DescriptorBlock<'a>,
}

impl<'a> Tsdt<'a> {
    /// TSDTのテーブルID。
    pub const TABLE_ID: u8 = 0x03;
}

impl<'a> PsiTable<'a> for Tsdt<'a> {
    fn read(psi: &PsiSection<'a>) -> Result<Tsdt<'a>, PsiError> {
        psi.expect_table_id([Self::TABLE_ID])?;
        let syntax = psi.syntax()?;

        Ok(Tsdt {
            info: syntax.info(),
            descriptors: DescriptorBlock::new(psi.data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    use crate::psi::desc::mpeg::ConditionalAccessDescriptor;

    fn info(version_number: u8) -> SectionInfo {
        SectionInfo {
            version_number,
            current_next_indicator: true,
            section_number: 0,
            last_section_number: 0,
        }
    }

    #[test]
    fn test_pat() {
        let section = hex!("00 B0 0D 00 01 C1 00 00 00 01 E1 00 E8 F9 5E 7D");
        let pat = Pat::decode(&section, true).unwrap();
        assert_eq!(pat.transport_stream_id, 1);
        assert_eq!(pat.network_pid, None);
        assert_eq!(
            pat.programs,
            [PatProgram {
                program_number: 1,
                program_map_pid: Pid::new(0x0100),
            }]
        );
        assert_eq!(pat.write().unwrap(), section);

        for len in 0..section.len() {
            assert!(Pat::decode(&section[..len], true).is_err());
        }
    }

    #[test]
    fn test_pat_round_trip() {
        let pat = Pat {
            transport_stream_id: 0x1234,
            info: info(5),
            network_pid: Some(Pid::NIT),
            programs: vec![
                PatProgram {
                    program_number: 0x0101,
                    program_map_pid: Pid::new(0x0101),
                },
                PatProgram {
                    program_number: 0x0102,
                    program_map_pid: Pid::new(0x0102),
                },
            ],
        };
        let section = pat.write().unwrap();
        assert_eq!(Pat::decode(&section, true).unwrap(), pat);
    }

    #[test]
    fn test_pat_wrong_table() {
        let section = hex!("00 B0 0D 00 01 C1 00 00 00 01 E1 00 E8 F9 5E 7D");
        assert_matches!(Cat::decode(&section, true), Err(PsiError::UnsupportedTableId(0x00)));
    }

    #[test]
    fn test_cat() {
        let descriptors = hex!("09 04 0B 00 E1 23");
        let cat = Cat {
            info: info(1),
            descriptors: DescriptorBlock::new(&descriptors).unwrap(),
        };
        let section = cat.write().unwrap();
        let decoded = Cat::decode(&section, true).unwrap();
        assert_eq!(decoded, cat);

        let ca = decoded
            .descriptors
            .get::<ConditionalAccessDescriptor>()
            .unwrap()
            .unwrap();
        assert_eq!(ca.ca_system_id, 0x0B00);
        assert_eq!(ca.ca_pid, Pid::new(0x0123));
    }

    #[test]
    fn test_pmt() {
        let program_info = hex!("09 04 0B 00 E1 23");
        let video_info = hex!("52 01 01");
        let pmt = Pmt {
            program_number: 0x0101,
            info: info(3),
            pcr_pid: Pid::new(0x0111),
            descriptors: DescriptorBlock::new(&program_info).unwrap(),
            streams: vec![
                PmtStream {
                    stream_type: StreamType::H264,
                    elementary_pid: Pid::new(0x0111),
                    descriptors: DescriptorBlock::new(&video_info).unwrap(),
                },
                PmtStream {
                    stream_type: StreamType::MPEG1_AUDIO,
                    elementary_pid: Pid::new(0x0112),
                    descriptors: DescriptorBlock::EMPTY,
                },
            ],
        };
        let section = pmt.write().unwrap();
        assert_eq!(Pmt::decode(&section, true).unwrap(), pmt);

        for len in 0..section.len() {
            assert!(Pmt::decode(&section[..len], true).is_err());
        }
    }

    #[test]
    fn test_pmt_descriptor_overrun() {
        // program_info_lengthが2だが記述子は3バイト
        let mut w = SectionWriter::extended(Pmt::TABLE_ID, false, 1, &info(0));
        w.put_u16(0xE100);
        w.put_u16(0xF002);
        w.put_bytes(&hex!("52 01 01"));
        let section = w.finish().unwrap();
        assert_matches!(Pmt::decode(&section, true), Err(PsiError::DescriptorTruncated));
    }
}
