//! TSパケットのペイロードからセクションを組み立てるバッファ。

use arrayvec::ArrayVec;

use super::{PsiError, PsiSection, MAX_SECTION_LENGTH};

/// 分割されて届くセクションを組み立てる。
///
/// TSパケットのペイロードを順に[`push`](SectionBuffer::push)すると、
/// セクションが揃うたびにコールバックが呼ばれる。
#[derive(Clone)]
pub struct SectionBuffer {
    buffer: Box<ArrayVec<u8, { 3 + MAX_SECTION_LENGTH }>>,
    synced: bool,
    verify_crc: bool,
}

impl SectionBuffer {
    /// 空のバッファを生成する。`verify_crc`が`true`の場合はCRCが一致するセクションのみを渡す。
    pub fn new(verify_crc: bool) -> SectionBuffer {
        SectionBuffer {
            buffer: Box::new(ArrayVec::new()),
            synced: false,
            verify_crc,
        }
    }

    /// 組み立て途中のデータを破棄し、次の`payload_unit_start_indicator`まで読み飛ばす。
    ///
    /// 連続性指標の不連続を検出した場合などに呼ぶ。
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.synced = false;
    }

    /// 組み立て途中のバイト数を返す。
    #[inline]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// TSパケットのペイロードを追加する。
    ///
    /// `unit_start`が`true`の場合、`payload`の先頭はpointer_fieldである。
    pub fn push<F>(&mut self, payload: &[u8], unit_start: bool, mut on_section: F)
    where
        F: FnMut(&PsiSection),
    {
        if payload.is_empty() {
            return;
        }

        if unit_start {
            let len = payload[0] as usize;
            let Some((prev, next)) = payload[1..].split_at_checked(len) else {
                log::debug!("invalid pointer_field: {}", len);
                self.reset();
                return;
            };

            if !prev.is_empty() && self.synced {
                self.write(prev, false, &mut on_section);
            }
            self.synced = true;
            self.write(next, true, &mut on_section);
        } else if self.synced {
            self.write(payload, false, &mut on_section);
        }
    }

    fn write<F>(&mut self, data: &[u8], is_start: bool, on_section: &mut F)
    where
        F: FnMut(&PsiSection),
    {
        if is_start {
            self.buffer.clear();
        }

        // バッファに収まる形でdataを追記
        let len = std::cmp::min(self.buffer.remaining_capacity(), data.len());
        let _result = self.buffer.try_extend_from_slice(&data[..len]);
        debug_assert!(_result.is_ok());

        let mut buf = self.buffer.as_slice();
        loop {
            let psi_len = match PsiSection::parse(buf, self.verify_crc) {
                Err(PsiError::TruncatedData | PsiError::EndOfPsi) => break,
                Err(PsiError::CrcMismatch) => {
                    log::debug!("psi section crc32 error");
                    section_len(buf)
                }
                Err(e) => {
                    // セクション長が信用できないため次の先頭まで捨てる
                    log::debug!("psi section corrupted: {}", e);
                    buf = &[];
                    self.synced = false;
                    break;
                }
                Ok((psi, psi_len)) => {
                    on_section(&psi);
                    psi_len
                }
            };

            // 読み込んだセクションの分バッファを進める
            buf = &buf[psi_len..];
        }

        if buf.len() < self.buffer.len() {
            // 処理した部分を捨てる
            let remaining = buf.len();
            let offset = self.buffer.len() - remaining;
            self.buffer.copy_within(offset.., 0);
            self.buffer.truncate(remaining);
        }
    }
}

impl std::fmt::Debug for SectionBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionBuffer")
            .field("pending", &self.buffer.len())
            .field("synced", &self.synced)
            .field("verify_crc", &self.verify_crc)
            .finish()
    }
}

/// ヘッダを解析済みのセクションのバイト数。
#[inline]
fn section_len(buf: &[u8]) -> usize {
    3 + (u16::from_be_bytes([buf[1], buf[2]]) & 0x0FFF) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const PAT: [u8; 16] = hex!("00 B0 0D 00 01 C1 00 00 00 01 E1 00 E8 F9 5E 7D");
    const TDT: [u8; 8] = hex!("70 70 05 C0 79 12 45 00");

    fn collect(buf: &mut SectionBuffer, payload: &[u8], unit_start: bool) -> Vec<u8> {
        let mut table_ids = Vec::new();
        buf.push(payload, unit_start, |psi| table_ids.push(psi.table_id));
        table_ids
    }

    #[test]
    fn test_single_packet() {
        let mut buf = SectionBuffer::new(true);
        let mut payload = vec![0x00];
        payload.extend_from_slice(&PAT);
        payload.extend_from_slice(&TDT);
        payload.extend_from_slice(&[0xFF; 10]);

        assert_eq!(collect(&mut buf, &payload, true), [0x00, 0x70]);
        // 詰め込みバイトは残るが次の先頭で捨てられる
        assert_eq!(buf.pending(), 10);
    }

    #[test]
    fn test_split_sections() {
        let mut buf = SectionBuffer::new(true);

        let mut first = vec![0x00];
        first.extend_from_slice(&PAT[..5]);
        assert!(collect(&mut buf, &first, true).is_empty());
        assert_eq!(buf.pending(), 5);

        assert_eq!(collect(&mut buf, &PAT[5..], false), [0x00]);
        assert_eq!(buf.pending(), 0);

        // pointer_fieldの前半で前のセクションが完結する
        let mut first = vec![0x00];
        first.extend_from_slice(&TDT[..3]);
        assert!(collect(&mut buf, &first, true).is_empty());

        let mut next = vec![5];
        next.extend_from_slice(&TDT[3..]);
        next.extend_from_slice(&PAT);
        assert_eq!(collect(&mut buf, &next, true), [0x70, 0x00]);
    }

    #[test]
    fn test_not_synced() {
        let mut buf = SectionBuffer::new(true);
        assert!(collect(&mut buf, &PAT, false).is_empty());
        assert_eq!(buf.pending(), 0);

        // 同期前のpointer_field前半も捨てる
        let mut payload = vec![3, 0x70, 0x70, 0x05];
        payload.extend_from_slice(&PAT);
        assert_eq!(collect(&mut buf, &payload, true), [0x00]);
    }

    #[test]
    fn test_crc_error_skips_section() {
        let mut buf = SectionBuffer::new(true);
        let mut corrupted = PAT;
        corrupted[10] ^= 0x01;

        let mut payload = vec![0x00];
        payload.extend_from_slice(&corrupted);
        payload.extend_from_slice(&TDT);
        assert_eq!(collect(&mut buf, &payload, true), [0x70]);

        let mut buf = SectionBuffer::new(false);
        assert_eq!(collect(&mut buf, &payload, true), [0x00, 0x70]);
    }

    #[test]
    fn test_invalid_pointer_field() {
        let mut buf = SectionBuffer::new(true);
        assert!(collect(&mut buf, &[0x10, 0x00], true).is_empty());
        assert!(collect(&mut buf, &PAT, false).is_empty());
    }

    #[test]
    fn test_reset() {
        let mut buf = SectionBuffer::new(true);
        let mut first = vec![0x00];
        first.extend_from_slice(&PAT[..8]);
        assert!(collect(&mut buf, &first, true).is_empty());

        buf.reset();
        assert_eq!(buf.pending(), 0);
        assert!(collect(&mut buf, &PAT[8..], false).is_empty());
    }
}
