//! MPEG-2で使われるCRC32。
//!
//! 生成多項式は0x04C11DB7、初期値は0xFFFFFFFFで、ビット反転および最終XORは行わない。

const fn make_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static TABLE: [u32; 256] = make_table();

/// `data`のCRC32を計算する。
pub fn calc32(data: &[u8]) -> u32 {
    data.iter().fold(0xFFFF_FFFF, |crc, &b| {
        (crc << 8) ^ TABLE[((crc >> 24) ^ b as u32) as usize]
    })
}

/// 末尾にCRC32を含む`section`が正しいかどうかを返す。
///
/// CRCを含めたセクション全体のCRC32が0になる場合に正しいものとする。
#[inline]
pub fn verify(section: &[u8]) -> bool {
    calc32(section) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc32() {
        assert_eq!(calc32(b"123456789"), 0x0376_E6E7);
        assert_eq!(calc32(&[]), 0xFFFF_FFFF);
    }

    #[test]
    fn test_verify() {
        // PAT: TSID=1, プログラム1 → PID 0x0100
        let mut section = hex_literal::hex!("00 B0 0D 00 01 C1 00 00 00 01 E1 00").to_vec();
        let crc = calc32(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        assert!(verify(&section));

        for bit in 0..section.len() * 8 {
            let mut corrupted = section.clone();
            corrupted[bit / 8] ^= 0x80 >> (bit % 8);
            assert!(!verify(&corrupted), "bit {} flip undetected", bit);
        }
    }

    #[test]
    fn test_zeroed_crc() {
        let body = hex_literal::hex!("00 B0 0D 00 01 C1 00 00 00 01 E1 00");
        assert_eq!(calc32(&body), 0xE8F9_5E7D);

        // 本体のCRCが0でなければ、CRCを0にしたセクションは通らない
        let mut zeroed = body.to_vec();
        zeroed.extend_from_slice(&[0, 0, 0, 0]);
        assert!(!verify(&zeroed));

        // 本体自体のCRCが0になる場合に限り、CRCを0にしたセクションも通る
        let mut genuine = body.to_vec();
        genuine.extend_from_slice(&calc32(&body).to_be_bytes());
        assert_eq!(calc32(&genuine), 0);
        genuine.extend_from_slice(&[0, 0, 0, 0]);
        assert!(verify(&genuine));
    }
}
