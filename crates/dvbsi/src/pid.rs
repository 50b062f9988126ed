//! PID関連。

use std::fmt;

use crate::utils::BytesExt;

/// MPEG2-TSのPID（13ビット）。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u16);

// 定数はISO/IEC 13818-1、EN 300 468およびATSC A/65による。
impl Pid {
    /// PIDの最大値。
    pub const MAX: u16 = 0x1FFF;

    /// プログラムアソシエーションテーブル（Program Association Table）。
    pub const PAT: Pid = Pid::new(0x0000);
    /// 限定受信テーブル（Conditional Access Table）。
    pub const CAT: Pid = Pid::new(0x0001);
    /// トランスポートストリーム記述テーブル（Transport Stream Description Table）。
    pub const TSDT: Pid = Pid::new(0x0002);

    /// ネットワーク情報テーブル（Network Information Table）。
    pub const NIT: Pid = Pid::new(0x0010);
    /// サービス記述テーブル（Service Description Table）。
    pub const SDT: Pid = Pid::new(0x0011);
    /// ブーケアソシエーションテーブル（Bouquet Association Table）。
    pub const BAT: Pid = Pid::new(0x0011);
    /// イベント情報テーブル（Event Information Table）。
    pub const EIT: Pid = Pid::new(0x0012);
    /// 進行状態テーブル（Running Status Table）。
    pub const RST: Pid = Pid::new(0x0013);
    /// 時刻日付テーブル（Time and Date Table）。
    pub const TDT: Pid = Pid::new(0x0014);
    /// 時刻日付オフセットテーブル（Time Offset Table）。
    pub const TOT: Pid = Pid::new(0x0014);
    /// 不連続情報テーブル（Discontinuity Information Table）。
    pub const DIT: Pid = Pid::new(0x001E);
    /// 選択情報テーブル（Selection Information Table）。
    pub const SIT: Pid = Pid::new(0x001F);

    /// ATSCのPSIPベースPID。
    pub const PSIP: Pid = Pid::new(0x1FFB);
    /// ヌルパケット（Null packet）。
    pub const NULL: Pid = Pid::new(0x1FFF);

    /// `Pid`を生成する。
    ///
    /// # パニック
    ///
    /// `pid`の値が範囲外の際はパニックする。
    #[inline]
    pub const fn new(pid: u16) -> Pid {
        assert!(pid <= Pid::MAX);
        Pid(pid)
    }

    /// `pid`がPIDとして範囲内であれば`Pid`を生成する。
    #[inline]
    pub const fn try_new(pid: u16) -> Option<Pid> {
        if pid > Pid::MAX {
            None
        } else {
            Some(Pid(pid))
        }
    }

    /// `data`の先頭2バイトの下位13ビットからPIDを読み出す。
    ///
    /// # パニック
    ///
    /// `data`の長さが2未満の場合、このメソッドはパニックする。
    #[inline]
    pub fn read(data: &[u8]) -> Pid {
        Pid(data[0..=1].read_be_16() & 0x1FFF)
    }

    /// 上位3ビットを予約ビット（すべて1）として2バイトで書き込む。
    #[inline]
    pub const fn to_bytes(self) -> [u8; 2] {
        (self.0 | 0xE000).to_be_bytes()
    }

    /// PIDを`u16`で返す。
    #[inline]
    pub const fn get(&self) -> u16 {
        self.0
    }
}

impl Default for Pid {
    fn default() -> Self {
        Pid::NULL
    }
}

impl From<Pid> for u16 {
    fn from(value: Pid) -> Self {
        value.get()
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pid(0x{:04X})", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid() {
        assert_eq!(Pid::read(&[0xE1, 0x00]), Pid::new(0x0100));
        assert_eq!(Pid::new(0x0100).to_bytes(), [0xE1, 0x00]);
        assert_eq!(Pid::try_new(0x2000), None);
        assert_eq!(format!("{:?}", Pid::NIT), "Pid(0x0010)");
    }
}
