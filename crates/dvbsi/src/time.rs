//! SIにおける日付時刻。
//!
//! DVBでは修正ユリウス日（MJD）と2進化10進数（BCD）による協定世界時、
//! ATSCでは1980年1月6日からのGPS秒が使われる。

use std::fmt::{self, Write};

use crate::utils::{read_bcd_digit, to_bcd_digit, BytesExt};

/// Unix時間の起点（1970年1月1日）の修正ユリウス日。
const MJD_UNIX_EPOCH: i64 = 40587;

/// GPS時間の起点（1980年1月6日 00:00:00 UTC）のUnix時間。
const GPS_UNIX_EPOCH: i64 = 315_964_800;

fn write_hundreds<W: Write>(w: &mut W, n: u8) -> fmt::Result {
    let h = b'0' + n / 10;
    let l = b'0' + n % 10;
    w.write_char(h as char)?;
    w.write_char(l as char)
}

/// 修正ユリウス日。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MjdDate {
    /// 1900年からの年（2003年＝103）。
    pub year: u16,
    /// 月（1月＝1、12月＝12）。
    pub month: u8,
    /// 日（1～31）。
    pub day: u8,
    /// 曜日（月曜日＝1、日曜日＝7）。
    pub day_of_week: u8,
}

impl MjdDate {
    /// `data`から`MjdDate`を読み取る。
    #[inline]
    pub fn read(data: &[u8; 2]) -> MjdDate {
        MjdDate::from_mjd(data[..].read_be_16())
    }

    /// 修正ユリウス日から`MjdDate`を生成する。
    ///
    /// EN 300 468 付録Cの換算式による。
    pub fn from_mjd(mjd: u16) -> MjdDate {
        let mjd_f = mjd as f64;
        let yd = ((mjd_f - 15078.2) / 365.25) as i64;
        let md = ((mjd_f - 14956.1 - ((yd as f64) * 365.25).trunc()) / 30.6001) as i64;
        let day = mjd as i64 - 14956 - ((yd as f64) * 365.25) as i64 - ((md as f64) * 30.6001) as i64;
        let k = if md == 14 || md == 15 { 1 } else { 0 };
        let year = yd + k;
        let month = md - 1 - k * 12;
        let day_of_week = ((mjd as u32 + 2) % 7 + 1) as u8;

        MjdDate {
            year: year.clamp(0, u16::MAX as i64) as u16,
            month: month.clamp(0, 12) as u8,
            day: day.clamp(0, 31) as u8,
            day_of_week,
        }
    }

    /// 修正ユリウス日を返す。
    pub fn to_mjd(&self) -> u16 {
        let l = if self.month <= 2 { 1 } else { 0 };
        let y = self.year as i64 - l;
        let m = self.month as i64 + 1 + l * 12;
        let mjd = 14956 + self.day as i64 + (y * 1461) / 4 + (m * 306001) / 10000;
        mjd.clamp(0, u16::MAX as i64) as u16
    }

    /// 修正ユリウス日を2バイトで書き込む。
    #[inline]
    pub fn to_bytes(&self) -> [u8; 2] {
        self.to_mjd().to_be_bytes()
    }
}

impl fmt::Debug for MjdDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", 1900 + self.year as u32)?;

        f.write_char('-')?;
        write_hundreds(f, self.month)?;

        f.write_char('-')?;
        write_hundreds(f, self.day)
    }
}

impl fmt::Display for MjdDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 修正ユリウス日と協定世界時からなる日付時刻。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DateTime {
    /// 修正ユリウス日。
    pub date: MjdDate,
    /// 時（0～23）。
    pub hour: u8,
    /// 分（0～59）。
    pub minute: u8,
    /// 秒（0～60）。
    pub second: u8,
}

impl DateTime {
    /// `data`から`DateTime`を読み取る。
    pub fn read(data: &[u8; 5]) -> DateTime {
        let date = MjdDate::read(&[data[0], data[1]]);

        let hour = read_bcd_digit(data[2]);
        let minute = read_bcd_digit(data[3]);
        let second = read_bcd_digit(data[4]);

        DateTime {
            date,
            hour,
            minute,
            second,
        }
    }

    /// 5バイトのMJD・BCD形式で書き込む。
    pub fn to_bytes(&self) -> [u8; 5] {
        let [d0, d1] = self.date.to_bytes();
        [
            d0,
            d1,
            to_bcd_digit(self.hour),
            to_bcd_digit(self.minute),
            to_bcd_digit(self.second),
        ]
    }

    /// Unix時間から`DateTime`を生成する。
    pub fn from_unix(secs: i64) -> DateTime {
        let days = secs.div_euclid(86400);
        let secs_of_day = secs.rem_euclid(86400);
        let mjd = (days + MJD_UNIX_EPOCH).clamp(0, u16::MAX as i64) as u16;

        DateTime {
            date: MjdDate::from_mjd(mjd),
            hour: (secs_of_day / 3600) as u8,
            minute: (secs_of_day / 60 % 60) as u8,
            second: (secs_of_day % 60) as u8,
        }
    }

    /// Unix時間に変換する。
    pub fn to_unix(&self) -> i64 {
        let days = self.date.to_mjd() as i64 - MJD_UNIX_EPOCH;
        days * 86400 + self.hour as i64 * 3600 + self.minute as i64 * 60 + self.second as i64
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.date.fmt(f)?;
        f.write_char(' ')?;

        write_hundreds(f, self.hour)?;
        f.write_char(':')?;
        write_hundreds(f, self.minute)?;
        f.write_char(':')?;
        write_hundreds(f, self.second)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 6桁のBCDで表された時分秒を秒数として読み取る。
#[inline]
pub fn read_bcd_duration(data: &[u8; 3]) -> u32 {
    read_bcd_digit(data[0]) as u32 * 3600
        + read_bcd_digit(data[1]) as u32 * 60
        + read_bcd_digit(data[2]) as u32
}

/// 秒数を6桁のBCDで表された時分秒にする。
///
/// 99時間59分59秒を超える場合は切り詰められる。
pub fn to_bcd_duration(secs: u32) -> [u8; 3] {
    let secs = secs.min(99 * 3600 + 59 * 60 + 59);
    [
        to_bcd_digit((secs / 3600) as u8),
        to_bcd_digit((secs / 60 % 60) as u8),
        to_bcd_digit((secs % 60) as u8),
    ]
}

/// 4桁のBCDで表された時分を分数として読み取る。
#[inline]
pub fn read_bcd_hhmm(data: &[u8; 2]) -> u16 {
    read_bcd_digit(data[0]) as u16 * 60 + read_bcd_digit(data[1]) as u16
}

/// ATSCで使われるGPS時間（1980年1月6日 00:00:00 UTCからの秒数）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpsTime(pub u32);

impl GpsTime {
    /// GPS・UTC間のうるう秒差`gps_utc_offset`を考慮してUnix時間に変換する。
    #[inline]
    pub fn to_unix(self, gps_utc_offset: u8) -> i64 {
        self.0 as i64 + GPS_UNIX_EPOCH - gps_utc_offset as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_time() {
        // EN 300 468 付録Cの例：93/10/13 12:45:00 → 0xC079124500
        let dt = DateTime::read(&[0xC0, 0x79, 0x12, 0x45, 0x00]);
        assert_eq!(dt.date.year, 93);
        assert_eq!(dt.date.month, 10);
        assert_eq!(dt.date.day, 13);
        assert_eq!(dt.date.day_of_week, 3);
        assert_eq!(dt.hour, 12);
        assert_eq!(dt.minute, 45);
        assert_eq!(dt.second, 0);
        assert_eq!(dt.to_string(), "1993-10-13 12:45:00");
        assert_eq!(dt.to_bytes(), [0xC0, 0x79, 0x12, 0x45, 0x00]);
    }

    #[test]
    fn test_mjd_conversion() {
        for mjd in [40587, 45218, 49273, 51544, 51603, 58849, 60000] {
            assert_eq!(MjdDate::from_mjd(mjd).to_mjd(), mjd);
        }
    }

    #[test]
    fn test_unix() {
        let dt = DateTime::from_unix(0);
        assert_eq!(dt.to_string(), "1970-01-01 00:00:00");

        let secs = chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap()
            .and_utc()
            .timestamp();
        let dt = DateTime::from_unix(secs);
        assert_eq!(dt.to_string(), "2024-02-29 23:59:58");
        assert_eq!(dt.to_unix(), secs);
    }

    #[test]
    fn test_duration() {
        assert_eq!(read_bcd_duration(&[0x01, 0x45, 0x30]), 3600 + 45 * 60 + 30);
        assert_eq!(to_bcd_duration(3600 + 45 * 60 + 30), [0x01, 0x45, 0x30]);
        assert_eq!(read_bcd_hhmm(&[0x01, 0x30]), 90);
    }

    #[test]
    fn test_gps_time() {
        assert_eq!(GpsTime(0).to_unix(0), 315_964_800);
        assert_eq!(GpsTime(100).to_unix(18), 315_964_800 + 100 - 18);
    }
}
