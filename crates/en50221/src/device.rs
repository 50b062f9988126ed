//! CAデバイスとのリンク層の入出力。

use std::io;

/// スロットに挿入されたモジュールの状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CamState {
    /// モジュールが挿入されていない。
    Missing,
    /// モジュールは挿入されているが初期化中である。
    Initialising,
    /// モジュールが通信可能である。
    Ready,
}

/// スロットのインターフェイス種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    /// TPDUをリンク層でやり取りする。
    Link,
    /// 上位層をデバイスドライバが処理する（HLCI）。
    Hlci,
}

/// CAデバイスのリンク層を抽象化するトレイト。
///
/// すべてのメソッドはノンブロッキングであることが期待される。
pub trait CaDevice: Send {
    /// `slot`のモジュールをリセットする。
    fn reset(&mut self, slot: u8) -> io::Result<()>;

    /// `slot`のモジュールの状態を返す。
    fn slot_status(&mut self, slot: u8) -> io::Result<CamState>;

    /// `slot`のインターフェイス種別を返す。
    fn link_type(&mut self, slot: u8) -> io::Result<LinkType>;

    /// `slot`からリンク層のデータを1つ読み取り、コネクション識別とバイト数を返す。
    ///
    /// 読み取れるデータがない場合は`None`を返す。
    fn read(&mut self, slot: u8, buf: &mut [u8]) -> io::Result<Option<(u8, usize)>>;

    /// `slot`のコネクション`tcid`にリンク層のデータを書き込む。
    fn write(&mut self, slot: u8, tcid: u8, data: &[u8]) -> io::Result<()>;
}
