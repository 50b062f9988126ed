//! CIスタックで発生するエラー。

use thiserror::Error;

/// CIスタックの各層で発生するエラー。
#[derive(Debug, Error)]
pub enum CiError {
    /// データ長が足りない。
    #[error("truncated data")]
    TruncatedData,

    /// 宣言された長さと実際のデータ長が一致しない。
    #[error("length mismatch")]
    LengthMismatch,

    /// モジュールがプロトコルに違反するデータを送ってきた。
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// 要求されたリソースが存在しない、または使用できない。
    #[error("resource unavailable")]
    ResourceUnavailable,

    /// モジュールが時間内に応答しなかった。
    #[error("slot timed out")]
    SlotTimeout,

    /// モジュールがトランスポートコネクションのエラーを通知した。
    #[error("slot reported an error")]
    SlotError,

    /// 登録できるリソース数を超えた。
    #[error("too many resources")]
    TooManyResources,

    /// 登録できるスロット数を超えた。
    #[error("too many slots")]
    TooManySlots,

    /// スロット当たりのコネクション数を超えた。
    #[error("too many connections")]
    TooManyConnections,

    /// 同時に開けるセッション数を超えた。
    #[error("too many sessions")]
    TooManySessions,

    /// スロットが存在しない。
    #[error("bad slot")]
    BadSlot,

    /// コネクションが存在しないか、使用できる状態にない。
    #[error("bad connection")]
    BadConnection,

    /// セッションが存在しないか、使用できる状態にない。
    #[error("bad session")]
    BadSession,

    /// 対応していない機能を要求された。
    #[error("unsupported")]
    Unsupported,

    /// デバイスの入出力エラー。
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
