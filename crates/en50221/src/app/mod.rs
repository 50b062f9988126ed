//! ホストが提供する標準のリソース。

pub mod ai;
pub mod ca;
pub mod dt;
pub mod mmi;
pub mod rm;

use crate::resource::ResourceId;
use crate::session::SessionId;

pub use ai::{ApplicationInfo, ApplicationInformation};
pub use ca::{CaPmt, CaPmtCmd, CaPmtReply, CaSupport, ListManagement};
pub use dt::DateTime;
pub use mmi::{Menu, Mmi, MmiEvent};
pub use rm::ResourceManager;

/// リソースからアプリケーションへの通知。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// モジュールが提供するリソースの一覧を受け取った。
    ModuleProfile {
        /// セッション。
        session: SessionId,
        /// モジュールのリソース。
        resources: Vec<ResourceId>,
    },
    /// モジュールのアプリケーション情報を受け取った。
    ApplicationInfo {
        /// セッション。
        session: SessionId,
        /// アプリケーション情報。
        info: ApplicationInfo,
    },
    /// モジュールが対応する限定受信方式を受け取った。
    CaInfo {
        /// セッション。
        session: SessionId,
        /// 限定受信方式識別の一覧。
        ca_system_ids: Vec<u16>,
    },
    /// CA_PMTへの応答を受け取った。
    CaPmtReply {
        /// セッション。
        session: SessionId,
        /// 応答。
        reply: CaPmtReply,
    },
    /// MMIの表示要求を受け取った。
    Mmi {
        /// セッション。
        session: SessionId,
        /// 要求の内容。
        event: MmiEvent,
    },
}

/// リソースが扱わないAPDUを受け取った際のエラーを返す。
pub(crate) fn unexpected_apdu(resource: &'static str, tag: u32) -> crate::error::CiError {
    log::debug!("unexpected apdu {:#08X} for {}", tag, resource);
    crate::error::CiError::ProtocolViolation("unexpected apdu")
}
