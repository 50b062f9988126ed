//! EN 50221に基づくCommon Interface（CI）のホスト側スタック。
//!
//! CAMとの通信をトランスポート層・セッション層・アプリケーション層に分けて扱う。
//! デバイスへの入出力は[`CaDevice`]として抽象化され、
//! 上位層は[`CommonInterface::poll`]を繰り返し呼ぶことで駆動される。

#![deny(missing_docs)]

pub mod apdu;
pub mod app;
pub mod asn1;
pub mod ci;
pub mod device;
pub mod error;
pub mod resource;
pub mod session;
pub mod spdu;
pub mod tpdu;
pub mod transport;

#[cfg(test)]
mod sim;

pub use apdu::Apdu;
pub use app::AppEvent;
pub use ci::{CiEvent, CommonInterface};
pub use device::{CaDevice, CamState, LinkType};
pub use error::CiError;
pub use resource::{Application, Context, Resource, ResourceId, ResourceRegistry};
pub use session::{SessionEvent, SessionHandler, SessionId, SessionLayer};
pub use spdu::SessionStatus;
pub use transport::{SlotConfig, SlotId, TransportEvent, TransportLayer};
