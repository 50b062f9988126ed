//! MPEG-2 Systems・DVB・ATSCのSI（番組配列情報）セクションおよび記述子を読み書きするためのクレート。
//!
//! すべての読み取りは呼び出し元が所有するバイト列を借用し、
//! 不正なデータに対してはパニックせず[`PsiError`]を返す。

#![deny(missing_docs)]

pub mod crc;
pub mod lang;
pub mod pid;
pub mod psi;
pub mod reader;
pub mod text;
pub mod time;
mod utils;

pub use pid::Pid;
pub use psi::{PsiError, PsiSection, PsiTable};
pub use reader::Reader;
pub use text::{DvbStr, MultipleString};
