//! 記述子の定義。
//!
//! 記述子ループそのものは[`DescriptorBlock`]が扱い、
//! 各規格で定義される記述子は規格ごとのモジュールに置く。

mod base;
pub mod atsc;
pub mod dvb;
pub mod mpeg;
pub mod registry;

pub use base::*;
pub use registry::{AnyDescriptor, Standard};
