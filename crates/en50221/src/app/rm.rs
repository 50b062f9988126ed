//! リソースマネージャ。

use fxhash::FxHashSet;

use crate::apdu::Apdu;
use crate::app::{unexpected_apdu, AppEvent};
use crate::error::CiError;
use crate::resource::{Context, Resource, ResourceId};
use crate::session::SessionId;

/// profile_enqのタグ。
pub const TAG_PROFILE_ENQ: u32 = 0x9F8010;
/// profileのタグ。
pub const TAG_PROFILE: u32 = 0x9F8011;
/// profile_changeのタグ。
pub const TAG_PROFILE_CHANGE: u32 = 0x9F8012;

/// リソースマネージャ。
///
/// セッションが開かれるとモジュールのプロファイルを問い合わせ、
/// モジュールからの問い合わせにはホストに登録されたリソースを返す。
#[derive(Debug, Default)]
pub struct ResourceManager {
    /// profile_changeを送ったセッション。
    changed: FxHashSet<SessionId>,
}

impl ResourceManager {
    /// `ResourceManager`を生成する。
    pub fn new() -> ResourceManager {
        ResourceManager::default()
    }
}

impl Resource for ResourceManager {
    fn resource_id(&self) -> ResourceId {
        ResourceId::RESOURCE_MANAGER
    }

    fn opened(&mut self, ctx: &mut Context, session: SessionId) -> Result<(), CiError> {
        ctx.send(session, TAG_PROFILE_ENQ, &[])
    }

    fn receive(
        &mut self,
        ctx: &mut Context,
        session: SessionId,
        apdu: &Apdu,
    ) -> Result<(), CiError> {
        match apdu.tag {
            TAG_PROFILE_ENQ => {
                let profile: Vec<u8> = ctx.resources().iter().flat_map(|r| r.to_bytes()).collect();
                ctx.send(session, TAG_PROFILE, &profile)
            }
            TAG_PROFILE => {
                let chunks = apdu.data.chunks_exact(4);
                if !chunks.remainder().is_empty() {
                    log::debug!("invalid profile: {} bytes", apdu.data.len());
                    return Err(CiError::LengthMismatch);
                }
                let resources = chunks
                    .map(|c| ResourceId::from_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                ctx.emit(AppEvent::ModuleProfile { session, resources });

                // 初回のみホストのリソースを問い合わせ直させる
                if self.changed.insert(session) {
                    ctx.send(session, TAG_PROFILE_CHANGE, &[])?;
                }
                Ok(())
            }
            TAG_PROFILE_CHANGE => ctx.send(session, TAG_PROFILE_ENQ, &[]),
            tag => Err(unexpected_apdu("resource manager", tag)),
        }
    }

    fn closed(&mut self, _ctx: &mut Context, session: SessionId) {
        self.changed.remove(&session);
    }
}
