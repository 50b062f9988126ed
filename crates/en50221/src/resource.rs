//! リソース識別とホスト側リソースの登録。

use std::fmt;
use std::time::Instant;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::apdu::{self, Apdu};
use crate::app::AppEvent;
use crate::error::CiError;
use crate::session::SessionId;
use crate::spdu::SessionStatus;

/// 登録できるリソースの最大数。
pub const MAX_RESOURCES: usize = 25;

/// リソース識別（resource_identifier）。
///
/// 公開リソースは上位2ビットが`0b11`以外で、クラス14ビット、種別10ビット、
/// バージョン6ビットからなる。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub u32);

impl ResourceId {
    /// リソースマネージャ。
    pub const RESOURCE_MANAGER: ResourceId = ResourceId::new(0x0001, 1, 1);
    /// アプリケーション情報。
    pub const APPLICATION_INFO: ResourceId = ResourceId::new(0x0002, 1, 1);
    /// 限定受信サポート。
    pub const CONDITIONAL_ACCESS: ResourceId = ResourceId::new(0x0003, 1, 1);
    /// 日時。
    pub const DATE_TIME: ResourceId = ResourceId::new(0x0024, 1, 1);
    /// MMI。
    pub const MMI: ResourceId = ResourceId::new(0x0040, 1, 1);

    /// クラス・種別・バージョンから公開リソースの識別を生成する。
    #[inline]
    pub const fn new(class: u16, resource_type: u16, version: u8) -> ResourceId {
        ResourceId(
            (class as u32 & 0x3FFF) << 16
                | (resource_type as u32 & 0x03FF) << 6
                | (version as u32 & 0x3F),
        )
    }

    /// 4バイトの値から読み取る。
    #[inline]
    pub const fn from_bytes(bytes: [u8; 4]) -> ResourceId {
        ResourceId(u32::from_be_bytes(bytes))
    }

    /// 4バイトの値に変換する。
    #[inline]
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// 私的リソースかどうか。
    #[inline]
    pub const fn is_private(self) -> bool {
        self.0 >> 30 == 0b11
    }

    /// リソースクラス。
    #[inline]
    pub const fn class(self) -> u16 {
        (self.0 >> 16 & 0x3FFF) as u16
    }

    /// リソース種別。
    #[inline]
    pub const fn resource_type(self) -> u16 {
        (self.0 >> 6 & 0x03FF) as u16
    }

    /// リソースのバージョン。
    #[inline]
    pub const fn version(self) -> u8 {
        (self.0 & 0x3F) as u8
    }

    /// バージョンを除いて同じリソースかどうか。
    #[inline]
    pub const fn same_resource(self, other: ResourceId) -> bool {
        if self.is_private() || other.is_private() {
            self.0 == other.0
        } else {
            self.0 >> 6 == other.0 >> 6
        }
    }

    /// このリソースで`requested`の要求に応じられるかを判定する。
    ///
    /// クラスと種別が一致し、バージョンが要求以上である必要がある。
    pub fn check(self, requested: ResourceId) -> Result<(), SessionStatus> {
        if !self.same_resource(requested) {
            Err(SessionStatus::NoResource)
        } else if !self.is_private() && self.version() < requested.version() {
            Err(SessionStatus::LowVersion)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ResourceId({:#010X})", self.0)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// リソースやアプリケーションに渡される、応答や通知の送り先。
#[derive(Debug)]
pub struct Context<'a> {
    pub(crate) now: Instant,
    pub(crate) unix_time: i64,
    pub(crate) resources: &'a [ResourceId],
    pub(crate) outbox: &'a mut Vec<(SessionId, Vec<u8>)>,
    pub(crate) events: &'a mut Vec<AppEvent>,
}

impl<'a> Context<'a> {
    /// 現在時刻。
    #[inline]
    pub fn now(&self) -> Instant {
        self.now
    }

    /// 現在のUNIX時間（秒）。
    #[inline]
    pub fn unix_time(&self) -> i64 {
        self.unix_time
    }

    /// ホストに登録されているリソース。
    #[inline]
    pub fn resources(&self) -> &[ResourceId] {
        self.resources
    }

    /// `session`にAPDUを送る。
    pub fn send(&mut self, session: SessionId, tag: u32, data: &[u8]) -> Result<(), CiError> {
        let apdu = apdu::encode(tag, data)?;
        self.outbox.push((session, apdu));
        Ok(())
    }

    /// アプリケーションへの通知を発行する。
    #[inline]
    pub fn emit(&mut self, event: AppEvent) {
        self.events.push(event);
    }
}

/// ホスト側で提供するリソース。
pub trait Resource: Send {
    /// このリソースの識別。
    fn resource_id(&self) -> ResourceId;

    /// モジュールがこのリソースへのセッションを開設した。
    fn opened(&mut self, ctx: &mut Context, session: SessionId) -> Result<(), CiError> {
        let _ = (ctx, session);
        Ok(())
    }

    /// セッションでAPDUを受信した。
    fn receive(
        &mut self,
        ctx: &mut Context,
        session: SessionId,
        apdu: &Apdu,
    ) -> Result<(), CiError>;

    /// セッションが閉じた。
    fn closed(&mut self, ctx: &mut Context, session: SessionId) {
        let _ = (ctx, session);
    }

    /// 定期的に呼ばれる。
    fn poll(&mut self, ctx: &mut Context) -> Result<(), CiError> {
        let _ = ctx;
        Ok(())
    }
}

/// セッションに直接結び付けられるアプリケーション。
///
/// アプリケーションが結び付けられたセッションのAPDUはリソースではなく
/// アプリケーションが受け取る。
pub trait Application: Send {
    /// セッションでAPDUを受信した。
    fn receive(
        &mut self,
        ctx: &mut Context,
        session: SessionId,
        apdu: &Apdu,
    ) -> Result<(), CiError>;

    /// セッションが閉じた。
    fn closed(&mut self, session: SessionId) {
        let _ = session;
    }
}

/// 登録されたリソースの一覧。
///
/// 登録順を保持し、プロファイルの応答はこの順序で返される。
pub struct ResourceRegistry {
    resources: IndexMap<ResourceId, Box<dyn Resource>, FxBuildHasher>,
    ids: Vec<ResourceId>,
}

impl ResourceRegistry {
    /// 空の`ResourceRegistry`を生成する。
    pub fn new() -> ResourceRegistry {
        ResourceRegistry {
            resources: IndexMap::default(),
            ids: Vec::new(),
        }
    }

    /// リソースを登録する。
    ///
    /// 同じ識別のリソースが既にある場合は置き換える。
    pub fn register(&mut self, resource: Box<dyn Resource>) -> Result<(), CiError> {
        let id = resource.resource_id();
        if !self.resources.contains_key(&id) && self.resources.len() >= MAX_RESOURCES {
            return Err(CiError::TooManyResources);
        }

        if self.resources.insert(id, resource).is_some() {
            log::debug!("resource {} replaced", id);
        } else {
            self.ids.push(id);
        }
        Ok(())
    }

    /// 登録されたリソースの識別を登録順に返す。
    #[inline]
    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }

    /// 登録されたリソースの数。
    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// リソースが1つも登録されていないかどうか。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// モジュールが要求したリソースに対応する、登録済みのリソースを探す。
    pub fn lookup(&self, requested: ResourceId) -> Result<ResourceId, SessionStatus> {
        let mut status = SessionStatus::NoResource;
        for &id in self.resources.keys() {
            match id.check(requested) {
                Ok(()) => return Ok(id),
                Err(e @ SessionStatus::LowVersion) => status = e,
                Err(_) => {}
            }
        }
        Err(status)
    }

    /// 登録済みの識別の一覧と、`id`のリソースを同時に借用する。
    pub(crate) fn split_mut(
        &mut self,
        id: ResourceId,
    ) -> (&[ResourceId], Option<&mut Box<dyn Resource>>) {
        (&self.ids, self.resources.get_mut(&id))
    }

    pub(crate) fn iter_mut(
        &mut self,
    ) -> (&[ResourceId], impl Iterator<Item = &mut Box<dyn Resource>>) {
        (&self.ids, self.resources.values_mut())
    }
}

impl Default for ResourceRegistry {
    fn default() -> ResourceRegistry {
        ResourceRegistry::new()
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(&self.ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct Dummy(ResourceId);

    impl Resource for Dummy {
        fn resource_id(&self) -> ResourceId {
            self.0
        }

        fn receive(&mut self, _: &mut Context, _: SessionId, _: &Apdu) -> Result<(), CiError> {
            Ok(())
        }
    }

    #[test]
    fn test_resource_id() {
        let id = ResourceId(0x00400041);
        assert_eq!(id, ResourceId::MMI);
        assert_eq!(id.class(), 0x40);
        assert_eq!(id.resource_type(), 1);
        assert_eq!(id.version(), 1);
        assert!(!id.is_private());
        assert_eq!(ResourceId::from_bytes(id.to_bytes()), id);

        assert_eq!(ResourceId::RESOURCE_MANAGER.0, 0x00010041);
        assert_eq!(ResourceId::APPLICATION_INFO.0, 0x00020041);
        assert_eq!(ResourceId::CONDITIONAL_ACCESS.0, 0x00030041);
        assert_eq!(ResourceId::DATE_TIME.0, 0x00240041);

        assert!(ResourceId(0xC000_1234).is_private());
    }

    #[test]
    fn test_check() {
        let host = ResourceId::new(0x0002, 1, 2);
        assert_eq!(host.check(ResourceId::new(0x0002, 1, 1)), Ok(()));
        assert_eq!(host.check(ResourceId::new(0x0002, 1, 2)), Ok(()));
        assert_eq!(
            host.check(ResourceId::new(0x0002, 1, 3)),
            Err(SessionStatus::LowVersion)
        );
        assert_eq!(
            host.check(ResourceId::new(0x0002, 2, 1)),
            Err(SessionStatus::NoResource)
        );
        assert_eq!(
            ResourceId(0xC000_1234).check(ResourceId(0xC000_1235)),
            Err(SessionStatus::NoResource)
        );
    }

    #[test]
    fn test_registry() {
        let mut registry = ResourceRegistry::new();
        assert!(registry.is_empty());
        registry.register(Box::new(Dummy(ResourceId::MMI))).unwrap();
        registry
            .register(Box::new(Dummy(ResourceId::RESOURCE_MANAGER)))
            .unwrap();
        registry.register(Box::new(Dummy(ResourceId::MMI))).unwrap();
        assert_eq!(
            registry.ids(),
            [ResourceId::MMI, ResourceId::RESOURCE_MANAGER]
        );

        assert_eq!(registry.lookup(ResourceId::MMI), Ok(ResourceId::MMI));
        assert_eq!(
            registry.lookup(ResourceId::new(0x0040, 1, 2)),
            Err(SessionStatus::LowVersion)
        );
        assert_eq!(
            registry.lookup(ResourceId::DATE_TIME),
            Err(SessionStatus::NoResource)
        );

        for i in registry.len()..MAX_RESOURCES {
            registry
                .register(Box::new(Dummy(ResourceId::new(0x1000 + i as u16, 1, 1))))
                .unwrap();
        }
        assert_matches!(
            registry.register(Box::new(Dummy(ResourceId::DATE_TIME))),
            Err(CiError::TooManyResources)
        );
    }
}
