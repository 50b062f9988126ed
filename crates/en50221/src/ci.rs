//! セッション層とリソースを束ねたCIスタック。

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use fxhash::FxHashMap;
use parking_lot::Mutex;

use crate::apdu::Apdu;
use crate::app::{self, AppEvent, CaPmt};
use crate::error::CiError;
use crate::resource::{Application, Context, Resource, ResourceId, ResourceRegistry};
use crate::session::{SessionEvent, SessionHandler, SessionId, SessionLayer};
use crate::spdu::SessionStatus;
use crate::transport::{SlotId, TransportLayer};

/// [`CommonInterface::poll`]で通知される出来事。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiEvent {
    /// モジュールがホストのリソースへのセッションを開設した。
    SessionOpened {
        /// セッション。
        session: SessionId,
        /// リソース。
        resource_id: ResourceId,
    },
    /// ホストが要求したセッションの開設結果。
    SessionCreated {
        /// セッション。
        session: SessionId,
        /// リソース。
        resource_id: ResourceId,
        /// 結果。
        status: SessionStatus,
    },
    /// セッションが閉じた。
    SessionClosed {
        /// セッション。
        session: SessionId,
        /// リソース。
        resource_id: ResourceId,
    },
    /// リソースからの通知。
    App(AppEvent),
}

enum Action<'d> {
    Opened,
    Receive(&'d [u8]),
    Closed,
}

/// セッション層の出来事をリソースやアプリケーションに振り分ける。
struct Dispatcher<'a> {
    registry: &'a mut ResourceRegistry,
    applications: &'a mut FxHashMap<SessionId, Box<dyn Application>>,
    outbox: &'a mut Vec<(SessionId, Vec<u8>)>,
    events: &'a mut Vec<CiEvent>,
    now: Instant,
    unix_time: i64,
    error: Option<CiError>,
}

impl Dispatcher<'_> {
    fn run(&mut self, session: SessionId, resource_id: ResourceId, action: Action) -> Result<(), CiError> {
        let mut app_events = Vec::new();
        let (ids, mut resource) = self.registry.split_mut(resource_id);
        let mut ctx = Context {
            now: self.now,
            unix_time: self.unix_time,
            resources: ids,
            outbox: &mut *self.outbox,
            events: &mut app_events,
        };

        let result = match action {
            Action::Opened => match resource {
                Some(r) => r.opened(&mut ctx, session),
                None => Ok(()),
            },
            Action::Receive(data) => Apdu::iter(data).try_for_each(|apdu| {
                let apdu = apdu?;
                if let Some(app) = self.applications.get_mut(&session) {
                    app.receive(&mut ctx, session, &apdu)
                } else if let Some(r) = resource.as_mut() {
                    r.receive(&mut ctx, session, &apdu)
                } else {
                    log::debug!("no resource for session {:?}", session);
                    Err(CiError::ResourceUnavailable)
                }
            }),
            Action::Closed => {
                if let Some(mut app) = self.applications.remove(&session) {
                    app.closed(session);
                }
                if let Some(r) = resource {
                    r.closed(&mut ctx, session);
                }
                Ok(())
            }
        };

        self.events.extend(app_events.into_iter().map(CiEvent::App));
        result
    }
}

impl SessionHandler for Dispatcher<'_> {
    fn lookup(&mut self, slot: SlotId, requested: ResourceId) -> Result<ResourceId, SessionStatus> {
        let found = self.registry.lookup(requested);
        log::debug!("slot {}: lookup {}: {:?}", slot, requested, found);
        found
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        let result = match event {
            SessionEvent::Opened {
                session,
                resource_id,
            } => {
                self.events.push(CiEvent::SessionOpened {
                    session,
                    resource_id,
                });
                self.run(session, resource_id, Action::Opened)
            }
            SessionEvent::Created {
                session,
                resource_id,
                status,
            } => {
                self.events.push(CiEvent::SessionCreated {
                    session,
                    resource_id,
                    status,
                });
                Ok(())
            }
            SessionEvent::Data {
                session,
                resource_id,
                data,
            } => self.run(session, resource_id, Action::Receive(&data)),
            SessionEvent::Closed {
                session,
                resource_id,
            } => {
                let result = self.run(session, resource_id, Action::Closed);
                self.events.push(CiEvent::SessionClosed {
                    session,
                    resource_id,
                });
                result
            }
        };

        if let Err(e) = result {
            log::warn!("application layer: {}", e);
            self.error = Some(e);
        }
    }
}

/// CIスタック。
///
/// セッション層の上でホストのリソースを提供し、モジュールとの対話を
/// [`CiEvent`]として通知する。
pub struct CommonInterface {
    sl: SessionLayer,
    registry: ResourceRegistry,
    applications: FxHashMap<SessionId, Box<dyn Application>>,
    outbox: Vec<(SessionId, Vec<u8>)>,
    last_error: Option<CiError>,
}

impl CommonInterface {
    /// トランスポート層と同時に開けるセッション数の上限を指定して生成する。
    pub fn new(tl: Arc<Mutex<TransportLayer>>, max_sessions: usize) -> CommonInterface {
        CommonInterface {
            sl: SessionLayer::new(tl, max_sessions),
            registry: ResourceRegistry::new(),
            applications: FxHashMap::default(),
            outbox: Vec::new(),
            last_error: None,
        }
    }

    /// セッション層を返す。
    #[inline]
    pub fn session_layer(&self) -> &SessionLayer {
        &self.sl
    }

    /// セッション層を返す。
    #[inline]
    pub fn session_layer_mut(&mut self) -> &mut SessionLayer {
        &mut self.sl
    }

    /// 登録されたリソースを返す。
    #[inline]
    pub fn resources(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// リソースを登録する。
    #[inline]
    pub fn register_resource(&mut self, resource: Box<dyn Resource>) -> Result<(), CiError> {
        self.registry.register(resource)
    }

    /// 標準のリソースをすべて登録する。
    ///
    /// `local_offset`は日時リソースが送る、UTCからの時差（分）である。
    pub fn register_default_resources(&mut self, local_offset: Option<i16>) -> Result<(), CiError> {
        self.register_resource(Box::new(app::ResourceManager::new()))?;
        self.register_resource(Box::new(app::ApplicationInformation::new()))?;
        self.register_resource(Box::new(app::CaSupport::new()))?;
        self.register_resource(Box::new(app::DateTime::new(local_offset)))?;
        self.register_resource(Box::new(app::Mmi::new()))?;
        Ok(())
    }

    /// セッションにアプリケーションを結び付ける。
    ///
    /// 以後そのセッションのAPDUはリソースではなくアプリケーションが受け取る。
    pub fn attach_application(
        &mut self,
        session: SessionId,
        application: Box<dyn Application>,
    ) -> Result<(), CiError> {
        if self.sl.resource_of(session).is_none() {
            return Err(CiError::BadSession);
        }
        self.applications.insert(session, application);
        Ok(())
    }

    /// セッションからアプリケーションを切り離す。
    #[inline]
    pub fn detach_application(&mut self, session: SessionId) -> Option<Box<dyn Application>> {
        self.applications.remove(&session)
    }

    /// 最後に発生したエラーを取り出す。
    #[inline]
    pub fn take_error(&mut self) -> Option<CiError> {
        self.last_error.take()
    }

    /// 下位層をポーリングし、発生した出来事を返す。
    ///
    /// 処理中に発生したエラーは他の処理を妨げず、[`take_error`](CommonInterface::take_error)で取得できる。
    pub fn poll(&mut self) -> Vec<CiEvent> {
        let unix_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);
        self.poll_at(Instant::now(), unix_time)
    }

    /// 現在時刻を`now`、UNIX時間を`unix_time`として[`poll`](CommonInterface::poll)する。
    pub fn poll_at(&mut self, now: Instant, unix_time: i64) -> Vec<CiEvent> {
        let mut events = Vec::new();
        let mut dispatcher = Dispatcher {
            registry: &mut self.registry,
            applications: &mut self.applications,
            outbox: &mut self.outbox,
            events: &mut events,
            now,
            unix_time,
            error: None,
        };

        if let Err(e) = self.sl.poll_at(now, &mut dispatcher) {
            self.last_error = Some(e);
        }
        if let Some(e) = dispatcher.error.take() {
            self.last_error = Some(e);
        }

        let mut app_events = Vec::new();
        let (ids, resources) = self.registry.iter_mut();
        for resource in resources {
            let mut ctx = Context {
                now,
                unix_time,
                resources: ids,
                outbox: &mut self.outbox,
                events: &mut app_events,
            };
            if let Err(e) = resource.poll(&mut ctx) {
                log::warn!("resource {}: {}", resource.resource_id(), e);
                self.last_error = Some(e);
            }
        }
        events.extend(app_events.into_iter().map(CiEvent::App));

        for (session, apdu) in self.outbox.drain(..) {
            if let Err(e) = self.sl.send_apdu(session, &apdu) {
                log::warn!("sending apdu to {:?}: {}", session, e);
                self.last_error = Some(e);
            }
        }

        events
    }

    /// 限定受信サポートのすべてのセッションにCA_PMTを送り、送った数を返す。
    pub fn send_ca_pmt(&mut self, ca_pmt: &CaPmt) -> Result<usize, CiError> {
        self.sl
            .broadcast(ResourceId::CONDITIONAL_ACCESS, &ca_pmt.to_apdu()?)
    }

    /// `slot`のモジュールにメニューの表示を要求する。
    pub fn mmi_enter_menu(&mut self, slot: SlotId) -> Result<(), CiError> {
        let session = self
            .sl
            .sessions()
            .find(|(s, r)| s.slot == slot && r.same_resource(ResourceId::APPLICATION_INFO))
            .map(|(s, _)| s)
            .ok_or(CiError::ResourceUnavailable)?;
        self.sl.send_apdu(session, &app::ai::enter_menu()?)
    }

    /// メニューの選択を答える。`choice`は1から始まり、0は取り消しを表す。
    pub fn mmi_menu_answer(&mut self, session: SessionId, choice: u8) -> Result<(), CiError> {
        self.sl.send_apdu(session, &app::mmi::menu_answ(choice)?)
    }

    /// 問い合わせに答える。`None`は取り消しを表す。
    pub fn mmi_answer(&mut self, session: SessionId, text: Option<&str>) -> Result<(), CiError> {
        self.sl.send_apdu(session, &app::mmi::answ(text)?)
    }

    /// MMIを閉じる。
    pub fn mmi_close(&mut self, session: SessionId) -> Result<(), CiError> {
        self.sl.send_apdu(session, &app::mmi::close_mmi()?)
    }
}

impl std::fmt::Debug for CommonInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CommonInterface")
            .field("sl", &self.sl)
            .field("registry", &self.registry)
            .field("applications", &self.applications.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    use crate::session::tests::setup;
    use crate::sim::SimCam;

    fn run(ci: &mut CommonInterface, n: usize) -> Vec<CiEvent> {
        (0..n).flat_map(|_| ci.poll()).collect()
    }

    fn session(slot: SlotId, session_nb: u16) -> SessionId {
        SessionId {
            slot,
            tcid: 1,
            session_nb,
        }
    }

    /// 受け取ったAPDUのタグを記録するアプリケーション。
    struct Recorder(Arc<Mutex<Vec<u32>>>);

    impl Application for Recorder {
        fn receive(&mut self, _: &mut Context, _: SessionId, apdu: &Apdu) -> Result<(), CiError> {
            self.0.lock().push(apdu.tag);
            Ok(())
        }
    }

    #[test]
    fn test_resource_sessions() {
        let cam = SimCam::new();
        let (tl, slot) = setup(&cam);
        let mut ci = CommonInterface::new(tl, 16);
        ci.register_default_resources(None).unwrap();

        cam.push(1, hex!("91 04 00 01 00 41").to_vec());
        let events = run(&mut ci, 10);
        assert_eq!(
            events,
            [CiEvent::SessionOpened {
                session: session(slot, 1),
                resource_id: ResourceId::RESOURCE_MANAGER,
            }]
        );
        assert_eq!(
            cam.take_received(),
            [
                (1, hex!("92 07 00 00 01 00 41 00 01").to_vec()),
                (1, hex!("90 02 00 01 9F 80 10 00").to_vec()),
            ]
        );

        // ホストのプロファイル
        cam.push(1, hex!("90 02 00 01 9F 80 10 00").to_vec());
        run(&mut ci, 10);
        let received = cam.take_received();
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0].1[..8],
            hex!("90 02 00 01 9F 80 11 14")
        );

        cam.push(1, hex!("91 04 00 03 00 41").to_vec());
        run(&mut ci, 10);
        assert_eq!(
            cam.take_received(),
            [
                (1, hex!("92 07 00 00 03 00 41 00 02").to_vec()),
                (1, hex!("90 02 00 02 9F 80 30 00").to_vec()),
            ]
        );

        cam.push(1, hex!("90 02 00 02 9F 80 31 02 0B 00").to_vec());
        let events = run(&mut ci, 10);
        assert_eq!(
            events,
            [CiEvent::App(AppEvent::CaInfo {
                session: session(slot, 2),
                ca_system_ids: vec![0x0B00],
            })]
        );

        cam.push(1, hex!("95 02 00 02").to_vec());
        let events = run(&mut ci, 10);
        assert_eq!(
            events,
            [CiEvent::SessionClosed {
                session: session(slot, 2),
                resource_id: ResourceId::CONDITIONAL_ACCESS,
            }]
        );
        assert!(ci.take_error().is_none());
    }

    #[test]
    fn test_unknown_resource() {
        let cam = SimCam::new();
        let (tl, _) = setup(&cam);
        let mut ci = CommonInterface::new(tl, 16);
        ci.register_default_resources(None).unwrap();

        cam.push(1, hex!("91 04 00 8C 10 01").to_vec());
        assert!(run(&mut ci, 10).is_empty());
        assert_eq!(
            cam.take_received(),
            [(1, hex!("92 07 F0 00 8C 10 01 00 00").to_vec())]
        );
    }

    #[test]
    fn test_ca_pmt_and_mmi() {
        let cam = SimCam::new();
        let (tl, slot) = setup(&cam);
        let mut ci = CommonInterface::new(tl, 16);
        ci.register_default_resources(None).unwrap();

        assert_matches!(ci.mmi_enter_menu(slot), Err(CiError::ResourceUnavailable));

        cam.push(1, hex!("91 04 00 02 00 41").to_vec());
        cam.push(1, hex!("91 04 00 03 00 41").to_vec());
        cam.push(1, hex!("91 04 00 40 00 41").to_vec());
        run(&mut ci, 20);
        cam.take_received();

        ci.mmi_enter_menu(slot).unwrap();
        let ca_pmt = app::ca::CaPmt::new(
            &dvbsi::psi::table::Pmt {
                program_number: 1,
                info: dvbsi::psi::SectionInfo {
                    version_number: 0,
                    current_next_indicator: true,
                    section_number: 0,
                    last_section_number: 0,
                },
                pcr_pid: dvbsi::Pid::new(0x100),
                descriptors: dvbsi::psi::desc::DescriptorBlock::EMPTY,
                streams: Vec::new(),
            },
            app::ListManagement::Only,
            app::CaPmtCmd::OkDescrambling,
        )
        .unwrap();
        assert_eq!(ci.send_ca_pmt(&ca_pmt).unwrap(), 1);
        run(&mut ci, 10);
        assert_eq!(
            cam.take_received(),
            [
                (1, hex!("90 02 00 01 9F 80 22 00").to_vec()),
                (1, hex!("90 02 00 02 9F 80 32 06 03 00 01 C1 F0 00").to_vec()),
            ]
        );

        // MMIの問い合わせと応答
        cam.push(1, hex!("90 02 00 03 9F 88 07 05 00 04 50 49 4E").to_vec());
        let events = run(&mut ci, 10);
        assert_eq!(
            events,
            [CiEvent::App(AppEvent::Mmi {
                session: session(slot, 3),
                event: app::MmiEvent::Enquiry {
                    blind: false,
                    answer_length: 4,
                    text: "PIN".to_owned(),
                },
            })]
        );
        ci.mmi_answer(session(slot, 3), Some("0000")).unwrap();
        ci.mmi_close(session(slot, 3)).unwrap();
        run(&mut ci, 10);
        assert_eq!(
            cam.take_received(),
            [
                (1, hex!("90 02 00 03 9F 88 08 05 01 30 30 30 30").to_vec()),
                (1, hex!("90 02 00 03 9F 88 00 01 00").to_vec()),
            ]
        );
    }

    #[test]
    fn test_application() {
        let cam = SimCam::new();
        let (tl, slot) = setup(&cam);
        let mut ci = CommonInterface::new(tl, 16);
        ci.register_default_resources(None).unwrap();

        let app_session = session(slot, 1);
        let log = Arc::new(Mutex::new(Vec::new()));
        assert_matches!(
            ci.attach_application(app_session, Box::new(Recorder(log.clone()))),
            Err(CiError::BadSession)
        );

        cam.push(1, hex!("91 04 00 01 00 41").to_vec());
        run(&mut ci, 10);
        cam.take_received();
        ci.attach_application(app_session, Box::new(Recorder(log.clone())))
            .unwrap();

        // リソースマネージャではなくアプリケーションが受け取る
        cam.push(1, hex!("90 02 00 01 9F 80 10 00").to_vec());
        run(&mut ci, 10);
        assert_eq!(*log.lock(), [0x9F8010]);
        assert!(cam.take_received().is_empty());

        // モジュールの取り外しでアプリケーションも切り離される
        cam.state().cam_state = crate::device::CamState::Missing;
        let events = run(&mut ci, 3);
        assert_eq!(
            events,
            [CiEvent::SessionClosed {
                session: app_session,
                resource_id: ResourceId::RESOURCE_MANAGER,
            }]
        );
        assert!(ci.detach_application(app_session).is_none());
    }
}
