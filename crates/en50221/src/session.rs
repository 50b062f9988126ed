//! セッション層。
//!
//! トランスポートコネクション上でリソースごとのセッションを開設・切断し、
//! セッション番号付きのAPDUを送受信する。

use std::sync::Arc;
use std::time::Instant;

use fxhash::FxHashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::error::CiError;
use crate::resource::ResourceId;
use crate::spdu::{SessionStatus, Spdu};
use crate::transport::{SlotId, TransportEvent, TransportLayer};

/// セッションを識別する値。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId {
    /// スロット。
    pub slot: SlotId,
    /// トランスポートコネクション識別。
    pub tcid: u8,
    /// セッション番号。
    pub session_nb: u16,
}

/// セッション層で発生した出来事。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// モジュールがホストのリソースへのセッションを開設した。
    Opened {
        /// セッション。
        session: SessionId,
        /// 割り当てたホストのリソース。
        resource_id: ResourceId,
    },
    /// ホストが要求したセッションの開設結果。
    Created {
        /// セッション。
        session: SessionId,
        /// リソース。
        resource_id: ResourceId,
        /// 結果。`Ok`以外の場合、セッションは既に破棄されている。
        status: SessionStatus,
    },
    /// セッションでAPDUを受信した。
    Data {
        /// セッション。
        session: SessionId,
        /// リソース。
        resource_id: ResourceId,
        /// session_numberに続くデータ。
        data: Vec<u8>,
    },
    /// セッションが閉じた。開設したセッションごとに1度だけ通知される。
    Closed {
        /// セッション。
        session: SessionId,
        /// リソース。
        resource_id: ResourceId,
    },
}

/// セッション層の出来事を受け取るトレイト。
pub trait SessionHandler {
    /// モジュールが要求したリソースに対応するホストのリソースを返す。
    fn lookup(&mut self, slot: SlotId, requested: ResourceId) -> Result<ResourceId, SessionStatus>;

    /// セッション層で出来事が発生した。
    fn on_session_event(&mut self, event: SessionEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// create_session_responseの待機中。
    Creating,
    Active,
    /// close_session_responseの待機中。
    Closing,
}

#[derive(Debug)]
struct Session {
    resource_id: ResourceId,
    state: SessionState,
}

impl Session {
    #[inline]
    fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Active | SessionState::Closing)
    }
}

#[derive(Debug, Default)]
struct ConnectionSessions {
    nsid: u16,
    sessions: FxHashMap<u16, Session>,
}

/// セッション層。
#[derive(Debug)]
pub struct SessionLayer {
    tl: Arc<Mutex<TransportLayer>>,
    max_sessions: usize,
    connections: FxHashMap<(SlotId, u8), ConnectionSessions>,
    session_count: usize,
}

impl SessionLayer {
    /// 同時に開けるセッション数の上限を指定して生成する。
    pub fn new(tl: Arc<Mutex<TransportLayer>>, max_sessions: usize) -> SessionLayer {
        SessionLayer {
            tl,
            max_sessions: max_sessions.min(u16::MAX as usize - 1),
            connections: FxHashMap::default(),
            session_count: 0,
        }
    }

    /// 共有しているトランスポート層を返す。
    #[inline]
    pub fn transport(&self) -> &Arc<Mutex<TransportLayer>> {
        &self.tl
    }

    #[inline]
    fn tl(&self) -> MutexGuard<TransportLayer> {
        self.tl.lock()
    }

    /// 開いているセッションの数。
    #[inline]
    pub fn session_count(&self) -> usize {
        self.session_count
    }

    /// セッションのリソースを返す。
    pub fn resource_of(&self, session: SessionId) -> Option<ResourceId> {
        self.get(session)
            .filter(|s| s.state == SessionState::Active)
            .map(|s| s.resource_id)
    }

    /// 通信可能なセッションとそのリソースを列挙する。
    pub fn sessions(&self) -> impl Iterator<Item = (SessionId, ResourceId)> + '_ {
        self.connections.iter().flat_map(|(&(slot, tcid), conn)| {
            conn.sessions
                .iter()
                .filter(|(_, s)| s.state == SessionState::Active)
                .map(move |(&session_nb, s)| {
                    let id = SessionId {
                        slot,
                        tcid,
                        session_nb,
                    };
                    (id, s.resource_id)
                })
        })
    }

    fn get(&self, session: SessionId) -> Option<&Session> {
        self.connections
            .get(&(session.slot, session.tcid))?
            .sessions
            .get(&session.session_nb)
    }

    fn get_mut(&mut self, session: SessionId) -> Option<&mut Session> {
        self.connections
            .get_mut(&(session.slot, session.tcid))?
            .sessions
            .get_mut(&session.session_nb)
    }

    fn remove(&mut self, session: SessionId) -> Option<Session> {
        let removed = self
            .connections
            .get_mut(&(session.slot, session.tcid))?
            .sessions
            .remove(&session.session_nb)?;
        self.session_count -= 1;
        Some(removed)
    }

    /// コネクションで次に使うセッション番号を選ぶ。
    ///
    /// 番号は[`insert`](SessionLayer::insert)で確定する。
    fn allocate(&self, slot: SlotId, tcid: u8) -> Result<u16, CiError> {
        if self.session_count >= self.max_sessions {
            return Err(CiError::TooManySessions);
        }

        let conn = self.connections.get(&(slot, tcid));
        let mut nsid = conn.map_or(0, |c| c.nsid);
        loop {
            nsid = nsid.wrapping_add(1);
            if nsid != 0 && !conn.map_or(false, |c| c.sessions.contains_key(&nsid)) {
                return Ok(nsid);
            }
        }
    }

    fn insert(&mut self, session: SessionId, resource_id: ResourceId, state: SessionState) {
        let conn = self
            .connections
            .entry((session.slot, session.tcid))
            .or_default();
        conn.nsid = session.session_nb;
        conn.sessions.insert(session.session_nb, Session { resource_id, state });
        self.session_count += 1;
    }

    fn send(&self, slot: SlotId, tcid: u8, spdu: &Spdu) -> Result<(), CiError> {
        self.tl().send_data(slot, tcid, &spdu.to_vec())
    }

    /// リソースへのセッションの開設をモジュールに要求する。
    ///
    /// 結果は[`SessionEvent::Created`]で通知される。
    pub fn create_session(
        &mut self,
        slot: SlotId,
        tcid: u8,
        resource_id: ResourceId,
    ) -> Result<SessionId, CiError> {
        let session_nb = self.allocate(slot, tcid)?;
        self.send(
            slot,
            tcid,
            &Spdu::CreateSession {
                resource_id,
                session_nb,
            },
        )?;

        let session = SessionId {
            slot,
            tcid,
            session_nb,
        };
        self.insert(session, resource_id, SessionState::Creating);
        log::debug!("creating session {:?} for {}", session, resource_id);
        Ok(session)
    }

    /// セッションの切断をモジュールに要求する。
    ///
    /// 切断されると[`SessionEvent::Closed`]が通知される。
    pub fn destroy_session(&mut self, session: SessionId) -> Result<(), CiError> {
        match self.get(session) {
            Some(s) if s.state == SessionState::Active => {}
            _ => return Err(CiError::BadSession),
        }

        self.send(
            session.slot,
            session.tcid,
            &Spdu::CloseSessionRequest {
                session_nb: session.session_nb,
            },
        )?;
        if let Some(s) = self.get_mut(session) {
            s.state = SessionState::Closing;
        }
        Ok(())
    }

    /// セッションにAPDUを送る。
    pub fn send_apdu(&self, session: SessionId, apdu: &[u8]) -> Result<(), CiError> {
        match self.get(session) {
            Some(s) if s.state == SessionState::Active => {}
            _ => return Err(CiError::BadSession),
        }

        self.send(
            session.slot,
            session.tcid,
            &Spdu::SessionNumber {
                session_nb: session.session_nb,
                body: apdu,
            },
        )
    }

    /// `resource_id`と同じリソースのすべてのセッションにAPDUを送り、送った数を返す。
    pub fn broadcast(&self, resource_id: ResourceId, apdu: &[u8]) -> Result<usize, CiError> {
        let targets: Vec<_> = self
            .sessions()
            .filter(|(_, r)| r.same_resource(resource_id))
            .map(|(s, _)| s)
            .collect();

        let mut sent = 0;
        let mut error = None;
        for session in targets {
            match self.send_apdu(session, apdu) {
                Ok(()) => sent += 1,
                Err(e) => {
                    log::warn!("broadcast to {:?} failed: {}", session, e);
                    error = Some(e);
                }
            }
        }
        error.map_or(Ok(sent), Err)
    }

    /// トランスポート層をポーリングし、受け取ったSPDUを処理する。
    ///
    /// コールバックはトランスポート層のロックを解放してから呼ばれる。
    #[inline]
    pub fn poll<H: SessionHandler>(&mut self, handler: &mut H) -> Result<(), CiError> {
        self.poll_at(Instant::now(), handler)
    }

    /// 現在時刻を`now`として[`poll`](SessionLayer::poll)する。
    pub fn poll_at<H: SessionHandler>(
        &mut self,
        now: Instant,
        handler: &mut H,
    ) -> Result<(), CiError> {
        let events = self.tl().poll_at(now);

        let mut result = Ok(());
        for event in events {
            if let Err(e) = self.process(handler, event) {
                log::warn!("session layer: {}", e);
                result = Err(e);
            }
        }
        result
    }

    fn process<H: SessionHandler>(
        &mut self,
        handler: &mut H,
        event: TransportEvent,
    ) -> Result<(), CiError> {
        match event {
            TransportEvent::ConnectionOpened { slot, tcid } => {
                log::trace!("slot {}: connection {} ready for sessions", slot, tcid);
                Ok(())
            }
            TransportEvent::Data { slot, tcid, data } => {
                self.process_spdu(handler, slot, tcid, &data)
            }
            TransportEvent::ConnectionClosed { slot, tcid } => {
                self.close_connection(handler, slot, tcid);
                Ok(())
            }
            TransportEvent::SlotClosed { slot } => {
                let mut tcids: Vec<_> = self
                    .connections
                    .keys()
                    .filter(|(s, _)| *s == slot)
                    .map(|&(_, tcid)| tcid)
                    .collect();
                tcids.sort_unstable();
                for tcid in tcids {
                    self.close_connection(handler, slot, tcid);
                }
                Ok(())
            }
        }
    }

    /// コネクション上のセッションをすべて閉じる。
    fn close_connection<H: SessionHandler>(&mut self, handler: &mut H, slot: SlotId, tcid: u8) {
        let Some(conn) = self.connections.remove(&(slot, tcid)) else {
            return;
        };

        let mut sessions: Vec<_> = conn.sessions.into_iter().collect();
        sessions.sort_unstable_by_key(|&(nb, _)| nb);
        self.session_count -= sessions.len();
        for (session_nb, s) in sessions {
            if s.is_open() {
                let session = SessionId {
                    slot,
                    tcid,
                    session_nb,
                };
                log::debug!("session {:?} closed with connection", session);
                handler.on_session_event(SessionEvent::Closed {
                    session,
                    resource_id: s.resource_id,
                });
            }
        }
    }

    fn process_spdu<H: SessionHandler>(
        &mut self,
        handler: &mut H,
        slot: SlotId,
        tcid: u8,
        data: &[u8],
    ) -> Result<(), CiError> {
        let id = |session_nb| SessionId {
            slot,
            tcid,
            session_nb,
        };

        match Spdu::read(data)? {
            Spdu::SessionNumber { session_nb, body } => {
                let session = id(session_nb);
                let Some(resource_id) = self.resource_of(session) else {
                    log::debug!("data for unknown session {:?}", session);
                    return Err(CiError::BadSession);
                };
                handler.on_session_event(SessionEvent::Data {
                    session,
                    resource_id,
                    data: body.to_vec(),
                });
            }

            Spdu::OpenSessionRequest { resource_id } => {
                let allocated = match handler.lookup(slot, resource_id) {
                    Ok(host_id) => self
                        .allocate(slot, tcid)
                        .map(|nb| (host_id, nb))
                        .map_err(|_| SessionStatus::Busy),
                    Err(status) => Err(status),
                };

                match allocated {
                    Ok((host_id, session_nb)) => {
                        self.send(
                            slot,
                            tcid,
                            &Spdu::OpenSessionResponse {
                                status: SessionStatus::Ok,
                                resource_id: host_id,
                                session_nb,
                            },
                        )?;
                        let session = id(session_nb);
                        self.insert(session, host_id, SessionState::Active);
                        log::debug!("session {:?} opened for {}", session, host_id);
                        handler.on_session_event(SessionEvent::Opened {
                            session,
                            resource_id: host_id,
                        });
                    }
                    Err(status) => {
                        log::debug!("open session for {} refused: {:?}", resource_id, status);
                        self.send(
                            slot,
                            tcid,
                            &Spdu::OpenSessionResponse {
                                status,
                                resource_id,
                                session_nb: 0,
                            },
                        )?;
                    }
                }
            }

            Spdu::CreateSessionResponse {
                status,
                resource_id,
                session_nb,
            } => {
                let session = id(session_nb);
                if self.get(session).map(|s| s.state) != Some(SessionState::Creating) {
                    return Err(CiError::ProtocolViolation("unexpected create_session_response"));
                }
                if status == SessionStatus::Ok {
                    if let Some(s) = self.get_mut(session) {
                        s.state = SessionState::Active;
                    }
                } else {
                    self.remove(session);
                }
                log::debug!("session {:?} created: {:?}", session, status);
                handler.on_session_event(SessionEvent::Created {
                    session,
                    resource_id,
                    status,
                });
            }

            Spdu::CloseSessionRequest { session_nb } => {
                let session = id(session_nb);
                let existing = self.get(session).map(|s| (s.is_open(), s.resource_id));
                let status = match existing {
                    Some((is_open, resource_id)) => {
                        if is_open {
                            handler.on_session_event(SessionEvent::Closed {
                                session,
                                resource_id,
                            });
                        }
                        self.remove(session);
                        log::debug!("session {:?} closed by module", session);
                        SessionStatus::Ok
                    }
                    None => SessionStatus::NoResource,
                };
                self.send(slot, tcid, &Spdu::CloseSessionResponse { status, session_nb })?;
            }

            Spdu::CloseSessionResponse { status, session_nb } => {
                let session = id(session_nb);
                match self.get(session) {
                    Some(s) if s.state == SessionState::Closing => {}
                    _ => return Err(CiError::ProtocolViolation("unexpected close_session_response")),
                }
                if status != SessionStatus::Ok {
                    log::debug!("close session {:?}: {:?}", session, status);
                }
                if let Some(s) = self.remove(session) {
                    handler.on_session_event(SessionEvent::Closed {
                        session,
                        resource_id: s.resource_id,
                    });
                }
            }

            Spdu::OpenSessionResponse { .. } | Spdu::CreateSession { .. } => {
                return Err(CiError::ProtocolViolation("host spdu from module"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::hex;
    use std::time::Duration;

    use crate::sim::SimCam;
    use crate::transport::SlotConfig;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Vec<SessionEvent>,
    }

    impl SessionHandler for Recorder {
        fn lookup(
            &mut self,
            _slot: SlotId,
            requested: ResourceId,
        ) -> Result<ResourceId, SessionStatus> {
            let host = ResourceId::RESOURCE_MANAGER;
            host.check(requested).map(|()| host)
        }

        fn on_session_event(&mut self, event: SessionEvent) {
            self.events.push(event);
        }
    }

    /// モジュールを挿入し、コネクション1を確立したトランスポート層を返す。
    pub(crate) fn setup(cam: &SimCam) -> (Arc<Mutex<TransportLayer>>, SlotId) {
        let config = SlotConfig {
            poll_delay: Duration::ZERO,
            ..SlotConfig::default()
        };
        let mut tl = TransportLayer::new(1, 4);
        let slot = tl.register_slot(Box::new(cam.clone()), 0, config).unwrap();
        for _ in 0..3 {
            tl.poll();
        }
        assert_eq!(tl.connection_state(slot, 1), Some(crate::transport::ConnectionState::Active));
        (Arc::new(Mutex::new(tl)), slot)
    }

    fn run(sl: &mut SessionLayer, handler: &mut Recorder, n: usize) -> Vec<CiError> {
        (0..n).filter_map(|_| sl.poll(handler).err()).collect()
    }

    fn session(slot: SlotId, session_nb: u16) -> SessionId {
        SessionId {
            slot,
            tcid: 1,
            session_nb,
        }
    }

    #[test]
    fn test_open_and_data() {
        let cam = SimCam::new();
        let (tl, slot) = setup(&cam);
        let mut sl = SessionLayer::new(tl, 8);
        let mut handler = Recorder::default();

        cam.push(1, hex!("91 04 00 01 00 41").to_vec());
        assert!(run(&mut sl, &mut handler, 10).is_empty());
        assert_eq!(
            handler.events,
            [SessionEvent::Opened {
                session: session(slot, 1),
                resource_id: ResourceId::RESOURCE_MANAGER,
            }]
        );
        assert_eq!(
            cam.take_received(),
            [(1, hex!("92 07 00 00 01 00 41 00 01").to_vec())]
        );
        assert_eq!(sl.session_count(), 1);
        assert_eq!(sl.resource_of(session(slot, 1)), Some(ResourceId::RESOURCE_MANAGER));

        handler.events.clear();
        cam.push(1, hex!("90 02 00 01 9F 80 10 00").to_vec());
        run(&mut sl, &mut handler, 10);
        assert_eq!(
            handler.events,
            [SessionEvent::Data {
                session: session(slot, 1),
                resource_id: ResourceId::RESOURCE_MANAGER,
                data: hex!("9F 80 10 00").to_vec(),
            }]
        );

        sl.send_apdu(session(slot, 1), &hex!("9F 80 11 00")).unwrap();
        run(&mut sl, &mut handler, 3);
        assert_eq!(
            cam.take_received(),
            [(1, hex!("90 02 00 01 9F 80 11 00").to_vec())]
        );
        assert_matches!(
            sl.send_apdu(session(slot, 2), &hex!("9F 80 11 00")),
            Err(CiError::BadSession)
        );
    }

    #[test]
    fn test_open_refused() {
        let cam = SimCam::new();
        let (tl, _) = setup(&cam);
        let mut sl = SessionLayer::new(tl, 1);
        let mut handler = Recorder::default();

        cam.push(1, hex!("91 04 00 24 00 41").to_vec());
        cam.push(1, hex!("91 04 00 01 00 42").to_vec());
        cam.push(1, hex!("91 04 00 01 00 41").to_vec());
        cam.push(1, hex!("91 04 00 01 00 41").to_vec());
        run(&mut sl, &mut handler, 30);
        assert_eq!(
            cam.take_received(),
            [
                (1, hex!("92 07 F0 00 24 00 41 00 00").to_vec()),
                (1, hex!("92 07 F2 00 01 00 42 00 00").to_vec()),
                (1, hex!("92 07 00 00 01 00 41 00 01").to_vec()),
                (1, hex!("92 07 F3 00 01 00 41 00 00").to_vec()),
            ]
        );
        assert_eq!(handler.events.len(), 1);
    }

    #[test]
    fn test_close_by_module() {
        let cam = SimCam::new();
        let (tl, slot) = setup(&cam);
        let mut sl = SessionLayer::new(tl, 8);
        let mut handler = Recorder::default();

        cam.push(1, hex!("91 04 00 01 00 41").to_vec());
        run(&mut sl, &mut handler, 10);
        cam.take_received();
        handler.events.clear();

        cam.push(1, hex!("95 02 00 01").to_vec());
        run(&mut sl, &mut handler, 10);
        assert_eq!(
            handler.events,
            [SessionEvent::Closed {
                session: session(slot, 1),
                resource_id: ResourceId::RESOURCE_MANAGER,
            }]
        );
        assert_eq!(cam.take_received(), [(1, hex!("96 03 00 00 01").to_vec())]);
        assert_eq!(sl.session_count(), 0);

        // 閉じたセッションへのデータ
        cam.push(1, hex!("90 02 00 01 9F 80 10 00").to_vec());
        let errors = run(&mut sl, &mut handler, 10);
        assert_matches!(errors.as_slice(), [CiError::BadSession]);

        // 存在しないセッションの切断
        cam.push(1, hex!("95 02 00 07").to_vec());
        run(&mut sl, &mut handler, 10);
        assert_eq!(cam.take_received(), [(1, hex!("96 03 F0 00 07").to_vec())]);
    }

    #[test]
    fn test_teardown() {
        let cam = SimCam::new();
        let (tl, slot) = setup(&cam);
        let mut sl = SessionLayer::new(tl, 8);
        let mut handler = Recorder::default();

        cam.push(1, hex!("91 04 00 01 00 41").to_vec());
        cam.push(1, hex!("91 04 00 01 00 41").to_vec());
        run(&mut sl, &mut handler, 20);
        assert_eq!(sl.session_count(), 2);
        handler.events.clear();

        cam.state().cam_state = crate::device::CamState::Missing;
        run(&mut sl, &mut handler, 5);
        assert_eq!(
            handler.events,
            [
                SessionEvent::Closed {
                    session: session(slot, 1),
                    resource_id: ResourceId::RESOURCE_MANAGER,
                },
                SessionEvent::Closed {
                    session: session(slot, 2),
                    resource_id: ResourceId::RESOURCE_MANAGER,
                },
            ]
        );
        assert_eq!(sl.session_count(), 0);
    }

    #[test]
    fn test_host_session() {
        let cam = SimCam::new();
        let (tl, slot) = setup(&cam);
        let mut sl = SessionLayer::new(tl, 8);
        let mut handler = Recorder::default();

        let created = sl.create_session(slot, 1, ResourceId::DATE_TIME).unwrap();
        assert_eq!(created, session(slot, 1));
        assert_matches!(sl.send_apdu(created, &[]), Err(CiError::BadSession));
        run(&mut sl, &mut handler, 3);
        assert_eq!(
            cam.take_received(),
            [(1, hex!("93 06 00 24 00 41 00 01").to_vec())]
        );

        cam.push(1, hex!("94 07 00 00 24 00 41 00 01").to_vec());
        run(&mut sl, &mut handler, 10);
        assert_eq!(
            handler.events,
            [SessionEvent::Created {
                session: created,
                resource_id: ResourceId::DATE_TIME,
                status: SessionStatus::Ok,
            }]
        );
        assert_eq!(sl.broadcast(ResourceId::DATE_TIME, &hex!("9F 84 40 01 0A")).unwrap(), 1);
        assert_eq!(sl.broadcast(ResourceId::MMI, &hex!("9F 88 00 01 00")).unwrap(), 0);

        // 存在しないコネクションには状態を残さない
        assert_matches!(
            sl.create_session(slot, 3, ResourceId::DATE_TIME),
            Err(CiError::BadConnection)
        );
        assert!(!sl.connections.contains_key(&(slot, 3)));
        assert_eq!(sl.session_count(), 1);

        handler.events.clear();
        sl.destroy_session(created).unwrap();
        run(&mut sl, &mut handler, 3);
        assert_eq!(
            cam.take_received(),
            [
                (1, hex!("90 02 00 01 9F 84 40 01 0A").to_vec()),
                (1, hex!("95 02 00 01").to_vec()),
            ]
        );

        cam.push(1, hex!("96 03 00 00 01").to_vec());
        run(&mut sl, &mut handler, 10);
        assert_eq!(
            handler.events,
            [SessionEvent::Closed {
                session: created,
                resource_id: ResourceId::DATE_TIME,
            }]
        );
        assert_eq!(sl.session_count(), 0);
    }
}
