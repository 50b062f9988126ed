//! トランスポート層。
//!
//! スロットごとにモジュールとのトランスポートコネクションを管理し、
//! 半二重のコマンド・応答によってTPDUを送受信する。

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use crate::device::{CaDevice, CamState, LinkType};
use crate::error::CiError;
use crate::tpdu::{self, Tpdu, TpduTag};

/// TPDUのヘッダに必要な最大バイト数。
const TPDU_HEADER_MAX: usize = 1 + crate::asn1::MAX_LENGTH_BYTES + 1;

/// T_T_C_ERRORで通知する、空きコネクションがないことを表すエラーコード。
const TC_ERROR_NO_CONNECTION: u8 = 0x01;

/// スロットを識別する値。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub(crate) u8);

impl SlotId {
    /// スロットの添字を返す。
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({})", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// スロットごとの設定値。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotConfig {
    /// コマンドを送ってから応答を待つ時間。
    pub response_timeout: Duration,
    /// 送信するデータがない場合にモジュールをポーリングする間隔。
    pub poll_delay: Duration,
    /// リンク層で一度に送れるTPDUの最大バイト数。
    pub max_tpdu_size: usize,
    /// T_DATA_MOREを連結して受け取るデータの最大バイト数。
    pub max_spdu_size: usize,
}

impl Default for SlotConfig {
    fn default() -> SlotConfig {
        SlotConfig {
            response_timeout: Duration::from_millis(1000),
            poll_delay: Duration::from_millis(100),
            max_tpdu_size: 4096,
            max_spdu_size: 65536,
        }
    }
}

/// トランスポートコネクションの状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// 未使用。
    Idle,
    /// T_CREATE_T_Cの応答待ち。
    Creation,
    /// 通信可能。
    Active,
    /// T_DELETE_T_Cの応答待ち。
    Deletion,
}

/// トランスポート層で発生した出来事。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// ホストが要求したコネクションが確立した。
    ConnectionOpened {
        /// スロット。
        slot: SlotId,
        /// コネクション識別。
        tcid: u8,
    },
    /// コネクションでデータを受信した。連鎖したT_DATA_MOREは連結済みである。
    Data {
        /// スロット。
        slot: SlotId,
        /// コネクション識別。
        tcid: u8,
        /// 受信したデータ。
        data: Vec<u8>,
    },
    /// コネクションが閉じた。
    ConnectionClosed {
        /// スロット。
        slot: SlotId,
        /// コネクション識別。
        tcid: u8,
    },
    /// スロットのモジュールが取り外された、またはスロットが破棄された。
    SlotClosed {
        /// スロット。
        slot: SlotId,
    },
}

#[derive(Debug)]
struct Connection {
    state: ConnectionState,
    tx_queue: VecDeque<Vec<u8>>,
    rx_chain: Vec<u8>,
    /// 上限を超えた連結の残りをT_DATA_LASTまで読み捨てる。
    rx_discarding: bool,
    /// 応答待ちのコマンドを送った時刻。
    awaiting: Option<Instant>,
    data_available: bool,
    last_sent: Option<Instant>,
}

impl Connection {
    fn new() -> Connection {
        Connection {
            state: ConnectionState::Idle,
            tx_queue: VecDeque::new(),
            rx_chain: Vec::new(),
            rx_discarding: false,
            awaiting: None,
            data_available: false,
            last_sent: None,
        }
    }

    fn reset(&mut self) {
        *self = Connection::new();
    }

    /// 確立済みか確立処理中のコネクションかどうか。
    #[inline]
    fn is_open(&self) -> bool {
        matches!(self.state, ConnectionState::Active | ConnectionState::Deletion)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Empty,
    Init,
    Ready,
    /// HLCIなど扱えないモジュール。
    Unsupported,
}

struct Slot {
    device: Box<dyn CaDevice>,
    slot_num: u8,
    state: SlotState,
    config: SlotConfig,
    connections: Vec<Connection>,
    read_buf: Vec<u8>,
}

impl Slot {
    fn connection_mut(&mut self, tcid: u8) -> Result<&mut Connection, CiError> {
        let idx = (tcid as usize).checked_sub(1).ok_or(CiError::BadConnection)?;
        self.connections.get_mut(idx).ok_or(CiError::BadConnection)
    }

    /// 空いているコネクションを確保してT_CREATE_T_Cを積む。
    fn open_connection(&mut self) -> Result<u8, CiError> {
        let (idx, conn) = self
            .connections
            .iter_mut()
            .enumerate()
            .find(|(_, c)| c.state == ConnectionState::Idle)
            .ok_or(CiError::TooManyConnections)?;

        let tcid = idx as u8 + 1;
        conn.state = ConnectionState::Creation;
        conn.tx_queue.push_back(tpdu::encode(TpduTag::CreateTc, tcid, &[])?);
        log::debug!("slot {}: creating connection {}", self.slot_num, tcid);
        Ok(tcid)
    }

    /// すべてのコネクションを閉じる。
    fn close_all(&mut self, id: SlotId, events: &mut Vec<TransportEvent>) {
        for (idx, conn) in self.connections.iter_mut().enumerate() {
            if conn.is_open() {
                events.push(TransportEvent::ConnectionClosed {
                    slot: id,
                    tcid: idx as u8 + 1,
                });
            }
            conn.reset();
        }
    }

    fn poll(
        &mut self,
        id: SlotId,
        now: Instant,
        events: &mut Vec<TransportEvent>,
    ) -> Result<(), CiError> {
        let status = self.device.slot_status(self.slot_num)?;
        match (self.state, status) {
            (SlotState::Empty, CamState::Missing) => return Ok(()),
            (SlotState::Empty, _) => {
                log::debug!("slot {}: module inserted", self.slot_num);
                self.device.reset(self.slot_num)?;
                self.state = SlotState::Init;
                return Ok(());
            }
            (_, CamState::Missing) => {
                log::debug!("slot {}: module removed", self.slot_num);
                self.close_all(id, events);
                self.state = SlotState::Empty;
                events.push(TransportEvent::SlotClosed { slot: id });
                return Ok(());
            }
            (SlotState::Init, CamState::Ready) => match self.device.link_type(self.slot_num)? {
                LinkType::Hlci => {
                    log::warn!("slot {}: HLCI module is not supported", self.slot_num);
                    self.state = SlotState::Unsupported;
                    return Err(CiError::Unsupported);
                }
                LinkType::Link => {
                    self.state = SlotState::Ready;
                    self.open_connection()?;
                }
            },
            (SlotState::Init | SlotState::Unsupported, _) => return Ok(()),
            (SlotState::Ready, _) => {}
        }

        let mut buf = std::mem::take(&mut self.read_buf);
        let result = self.receive(id, &mut buf, events);
        self.read_buf = buf;
        result?;

        self.send(id, now, events)
    }

    /// 読み取れる応答をすべて処理する。
    ///
    /// 処理できないTPDUがあっても残りのTPDUは処理し、最初のエラーを返す。
    fn receive(
        &mut self,
        id: SlotId,
        buf: &mut [u8],
        events: &mut Vec<TransportEvent>,
    ) -> Result<(), CiError> {
        let mut result = Ok(());
        while let Some((tcid, len)) = self.device.read(self.slot_num, buf)? {
            let data = buf.get(..len).ok_or(CiError::LengthMismatch)?;
            log::trace!("slot {}: tcid {} received {} bytes", self.slot_num, tcid, len);
            for tpdu in Tpdu::read_response(data)? {
                if let Err(e) = self.process_tpdu(id, tpdu, events) {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }

    fn process_tpdu(
        &mut self,
        id: SlotId,
        tpdu: Tpdu,
        events: &mut Vec<TransportEvent>,
    ) -> Result<(), CiError> {
        let slot_num = self.slot_num;
        let max_spdu_size = self.config.max_spdu_size;
        let tcid = tpdu.tcid;
        let conn = self.connection_mut(tcid)?;
        conn.awaiting = None;

        match tpdu.tag {
            TpduTag::CreateTcReply => {
                if conn.state != ConnectionState::Creation {
                    return Err(CiError::ProtocolViolation("unexpected T_C_T_C_REPLY"));
                }
                conn.state = ConnectionState::Active;
                log::debug!("slot {}: connection {} opened", slot_num, tcid);
                events.push(TransportEvent::ConnectionOpened { slot: id, tcid });
            }
            TpduTag::DeleteTcReply => {
                if conn.state != ConnectionState::Deletion {
                    return Err(CiError::ProtocolViolation("unexpected T_D_T_C_REPLY"));
                }
                conn.reset();
                log::debug!("slot {}: connection {} deleted", slot_num, tcid);
                events.push(TransportEvent::ConnectionClosed { slot: id, tcid });
            }
            TpduTag::DeleteTc => {
                let was_open = conn.is_open();
                conn.reset();
                log::debug!("slot {}: module deleted connection {}", slot_num, tcid);
                let reply = tpdu::encode(TpduTag::DeleteTcReply, tcid, &[])?;
                self.device.write(slot_num, tcid, &reply)?;
                if was_open {
                    events.push(TransportEvent::ConnectionClosed { slot: id, tcid });
                }
            }
            TpduTag::RequestTc => match self.open_connection() {
                Ok(new_tcid) => {
                    log::debug!("slot {}: module requested connection {}", slot_num, new_tcid);
                    let new_tc = tpdu::encode(TpduTag::NewTc, tcid, &[new_tcid])?;
                    self.device.write(slot_num, tcid, &new_tc)?;
                }
                Err(CiError::TooManyConnections) => {
                    log::warn!("slot {}: no connection available for module", slot_num);
                    let error = tpdu::encode(TpduTag::TcError, tcid, &[TC_ERROR_NO_CONNECTION])?;
                    self.device.write(slot_num, tcid, &error)?;
                }
                Err(e) => return Err(e),
            },
            TpduTag::DataMore | TpduTag::DataLast => {
                if conn.state != ConnectionState::Active {
                    return Err(CiError::BadConnection);
                }
                let last = tpdu.tag == TpduTag::DataLast;
                if conn.rx_discarding {
                    conn.rx_discarding = !last;
                    return Ok(());
                }
                if conn.rx_chain.len() + tpdu.data.len() > max_spdu_size {
                    log::warn!(
                        "slot {}: connection {} received more than {} bytes",
                        slot_num,
                        tcid,
                        max_spdu_size
                    );
                    conn.rx_chain = Vec::new();
                    conn.rx_discarding = !last;
                    return Err(CiError::ProtocolViolation("received data too long"));
                }

                conn.rx_chain.extend_from_slice(tpdu.data);
                if last && !conn.rx_chain.is_empty() {
                    let data = std::mem::take(&mut conn.rx_chain);
                    events.push(TransportEvent::Data {
                        slot: id,
                        tcid,
                        data,
                    });
                }
            }
            TpduTag::Sb => {
                conn.data_available = tpdu.data_available() == Some(true);
            }
            TpduTag::TcError => {
                log::warn!("slot {}: module reported error on connection {}", slot_num, tcid);
                let was_open = conn.is_open();
                conn.reset();
                if was_open {
                    events.push(TransportEvent::ConnectionClosed { slot: id, tcid });
                }
                return Err(CiError::SlotError);
            }
            TpduTag::Rcv | TpduTag::CreateTc | TpduTag::NewTc => {
                return Err(CiError::ProtocolViolation("host tpdu from module"));
            }
        }

        Ok(())
    }

    /// 応答待ちでないコネクションで次のコマンドを送る。
    fn send(
        &mut self,
        id: SlotId,
        now: Instant,
        events: &mut Vec<TransportEvent>,
    ) -> Result<(), CiError> {
        let mut result = Ok(());
        for (idx, conn) in self.connections.iter_mut().enumerate() {
            let tcid = idx as u8 + 1;
            if conn.state == ConnectionState::Idle {
                continue;
            }

            if let Some(sent) = conn.awaiting {
                if now.saturating_duration_since(sent) >= self.config.response_timeout {
                    log::warn!("slot {}: connection {} timed out", self.slot_num, tcid);
                    if conn.is_open() {
                        events.push(TransportEvent::ConnectionClosed { slot: id, tcid });
                    }
                    conn.reset();
                    result = Err(CiError::SlotTimeout);
                }
                continue;
            }

            let tpdu = if conn.data_available {
                conn.data_available = false;
                tpdu::encode(TpduTag::Rcv, tcid, &[])?
            } else if let Some(tpdu) = conn.tx_queue.pop_front() {
                tpdu
            } else if conn.state == ConnectionState::Active
                && conn
                    .last_sent
                    .map_or(true, |t| now.saturating_duration_since(t) >= self.config.poll_delay)
            {
                tpdu::encode(TpduTag::DataLast, tcid, &[])?
            } else {
                continue;
            };

            log::trace!("slot {}: tcid {} sending {} bytes", self.slot_num, tcid, tpdu.len());
            self.device.write(self.slot_num, tcid, &tpdu)?;
            conn.awaiting = Some(now);
            conn.last_sent = Some(now);
        }
        result
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("slot_num", &self.slot_num)
            .field("state", &self.state)
            .field("config", &self.config)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

/// トランスポート層。
///
/// ポーリングは1つのスレッドから行い、他のスレッドとは
/// `Arc<parking_lot::Mutex<TransportLayer>>`として共有する。
#[derive(Debug)]
pub struct TransportLayer {
    slots: Vec<Option<Slot>>,
    max_connections: u8,
    events: Vec<TransportEvent>,
    last_error: Option<(SlotId, CiError)>,
}

impl TransportLayer {
    /// スロット数の上限とスロット当たりのコネクション数の上限を指定して生成する。
    pub fn new(max_slots: u8, max_connections_per_slot: u8) -> TransportLayer {
        TransportLayer {
            slots: std::iter::repeat_with(|| None).take(max_slots as usize).collect(),
            max_connections: max_connections_per_slot.min(u8::MAX - 1),
            events: Vec::new(),
            last_error: None,
        }
    }

    fn slot_mut(&mut self, slot: SlotId) -> Result<&mut Slot, CiError> {
        self.slots
            .get_mut(slot.index())
            .and_then(Option::as_mut)
            .ok_or(CiError::BadSlot)
    }

    /// CAデバイスの`slot_num`番のスロットを登録する。
    pub fn register_slot(
        &mut self,
        device: Box<dyn CaDevice>,
        slot_num: u8,
        config: SlotConfig,
    ) -> Result<SlotId, CiError> {
        let idx = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(CiError::TooManySlots)?;

        let read_buf = vec![0; config.max_tpdu_size.max(TPDU_HEADER_MAX + 1)];
        self.slots[idx] = Some(Slot {
            device,
            slot_num,
            state: SlotState::Empty,
            config,
            connections: std::iter::repeat_with(Connection::new)
                .take(self.max_connections as usize)
                .collect(),
            read_buf,
        });
        Ok(SlotId(idx as u8))
    }

    /// スロットを破棄する。
    ///
    /// 開いているコネクションの[`TransportEvent::ConnectionClosed`]と
    /// [`TransportEvent::SlotClosed`]は次の[`poll`](TransportLayer::poll)で通知される。
    pub fn destroy_slot(&mut self, slot: SlotId) -> Result<(), CiError> {
        let mut removed = self
            .slots
            .get_mut(slot.index())
            .and_then(Option::take)
            .ok_or(CiError::BadSlot)?;

        removed.close_all(slot, &mut self.events);
        self.events.push(TransportEvent::SlotClosed { slot });
        Ok(())
    }

    /// 新たなトランスポートコネクションを要求し、そのコネクション識別を返す。
    ///
    /// 確立すると[`TransportEvent::ConnectionOpened`]が通知される。
    pub fn new_tc(&mut self, slot: SlotId) -> Result<u8, CiError> {
        let slot = self.slot_mut(slot)?;
        if slot.state != SlotState::Ready {
            return Err(CiError::BadSlot);
        }
        slot.open_connection()
    }

    /// トランスポートコネクションの削除を要求する。
    pub fn delete_tc(&mut self, slot: SlotId, tcid: u8) -> Result<(), CiError> {
        let conn = self.slot_mut(slot)?.connection_mut(tcid)?;
        if conn.state != ConnectionState::Active {
            return Err(CiError::BadConnection);
        }

        conn.state = ConnectionState::Deletion;
        conn.tx_queue.clear();
        conn.tx_queue
            .push_back(tpdu::encode(TpduTag::DeleteTc, tcid, &[])?);
        Ok(())
    }

    /// コネクションにデータを送る。
    ///
    /// リンク層の上限を超えるデータはT_DATA_MOREに分割される。
    pub fn send_data(&mut self, slot: SlotId, tcid: u8, data: &[u8]) -> Result<(), CiError> {
        let slot = self.slot_mut(slot)?;
        let chunk_size = slot
            .config
            .max_tpdu_size
            .saturating_sub(TPDU_HEADER_MAX)
            .max(1);
        let conn = slot.connection_mut(tcid)?;
        if conn.state != ConnectionState::Active {
            return Err(CiError::BadConnection);
        }

        if data.is_empty() {
            conn.tx_queue
                .push_back(tpdu::encode(TpduTag::DataLast, tcid, &[])?);
            return Ok(());
        }

        let mut chunks = data.chunks(chunk_size).peekable();
        while let Some(chunk) = chunks.next() {
            let tag = if chunks.peek().is_some() {
                TpduTag::DataMore
            } else {
                TpduTag::DataLast
            };
            conn.tx_queue.push_back(tpdu::encode(tag, tcid, chunk)?);
        }
        Ok(())
    }

    /// コネクションの状態を返す。
    pub fn connection_state(&self, slot: SlotId, tcid: u8) -> Option<ConnectionState> {
        let slot = self.slots.get(slot.index())?.as_ref()?;
        let idx = (tcid as usize).checked_sub(1)?;
        slot.connections.get(idx).map(|c| c.state)
    }

    /// すべてのスロットを1回ずつ処理し、発生した出来事を返す。
    ///
    /// スロットで発生したエラーは他のスロットの処理を妨げず、
    /// [`last_error`](TransportLayer::last_error)で取得できる。
    #[inline]
    pub fn poll(&mut self) -> Vec<TransportEvent> {
        self.poll_at(Instant::now())
    }

    /// 現在時刻を`now`として[`poll`](TransportLayer::poll)する。
    pub fn poll_at(&mut self, now: Instant) -> Vec<TransportEvent> {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            let Some(slot) = slot else {
                continue;
            };

            let id = SlotId(idx as u8);
            if let Err(e) = slot.poll(id, now, &mut self.events) {
                log::warn!("slot {}: {}", slot.slot_num, e);
                self.last_error = Some((id, e));
            }
        }
        std::mem::take(&mut self.events)
    }

    /// 最後に発生したエラーを返す。
    #[inline]
    pub fn last_error(&self) -> Option<&CiError> {
        self.last_error.as_ref().map(|(_, e)| e)
    }

    /// 最後にエラーが発生したスロットを返す。
    #[inline]
    pub fn error_slot(&self) -> Option<SlotId> {
        self.last_error.as_ref().map(|(slot, _)| *slot)
    }
}
