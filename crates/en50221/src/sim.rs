//! テスト用の模擬CAM。

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::device::{CaDevice, CamState, LinkType};
use crate::tpdu::{self, Tpdu, TpduTag, SB_DATA_AVAILABLE};

/// T_RCVに対して一度に返すデータのバイト数。
const CHUNK_SIZE: usize = 8;

#[derive(Debug)]
pub struct SimState {
    pub cam_state: CamState,
    pub link_type: LinkType,
    pub resets: usize,
    /// 書き込みに応答しない。
    pub mute: bool,
    /// ホストが書き込んだTPDU。
    pub written: Vec<Vec<u8>>,
    /// ホストから受け取ったデータ。
    pub received: Vec<(u8, Vec<u8>)>,
    /// ホストに送るデータ。
    pub outgoing: FxHashMap<u8, VecDeque<Vec<u8>>>,
    /// 次にコネクション1へ書き込まれた際にT_REQUEST_T_Cを返す。
    pub request_tc: bool,
    /// 次に指定のコネクションへ書き込まれた際にT_DELETE_T_Cを返す。
    pub delete_tc: Option<u8>,
    responses: VecDeque<(u8, Vec<u8>)>,
    chains: FxHashMap<u8, Vec<u8>>,
}

impl SimState {
    fn status(&mut self, tcid: u8) -> Vec<u8> {
        let da = self.outgoing.get(&tcid).map_or(false, |q| !q.is_empty());
        let sb_value = if da { SB_DATA_AVAILABLE } else { 0 };
        tpdu::encode(TpduTag::Sb, tcid, &[sb_value]).unwrap()
    }

    fn respond(&mut self, tcid: u8, data: &[u8]) {
        let (tpdu, _) = Tpdu::read(data).unwrap();
        assert_eq!(tpdu.tcid, tcid);

        let mut response = Vec::new();
        match tpdu.tag {
            TpduTag::CreateTc => {
                response = tpdu::encode(TpduTag::CreateTcReply, tcid, &[]).unwrap();
            }
            TpduTag::DeleteTc => {
                self.responses
                    .push_back((tcid, tpdu::encode(TpduTag::DeleteTcReply, tcid, &[]).unwrap()));
                return;
            }
            TpduTag::DeleteTcReply | TpduTag::TcError => return,
            TpduTag::DataMore => {
                self.chains.entry(tcid).or_default().extend_from_slice(tpdu.data);
            }
            TpduTag::DataLast => {
                let mut chain = self.chains.remove(&tcid).unwrap_or_default();
                chain.extend_from_slice(tpdu.data);
                if !chain.is_empty() {
                    self.received.push((tcid, chain));
                }
            }
            TpduTag::Rcv => {
                if let Some(queue) = self.outgoing.get_mut(&tcid) {
                    if let Some(front) = queue.front_mut() {
                        if front.len() > CHUNK_SIZE {
                            let rest = front.split_off(CHUNK_SIZE);
                            let chunk = std::mem::replace(front, rest);
                            response = tpdu::encode(TpduTag::DataMore, tcid, &chunk).unwrap();
                        } else if let Some(last) = queue.pop_front() {
                            response = tpdu::encode(TpduTag::DataLast, tcid, &last).unwrap();
                        }
                    }
                }
            }
            _ => {}
        }

        if self.request_tc && tcid == 1 {
            self.request_tc = false;
            response.extend(tpdu::encode(TpduTag::RequestTc, tcid, &[]).unwrap());
        } else if self.delete_tc == Some(tcid) {
            self.delete_tc = None;
            self.responses
                .push_back((tcid, tpdu::encode(TpduTag::DeleteTc, tcid, &[]).unwrap()));
            return;
        }

        let status = self.status(tcid);
        response.extend(status);
        self.responses.push_back((tcid, response));
    }
}

/// [`CaDevice`]を実装する模擬CAM。
#[derive(Debug, Clone)]
pub struct SimCam(Arc<Mutex<SimState>>);

impl SimCam {
    pub fn new() -> SimCam {
        SimCam(Arc::new(Mutex::new(SimState {
            cam_state: CamState::Ready,
            link_type: LinkType::Link,
            resets: 0,
            mute: false,
            written: Vec::new(),
            received: Vec::new(),
            outgoing: FxHashMap::default(),
            request_tc: false,
            delete_tc: None,
            responses: VecDeque::new(),
            chains: FxHashMap::default(),
        })))
    }

    #[inline]
    pub fn state(&self) -> MutexGuard<SimState> {
        self.0.lock()
    }

    /// モジュールからコネクション`tcid`にデータを送る。
    pub fn push(&self, tcid: u8, data: Vec<u8>) {
        self.state().outgoing.entry(tcid).or_default().push_back(data);
    }

    /// ホストから受け取ったデータを取り出す。
    pub fn take_received(&self) -> Vec<(u8, Vec<u8>)> {
        std::mem::take(&mut self.state().received)
    }
}

impl CaDevice for SimCam {
    fn reset(&mut self, _slot: u8) -> io::Result<()> {
        let mut state = self.state();
        state.resets += 1;
        state.responses.clear();
        state.chains.clear();
        Ok(())
    }

    fn slot_status(&mut self, _slot: u8) -> io::Result<CamState> {
        Ok(self.state().cam_state)
    }

    fn link_type(&mut self, _slot: u8) -> io::Result<LinkType> {
        Ok(self.state().link_type)
    }

    fn read(&mut self, _slot: u8, buf: &mut [u8]) -> io::Result<Option<(u8, usize)>> {
        let mut state = self.state();
        let Some((tcid, data)) = state.responses.pop_front() else {
            return Ok(None);
        };
        let dst = buf
            .get_mut(..data.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "buffer too small"))?;
        dst.copy_from_slice(&data);
        Ok(Some((tcid, data.len())))
    }

    fn write(&mut self, _slot: u8, tcid: u8, data: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        state.written.push(data.to_vec());
        if !state.mute {
            state.respond(tcid, data);
        }
        Ok(())
    }
}
