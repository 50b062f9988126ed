//! 日時。

use std::time::{Duration, Instant};

use fxhash::FxHashMap;

use crate::apdu::Apdu;
use crate::app::unexpected_apdu;
use crate::error::CiError;
use crate::resource::{Context, Resource, ResourceId};
use crate::session::SessionId;

/// date_time_enqのタグ。
pub const TAG_DATE_TIME_ENQ: u32 = 0x9F8440;
/// date_timeのタグ。
pub const TAG_DATE_TIME: u32 = 0x9F8441;

#[derive(Debug)]
struct Schedule {
    interval: Duration,
    last_sent: Instant,
}

/// 日時のリソース。
///
/// date_time_enqで要求された間隔でdate_timeを送り続ける。
#[derive(Debug, Default)]
pub struct DateTime {
    local_offset: Option<i16>,
    schedules: FxHashMap<SessionId, Schedule>,
}

impl DateTime {
    /// `DateTime`を生成する。
    ///
    /// `local_offset`を指定すると、UTCからの時差（分）もdate_timeに含める。
    pub fn new(local_offset: Option<i16>) -> DateTime {
        DateTime {
            local_offset,
            schedules: FxHashMap::default(),
        }
    }

    fn send(&self, ctx: &mut Context, session: SessionId) -> Result<(), CiError> {
        let mut data = [0; 7];
        data[..5].copy_from_slice(&dvbsi::time::DateTime::from_unix(ctx.unix_time()).to_bytes());
        let len = match self.local_offset {
            Some(offset) => {
                data[5..].copy_from_slice(&offset.to_be_bytes());
                7
            }
            None => 5,
        };
        ctx.send(session, TAG_DATE_TIME, &data[..len])
    }
}

impl Resource for DateTime {
    fn resource_id(&self) -> ResourceId {
        ResourceId::DATE_TIME
    }

    fn receive(
        &mut self,
        ctx: &mut Context,
        session: SessionId,
        apdu: &Apdu,
    ) -> Result<(), CiError> {
        match apdu.tag {
            TAG_DATE_TIME_ENQ => {
                let interval = apdu.data.first().copied().unwrap_or(0);
                log::debug!("date_time_enq: interval {}s", interval);
                self.send(ctx, session)?;

                if interval == 0 {
                    self.schedules.remove(&session);
                } else {
                    self.schedules.insert(
                        session,
                        Schedule {
                            interval: Duration::from_secs(interval as u64),
                            last_sent: ctx.now(),
                        },
                    );
                }
                Ok(())
            }
            tag => Err(unexpected_apdu("date-time", tag)),
        }
    }

    fn closed(&mut self, _ctx: &mut Context, session: SessionId) {
        self.schedules.remove(&session);
    }

    fn poll(&mut self, ctx: &mut Context) -> Result<(), CiError> {
        let now = ctx.now();
        let due: Vec<SessionId> = self
            .schedules
            .iter_mut()
            .filter(|(_, s)| now.saturating_duration_since(s.last_sent) >= s.interval)
            .map(|(&session, s)| {
                s.last_sent = now;
                session
            })
            .collect();

        for session in due {
            self.send(ctx, session)?;
        }
        Ok(())
    }
}
