//! MMI（Man-Machine Interface）の高水準オブジェクト。

use dvbsi::DvbStr;
use fxhash::FxHashMap;

use crate::apdu::{self, Apdu};
use crate::app::{unexpected_apdu, AppEvent};
use crate::error::CiError;
use crate::resource::{Context, Resource, ResourceId};
use crate::session::SessionId;

/// close_mmiのタグ。
pub const TAG_CLOSE_MMI: u32 = 0x9F8800;
/// display_controlのタグ。
pub const TAG_DISPLAY_CONTROL: u32 = 0x9F8801;
/// display_replyのタグ。
pub const TAG_DISPLAY_REPLY: u32 = 0x9F8802;
/// text_lastのタグ。
pub const TAG_TEXT_LAST: u32 = 0x9F8803;
/// text_moreのタグ。
pub const TAG_TEXT_MORE: u32 = 0x9F8804;
/// keypad_controlのタグ。
pub const TAG_KEYPAD_CONTROL: u32 = 0x9F8805;
/// keypressのタグ。
pub const TAG_KEYPRESS: u32 = 0x9F8806;
/// enqのタグ。
pub const TAG_ENQ: u32 = 0x9F8807;
/// answのタグ。
pub const TAG_ANSW: u32 = 0x9F8808;
/// menu_lastのタグ。
pub const TAG_MENU_LAST: u32 = 0x9F8809;
/// menu_moreのタグ。
pub const TAG_MENU_MORE: u32 = 0x9F880A;
/// menu_answのタグ。
pub const TAG_MENU_ANSW: u32 = 0x9F880B;
/// list_lastのタグ。
pub const TAG_LIST_LAST: u32 = 0x9F880C;
/// list_moreのタグ。
pub const TAG_LIST_MORE: u32 = 0x9F880D;

const DISPLAY_CMD_SET_MMI_MODE: u8 = 0x01;
const DISPLAY_CMD_GET_DISPLAY_CHAR_TABLES: u8 = 0x02;
const DISPLAY_CMD_GET_INPUT_CHAR_TABLES: u8 = 0x03;

const REPLY_MMI_MODE_ACK: u8 = 0x01;
const REPLY_LIST_DISPLAY_CHAR_TABLES: u8 = 0x02;
const REPLY_LIST_INPUT_CHAR_TABLES: u8 = 0x03;
const REPLY_UNKNOWN_CMD: u8 = 0xF0;
const REPLY_UNKNOWN_MMI_MODE: u8 = 0xF1;

/// 高水準MMI。
const MMI_MODE_HIGH_LEVEL: u8 = 0x01;

/// 選択肢の数が指定されていないことを表すchoice_nb。
const CHOICE_NB_UNSPECIFIED: u8 = 0xFF;

/// メニューまたはリスト。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    /// 表題。
    pub title: String,
    /// 副題。
    pub subtitle: String,
    /// 下部の文言。
    pub bottom: String,
    /// 選択肢または項目。
    pub items: Vec<String>,
}

impl Menu {
    /// menu_lastまたはlist_lastの内容を読み取る。
    pub fn read(data: &[u8]) -> Result<Menu, CiError> {
        let [choice_nb, ref rest @ ..] = *data else {
            log::debug!("invalid Menu");
            return Err(CiError::TruncatedData);
        };

        let mut texts = read_texts(rest)?.into_iter();
        let (Some(title), Some(subtitle), Some(bottom)) = (texts.next(), texts.next(), texts.next())
        else {
            log::debug!("invalid Menu: missing title");
            return Err(CiError::TruncatedData);
        };
        let items: Vec<String> = texts.collect();
        if choice_nb != CHOICE_NB_UNSPECIFIED && choice_nb as usize != items.len() {
            log::debug!("menu has {} items, expected {}", items.len(), choice_nb);
        }

        Ok(Menu {
            title,
            subtitle,
            bottom,
            items,
        })
    }
}

/// text_moreとtext_lastからなるテキストの列を読み取る。
fn read_texts(data: &[u8]) -> Result<Vec<String>, CiError> {
    let mut texts = Vec::new();
    let mut chain = Vec::new();
    for apdu in Apdu::iter(data) {
        let apdu = apdu?;
        match apdu.tag {
            TAG_TEXT_MORE => chain.extend_from_slice(apdu.data),
            TAG_TEXT_LAST => {
                chain.extend_from_slice(apdu.data);
                texts.push(<&DvbStr>::from(&*chain).decode());
                chain.clear();
            }
            tag => {
                log::debug!("unexpected apdu {:#08X} in text", tag);
                return Err(CiError::ProtocolViolation("text object"));
            }
        }
    }

    if !chain.is_empty() {
        log::debug!("text_more without text_last");
        return Err(CiError::TruncatedData);
    }
    Ok(texts)
}

/// MMIでモジュールから要求された表示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmiEvent {
    /// MMIを閉じる。
    Close {
        /// 閉じるまでの秒数。
        delay: Option<u8>,
    },
    /// メニューを表示して選択を求める。
    Menu(Menu),
    /// リストを表示する。
    List(Menu),
    /// 文字列の入力を求める。
    Enquiry {
        /// 入力を伏せ字にするかどうか。
        blind: bool,
        /// 期待される入力の長さ。
        answer_length: u8,
        /// 問い合わせの文言。
        text: String,
    },
}

/// menu_answのAPDUを生成する。`choice`は1から始まり、0は取り消しを表す。
#[inline]
pub fn menu_answ(choice: u8) -> Result<Vec<u8>, CiError> {
    apdu::encode(TAG_MENU_ANSW, &[choice])
}

/// answのAPDUを生成する。`None`は取り消しを表す。
pub fn answ(text: Option<&str>) -> Result<Vec<u8>, CiError> {
    match text {
        Some(text) => {
            let mut data = Vec::with_capacity(1 + text.len());
            data.push(0x01);
            data.extend_from_slice(text.as_bytes());
            apdu::encode(TAG_ANSW, &data)
        }
        None => apdu::encode(TAG_ANSW, &[0x00]),
    }
}

/// 即座にMMIを閉じるclose_mmiのAPDUを生成する。
#[inline]
pub fn close_mmi() -> Result<Vec<u8>, CiError> {
    apdu::encode(TAG_CLOSE_MMI, &[0x00])
}

/// MMIのリソース。
///
/// 高水準MMIのみに対応する。
#[derive(Debug, Default)]
pub struct Mmi {
    /// menu_moreまたはlist_moreで受け取り途中の内容。
    chains: FxHashMap<SessionId, (u32, Vec<u8>)>,
}

impl Mmi {
    /// `Mmi`を生成する。
    pub fn new() -> Mmi {
        Mmi::default()
    }

    fn display_control(
        &mut self,
        ctx: &mut Context,
        session: SessionId,
        data: &[u8],
    ) -> Result<(), CiError> {
        let reply: &[u8] = match *data {
            [DISPLAY_CMD_SET_MMI_MODE, MMI_MODE_HIGH_LEVEL, ..] => {
                &[REPLY_MMI_MODE_ACK, MMI_MODE_HIGH_LEVEL]
            }
            [DISPLAY_CMD_SET_MMI_MODE, mode, ..] => {
                log::debug!("unsupported mmi mode: {}", mode);
                &[REPLY_UNKNOWN_MMI_MODE]
            }
            [DISPLAY_CMD_SET_MMI_MODE] => return Err(CiError::TruncatedData),
            // 既定の文字符号表のみ
            [DISPLAY_CMD_GET_DISPLAY_CHAR_TABLES, ..] => &[REPLY_LIST_DISPLAY_CHAR_TABLES],
            [DISPLAY_CMD_GET_INPUT_CHAR_TABLES, ..] => &[REPLY_LIST_INPUT_CHAR_TABLES],
            [cmd, ..] => {
                log::debug!("unsupported display_control_cmd: {:#04X}", cmd);
                &[REPLY_UNKNOWN_CMD]
            }
            [] => return Err(CiError::TruncatedData),
        };
        ctx.send(session, TAG_DISPLAY_REPLY, reply)
    }

    /// menu_moreやlist_moreを連結し、最後の断片で完成した内容を返す。
    fn defragment(
        &mut self,
        session: SessionId,
        kind: u32,
        data: &[u8],
        last: bool,
    ) -> Result<Option<Vec<u8>>, CiError> {
        let mut chain = match self.chains.remove(&session) {
            Some((k, chain)) if k == kind => chain,
            Some(_) => {
                log::debug!("mmi object interleaved with another");
                return Err(CiError::ProtocolViolation("interleaved mmi object"));
            }
            None => Vec::new(),
        };
        chain.extend_from_slice(data);

        if last {
            Ok(Some(chain))
        } else {
            self.chains.insert(session, (kind, chain));
            Ok(None)
        }
    }
}

impl Resource for Mmi {
    fn resource_id(&self) -> ResourceId {
        ResourceId::MMI
    }

    fn receive(
        &mut self,
        ctx: &mut Context,
        session: SessionId,
        apdu: &Apdu,
    ) -> Result<(), CiError> {
        let event = match apdu.tag {
            TAG_CLOSE_MMI => {
                let delay = match *apdu.data {
                    [0x01, delay, ..] => Some(delay),
                    _ => None,
                };
                self.chains.remove(&session);
                MmiEvent::Close { delay }
            }
            TAG_DISPLAY_CONTROL => return self.display_control(ctx, session, apdu.data),
            TAG_MENU_MORE | TAG_MENU_LAST => {
                let last = apdu.tag == TAG_MENU_LAST;
                let Some(data) = self.defragment(session, TAG_MENU_LAST, apdu.data, last)? else {
                    return Ok(());
                };
                MmiEvent::Menu(Menu::read(&data)?)
            }
            TAG_LIST_MORE | TAG_LIST_LAST => {
                let last = apdu.tag == TAG_LIST_LAST;
                let Some(data) = self.defragment(session, TAG_LIST_LAST, apdu.data, last)? else {
                    return Ok(());
                };
                MmiEvent::List(Menu::read(&data)?)
            }
            TAG_ENQ => {
                let [flags, answer_length, ref text @ ..] = *apdu.data else {
                    log::debug!("invalid enq");
                    return Err(CiError::TruncatedData);
                };
                MmiEvent::Enquiry {
                    blind: flags & 0x01 != 0,
                    answer_length,
                    text: <&DvbStr>::from(text).decode(),
                }
            }
            TAG_KEYPAD_CONTROL | TAG_TEXT_LAST | TAG_TEXT_MORE => {
                log::debug!("ignoring mmi apdu {:#08X}", apdu.tag);
                return Ok(());
            }
            tag => return Err(unexpected_apdu("mmi", tag)),
        };

        log::debug!("mmi: {:?}", event);
        ctx.emit(AppEvent::Mmi { session, event });
        Ok(())
    }

    fn closed(&mut self, _ctx: &mut Context, session: SessionId) {
        self.chains.remove(&session);
    }
}
