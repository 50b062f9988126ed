//! アプリケーション情報。

use dvbsi::DvbStr;

use crate::apdu::{self, Apdu};
use crate::app::{unexpected_apdu, AppEvent};
use crate::error::CiError;
use crate::resource::{Context, Resource, ResourceId};
use crate::session::SessionId;

/// application_info_enqのタグ。
pub const TAG_APPLICATION_INFO_ENQ: u32 = 0x9F8020;
/// application_infoのタグ。
pub const TAG_APPLICATION_INFO: u32 = 0x9F8021;
/// enter_menuのタグ。
pub const TAG_ENTER_MENU: u32 = 0x9F8022;

/// モジュールのアプリケーション情報。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationInfo {
    /// アプリケーション種別（1は限定受信）。
    pub application_type: u8,
    /// アプリケーション製造者。
    pub application_manufacturer: u16,
    /// 製造者コード。
    pub manufacturer_code: u16,
    /// メニューの表題。
    pub menu_string: String,
}

impl ApplicationInfo {
    /// application_infoの内容を読み取る。
    pub fn read(data: &[u8]) -> Result<ApplicationInfo, CiError> {
        let [application_type, m1, m2, c1, c2, len, ref rest @ ..] = *data else {
            log::debug!("invalid ApplicationInfo");
            return Err(CiError::TruncatedData);
        };
        let Some(menu_string) = rest.get(..len as usize) else {
            log::debug!("invalid ApplicationInfo: menu_string_length {}", len);
            return Err(CiError::TruncatedData);
        };

        Ok(ApplicationInfo {
            application_type,
            application_manufacturer: u16::from_be_bytes([m1, m2]),
            manufacturer_code: u16::from_be_bytes([c1, c2]),
            menu_string: <&DvbStr>::from(menu_string).decode(),
        })
    }
}

/// enter_menuのAPDUを生成する。
#[inline]
pub fn enter_menu() -> Result<Vec<u8>, CiError> {
    apdu::encode(TAG_ENTER_MENU, &[])
}

/// アプリケーション情報のリソース。
#[derive(Debug, Default)]
pub struct ApplicationInformation;

impl ApplicationInformation {
    /// `ApplicationInformation`を生成する。
    pub fn new() -> ApplicationInformation {
        ApplicationInformation
    }
}

impl Resource for ApplicationInformation {
    fn resource_id(&self) -> ResourceId {
        ResourceId::APPLICATION_INFO
    }

    fn opened(&mut self, ctx: &mut Context, session: SessionId) -> Result<(), CiError> {
        ctx.send(session, TAG_APPLICATION_INFO_ENQ, &[])
    }

    fn receive(
        &mut self,
        ctx: &mut Context,
        session: SessionId,
        apdu: &Apdu,
    ) -> Result<(), CiError> {
        match apdu.tag {
            TAG_APPLICATION_INFO => {
                let info = ApplicationInfo::read(apdu.data)?;
                log::debug!("application info: {:?}", info);
                ctx.emit(AppEvent::ApplicationInfo { session, info });
                Ok(())
            }
            tag => Err(unexpected_apdu("application information", tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::Harness;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn test_application_info() {
        let mut h = Harness::new(&[]);
        let mut ai = ApplicationInformation::new();

        h.open(&mut ai).unwrap();
        assert_eq!(h.take_outbox(), [hex!("9F 80 20 00").to_vec()]);

        h.receive(
            &mut ai,
            &hex!("9F 80 21 0B 01 12 34 56 78 05 41 43 4D 45 20"),
        )
        .unwrap();
        assert_eq!(
            h.events,
            [AppEvent::ApplicationInfo {
                session: h.session,
                info: ApplicationInfo {
                    application_type: 1,
                    application_manufacturer: 0x1234,
                    manufacturer_code: 0x5678,
                    menu_string: "ACME ".to_owned(),
                },
            }]
        );

        assert_matches!(
            h.receive(&mut ai, &hex!("9F 80 21 07 01 12 34 56 78 05 41")),
            Err(CiError::TruncatedData)
        );
        assert_matches!(
            h.receive(&mut ai, &hex!("9F 80 22 00")),
            Err(CiError::ProtocolViolation(_))
        );
        assert_eq!(enter_menu().unwrap(), hex!("9F 80 22 00"));
    }
}
