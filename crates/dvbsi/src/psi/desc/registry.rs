//! 規格ごとの記述子タグ表。
//!
//! 同じタグでも規格によって意味が異なるため（0x81はATSCではAC-3、
//! DVBでは事業者定義）、タグの解釈は[`Standard`]を指定して行う。

use crate::psi::PsiError;

use super::atsc::*;
use super::base::{Descriptor, RawDescriptor};
use super::dvb::*;
use super::mpeg::*;

/// 記述子タグの解釈に使う規格。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Standard {
    /// ISO/IEC 13818-1のみ。
    Mpeg,
    /// EN 300 468（MPEGを含む）。
    Dvb,
    /// ATSC A/65（MPEGを含む）。
    Atsc,
}

const MPEG_TAGS: &[(u8, &str)] = &[
    (0x02, "video_stream"),
    (0x03, "audio_stream"),
    (0x04, "hierarchy"),
    (0x05, "registration"),
    (0x06, "data_stream_alignment"),
    (0x07, "target_background_grid"),
    (0x08, "video_window"),
    (0x09, "ca"),
    (0x0A, "iso_639_language"),
    (0x0B, "system_clock"),
    (0x0C, "multiplex_buffer_utilization"),
    (0x0D, "copyright"),
    (0x0E, "maximum_bitrate"),
    (0x0F, "private_data_indicator"),
    (0x10, "smoothing_buffer"),
    (0x11, "std"),
    (0x12, "ibp"),
];

const DVB_TAGS: &[(u8, &str)] = &[
    (0x40, "network_name"),
    (0x41, "service_list"),
    (0x42, "stuffing"),
    (0x43, "satellite_delivery_system"),
    (0x44, "cable_delivery_system"),
    (0x45, "vbi_data"),
    (0x46, "vbi_teletext"),
    (0x47, "bouquet_name"),
    (0x48, "service"),
    (0x49, "country_availability"),
    (0x4A, "linkage"),
    (0x4B, "nvod_reference"),
    (0x4C, "time_shifted_service"),
    (0x4D, "short_event"),
    (0x4E, "extended_event"),
    (0x4F, "time_shifted_event"),
    (0x50, "component"),
    (0x51, "mosaic"),
    (0x52, "stream_identifier"),
    (0x53, "ca_identifier"),
    (0x54, "content"),
    (0x55, "parental_rating"),
    (0x56, "teletext"),
    (0x57, "telephone"),
    (0x58, "local_time_offset"),
    (0x59, "subtitling"),
    (0x5A, "terrestrial_delivery_system"),
    (0x5B, "multilingual_network_name"),
    (0x5C, "multilingual_bouquet_name"),
    (0x5D, "multilingual_service_name"),
    (0x5E, "multilingual_component"),
    (0x5F, "private_data_specifier"),
    (0x60, "service_move"),
    (0x61, "short_smoothing_buffer"),
    (0x62, "frequency_list"),
    (0x63, "partial_transport_stream"),
    (0x64, "data_broadcast"),
    (0x65, "scrambling"),
    (0x66, "data_broadcast_id"),
    (0x67, "transport_stream"),
    (0x68, "dsng"),
    (0x69, "pdc"),
    (0x6A, "ac3"),
    (0x6B, "ancillary_data"),
    (0x6C, "cell_list"),
    (0x6D, "cell_frequency_link"),
    (0x6E, "announcement_support"),
    (0x6F, "application_signalling"),
    (0x70, "adaptation_field_data"),
    (0x71, "service_identifier"),
    (0x72, "service_availability"),
    (0x73, "default_authority"),
    (0x74, "related_content"),
    (0x75, "tva_id"),
    (0x76, "content_identifier"),
    (0x77, "time_slice_fec_identifier"),
    (0x78, "ecm_repetition_rate"),
    (0x79, "s2_satellite_delivery_system"),
    (0x7A, "enhanced_ac3"),
    (0x7B, "dts"),
    (0x7C, "aac"),
    (0x7F, "extension"),
];

const ATSC_TAGS: &[(u8, &str)] = &[
    (0x80, "stuffing"),
    (0x81, "ac3_audio_stream"),
    (0x86, "caption_service"),
    (0x87, "content_advisory"),
    (0xA0, "extended_channel_name"),
    (0xA1, "service_location"),
    (0xA2, "time_shifted_service"),
    (0xA3, "component_name"),
    (0xA8, "dcc_departing_request"),
    (0xA9, "dcc_arriving_request"),
    (0xAA, "redistribution_control"),
    (0xAD, "atsc_private_information"),
    (0xB6, "content_identifier"),
];

fn lookup(table: &[(u8, &'static str)], tag: u8) -> Option<&'static str> {
    table
        .binary_search_by_key(&tag, |&(t, _)| t)
        .ok()
        .map(|i| table[i].1)
}

impl Standard {
    /// `tag`の記述子名を返す。未知のタグでは`None`を返す。
    pub fn descriptor_name(self, tag: u8) -> Option<&'static str> {
        lookup(MPEG_TAGS, tag).or_else(|| match self {
            Standard::Mpeg => None,
            Standard::Dvb => lookup(DVB_TAGS, tag),
            Standard::Atsc => lookup(ATSC_TAGS, tag),
        })
    }
}

/// 規格のタグ表に従って読み取った記述子。
///
/// 未対応のタグは[`AnyDescriptor::Unknown`]としてそのまま渡される。
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyDescriptor<'a> {
    VideoStream(VideoStreamDescriptor),
    AudioStream(AudioStreamDescriptor),
    Registration(RegistrationDescriptor<'a>),
    DataStreamAlignment(DataStreamAlignmentDescriptor),
    ConditionalAccess(ConditionalAccessDescriptor<'a>),
    Iso639Language(Iso639LanguageDescriptor),
    MaximumBitrate(MaximumBitrateDescriptor),

    NetworkName(NetworkNameDescriptor<'a>),
    ServiceList(ServiceListDescriptor),
    SatelliteDeliverySystem(SatelliteDeliverySystemDescriptor),
    CableDeliverySystem(CableDeliverySystemDescriptor),
    BouquetName(BouquetNameDescriptor<'a>),
    Service(ServiceDescriptor<'a>),
    Linkage(LinkageDescriptor<'a>),
    ShortEvent(ShortEventDescriptor<'a>),
    ExtendedEvent(ExtendedEventDescriptor<'a>),
    Component(ComponentDescriptor<'a>),
    StreamIdentifier(StreamIdentifierDescriptor),
    CaIdentifier(CaIdentifierDescriptor),
    Content(ContentDescriptor),
    ParentalRating(ParentalRatingDescriptor),
    Teletext(TeletextDescriptor),
    LocalTimeOffset(LocalTimeOffsetDescriptor),
    Subtitling(SubtitlingDescriptor),
    TerrestrialDeliverySystem(TerrestrialDeliverySystemDescriptor),
    PrivateDataSpecifier(PrivateDataSpecifierDescriptor),
    FrequencyList(FrequencyListDescriptor),
    DataBroadcastId(DataBroadcastIdDescriptor<'a>),
    Ac3(Ac3Descriptor<'a>),

    Ac3AudioStream(Ac3AudioStreamDescriptor<'a>),
    CaptionService(CaptionServiceDescriptor),
    ContentAdvisory(ContentAdvisoryDescriptor<'a>),
    ExtendedChannelName(ExtendedChannelNameDescriptor<'a>),
    ServiceLocation(ServiceLocationDescriptor),
    ComponentName(ComponentNameDescriptor<'a>),

    /// 未対応の記述子。
    Unknown(RawDescriptor<'a>),
}

impl<'a> AnyDescriptor<'a> {
    /// `raw`を`standard`のタグ表に従って読み取る。
    pub fn read(raw: RawDescriptor<'a>, standard: Standard) -> Result<AnyDescriptor<'a>, PsiError> {
        macro_rules! read {
            ($variant:ident, $ty:ty) => {
                <$ty as Descriptor<'a>>::read(raw.data).map(AnyDescriptor::$variant)
            };
        }

        match (standard, raw.tag) {
            (_, 0x02) => read!(VideoStream, VideoStreamDescriptor),
            (_, 0x03) => read!(AudioStream, AudioStreamDescriptor),
            (_, 0x05) => read!(Registration, RegistrationDescriptor),
            (_, 0x06) => read!(DataStreamAlignment, DataStreamAlignmentDescriptor),
            (_, 0x09) => read!(ConditionalAccess, ConditionalAccessDescriptor),
            (_, 0x0A) => read!(Iso639Language, Iso639LanguageDescriptor),
            (_, 0x0E) => read!(MaximumBitrate, MaximumBitrateDescriptor),

            (Standard::Dvb, 0x40) => read!(NetworkName, NetworkNameDescriptor),
            (Standard::Dvb, 0x41) => read!(ServiceList, ServiceListDescriptor),
            (Standard::Dvb, 0x43) => read!(SatelliteDeliverySystem, SatelliteDeliverySystemDescriptor),
            (Standard::Dvb, 0x44) => read!(CableDeliverySystem, CableDeliverySystemDescriptor),
            (Standard::Dvb, 0x47) => read!(BouquetName, BouquetNameDescriptor),
            (Standard::Dvb, 0x48) => read!(Service, ServiceDescriptor),
            (Standard::Dvb, 0x4A) => read!(Linkage, LinkageDescriptor),
            (Standard::Dvb, 0x4D) => read!(ShortEvent, ShortEventDescriptor),
            (Standard::Dvb, 0x4E) => read!(ExtendedEvent, ExtendedEventDescriptor),
            (Standard::Dvb, 0x50) => read!(Component, ComponentDescriptor),
            (Standard::Dvb, 0x52) => read!(StreamIdentifier, StreamIdentifierDescriptor),
            (Standard::Dvb, 0x53) => read!(CaIdentifier, CaIdentifierDescriptor),
            (Standard::Dvb, 0x54) => read!(Content, ContentDescriptor),
            (Standard::Dvb, 0x55) => read!(ParentalRating, ParentalRatingDescriptor),
            (Standard::Dvb, 0x56) => read!(Teletext, TeletextDescriptor),
            (Standard::Dvb, 0x58) => read!(LocalTimeOffset, LocalTimeOffsetDescriptor),
            (Standard::Dvb, 0x59) => read!(Subtitling, SubtitlingDescriptor),
            (Standard::Dvb, 0x5A) => read!(TerrestrialDeliverySystem, TerrestrialDeliverySystemDescriptor),
            (Standard::Dvb, 0x5F) => read!(PrivateDataSpecifier, PrivateDataSpecifierDescriptor),
            (Standard::Dvb, 0x62) => read!(FrequencyList, FrequencyListDescriptor),
            (Standard::Dvb, 0x66) => read!(DataBroadcastId, DataBroadcastIdDescriptor),
            (Standard::Dvb, 0x6A) => read!(Ac3, Ac3Descriptor),

            (Standard::Atsc, 0x81) => read!(Ac3AudioStream, Ac3AudioStreamDescriptor),
            (Standard::Atsc, 0x86) => read!(CaptionService, CaptionServiceDescriptor),
            (Standard::Atsc, 0x87) => read!(ContentAdvisory, ContentAdvisoryDescriptor),
            (Standard::Atsc, 0xA0) => read!(ExtendedChannelName, ExtendedChannelNameDescriptor),
            (Standard::Atsc, 0xA1) => read!(ServiceLocation, ServiceLocationDescriptor),
            (Standard::Atsc, 0xA3) => read!(ComponentName, ComponentNameDescriptor),

            _ => Ok(AnyDescriptor::Unknown(raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psi::desc::DescriptorBlock;
    use assert_matches::assert_matches;
    use hex_literal::hex;

    #[test]
    fn test_tables_sorted() {
        for table in [MPEG_TAGS, DVB_TAGS, ATSC_TAGS] {
            assert!(table.windows(2).all(|w| w[0].0 < w[1].0));
        }
    }

    #[test]
    fn test_descriptor_name() {
        assert_eq!(Standard::Dvb.descriptor_name(0x48), Some("service"));
        assert_eq!(Standard::Atsc.descriptor_name(0x48), None);
        assert_eq!(Standard::Atsc.descriptor_name(0x09), Some("ca"));
        assert_eq!(Standard::Mpeg.descriptor_name(0x81), None);
        assert_eq!(Standard::Atsc.descriptor_name(0x81), Some("ac3_audio_stream"));
    }

    #[test]
    fn test_any_descriptor() {
        let data = hex!("52 01 07 81 03 48 3E 0F FE 02 AB CD");
        let block = DescriptorBlock::new(&data).unwrap();

        let dvb: Vec<_> = block
            .iter()
            .map(|raw| AnyDescriptor::read(raw, Standard::Dvb).unwrap())
            .collect();
        assert_matches!(
            dvb[0],
            AnyDescriptor::StreamIdentifier(StreamIdentifierDescriptor { component_tag: 7 })
        );
        assert_matches!(dvb[1], AnyDescriptor::Unknown(RawDescriptor { tag: 0x81, .. }));
        assert_matches!(dvb[2], AnyDescriptor::Unknown(RawDescriptor { tag: 0xFE, data: &[0xAB, 0xCD] }));

        let atsc = AnyDescriptor::read(block.iter().nth(1).unwrap(), Standard::Atsc).unwrap();
        assert_matches!(atsc, AnyDescriptor::Ac3AudioStream(Ac3AudioStreamDescriptor { bsid: 8, .. }));
    }
}
