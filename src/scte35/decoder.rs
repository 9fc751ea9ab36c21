use super::commands::{
    PrivateCommand, SpliceCommand, SpliceInsertCommand, SpliceScheduleCommand, TimeSignalCommand,
    TYPE_PRIVATE_COMMAND, TYPE_SPLICE_INSERT, TYPE_SPLICE_NULL, TYPE_SPLICE_SCHEDULE,
    TYPE_TIME_SIGNAL,
};
use crate::bits::{BitReader, ByteCursor};
use crate::errors::{MediaParserError, MediaParserResult};
use crate::metadata::{Metadata, MetadataEntry};
use crate::timestamp_adjuster::TimestampAdjuster;
use log::{debug, warn};

/// Bytes of `splice_info_section` before `splice_command()`.
const SECTION_HEADER_LENGTH: usize = 14;

/// One sample of timed metadata handed to a decoder.
#[derive(Debug, Clone, Default)]
pub struct MetadataInputBuffer {
    /// Backing bytes. `None` models a buffer with no addressable array.
    pub data: Option<Vec<u8>>,
    /// Offset of the visible window within `data`.
    pub array_offset: usize,
    /// Read position within the window.
    pub position: usize,
    pub time_us: i64,
    pub subsample_offset_us: i64,
}

impl MetadataInputBuffer {
    pub fn new(data: Vec<u8>, time_us: i64, subsample_offset_us: i64) -> Self {
        Self {
            data: Some(data),
            array_offset: 0,
            position: 0,
            time_us,
            subsample_offset_us,
        }
    }
}

/// Decodes SCTE-35 `splice_info_section`s into splice commands.
///
/// Holds the session's timestamp adjuster, rebuilt whenever the buffer's subsample offset
/// changes.
#[derive(Debug, Default)]
pub struct SpliceInfoDecoder {
    timestamp_adjuster: Option<TimestampAdjuster>,
}

impl SpliceInfoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, buffer: &MetadataInputBuffer) -> MediaParserResult<Metadata> {
        let data = match &buffer.data {
            Some(data) => data,
            None => {
                return Err(MediaParserError::contract(
                    "metadata buffer has no backing array",
                ))
            }
        };
        if buffer.position != 0 {
            return Err(MediaParserError::contract(format!(
                "metadata buffer position must be 0, was {}",
                buffer.position
            )));
        }
        if buffer.array_offset != 0 {
            return Err(MediaParserError::contract(format!(
                "metadata buffer array offset must be 0, was {}",
                buffer.array_offset
            )));
        }

        let offset_changed = self
            .timestamp_adjuster
            .as_ref()
            .map_or(false, |a| a.timestamp_offset_us() != Some(buffer.subsample_offset_us));
        if offset_changed {
            self.timestamp_adjuster = None;
        }
        let adjuster = self.timestamp_adjuster.get_or_insert_with(|| {
            debug!(
                "building splice timestamp adjuster for subsample offset {}",
                buffer.subsample_offset_us
            );
            let mut adjuster = TimestampAdjuster::new(buffer.time_us);
            adjuster.adjust_sample_timestamp(buffer.time_us - buffer.subsample_offset_us);
            adjuster
        });

        let mut header = BitReader::new(data.as_slice());
        // table_id, section_syntax_indicator, private_indicator, reserved, section_length,
        // protocol_version, encrypted_packet, encryption_algorithm
        header.skip(39);
        let pts_adjustment = header.read_u64(33);
        // cw_index, tier
        header.skip(20);
        let command_length = header.read(12) as usize;
        let command_type = header.read(8);
        header.finish("splice_info_section header")?;

        let mut section = ByteCursor::new(data);
        section.skip(SECTION_HEADER_LENGTH)?;
        let command = match command_type {
            TYPE_SPLICE_NULL => Some(SpliceCommand::Null),
            TYPE_SPLICE_SCHEDULE => Some(SpliceCommand::Schedule(SpliceScheduleCommand::parse(
                &mut section,
            )?)),
            TYPE_SPLICE_INSERT => Some(SpliceCommand::Insert(SpliceInsertCommand::parse(
                &mut section,
                pts_adjustment,
                adjuster,
            )?)),
            TYPE_TIME_SIGNAL => Some(SpliceCommand::TimeSignal(TimeSignalCommand::parse(
                &mut section,
                pts_adjustment,
                adjuster,
            )?)),
            TYPE_PRIVATE_COMMAND => Some(SpliceCommand::Private(PrivateCommand::parse(
                &mut section,
                command_length,
                pts_adjustment,
            )?)),
            other => {
                warn!("ignoring unknown splice command type {:#04x}", other);
                None
            }
        };
        Ok(match command {
            Some(command) => Metadata::new(vec![MetadataEntry::Splice(command)]),
            None => Metadata::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp_adjuster::{pts_to_us, us_to_non_wrapped_pts};

    fn splice(metadata: &Metadata) -> &SpliceCommand {
        assert_eq!(metadata.len(), 1);
        match metadata.get(0) {
            Some(MetadataEntry::Splice(command)) => command,
            other => panic!("expected splice command, got {:?}", other),
        }
    }

    fn without_conversion_error(time_us: i64, offset_us: i64) -> i64 {
        pts_to_us(us_to_non_wrapped_pts(time_us - offset_us)) + offset_us
    }

    #[test]
    fn test_wrapped_around_time_signal_command() {
        let section = vec![
            0x00, // table_id
            0x80, // section_syntax_indicator, private_indicator, reserved, section_length(4)
            0x14, // section_length(8)
            0x00, // protocol_version
            0x00, // encrypted_packet, encryption_algorithm, pts_adjustment(1)
            0x00, 0x00, 0x00, 0x00, // pts_adjustment(32)
            0x00, // cw_index
            0x00, // tier(8)
            0x00, // tier(4), splice_command_length(4)
            0x05, // splice_command_length(8)
            0x06, // splice_command_type = time_signal
            0x80, // time_specified_flag, reserved, pts_time(1)
            0x52, 0x03, 0x02, 0x8f, // pts_time(32), a second after the playback position
            0x00, 0x00, 0x00, 0x00, // CRC_32
        ];
        let mut decoder = SpliceInfoDecoder::new();
        // playback position is about 57:15:58.43, pts before wrapping 0x451ebf851
        let buffer = MetadataInputBuffer::new(section, 0x30_0000_0000, -0x50000);
        let metadata = decoder.decode(&buffer).unwrap();
        match splice(&metadata) {
            SpliceCommand::TimeSignal(command) => {
                assert_eq!(
                    command.playback_position_us,
                    Some(without_conversion_error(0x30_0100_0000, -0x50000))
                );
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_two_splice_insert_commands() {
        let first = vec![
            0x00, 0x80, 0x19, 0x00, 0x00, // header up to pts_adjustment(1)
            0x00, 0x00, 0x00, 0x00, // pts_adjustment(32)
            0x00, 0x00, 0x00, // cw_index, tier, splice_command_length(4)
            0x0e, // splice_command_length(8)
            0x05, // splice_command_type = splice_insert
            0x00, 0x00, 0x00, 0x42, // splice_event_id
            0x00, // splice_event_cancel_indicator, reserved
            0x40, // out_of_network, program_splice, duration, splice_immediate, reserved
            0x80, 0x00, 0x00, 0x00, 0x00, // splice_time() for playback position 3s
            0x00, 0x10, // unique_program_id
            0x01, // avail_num
            0x02, // avails_expected
            0x00, 0x00, 0x00, 0x00, // CRC_32
        ];
        let mut decoder = SpliceInfoDecoder::new();
        let metadata = decoder
            .decode(&MetadataInputBuffer::new(first, 2_000_000, 3_000_000))
            .unwrap();
        let command = match splice(&metadata) {
            SpliceCommand::Insert(command) => command.clone(),
            other => panic!("unexpected command {:?}", other),
        };
        assert_eq!(command.splice_event_id, 66);
        assert!(!command.splice_event_cancel_indicator);
        assert!(!command.out_of_network_indicator);
        assert!(command.program_splice_flag);
        assert!(!command.splice_immediate_flag);
        assert_eq!(command.program_splice_playback_position_us, Some(3_000_000));
        assert_eq!(command.break_duration_us, None);
        assert_eq!(command.unique_program_id, 16);
        assert_eq!(command.avail_num, 1);
        assert_eq!(command.avails_expected, 2);

        let second = vec![
            0x00, 0x80, 0x22, 0x00, 0x00, // header up to pts_adjustment(1)
            0x00, 0x00, 0x00, 0x00, // pts_adjustment(32)
            0x00, 0x00, 0x00, // cw_index, tier, splice_command_length(4)
            0x13, // splice_command_length(8)
            0x05, // splice_command_type = splice_insert
            0xff, 0xff, 0xff, 0xff, // splice_event_id
            0x00, // splice_event_cancel_indicator, reserved
            0x00, // out_of_network, program_splice, duration, splice_immediate, reserved
            0x02, // component_count
            0x10, // component_tag
            0x81, 0xff, 0xff, 0xff, 0xff, // splice_time() for playback position 10s
            0x11, // component_tag
            0x00, // splice_time() without time
            0x00, 0x20, // unique_program_id
            0x01, // avail_num
            0x02, // avails_expected
            0x00, 0x00, 0x00, 0x00, // CRC_32
        ];
        // a different subsample offset forces the adjuster to be rebuilt
        let metadata = decoder
            .decode(&MetadataInputBuffer::new(second, 1_000_000, 1_000_011))
            .unwrap();
        let command = match splice(&metadata) {
            SpliceCommand::Insert(command) => command.clone(),
            other => panic!("unexpected command {:?}", other),
        };
        assert_eq!(command.splice_event_id, 0xffff_ffff);
        assert!(!command.program_splice_flag);
        assert_eq!(command.program_splice_playback_position_us, None);
        assert_eq!(command.break_duration_us, None);
        let components = &command.component_splice_list;
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].component_tag, 16);
        assert_eq!(
            components[0].component_splice_playback_position_us,
            Some(1_000_000)
        );
        assert_eq!(components[1].component_tag, 17);
        assert_eq!(components[1].component_splice_pts, None);
        assert_eq!(command.unique_program_id, 32);
        assert_eq!(command.avail_num, 1);
        assert_eq!(command.avails_expected, 2);
    }

    #[test]
    fn test_unknown_command_type_yields_empty_metadata() {
        let mut section = vec![0u8; 18];
        section[13] = 0x07;
        let metadata = SpliceInfoDecoder::new()
            .decode(&MetadataInputBuffer::new(section, 0, 0))
            .unwrap();
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_decode_fails_if_position_non_zero() {
        let mut buffer = MetadataInputBuffer::new(vec![1, 2, 3], 0, 0);
        buffer.position = 1;
        let err = SpliceInfoDecoder::new().decode(&buffer).unwrap_err();
        assert!(matches!(err, MediaParserError::Contract(_)));
    }

    #[test]
    fn test_decode_fails_if_buffer_has_no_array() {
        let mut buffer = MetadataInputBuffer::new(vec![1, 2, 3], 0, 0);
        buffer.data = None;
        let err = SpliceInfoDecoder::new().decode(&buffer).unwrap_err();
        assert!(matches!(err, MediaParserError::Contract(_)));
    }

    #[test]
    fn test_decode_fails_if_array_offset_non_zero() {
        let mut buffer = MetadataInputBuffer::new(vec![1, 2, 3], 0, 0);
        buffer.array_offset = 1;
        let err = SpliceInfoDecoder::new().decode(&buffer).unwrap_err();
        assert!(matches!(err, MediaParserError::Contract(_)));
    }

    #[test]
    fn test_truncated_section_is_malformed() {
        let buffer = MetadataInputBuffer::new(vec![0, 0x80, 0x14], 0, 0);
        let err = SpliceInfoDecoder::new().decode(&buffer).unwrap_err();
        assert!(matches!(err, MediaParserError::Malformed(_)));
    }
}
