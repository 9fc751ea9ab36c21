use crate::bits::ByteCursor;
use crate::errors::MediaParserResult;
use crate::timestamp_adjuster::TimestampAdjuster;
use serde::Serialize;

pub const TYPE_SPLICE_NULL: u32 = 0x00;
pub const TYPE_SPLICE_SCHEDULE: u32 = 0x04;
pub const TYPE_SPLICE_INSERT: u32 = 0x05;
pub const TYPE_TIME_SIGNAL: u32 = 0x06;
pub const TYPE_PRIVATE_COMMAND: u32 = 0xFF;

const PTS_MASK: u64 = 0x1_FFFF_FFFF;

/// Decoded `splice_command()`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command")]
pub enum SpliceCommand {
    Null,
    Schedule(SpliceScheduleCommand),
    Insert(SpliceInsertCommand),
    TimeSignal(TimeSignalCommand),
    Private(PrivateCommand),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSignalCommand {
    /// Raw `pts_time` plus `pts_adjustment`, modulo 2^33.
    pub pts_time: Option<u64>,
    pub playback_position_us: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSplice {
    pub component_tag: u8,
    pub component_splice_pts: Option<u64>,
    pub component_splice_playback_position_us: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpliceInsertCommand {
    pub splice_event_id: u32,
    pub splice_event_cancel_indicator: bool,
    pub out_of_network_indicator: bool,
    pub program_splice_flag: bool,
    pub splice_immediate_flag: bool,
    pub program_splice_pts: Option<u64>,
    pub program_splice_playback_position_us: Option<i64>,
    pub component_splice_list: Vec<ComponentSplice>,
    pub auto_return: bool,
    pub break_duration_us: Option<i64>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledComponentSplice {
    pub component_tag: u8,
    pub utc_splice_time: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledSpliceEvent {
    pub splice_event_id: u32,
    pub splice_event_cancel_indicator: bool,
    pub out_of_network_indicator: bool,
    pub program_splice_flag: bool,
    pub utc_splice_time: Option<u32>,
    pub component_splice_list: Vec<ScheduledComponentSplice>,
    pub auto_return: bool,
    pub break_duration_us: Option<i64>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpliceScheduleCommand {
    pub events: Vec<ScheduledSpliceEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrivateCommand {
    pub pts_adjustment: u64,
    pub identifier: u32,
    pub command_bytes: Vec<u8>,
}

/// `splice_time()`: the adjusted PTS when `time_specified_flag` is set.
pub(crate) fn parse_splice_time(
    data: &mut ByteCursor,
    pts_adjustment: u64,
) -> MediaParserResult<Option<u64>> {
    let first = data.read_u8()?;
    if first & 0x80 == 0 {
        return Ok(None);
    }
    let pts = ((u64::from(first & 0x01) << 32) | u64::from(data.read_u32()?)) + pts_adjustment;
    Ok(Some(pts & PTS_MASK))
}

/// `break_duration()`: auto-return flag and duration in microseconds.
fn parse_break_duration(data: &mut ByteCursor) -> MediaParserResult<(bool, i64)> {
    let first = data.read_u8()?;
    let auto_return = first & 0x80 != 0;
    let duration_90khz = (u64::from(first & 0x01) << 32) | u64::from(data.read_u32()?);
    Ok((auto_return, (duration_90khz * 1000 / 90) as i64))
}

fn adjust(adjuster: &mut TimestampAdjuster, pts: Option<u64>) -> Option<i64> {
    pts.map(|pts| adjuster.adjust_ts_timestamp(pts as i64))
}

impl TimeSignalCommand {
    pub(crate) fn parse(
        data: &mut ByteCursor,
        pts_adjustment: u64,
        adjuster: &mut TimestampAdjuster,
    ) -> MediaParserResult<Self> {
        let pts_time = parse_splice_time(data, pts_adjustment)?;
        Ok(Self {
            pts_time,
            playback_position_us: adjust(adjuster, pts_time),
        })
    }
}

impl SpliceInsertCommand {
    pub(crate) fn parse(
        data: &mut ByteCursor,
        pts_adjustment: u64,
        adjuster: &mut TimestampAdjuster,
    ) -> MediaParserResult<Self> {
        let splice_event_id = data.read_u32()?;
        let splice_event_cancel_indicator = data.read_u8()? & 0x80 != 0;
        let mut command = Self {
            splice_event_id,
            splice_event_cancel_indicator,
            out_of_network_indicator: false,
            program_splice_flag: false,
            splice_immediate_flag: false,
            program_splice_pts: None,
            program_splice_playback_position_us: None,
            component_splice_list: Vec::new(),
            auto_return: false,
            break_duration_us: None,
            unique_program_id: 0,
            avail_num: 0,
            avails_expected: 0,
        };
        if !splice_event_cancel_indicator {
            let header = data.read_u8()?;
            command.out_of_network_indicator = header & 0x80 != 0;
            command.program_splice_flag = header & 0x40 != 0;
            let duration_flag = header & 0x20 != 0;
            command.splice_immediate_flag = header & 0x10 != 0;
            if command.program_splice_flag && !command.splice_immediate_flag {
                command.program_splice_pts = parse_splice_time(data, pts_adjustment)?;
            }
            if !command.program_splice_flag {
                let component_count = data.read_u8()?;
                for _ in 0..component_count {
                    let component_tag = data.read_u8()?;
                    let pts = if command.splice_immediate_flag {
                        None
                    } else {
                        parse_splice_time(data, pts_adjustment)?
                    };
                    command.component_splice_list.push(ComponentSplice {
                        component_tag,
                        component_splice_pts: pts,
                        component_splice_playback_position_us: adjust(adjuster, pts),
                    });
                }
            }
            if duration_flag {
                let (auto_return, duration_us) = parse_break_duration(data)?;
                command.auto_return = auto_return;
                command.break_duration_us = Some(duration_us);
            }
            command.unique_program_id = data.read_u16()?;
            command.avail_num = data.read_u8()?;
            command.avails_expected = data.read_u8()?;
        }
        command.program_splice_playback_position_us =
            adjust(adjuster, command.program_splice_pts);
        Ok(command)
    }
}

impl ScheduledSpliceEvent {
    fn parse(data: &mut ByteCursor) -> MediaParserResult<Self> {
        let splice_event_id = data.read_u32()?;
        let splice_event_cancel_indicator = data.read_u8()? & 0x80 != 0;
        let mut event = Self {
            splice_event_id,
            splice_event_cancel_indicator,
            out_of_network_indicator: false,
            program_splice_flag: false,
            utc_splice_time: None,
            component_splice_list: Vec::new(),
            auto_return: false,
            break_duration_us: None,
            unique_program_id: 0,
            avail_num: 0,
            avails_expected: 0,
        };
        if !splice_event_cancel_indicator {
            let header = data.read_u8()?;
            event.out_of_network_indicator = header & 0x80 != 0;
            event.program_splice_flag = header & 0x40 != 0;
            let duration_flag = header & 0x20 != 0;
            if event.program_splice_flag {
                event.utc_splice_time = Some(data.read_u32()?);
            } else {
                let component_count = data.read_u8()?;
                for _ in 0..component_count {
                    let component_tag = data.read_u8()?;
                    let utc_splice_time = data.read_u32()?;
                    event.component_splice_list.push(ScheduledComponentSplice {
                        component_tag,
                        utc_splice_time,
                    });
                }
            }
            if duration_flag {
                let (auto_return, duration_us) = parse_break_duration(data)?;
                event.auto_return = auto_return;
                event.break_duration_us = Some(duration_us);
            }
            event.unique_program_id = data.read_u16()?;
            event.avail_num = data.read_u8()?;
            event.avails_expected = data.read_u8()?;
        }
        Ok(event)
    }
}

impl SpliceScheduleCommand {
    pub(crate) fn parse(data: &mut ByteCursor) -> MediaParserResult<Self> {
        let splice_count = data.read_u8()?;
        let mut events = Vec::with_capacity(splice_count as usize);
        for _ in 0..splice_count {
            events.push(ScheduledSpliceEvent::parse(data)?);
        }
        Ok(Self { events })
    }
}

impl PrivateCommand {
    pub(crate) fn parse(
        data: &mut ByteCursor,
        command_length: usize,
        pts_adjustment: u64,
    ) -> MediaParserResult<Self> {
        let identifier = data.read_u32()?;
        let command_bytes = data.read_bytes(command_length.saturating_sub(4))?.to_vec();
        Ok(Self {
            pts_adjustment,
            identifier,
            command_bytes,
        })
    }
}
