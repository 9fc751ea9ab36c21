/*
# SCTE-35 Module

 Decoding of `splice_info_section` payloads carried as timed metadata. Every decoded PTS is
 unwrapped against the session's running clock before it is exposed in microseconds.
*/

pub mod commands;
pub mod decoder;

pub use commands::{
    ComponentSplice, PrivateCommand, ScheduledComponentSplice, ScheduledSpliceEvent,
    SpliceCommand, SpliceInsertCommand, SpliceScheduleCommand, TimeSignalCommand,
};
pub use decoder::{MetadataInputBuffer, SpliceInfoDecoder};
