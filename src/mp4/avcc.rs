//! A module for parsing AVCConfigurationBox (avcC) data.
//! Parses SPS and PPS NAL units for H.264 streams in AVCC format.

use crate::bits::ByteCursor;
use crate::errors::{MediaParserError, MediaParserResult};

const NAL_START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Represents the parsed AVCDecoderConfigurationRecord (avcC) configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AvccConfig {
    /// configurationVersion
    pub configuration_version: u8,
    /// AVCProfileIndication
    pub profile: u8,
    /// profileCompatibility
    pub compatibility: u8,
    /// AVCLevelIndication
    pub level: u8,
    /// lengthSizeMinusOne
    pub length_size_minus_one: u8,
    /// Sequence Parameter Sets
    pub sps: Vec<Vec<u8>>,
    /// Picture Parameter Sets
    pub pps: Vec<Vec<u8>>,
}

impl AvccConfig {
    /// Parse AVCDecoderConfigurationRecord as defined in ISO/IEC 14496-15.
    ///
    /// data: full contents of the avcC box (excluding header).
    pub fn parse(data: &[u8]) -> MediaParserResult<Self> {
        let mut cursor = ByteCursor::new(data);
        let configuration_version = cursor.read_u8()?;
        let profile = cursor.read_u8()?;
        let compatibility = cursor.read_u8()?;
        let level = cursor.read_u8()?;
        // lengthSizeMinusOne: 6 bits reserved + 2 bits
        let length_size_minus_one = cursor.read_u8()? & 0x03;
        if length_size_minus_one == 2 {
            return Err(MediaParserError::malformed(
                "avcC NAL length size of 3 bytes is not allowed",
            ));
        }
        // numOfSequenceParameterSets: 3 bits reserved + 5 bits count
        let num_sps = cursor.read_u8()? & 0x1F;
        let sps = read_parameter_sets(&mut cursor, num_sps)?;
        let num_pps = cursor.read_u8()?;
        let pps = read_parameter_sets(&mut cursor, num_pps)?;
        Ok(AvccConfig {
            configuration_version,
            profile,
            compatibility,
            level,
            length_size_minus_one,
            sps,
            pps,
        })
    }

    /// RFC 6381 codecs string, e.g. `avc1.64001F`.
    pub fn codecs_string(&self, sample_entry: &str) -> String {
        format!(
            "{}.{:02X}{:02X}{:02X}",
            sample_entry, self.profile, self.compatibility, self.level
        )
    }

    /// SPS then PPS NAL units, each prefixed with an Annex B start code.
    pub fn initialization_data(&self) -> Vec<Vec<u8>> {
        self.sps
            .iter()
            .chain(self.pps.iter())
            .map(|nal| [&NAL_START_CODE[..], nal.as_slice()].concat())
            .collect()
    }

    pub fn nal_length_size(&self) -> usize {
        usize::from(self.length_size_minus_one) + 1
    }

    /// Check if configuration is valid
    pub fn is_valid(&self) -> bool {
        !self.sps.is_empty() && !self.pps.is_empty()
    }
}

fn read_parameter_sets(cursor: &mut ByteCursor, count: u8) -> MediaParserResult<Vec<Vec<u8>>> {
    let mut sets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = cursor.read_u16()? as usize;
        sets.push(cursor.read_bytes(len)?.to_vec());
    }
    Ok(sets)
}
