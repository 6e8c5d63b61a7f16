//! SCSI protocol constants, sense data and command responses
//!
//! Values follow SPC-4 and SBC-3. Opcodes are kept as plain constants
//! rather than an enum because the same byte can mean different things
//! depending on the device type (MAINTENANCE IN is SEND KEY on a CD/DVD).

/// SCSI operation codes
pub mod opcode {
    pub const TEST_UNIT_READY: u8 = 0x00;
    pub const REQUEST_SENSE: u8 = 0x03;
    pub const READ_6: u8 = 0x08;
    pub const WRITE_6: u8 = 0x0A;
    pub const INQUIRY: u8 = 0x12;
    pub const MODE_SELECT: u8 = 0x15;
    pub const RESERVE: u8 = 0x16;
    pub const RELEASE: u8 = 0x17;
    pub const MODE_SENSE: u8 = 0x1A;
    pub const START_STOP: u8 = 0x1B;
    pub const RECEIVE_DIAGNOSTIC: u8 = 0x1C;
    pub const SEND_DIAGNOSTIC: u8 = 0x1D;
    pub const READ_CAPACITY: u8 = 0x25;
    pub const READ_10: u8 = 0x28;
    pub const WRITE_10: u8 = 0x2A;
    pub const WRITE_VERIFY: u8 = 0x2E;
    pub const VERIFY: u8 = 0x2F;
    pub const SYNCHRONIZE_CACHE: u8 = 0x35;
    pub const WRITE_BUFFER: u8 = 0x3B;
    pub const WRITE_SAME: u8 = 0x41;
    pub const UNMAP: u8 = 0x42;
    pub const LOG_SELECT: u8 = 0x4C;
    pub const LOG_SENSE: u8 = 0x4D;
    pub const MODE_SELECT_10: u8 = 0x55;
    pub const RESERVE_10: u8 = 0x56;
    pub const RELEASE_10: u8 = 0x57;
    pub const MODE_SENSE_10: u8 = 0x5A;
    pub const PERSISTENT_RESERVE_IN: u8 = 0x5E;
    pub const PERSISTENT_RESERVE_OUT: u8 = 0x5F;
    pub const VARIABLE_LENGTH_CMD: u8 = 0x7F;
    pub const EXTENDED_COPY: u8 = 0x83;
    pub const RECEIVE_COPY_RESULTS: u8 = 0x84;
    pub const READ_16: u8 = 0x88;
    pub const COMPARE_AND_WRITE: u8 = 0x89;
    pub const WRITE_16: u8 = 0x8A;
    pub const READ_ATTRIBUTE: u8 = 0x8C;
    pub const WRITE_ATTRIBUTE: u8 = 0x8D;
    pub const WRITE_VERIFY_16: u8 = 0x8E;
    pub const VERIFY_16: u8 = 0x8F;
    pub const SYNCHRONIZE_CACHE_16: u8 = 0x91;
    pub const WRITE_SAME_16: u8 = 0x93;
    pub const SERVICE_ACTION_IN_16: u8 = 0x9E;
    pub const REPORT_LUNS: u8 = 0xA0;
    pub const SECURITY_PROTOCOL_IN: u8 = 0xA2;
    pub const MAINTENANCE_IN: u8 = 0xA3;
    pub const MAINTENANCE_OUT: u8 = 0xA4;
    pub const READ_12: u8 = 0xA8;
    pub const WRITE_12: u8 = 0xAA;
    pub const SECURITY_PROTOCOL_OUT: u8 = 0xB5;
}

/// Service actions for two-byte opcodes
pub mod service_action {
    // VARIABLE LENGTH (0x7F), carried in CDB bytes 8-9
    pub const WRITE_SAME_32: u16 = 0x000D;

    // SERVICE ACTION IN (16)
    pub const SAI_READ_CAPACITY_16: u16 = 0x10;
    pub const SAI_REPORT_REFERRALS: u16 = 0x13;

    // PERSISTENT RESERVE IN
    pub const PRI_READ_KEYS: u16 = 0x00;
    pub const PRI_READ_RESERVATION: u16 = 0x01;
    pub const PRI_REPORT_CAPABILITIES: u16 = 0x02;
    pub const PRI_READ_FULL_STATUS: u16 = 0x03;

    // PERSISTENT RESERVE OUT
    pub const PRO_REGISTER: u16 = 0x00;
    pub const PRO_RESERVE: u16 = 0x01;
    pub const PRO_RELEASE: u16 = 0x02;
    pub const PRO_CLEAR: u16 = 0x03;
    pub const PRO_PREEMPT: u16 = 0x04;
    pub const PRO_PREEMPT_AND_ABORT: u16 = 0x05;
    pub const PRO_REGISTER_AND_IGNORE_EXISTING_KEY: u16 = 0x06;
    pub const PRO_REGISTER_AND_MOVE: u16 = 0x07;
    pub const PRO_REPLACE_LOST_RESERVATION: u16 = 0x08;

    // EXTENDED COPY / RECEIVE COPY RESULTS
    pub const XCOPY_LID1: u16 = 0x00;
    pub const RCR_SA_OPERATING_PARAMETERS: u16 = 0x03;

    // MAINTENANCE IN / OUT
    pub const MI_REPORT_TARGET_PGS: u16 = 0x0A;
    pub const MI_REPORT_SUPPORTED_OPERATION_CODES: u16 = 0x0C;
    pub const MO_SET_TARGET_PGS: u16 = 0x0A;
}

/// SCSI status codes
pub mod scsi_status {
    pub const GOOD: u8 = 0x00;
    pub const CHECK_CONDITION: u8 = 0x02;
}

/// SCSI sense key codes
pub mod sense_key {
    pub const NO_SENSE: u8 = 0x00;
    pub const RECOVERED_ERROR: u8 = 0x01;
    pub const NOT_READY: u8 = 0x02;
    pub const MEDIUM_ERROR: u8 = 0x03;
    pub const HARDWARE_ERROR: u8 = 0x04;
    pub const ILLEGAL_REQUEST: u8 = 0x05;
    pub const UNIT_ATTENTION: u8 = 0x06;
    pub const DATA_PROTECT: u8 = 0x07;
    pub const ABORTED_COMMAND: u8 = 0x0B;
    pub const MISCOMPARE: u8 = 0x0E;
}

/// Additional Sense Code (ASC) values
pub mod asc {
    pub const NO_ADDITIONAL_SENSE: u8 = 0x00;
    pub const LOGICAL_UNIT_COMMUNICATION_FAILURE: u8 = 0x08;
    pub const PARAMETER_LIST_LENGTH_ERROR: u8 = 0x1A;
    pub const INVALID_COMMAND_OPERATION_CODE: u8 = 0x20;
    pub const INVALID_FIELD_IN_CDB: u8 = 0x24;
    pub const INVALID_FIELD_IN_PARAMETER_LIST: u8 = 0x26;
    pub const POWER_ON_RESET: u8 = 0x29;
    pub const PARAMETERS_CHANGED: u8 = 0x2A;
    pub const REPORTED_LUNS_DATA_HAS_CHANGED: u8 = 0x3F;
}

/// SCSI transport protocol identifiers (SPC-4 table 362)
pub mod protocol_id {
    pub const FCP: u8 = 0x0;
    pub const SPI: u8 = 0x1;
    pub const SSA: u8 = 0x2;
    pub const SBP: u8 = 0x3;
    pub const SRP: u8 = 0x4;
    pub const ISCSI: u8 = 0x5;
    pub const SAS: u8 = 0x6;
    pub const ADT: u8 = 0x7;
    pub const ATA: u8 = 0x8;
    pub const UNSPEC: u8 = 0xF;
}

/// VERSION DESCRIPTOR codes reported in standard INQUIRY data
pub mod version_descriptor {
    pub const SAM5: u16 = 0x00A0;
    pub const SPC4: u16 = 0x0460;
    pub const SBC3: u16 = 0x04C0;
    pub const SBP3: u16 = 0x04EA;
    pub const SRP: u16 = 0x0940;
    pub const ISCSI: u16 = 0x0960;
    pub const FCP4: u16 = 0x0A40;
    pub const SAS3: u16 = 0x0C60;
}

/// Length of fixed format sense data
pub const FIXED_SENSE_LEN: usize = 18;

/// Length of descriptor format sense data without descriptors
pub const DESC_SENSE_LEN: usize = 8;

/// SCSI sense data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseData {
    pub sense_key: u8,
    pub asc: u8,        // Additional Sense Code
    pub ascq: u8,       // Additional Sense Code Qualifier
}

impl SenseData {
    pub fn new(sense_key: u8, asc: u8, ascq: u8) -> Self {
        SenseData {
            sense_key,
            asc,
            ascq,
        }
    }

    /// NO SENSE, used by REQUEST SENSE when nothing is pending
    pub fn no_sense() -> Self {
        SenseData::new(sense_key::NO_SENSE, asc::NO_ADDITIONAL_SENSE, 0)
    }

    /// Serialize to fixed format sense data (18 bytes)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; FIXED_SENSE_LEN];

        // Response code: 0x70 = current error, fixed format
        data[0] = 0x70;

        // Sense key
        data[2] = self.sense_key & 0x0F;

        // Additional sense length
        data[7] = (FIXED_SENSE_LEN - 8) as u8;

        // ASC and ASCQ
        data[12] = self.asc;
        data[13] = self.ascq;

        data
    }

    /// Serialize to descriptor format sense data (8 bytes, no descriptors)
    pub fn to_desc_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; DESC_SENSE_LEN];

        // Response code: 0x72 = current error, descriptor format
        data[0] = 0x72;
        data[1] = self.sense_key & 0x0F;
        data[2] = self.asc;
        data[3] = self.ascq;
        // data[7] additional sense length stays 0

        data
    }

    /// Serialize in the requested format
    pub fn encode(&self, desc_format: bool) -> Vec<u8> {
        if desc_format {
            self.to_desc_bytes()
        } else {
            self.to_bytes()
        }
    }
}

/// Result of an emulated SCSI command
#[derive(Debug, Clone)]
pub struct ScsiResponse {
    /// SCSI status code
    pub status: u8,
    /// Bytes copied into the command's data buffer
    pub data: Vec<u8>,
    /// Length the command reports as transferred. May exceed `data.len()`
    /// when the allocation length truncated the response.
    pub transfer_length: u32,
    /// Sense data (for CHECK CONDITION status)
    pub sense: Option<SenseData>,
}

impl ScsiResponse {
    /// Create a GOOD status response with data
    pub fn good(data: Vec<u8>, transfer_length: u32) -> Self {
        ScsiResponse {
            status: scsi_status::GOOD,
            data,
            transfer_length,
            sense: None,
        }
    }

    /// Create a GOOD status response without data
    pub fn good_no_data() -> Self {
        ScsiResponse {
            status: scsi_status::GOOD,
            data: Vec::new(),
            transfer_length: 0,
            sense: None,
        }
    }

    /// Create a CHECK CONDITION response with sense data
    pub fn check_condition(sense: SenseData) -> Self {
        ScsiResponse {
            status: scsi_status::CHECK_CONDITION,
            data: Vec::new(),
            transfer_length: 0,
            sense: Some(sense),
        }
    }

    pub fn is_good(&self) -> bool {
        self.status == scsi_status::GOOD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sense_data_serialization() {
        let sense = SenseData::new(sense_key::ILLEGAL_REQUEST, asc::INVALID_FIELD_IN_CDB, 0);
        let data = sense.to_bytes();
        assert_eq!(data.len(), 18);
        assert_eq!(data[0], 0x70); // Current error, fixed format
        assert_eq!(data[2], sense_key::ILLEGAL_REQUEST);
        assert_eq!(data[7], 10);
        assert_eq!(data[12], asc::INVALID_FIELD_IN_CDB);
    }

    #[test]
    fn test_sense_data_information_field_is_zero() {
        let data = SenseData::new(sense_key::UNIT_ATTENTION, asc::POWER_ON_RESET, 0).to_bytes();
        assert_eq!(&data[3..7], &[0, 0, 0, 0]);
        assert_eq!(&data[8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_descriptor_sense_format() {
        let sense = SenseData::new(sense_key::UNIT_ATTENTION, asc::POWER_ON_RESET, 0x02);
        let data = sense.encode(true);
        assert_eq!(data, vec![0x72, 0x06, 0x29, 0x02, 0, 0, 0, 0]);
        assert_eq!(sense.encode(false).len(), FIXED_SENSE_LEN);
    }

    #[test]
    fn test_response_constructors() {
        let response = ScsiResponse::good(vec![1, 2, 3], 40);
        assert!(response.is_good());
        assert_eq!(response.transfer_length, 40);

        let response = ScsiResponse::check_condition(SenseData::no_sense());
        assert_eq!(response.status, scsi_status::CHECK_CONDITION);
        assert!(response.data.is_empty());
    }
}
