//! Supported operation code catalog
//!
//! One [`OpcodeDescriptor`] per (opcode, service action) the target accepts,
//! in the order REPORT SUPPORTED OPERATION CODES enumerates them. Entries
//! that depend on device configuration carry an `enabled` predicate; entries
//! whose CDB usage bits depend on the device carry an `update_usage_bits`
//! patcher.

use crate::command::Command;
use crate::device::Device;
use crate::scsi::opcode::*;
use crate::scsi::service_action::*;
use crate::target::TPGS_EXPLICIT_ALUA;

/// Usage bits reported for the CONTROL byte
pub const SCSI_CONTROL_MASK: u8 = 0;
/// Usage bits reported for the GROUP NUMBER field
pub const SCSI_GROUP_NUMBER_MASK: u8 = 0;

/// SUPPORT field: supported in conformance with a SCSI standard
pub const SCSI_SUPPORT_FULL: u8 = 0x03;
/// SUPPORT field: not supported
pub const SCSI_SUPPORT_NOT_SUPPORTED: u8 = 0x01;

/// Decides whether a descriptor is currently supported for a command
pub type EnabledFn = fn(&OpcodeDescriptor, &Command<'_>) -> bool;

/// Adjusts a copy of the usage bits for the device
pub type UsageBitsFn = fn(&mut [u8], &Device);

/// A supported operation code
#[derive(Debug, Clone, Copy)]
pub struct OpcodeDescriptor {
    pub opcode: u8,
    /// Service action, `None` for opcodes without service actions
    pub service_action: Option<u16>,
    pub cdb_size: u16,
    /// CDB usage data, `cdb_size` bytes
    pub usage_bits: &'static [u8],
    pub enabled: Option<EnabledFn>,
    pub update_usage_bits: Option<UsageBitsFn>,
    pub specific_timeout: u8,
    pub nominal_timeout: u32,
    pub recommended_timeout: u32,
}

impl OpcodeDescriptor {
    const fn new(opcode: u8, cdb_size: u16, usage_bits: &'static [u8]) -> Self {
        OpcodeDescriptor {
            opcode,
            service_action: None,
            cdb_size,
            usage_bits,
            enabled: None,
            update_usage_bits: None,
            specific_timeout: 0,
            nominal_timeout: 0,
            recommended_timeout: 0,
        }
    }

    const fn sa(mut self, service_action: u16) -> Self {
        self.service_action = Some(service_action);
        self
    }

    const fn enabled_if(mut self, f: EnabledFn) -> Self {
        self.enabled = Some(f);
        self
    }

    const fn patch_usage(mut self, f: UsageBitsFn) -> Self {
        self.update_usage_bits = Some(f);
        self
    }

    /// Service action field is meaningful for this opcode
    pub fn sa_valid(&self) -> bool {
        self.service_action.is_some()
    }

    pub fn is_enabled(&self, cmd: &Command<'_>) -> bool {
        match self.enabled {
            Some(f) => f(self, cmd),
            None => true,
        }
    }

    /// Usage bits with device specific adjustments applied
    pub fn usage_bits_for(&self, dev: &Device) -> Vec<u8> {
        let mut bits = self.usage_bits.to_vec();
        if let Some(patch) = self.update_usage_bits {
            patch(&mut bits, dev);
        }
        bits
    }
}

fn set_dpofua_at(usage_bits: &mut [u8], idx: usize, dev: &Device) {
    if let Some(b) = usage_bits.get_mut(idx) {
        if dev.check_fua() {
            *b |= 0x18;
        } else {
            *b &= !0x18;
        }
    }
}

fn set_dpofua_usage_bits(usage_bits: &mut [u8], dev: &Device) {
    set_dpofua_at(usage_bits, 1, dev);
}

fn set_dpofua_usage_bits32(usage_bits: &mut [u8], dev: &Device) {
    set_dpofua_at(usage_bits, 10, dev);
}

fn is_ws_enabled(_: &OpcodeDescriptor, cmd: &Command<'_>) -> bool {
    let dev = cmd.device;
    (dev.attrib.emulate_tpws && dev.backend.execute_unmap) || dev.backend.execute_write_same
}

fn is_caw_enabled(_: &OpcodeDescriptor, cmd: &Command<'_>) -> bool {
    cmd.device.attrib.emulate_caw
}

fn is_rep_ref_enabled(_: &OpcodeDescriptor, cmd: &Command<'_>) -> bool {
    cmd.device.has_lba_map()
}

fn is_unmap_enabled(_: &OpcodeDescriptor, cmd: &Command<'_>) -> bool {
    cmd.device.backend.execute_unmap && cmd.device.attrib.emulate_tpu
}

fn is_pr_enabled(descr: &OpcodeDescriptor, cmd: &Command<'_>) -> bool {
    let dev = cmd.device;
    if !dev.attrib.emulate_pr {
        return false;
    }
    if !dev.backend.passthrough_pgr {
        return true;
    }

    // Backend reservation handlers have no access to ports or nexuses
    match (descr.opcode, descr.service_action) {
        (RESERVE | RESERVE_10 | RELEASE | RELEASE_10, _) => false,
        (PERSISTENT_RESERVE_OUT, Some(PRO_REGISTER_AND_MOVE | PRO_REPLACE_LOST_RESERVATION)) => false,
        (PERSISTENT_RESERVE_IN, Some(PRI_READ_FULL_STATUS)) => false,
        _ => true,
    }
}

fn is_3pc_enabled(_: &OpcodeDescriptor, cmd: &Command<'_>) -> bool {
    cmd.device.attrib.emulate_3pc
}

fn is_rsoc_enabled(_: &OpcodeDescriptor, cmd: &Command<'_>) -> bool {
    cmd.device.attrib.emulate_rsoc
}

fn is_set_tpg_enabled(_: &OpcodeDescriptor, cmd: &Command<'_>) -> bool {
    match cmd.lun.tg_pt_gp() {
        Some(gp) => gp.alua_access_type & TPGS_EXPLICIT_ALUA != 0,
        None => false,
    }
}

const CTL: u8 = SCSI_CONTROL_MASK;
const GRP: u8 = SCSI_GROUP_NUMBER_MASK;

const PRO_USAGE_TAIL: [u8; 7] = [0xff, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff];

const fn pro_usage(sa: u16) -> [u8; 10] {
    let t = PRO_USAGE_TAIL;
    [PERSISTENT_RESERVE_OUT, sa as u8, t[0], t[1], t[2], t[3], t[4], t[5], t[6], CTL]
}

const fn pri_usage(sa: u16) -> [u8; 10] {
    [PERSISTENT_RESERVE_IN, sa as u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, CTL]
}

const fn pro(sa: u16, usage_bits: &'static [u8]) -> OpcodeDescriptor {
    OpcodeDescriptor::new(PERSISTENT_RESERVE_OUT, 10, usage_bits)
        .sa(sa)
        .enabled_if(is_pr_enabled)
}

const fn pri(sa: u16, usage_bits: &'static [u8]) -> OpcodeDescriptor {
    OpcodeDescriptor::new(PERSISTENT_RESERVE_IN, 10, usage_bits).sa(sa)
}

const PRI_READ_KEYS_BITS: [u8; 10] = pri_usage(PRI_READ_KEYS);
const PRI_READ_RESERVATION_BITS: [u8; 10] = pri_usage(PRI_READ_RESERVATION);
const PRI_REPORT_CAPABILITIES_BITS: [u8; 10] = pri_usage(PRI_REPORT_CAPABILITIES);
const PRI_READ_FULL_STATUS_BITS: [u8; 10] = pri_usage(PRI_READ_FULL_STATUS);
const PRO_REGISTER_BITS: [u8; 10] = pro_usage(PRO_REGISTER);
const PRO_RESERVE_BITS: [u8; 10] = pro_usage(PRO_RESERVE);
const PRO_RELEASE_BITS: [u8; 10] = pro_usage(PRO_RELEASE);
const PRO_CLEAR_BITS: [u8; 10] = pro_usage(PRO_CLEAR);
const PRO_PREEMPT_BITS: [u8; 10] = pro_usage(PRO_PREEMPT);
const PRO_PREEMPT_AND_ABORT_BITS: [u8; 10] = pro_usage(PRO_PREEMPT_AND_ABORT);
const PRO_REG_IGN_EXIST_BITS: [u8; 10] = pro_usage(PRO_REGISTER_AND_IGNORE_EXISTING_KEY);
const PRO_REGISTER_AND_MOVE_BITS: [u8; 10] = pro_usage(PRO_REGISTER_AND_MOVE);

/// Every operation code the target reports as supported, in report order
pub static SUPPORTED_OPCODES: &[OpcodeDescriptor] = &[
    OpcodeDescriptor::new(READ_6, 6, &[READ_6, 0x1f, 0xff, 0xff, 0xff, CTL]),
    OpcodeDescriptor::new(
        READ_10,
        10,
        &[READ_10, 0xf8, 0xff, 0xff, 0xff, 0xff, GRP, 0xff, 0xff, CTL],
    )
    .patch_usage(set_dpofua_usage_bits),
    OpcodeDescriptor::new(
        READ_12,
        12,
        &[READ_12, 0xf8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, GRP, CTL],
    )
    .patch_usage(set_dpofua_usage_bits),
    OpcodeDescriptor::new(
        READ_16,
        16,
        &[
            READ_16, 0xf8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            GRP, CTL,
        ],
    )
    .patch_usage(set_dpofua_usage_bits),
    OpcodeDescriptor::new(WRITE_6, 6, &[WRITE_6, 0x1f, 0xff, 0xff, 0xff, CTL]),
    OpcodeDescriptor::new(
        WRITE_10,
        10,
        &[WRITE_10, 0xf8, 0xff, 0xff, 0xff, 0xff, GRP, 0xff, 0xff, CTL],
    )
    .patch_usage(set_dpofua_usage_bits),
    OpcodeDescriptor::new(
        WRITE_VERIFY,
        10,
        &[WRITE_VERIFY, 0xf0, 0xff, 0xff, 0xff, 0xff, GRP, 0xff, 0xff, CTL],
    )
    .patch_usage(set_dpofua_usage_bits),
    OpcodeDescriptor::new(
        WRITE_12,
        12,
        &[WRITE_12, 0xf8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, GRP, CTL],
    )
    .patch_usage(set_dpofua_usage_bits),
    OpcodeDescriptor::new(
        WRITE_16,
        16,
        &[
            WRITE_16, 0xf8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            GRP, CTL,
        ],
    )
    .patch_usage(set_dpofua_usage_bits),
    OpcodeDescriptor::new(
        WRITE_VERIFY_16,
        16,
        &[
            WRITE_VERIFY_16, 0xf0, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, GRP, CTL,
        ],
    )
    .patch_usage(set_dpofua_usage_bits),
    OpcodeDescriptor::new(
        VARIABLE_LENGTH_CMD,
        32,
        &[
            VARIABLE_LENGTH_CMD, CTL, 0x00, 0x00, 0x00, 0x00, GRP, 0x18,
            0x00, WRITE_SAME_32 as u8, 0xe8, 0x00, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff,
        ],
    )
    .sa(WRITE_SAME_32)
    .enabled_if(is_ws_enabled)
    .patch_usage(set_dpofua_usage_bits32),
    OpcodeDescriptor::new(
        COMPARE_AND_WRITE,
        16,
        &[
            COMPARE_AND_WRITE, 0x18, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00,
            0x00, 0xff, GRP, CTL,
        ],
    )
    .enabled_if(is_caw_enabled)
    .patch_usage(set_dpofua_usage_bits),
    OpcodeDescriptor::new(
        READ_CAPACITY,
        10,
        &[READ_CAPACITY, 0x00, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x01, CTL],
    ),
    OpcodeDescriptor::new(
        SERVICE_ACTION_IN_16,
        16,
        &[
            SERVICE_ACTION_IN_16, SAI_READ_CAPACITY_16 as u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x00, CTL,
        ],
    )
    .sa(SAI_READ_CAPACITY_16),
    OpcodeDescriptor::new(
        SERVICE_ACTION_IN_16,
        16,
        &[
            SERVICE_ACTION_IN_16, SAI_REPORT_REFERRALS as u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x00, CTL,
        ],
    )
    .sa(SAI_REPORT_REFERRALS)
    .enabled_if(is_rep_ref_enabled),
    OpcodeDescriptor::new(
        SYNCHRONIZE_CACHE,
        10,
        &[SYNCHRONIZE_CACHE, 0x02, 0xff, 0xff, 0xff, 0xff, GRP, 0xff, 0xff, CTL],
    ),
    OpcodeDescriptor::new(
        SYNCHRONIZE_CACHE_16,
        16,
        &[
            SYNCHRONIZE_CACHE_16, 0x02, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, GRP, CTL,
        ],
    ),
    OpcodeDescriptor::new(
        UNMAP,
        10,
        &[UNMAP, 0x00, 0x00, 0x00, 0x00, 0x00, GRP, 0xff, 0xff, CTL],
    )
    .enabled_if(is_unmap_enabled),
    OpcodeDescriptor::new(
        WRITE_SAME,
        10,
        &[WRITE_SAME, 0xe8, 0xff, 0xff, 0xff, 0xff, GRP, 0xff, 0xff, CTL],
    )
    .enabled_if(is_ws_enabled),
    OpcodeDescriptor::new(
        WRITE_SAME_16,
        16,
        &[
            WRITE_SAME_16, 0xe8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, GRP, CTL,
        ],
    )
    .enabled_if(is_ws_enabled),
    OpcodeDescriptor::new(
        VERIFY,
        10,
        &[VERIFY, 0x00, 0xff, 0xff, 0xff, 0xff, GRP, 0xff, 0xff, CTL],
    ),
    OpcodeDescriptor::new(
        VERIFY_16,
        16,
        &[
            VERIFY_16, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, GRP, CTL,
        ],
    ),
    OpcodeDescriptor::new(START_STOP, 6, &[START_STOP, 0x01, 0x00, 0x00, 0x01, CTL]),
    OpcodeDescriptor::new(MODE_SELECT, 6, &[MODE_SELECT, 0x10, 0x00, 0x00, 0xff, CTL]),
    OpcodeDescriptor::new(
        MODE_SELECT_10,
        10,
        &[MODE_SELECT_10, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, CTL],
    ),
    OpcodeDescriptor::new(MODE_SENSE, 6, &[MODE_SENSE, 0x08, 0xff, 0xff, 0xff, CTL]),
    OpcodeDescriptor::new(
        MODE_SENSE_10,
        10,
        &[MODE_SENSE_10, 0x18, 0xff, 0xff, 0x00, 0x00, 0x00, 0xff, 0xff, CTL],
    ),
    pri(PRI_READ_KEYS, &PRI_READ_KEYS_BITS),
    pri(PRI_READ_RESERVATION, &PRI_READ_RESERVATION_BITS),
    pri(PRI_REPORT_CAPABILITIES, &PRI_REPORT_CAPABILITIES_BITS).enabled_if(is_pr_enabled),
    pri(PRI_READ_FULL_STATUS, &PRI_READ_FULL_STATUS_BITS).enabled_if(is_pr_enabled),
    pro(PRO_REGISTER, &PRO_REGISTER_BITS),
    pro(PRO_RESERVE, &PRO_RESERVE_BITS),
    pro(PRO_RELEASE, &PRO_RELEASE_BITS),
    pro(PRO_CLEAR, &PRO_CLEAR_BITS),
    pro(PRO_PREEMPT, &PRO_PREEMPT_BITS),
    pro(PRO_PREEMPT_AND_ABORT, &PRO_PREEMPT_AND_ABORT_BITS),
    pro(PRO_REGISTER_AND_IGNORE_EXISTING_KEY, &PRO_REG_IGN_EXIST_BITS),
    pro(PRO_REGISTER_AND_MOVE, &PRO_REGISTER_AND_MOVE_BITS),
    OpcodeDescriptor::new(RELEASE, 6, &[RELEASE, 0x00, 0x00, 0x00, 0x00, CTL])
        .enabled_if(is_pr_enabled),
    OpcodeDescriptor::new(
        RELEASE_10,
        10,
        &[RELEASE_10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, CTL],
    )
    .enabled_if(is_pr_enabled),
    OpcodeDescriptor::new(RESERVE, 6, &[RESERVE, 0x00, 0x00, 0x00, 0x00, CTL])
        .enabled_if(is_pr_enabled),
    OpcodeDescriptor::new(
        RESERVE_10,
        10,
        &[RESERVE_10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, CTL],
    )
    .enabled_if(is_pr_enabled),
    OpcodeDescriptor::new(REQUEST_SENSE, 6, &[REQUEST_SENSE, 0x00, 0x00, 0x00, 0xff, CTL]),
    OpcodeDescriptor::new(INQUIRY, 6, &[INQUIRY, 0x01, 0xff, 0xff, 0xff, CTL]),
    OpcodeDescriptor::new(
        EXTENDED_COPY,
        16,
        &[
            EXTENDED_COPY, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff,
            0xff, 0xff, 0x00, CTL,
        ],
    )
    .sa(XCOPY_LID1)
    .enabled_if(is_3pc_enabled),
    OpcodeDescriptor::new(
        RECEIVE_COPY_RESULTS,
        16,
        &[
            RECEIVE_COPY_RESULTS, RCR_SA_OPERATING_PARAMETERS as u8, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x00, CTL,
        ],
    )
    .sa(RCR_SA_OPERATING_PARAMETERS)
    .enabled_if(is_3pc_enabled),
    OpcodeDescriptor::new(
        REPORT_LUNS,
        12,
        &[REPORT_LUNS, 0x00, 0xff, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0x00, CTL],
    ),
    OpcodeDescriptor::new(
        TEST_UNIT_READY,
        6,
        &[TEST_UNIT_READY, 0x00, 0x00, 0x00, 0x00, CTL],
    ),
    OpcodeDescriptor::new(
        MAINTENANCE_IN,
        12,
        &[
            MAINTENANCE_IN, 0xE0 | MI_REPORT_TARGET_PGS as u8, 0x00, 0x00, 0x00, 0x00, 0xff,
            0xff, 0xff, 0xff, 0x00, CTL,
        ],
    )
    .sa(MI_REPORT_TARGET_PGS),
    OpcodeDescriptor::new(
        MAINTENANCE_IN,
        12,
        &[
            MAINTENANCE_IN, MI_REPORT_SUPPORTED_OPERATION_CODES as u8, 0x87, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0x00, CTL,
        ],
    )
    .sa(MI_REPORT_SUPPORTED_OPERATION_CODES)
    .enabled_if(is_rsoc_enabled),
    OpcodeDescriptor::new(
        MAINTENANCE_OUT,
        12,
        &[
            MAINTENANCE_OUT, MO_SET_TARGET_PGS as u8, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff,
            0xff, 0x00, CTL,
        ],
    )
    .sa(MO_SET_TARGET_PGS)
    .enabled_if(is_set_tpg_enabled),
];

/// Find the descriptor for an exact (opcode, service action) pair
pub fn lookup(opcode: u8, service_action: Option<u16>) -> Option<&'static OpcodeDescriptor> {
    SUPPORTED_OPCODES
        .iter()
        .find(|d| d.opcode == opcode && d.service_action == service_action)
}
