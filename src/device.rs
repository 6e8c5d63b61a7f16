//! Device model consumed by the emulators
//!
//! A [`Device`] carries the attributes the emulators read while building
//! responses: T10 identity strings, block geometry, `emulate_*` feature
//! switches and the capabilities of the backend behind the device. The
//! attributes are fixed once the device is built. The ALUA logical unit
//! group and the referral map are owned by other subsystems and can change
//! at runtime, so they sit behind locks and are read through snapshot
//! accessors.

use crate::error::{SpcError, SpcResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};

/// Maximum INQUIRY vendor identification length
pub const INQUIRY_VENDOR_LEN: usize = 8;
/// Maximum INQUIRY product identification length
pub const INQUIRY_MODEL_LEN: usize = 16;
/// Maximum INQUIRY product revision length
pub const INQUIRY_REVISION_LEN: usize = 4;
/// Maximum unit serial number length (VPD 0x80)
pub const INQUIRY_VPD_SERIAL_LEN: usize = 254;

/// IEEE company id used for NAA designators unless overridden
pub const DEFAULT_COMPANY_ID: u32 = 0x001405;

/// Peripheral device type (SPC-4 table 133)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// Direct access block device (SBC)
    #[default]
    Disk = 0x00,
    /// Sequential access device (SSC)
    Tape = 0x01,
    Processor = 0x03,
    Worm = 0x04,
    /// CD/DVD device (MMC)
    Rom = 0x05,
    MediumChanger = 0x08,
    Enclosure = 0x0D,
}

impl DeviceType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// T10-PI protection type configured on the device or session
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtectionType {
    #[default]
    None = 0,
    Type1 = 1,
    Type2 = 2,
    Type3 = 3,
}

impl ProtectionType {
    pub fn is_enabled(self) -> bool {
        self != ProtectionType::None
    }
}

/// UA_INTLCK_CTRL setting reported in the control mode page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UaInterlock {
    /// Clear unit attentions reported with CHECK CONDITION
    #[default]
    Clear,
    /// Keep unit attentions, without establishing new ones
    NoClear,
    /// Keep unit attentions and establish one on BUSY status
    EstablishUa,
}

/// T10 identity strings of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct T10Wwn {
    pub vendor: String,
    pub model: String,
    pub revision: String,
    /// Unit serial number, `None` until one has been configured
    pub unit_serial: Option<String>,
    /// IEEE company id packed into the NAA designator
    pub company_id: u32,
}

impl Default for T10Wwn {
    fn default() -> Self {
        T10Wwn {
            vendor: "SPCEMU".to_string(),
            model: "Virtual Disk".to_string(),
            revision: "1.0".to_string(),
            unit_serial: None,
            company_id: DEFAULT_COMPANY_ID,
        }
    }
}

/// Device attributes
///
/// Defaults match a freshly created backstore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAttributes {
    /// Logical block size exposed to initiators
    pub block_size: u32,
    /// Block size of the backing hardware
    pub hw_block_size: u32,
    /// Largest backend I/O in `hw_block_size` units
    pub hw_max_sectors: u32,
    /// Optimal transfer length in logical blocks
    pub optimal_sectors: u32,
    pub emulate_write_cache: bool,
    pub emulate_fua_write: bool,
    /// Thin provisioning UNMAP
    pub emulate_tpu: bool,
    /// Thin provisioning WRITE SAME with UNMAP
    pub emulate_tpws: bool,
    /// COMPARE AND WRITE
    pub emulate_caw: bool,
    /// Third party copy (EXTENDED COPY)
    pub emulate_3pc: bool,
    /// Persistent and SPC-2 reservations
    pub emulate_pr: bool,
    /// REPORT SUPPORTED OPERATION CODES
    pub emulate_rsoc: bool,
    /// Restricted reordering of SIMPLE commands
    pub emulate_rest_reord: bool,
    /// Task aborted status
    pub emulate_tas: bool,
    pub emulate_ua_intlck_ctrl: UaInterlock,
    pub is_nonrot: bool,
    pub pi_prot_type: ProtectionType,
    pub unmap_zeroes_data: bool,
    pub max_unmap_lba_count: u32,
    pub max_unmap_block_desc_count: u32,
    pub unmap_granularity: u32,
    pub unmap_granularity_alignment: u32,
    pub max_write_same_len: u64,
}

impl Default for DeviceAttributes {
    fn default() -> Self {
        DeviceAttributes {
            block_size: 512,
            hw_block_size: 512,
            hw_max_sectors: 8192,
            optimal_sectors: 8192,
            emulate_write_cache: false,
            emulate_fua_write: true,
            emulate_tpu: false,
            emulate_tpws: false,
            emulate_caw: true,
            emulate_3pc: true,
            emulate_pr: true,
            emulate_rsoc: true,
            emulate_rest_reord: false,
            emulate_tas: true,
            emulate_ua_intlck_ctrl: UaInterlock::Clear,
            is_nonrot: false,
            pi_prot_type: ProtectionType::None,
            unmap_zeroes_data: false,
            max_unmap_lba_count: 0,
            max_unmap_block_desc_count: 0,
            unmap_granularity: 0,
            unmap_granularity_alignment: 0,
            max_write_same_len: 0,
        }
    }
}

/// What the backend behind the device can do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendCaps {
    /// Backend implements UNMAP
    pub execute_unmap: bool,
    /// Backend implements WRITE SAME
    pub execute_write_same: bool,
    /// Write cache state reported by the backend, overrides `emulate_write_cache`
    pub write_cache: Option<bool>,
    /// Minimum I/O size in bytes, 0 if unknown
    pub io_min: u32,
    /// Optimal I/O size in bytes, 0 if unknown
    pub io_opt: u32,
    /// Reservations are handled by the backend (pass-through PGR)
    pub passthrough_pgr: bool,
}

/// ALUA logical unit group membership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LuGroup {
    pub id: u16,
}

/// One entry of the ALUA LBA referral map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbaMapEntry {
    pub first_lba: u64,
    pub last_lba: u64,
}

/// ALUA LBA referral map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LbaMap {
    pub segment_size: u32,
    pub segment_multiplier: u32,
    pub entries: Vec<LbaMapEntry>,
}

/// A SCSI device exported through one or more LUNs
#[derive(Debug)]
pub struct Device {
    dev_type: DeviceType,
    /// Capacity in logical blocks
    capacity: u64,
    pub attrib: DeviceAttributes,
    pub wwn: T10Wwn,
    pub backend: BackendCaps,
    export_count: AtomicU32,
    lu_gp: Mutex<Option<LuGroup>>,
    lba_map: RwLock<LbaMap>,
}

impl Device {
    /// Create a new builder for configuring a device
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::new()
    }

    pub fn device_type(&self) -> DeviceType {
        self.dev_type
    }

    /// Capacity in logical blocks
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Highest addressable LBA
    pub fn last_lba(&self) -> u64 {
        self.capacity.saturating_sub(1)
    }

    pub fn has_unit_serial(&self) -> bool {
        self.wwn.unit_serial.is_some()
    }

    /// Whether writes land in a volatile cache
    pub fn check_wce(&self) -> bool {
        match self.backend.write_cache {
            Some(wce) => wce,
            None => self.attrib.emulate_write_cache,
        }
    }

    /// Whether FUA (and DPO) are honoured
    pub fn check_fua(&self) -> bool {
        self.check_wce() && self.attrib.emulate_fua_write
    }

    /// Descriptor format sense is required once LBAs exceed 32 bits
    pub fn sense_desc_format(&self) -> bool {
        self.last_lba() > u32::MAX as u64
    }

    /// Number of LUNs this device is exported through
    pub fn export_count(&self) -> u32 {
        self.export_count.load(Ordering::Acquire)
    }

    pub fn set_export_count(&self, count: u32) {
        self.export_count.store(count, Ordering::Release);
    }

    /// Current LU group, if the device is a member of one
    pub fn lu_group(&self) -> Option<LuGroup> {
        *self.lu_gp.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_lu_group(&self, group: Option<LuGroup>) {
        *self.lu_gp.lock().unwrap_or_else(|e| e.into_inner()) = group;
    }

    /// Whether an LBA referral map has been installed
    pub fn has_lba_map(&self) -> bool {
        !self
            .lba_map
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .is_empty()
    }

    /// Referral segment size and multiplier
    pub fn lba_map_segment(&self) -> (u32, u32) {
        let map = self.lba_map.read().unwrap_or_else(|e| e.into_inner());
        (map.segment_size, map.segment_multiplier)
    }

    pub fn set_lba_map(&self, map: LbaMap) {
        *self.lba_map.write().unwrap_or_else(|e| e.into_inner()) = map;
    }
}

/// Builder for configuring a device
pub struct DeviceBuilder {
    dev_type: DeviceType,
    capacity: Option<u64>,
    attrib: DeviceAttributes,
    wwn: T10Wwn,
    backend: BackendCaps,
    export_count: u32,
}

impl DeviceBuilder {
    fn new() -> Self {
        Self {
            dev_type: DeviceType::Disk,
            capacity: None,
            attrib: DeviceAttributes::default(),
            wwn: T10Wwn::default(),
            backend: BackendCaps::default(),
            export_count: 1,
        }
    }

    pub fn device_type(mut self, dev_type: DeviceType) -> Self {
        self.dev_type = dev_type;
        self
    }

    /// Set the capacity in logical blocks
    pub fn capacity(mut self, blocks: u64) -> Self {
        self.capacity = Some(blocks);
        self
    }

    /// Set the logical block size (default: 512)
    pub fn block_size(mut self, block_size: u32) -> Self {
        self.attrib.block_size = block_size;
        self
    }

    /// Set vendor identification (8 chars max)
    pub fn vendor(mut self, vendor: &str) -> Self {
        self.wwn.vendor = vendor.to_string();
        self
    }

    /// Set product identification (16 chars max)
    pub fn model(mut self, model: &str) -> Self {
        self.wwn.model = model.to_string();
        self
    }

    /// Set product revision (4 chars max)
    pub fn revision(mut self, revision: &str) -> Self {
        self.wwn.revision = revision.to_string();
        self
    }

    /// Set the unit serial number reported in VPD 0x80
    pub fn unit_serial(mut self, serial: &str) -> Self {
        self.wwn.unit_serial = Some(serial.to_string());
        self
    }

    pub fn company_id(mut self, company_id: u32) -> Self {
        self.wwn.company_id = company_id;
        self
    }

    /// Replace all attributes at once
    pub fn attributes(mut self, attrib: DeviceAttributes) -> Self {
        self.attrib = attrib;
        self
    }

    /// Adjust individual attributes in place
    pub fn configure(mut self, f: impl FnOnce(&mut DeviceAttributes)) -> Self {
        f(&mut self.attrib);
        self
    }

    pub fn backend(mut self, backend: BackendCaps) -> Self {
        self.backend = backend;
        self
    }

    pub fn export_count(mut self, count: u32) -> Self {
        self.export_count = count;
        self
    }

    /// Build the device, validating the configuration
    pub fn build(self) -> SpcResult<Device> {
        let capacity = self
            .capacity
            .ok_or_else(|| SpcError::Config("device capacity must be set".to_string()))?;

        for (name, size) in [
            ("block_size", self.attrib.block_size),
            ("hw_block_size", self.attrib.hw_block_size),
        ] {
            if size < 512 || !size.is_power_of_two() {
                return Err(SpcError::Config(format!(
                    "{} must be a power of two of at least 512, got {}",
                    name, size
                )));
            }
        }

        if self.wwn.company_id > 0x00FF_FFFF {
            return Err(SpcError::Config(format!(
                "company_id 0x{:x} does not fit in 24 bits",
                self.wwn.company_id
            )));
        }

        if let Some(serial) = &self.wwn.unit_serial {
            if serial.is_empty() || serial.len() > INQUIRY_VPD_SERIAL_LEN {
                return Err(SpcError::Config(format!(
                    "unit_serial must be 1 to {} bytes",
                    INQUIRY_VPD_SERIAL_LEN
                )));
            }
            if !serial.is_ascii() {
                return Err(SpcError::Config("unit_serial must be ASCII".to_string()));
            }
        }

        for (name, value, max) in [
            ("vendor", &self.wwn.vendor, INQUIRY_VENDOR_LEN),
            ("model", &self.wwn.model, INQUIRY_MODEL_LEN),
            ("revision", &self.wwn.revision, INQUIRY_REVISION_LEN),
        ] {
            if !value.is_ascii() {
                return Err(SpcError::Config(format!("{} must be ASCII", name)));
            }
            if value.len() > max {
                log::warn!(
                    "{} {:?} is longer than {} bytes and will be truncated in INQUIRY data",
                    name,
                    value,
                    max
                );
            }
        }

        Ok(Device {
            dev_type: self.dev_type,
            capacity,
            attrib: self.attrib,
            wwn: self.wwn,
            backend: self.backend,
            export_count: AtomicU32::new(self.export_count),
            lu_gp: Mutex::new(None),
            lba_map: RwLock::new(LbaMap::default()),
        })
    }
}
