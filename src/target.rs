//! Target ports and logical units
//!
//! A [`TargetPort`] describes the fabric endpoint commands arrive on: its
//! SCSI transport protocol, its fabric WWN and target portal group tag.
//! A [`Lun`] ties a [`Device`](crate::device::Device) export to a port and
//! carries the ALUA target port group the ALUA subsystem assigned to it.

use crate::error::{SpcError, SpcResult};
use crate::scsi::protocol_id;
use std::sync::{Arc, RwLock};

/// Page size used to turn a scatter-gather entry limit into bytes
pub const PAGE_SIZE: u32 = 4096;

/// Implicit ALUA supported (TPGS = 01b)
pub const TPGS_IMPLICIT_ALUA: u8 = 0x10;
/// Explicit ALUA supported (TPGS = 10b)
pub const TPGS_EXPLICIT_ALUA: u8 = 0x20;

/// Target port over which commands are received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPort {
    /// SCSI transport protocol identifier (see [`protocol_id`])
    pub proto_id: u8,
    /// Fabric WWN of the target, e.g. an iSCSI qualified name
    pub wwn: String,
    /// Target portal group tag
    pub tag: u16,
    /// Relative target port identifier
    pub rtpi: u16,
    /// Largest number of scatter-gather entries the fabric accepts, 0 for no limit
    pub max_data_sg_nents: u32,
    /// Name of the fabric module, used in log messages
    pub fabric_name: String,
}

impl TargetPort {
    /// Create a new builder for configuring a target port
    pub fn builder() -> TargetPortBuilder {
        TargetPortBuilder::new()
    }
}

/// Builder for configuring a target port
pub struct TargetPortBuilder {
    proto_id: u8,
    wwn: Option<String>,
    tag: u16,
    rtpi: u16,
    max_data_sg_nents: u32,
    fabric_name: Option<String>,
}

impl TargetPortBuilder {
    fn new() -> Self {
        Self {
            proto_id: protocol_id::ISCSI,
            wwn: None,
            tag: 1,
            rtpi: 1,
            max_data_sg_nents: 0,
            fabric_name: None,
        }
    }

    /// Set the SCSI transport protocol identifier (default: iSCSI)
    pub fn protocol(mut self, proto_id: u8) -> Self {
        self.proto_id = proto_id;
        self
    }

    /// Set the fabric WWN of the target
    ///
    /// Example: iqn.2025-12.local:storage.disk1
    pub fn wwn(mut self, wwn: &str) -> Self {
        self.wwn = Some(wwn.to_string());
        self
    }

    /// Set the target portal group tag (default: 1)
    pub fn tag(mut self, tag: u16) -> Self {
        self.tag = tag;
        self
    }

    /// Set the relative target port identifier (default: 1)
    pub fn rtpi(mut self, rtpi: u16) -> Self {
        self.rtpi = rtpi;
        self
    }

    /// Limit the number of scatter-gather entries per command
    pub fn max_data_sg_nents(mut self, nents: u32) -> Self {
        self.max_data_sg_nents = nents;
        self
    }

    pub fn fabric_name(mut self, name: &str) -> Self {
        self.fabric_name = Some(name.to_string());
        self
    }

    /// Build the target port
    pub fn build(self) -> SpcResult<TargetPort> {
        let wwn = self.wwn.unwrap_or_else(|| {
            "iqn.2025-12.local:storage.default".to_string()
        });

        if self.proto_id > protocol_id::UNSPEC {
            return Err(SpcError::Config(format!(
                "protocol identifier 0x{:x} does not fit in 4 bits",
                self.proto_id
            )));
        }

        // Validate IQN format (basic check)
        if self.proto_id == protocol_id::ISCSI
            && !(wwn.starts_with("iqn.") || wwn.starts_with("eui.") || wwn.starts_with("naa."))
        {
            return Err(SpcError::Config(
                "iSCSI wwn must be in IQN format (e.g., iqn.2025-12.local:storage.disk1)".to_string()
            ));
        }

        if self.rtpi == 0 {
            return Err(SpcError::Config(
                "relative target port identifier 0 is reserved".to_string()
            ));
        }

        let fabric_name = self.fabric_name.unwrap_or_else(|| {
            match self.proto_id {
                protocol_id::ISCSI => "iSCSI",
                protocol_id::FCP => "qla2xxx",
                protocol_id::SAS => "sas",
                protocol_id::SRP => "srpt",
                protocol_id::SBP => "sbp",
                _ => "loopback",
            }
            .to_string()
        });

        Ok(TargetPort {
            proto_id: self.proto_id,
            wwn,
            tag: self.tag,
            rtpi: self.rtpi,
            max_data_sg_nents: self.max_data_sg_nents,
            fabric_name,
        })
    }
}

/// ALUA target port group a LUN belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetPortGroup {
    pub id: u16,
    /// TPGS bits: [`TPGS_IMPLICIT_ALUA`] and/or [`TPGS_EXPLICIT_ALUA`]
    pub alua_access_type: u8,
}

/// A logical unit exported on a target port
#[derive(Debug)]
pub struct Lun {
    pub unpacked_lun: u64,
    pub tpg: Arc<TargetPort>,
    /// LUN was exported read-only
    pub read_only: bool,
    tg_pt_gp: RwLock<Option<TargetPortGroup>>,
}

impl Lun {
    pub fn new(unpacked_lun: u64, tpg: Arc<TargetPort>) -> Self {
        Lun {
            unpacked_lun,
            tpg,
            read_only: false,
            tg_pt_gp: RwLock::new(None),
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Current ALUA target port group, copied out under the read lock
    pub fn tg_pt_gp(&self) -> Option<TargetPortGroup> {
        *self.tg_pt_gp.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_tg_pt_gp(&self, group: Option<TargetPortGroup>) {
        *self.tg_pt_gp.write().unwrap_or_else(|e| e.into_inner()) = group;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let port = TargetPort::builder().build().unwrap();
        assert_eq!(port.proto_id, protocol_id::ISCSI);
        assert_eq!(port.wwn, "iqn.2025-12.local:storage.default");
        assert_eq!(port.tag, 1);
        assert_eq!(port.fabric_name, "iSCSI");
    }

    #[test]
    fn test_iscsi_requires_iqn() {
        let result = TargetPort::builder().wwn("storage.disk1").build();
        assert!(matches!(result, Err(SpcError::Config(_))));
    }

    #[test]
    fn test_non_iscsi_accepts_any_wwn() {
        let port = TargetPort::builder()
            .protocol(protocol_id::FCP)
            .wwn("21:00:00:24:ff:31:4c:5e")
            .build()
            .unwrap();
        assert_eq!(port.fabric_name, "qla2xxx");
    }

    #[test]
    fn test_rejects_zero_rtpi() {
        assert!(TargetPort::builder().rtpi(0).build().is_err());
    }

    #[test]
    fn test_lun_tg_pt_gp_snapshot() {
        let port = Arc::new(TargetPort::builder().build().unwrap());
        let lun = Lun::new(3, port);
        assert_eq!(lun.tg_pt_gp(), None);
        lun.set_tg_pt_gp(Some(TargetPortGroup {
            id: 0x10,
            alua_access_type: TPGS_IMPLICIT_ALUA,
        }));
        assert_eq!(lun.tg_pt_gp().map(|g| g.id), Some(0x10));
    }
}
