//! SCSI Primary Commands (SPC) emulation for storage targets
//!
//! This library implements the device independent part of a SCSI target:
//! given a CDB it works out the expected transfer size, decides whether the
//! command is emulated here, delegated to an external collaborator (PR,
//! ALUA, extended copy) or left to the backend, and for emulated commands
//! builds a byte-exact response.
//!
//! Emulated commands: INQUIRY (standard data and VPD pages 0x00, 0x80, 0x83,
//! 0x86, 0xB0 to 0xB3), MODE SENSE/SELECT (6 and 10), REPORT LUNS, REQUEST
//! SENSE, REPORT SUPPORTED OPERATION CODES and TEST UNIT READY.
//!
//! # Example
//!
//! ```no_run
//! use spc_target::{Command, Device, Disposition, Lun, SpcHandler, TargetPort};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = Device::builder()
//!     .capacity(2 * 1024 * 1024)
//!     .vendor("LIO-ORG")
//!     .model("RAMDISK")
//!     .unit_serial("a1b2c3d4-0001")
//!     .build()?;
//! let port = TargetPort::builder()
//!     .wwn("iqn.2025-12.local:storage.disk1")
//!     .tag(1)
//!     .build()?;
//! let lun = Lun::new(0, Arc::new(port));
//!
//! let mut cmd = Command::new(&[0x12, 0x00, 0x00, 0x00, 0x60, 0x00], 96, &device, &lun);
//! if let Disposition::Completed(response) = SpcHandler::handle_command(&mut cmd) {
//!     println!("INQUIRY returned {} bytes", response.data.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod command;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod inquiry;
pub mod luns;
pub mod mode;
pub mod opcodes;
pub mod rsoc;
pub mod scsi;
pub mod sense;
pub mod session;
pub mod target;
pub mod vpd;

pub use command::{Command, Completion, TaskAttr};
pub use device::{Device, DeviceAttributes, DeviceBuilder, DeviceType, ProtectionType};
pub use dispatch::{parse_cdb, Disposition, ExternalOp, Handler, ParsedCdb, SpcHandler};
pub use error::{SenseReason, SenseResult, SpcError, SpcResult};
pub use scsi::{ScsiResponse, SenseData};
pub use session::{NodeAcl, Session};
pub use target::{Lun, TargetPort, TargetPortBuilder, TargetPortGroup};

/// Version of this library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
