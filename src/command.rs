//! Command context passed to the emulators
//!
//! A [`Command`] borrows the device, LUN and session it was received on for
//! the duration of one call. Its data buffer has a fixed capacity chosen by
//! the transport and may fail to map, in which case [`Command::map_data`]
//! returns `None`.

use crate::device::Device;
use crate::scsi::scsi_status;
use crate::session::{DevEntry, Session};
use crate::target::Lun;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// SAM task attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskAttr {
    #[default]
    Simple,
    Ordered,
    HeadOfQueue,
    Aca,
}

/// Status and length an emulator completed the command with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub status: u8,
    /// Effective transfer length, `None` when the emulator moved no data-in
    pub length: Option<u32>,
}

/// A SCSI command being processed
pub struct Command<'a> {
    pub cdb: Vec<u8>,
    /// Transfer length negotiated by the transport
    pub data_length: u32,
    pub task_attr: TaskAttr,
    pub device: &'a Device,
    pub lun: &'a Lun,
    pub session: Option<&'a Session>,
    data: Option<Vec<u8>>,
    completion: Option<Completion>,
}

impl<'a> Command<'a> {
    /// Create a command with a zeroed data buffer of `data_length` bytes
    pub fn new(cdb: &[u8], data_length: u32, device: &'a Device, lun: &'a Lun) -> Self {
        Command {
            cdb: cdb.to_vec(),
            data_length,
            task_attr: TaskAttr::Simple,
            device,
            lun,
            session: None,
            data: Some(vec![0u8; data_length as usize]),
            completion: None,
        }
    }

    pub fn with_session(mut self, session: &'a Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Fill the data buffer with data-out bytes from the initiator
    pub fn with_data_out(mut self, bytes: &[u8]) -> Self {
        let mut buf = vec![0u8; self.data_length as usize];
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        self.data = Some(buf);
        self
    }

    /// Simulate a data buffer the transport cannot map
    pub fn without_data_buffer(mut self) -> Self {
        self.data = None;
        self
    }

    pub fn opcode(&self) -> u8 {
        self.cdb.first().copied().unwrap_or(0)
    }

    /// Map the data buffer for CPU access
    ///
    /// The mapping is released when the returned guard is dropped.
    pub fn map_data(&mut self) -> Option<DataMap<'_>> {
        let buf = self.data.as_mut()?;
        log::trace!("mapped {} byte data buffer", buf.len());
        Some(DataMap { buf })
    }

    /// Nexus entry the command's LUN is mapped through, if any
    pub fn dev_entry(&self) -> Option<Arc<DevEntry>> {
        let session = self.session?;
        session.node_acl.find_entry(self.lun.unpacked_lun)
    }

    pub fn complete(&mut self, status: u8) {
        self.completion = Some(Completion {
            status,
            length: None,
        });
    }

    /// Complete with GOOD status and an explicit transfer length
    pub fn complete_with_length(&mut self, length: u32) {
        self.completion = Some(Completion {
            status: scsi_status::GOOD,
            length: Some(length),
        });
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    /// Bytes currently held in the data buffer
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

/// Mapped view of a command's data buffer
pub struct DataMap<'b> {
    buf: &'b mut Vec<u8>,
}

impl Deref for DataMap<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf
    }
}

impl DerefMut for DataMap<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf
    }
}

impl Drop for DataMap<'_> {
    fn drop(&mut self) {
        log::trace!("unmapped {} byte data buffer", self.buf.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetPort;

    fn setup() -> (Device, Lun) {
        let dev = Device::builder().capacity(1024).build().unwrap();
        let port = Arc::new(TargetPort::builder().build().unwrap());
        (dev, Lun::new(0, port))
    }

    #[test]
    fn test_map_data_writes_through() {
        let (dev, lun) = setup();
        let mut cmd = Command::new(&[0x12, 0, 0, 0, 36, 0], 36, &dev, &lun);
        {
            let mut map = cmd.map_data().unwrap();
            assert_eq!(map.len(), 36);
            map[0] = 0xAB;
        }
        assert_eq!(cmd.data()[0], 0xAB);
        assert_eq!(cmd.opcode(), 0x12);
    }

    #[test]
    fn test_unmappable_buffer() {
        let (dev, lun) = setup();
        let mut cmd = Command::new(&[0x12], 36, &dev, &lun).without_data_buffer();
        assert!(cmd.map_data().is_none());
        assert!(cmd.data().is_empty());
    }

    #[test]
    fn test_data_out_is_bounded_by_length() {
        let (dev, lun) = setup();
        let cmd = Command::new(&[0x15], 4, &dev, &lun).with_data_out(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(cmd.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_completion_recorded() {
        let (dev, lun) = setup();
        let mut cmd = Command::new(&[0x00], 0, &dev, &lun);
        assert!(cmd.completion().is_none());
        cmd.complete_with_length(96);
        assert_eq!(
            cmd.completion(),
            Some(Completion {
                status: scsi_status::GOOD,
                length: Some(96)
            })
        );
    }

    #[test]
    fn test_dev_entry_lookup() {
        use crate::session::NodeAcl;

        let (dev, lun) = setup();
        let acl = Arc::new(NodeAcl::new("iqn.1994-05.com.redhat:client"));
        acl.map_lun(0, true);
        let sess = Session::new(acl);
        let cmd = Command::new(&[0x1A], 0, &dev, &lun).with_session(&sess);
        assert!(cmd.dev_entry().unwrap().read_only);
    }
}
