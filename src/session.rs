//! Initiator sessions and their LUN mappings
//!
//! A [`Session`] is the I_T nexus a command arrived on. Its [`NodeAcl`]
//! lists the LUNs the initiator may see, each as a [`DevEntry`] that also
//! queues the unit attention conditions pending for that I_T_L nexus.

use crate::device::ProtectionType;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

/// Protection operations a fabric can offload
pub mod prot_ops {
    pub const DIN_INSERT: u8 = 0x01;
    pub const DOUT_STRIP: u8 = 0x02;
    pub const DIN_STRIP: u8 = 0x04;
    pub const DOUT_INSERT: u8 = 0x08;
    pub const DIN_PASS: u8 = 0x10;
    pub const DOUT_PASS: u8 = 0x20;
}

/// A pending unit attention condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitAttention {
    pub asc: u8,
    pub ascq: u8,
}

/// A LUN mapped into an initiator's view
#[derive(Debug)]
pub struct DevEntry {
    /// LUN number as seen by the initiator
    pub mapped_lun: u64,
    /// Mapping grants read-only access
    pub read_only: bool,
    ua_list: Mutex<VecDeque<UnitAttention>>,
}

impl DevEntry {
    pub fn new(mapped_lun: u64, read_only: bool) -> Self {
        DevEntry {
            mapped_lun,
            read_only,
            ua_list: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a unit attention condition for this nexus
    pub fn establish_ua(&self, asc: u8, ascq: u8) {
        let mut list = self.ua_list.lock().unwrap_or_else(|e| e.into_inner());
        let ua = UnitAttention { asc, ascq };
        if !list.contains(&ua) {
            list.push_back(ua);
        }
    }

    /// Remove and return the oldest pending unit attention
    pub fn take_ua(&self) -> Option<UnitAttention> {
        self.ua_list
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    pub fn pending_ua_count(&self) -> usize {
        self.ua_list.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Access control list of one initiator
#[derive(Debug)]
pub struct NodeAcl {
    pub initiator_name: String,
    lun_entries: RwLock<Vec<Arc<DevEntry>>>,
}

impl NodeAcl {
    pub fn new(initiator_name: &str) -> Self {
        NodeAcl {
            initiator_name: initiator_name.to_string(),
            lun_entries: RwLock::new(Vec::new()),
        }
    }

    /// Map a LUN into this initiator's view, replacing an existing mapping
    pub fn map_lun(&self, mapped_lun: u64, read_only: bool) -> Arc<DevEntry> {
        let entry = Arc::new(DevEntry::new(mapped_lun, read_only));
        let mut entries = self.lun_entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|e| e.mapped_lun != mapped_lun);
        entries.push(Arc::clone(&entry));
        entry
    }

    pub fn unmap_lun(&self, mapped_lun: u64) -> bool {
        let mut entries = self.lun_entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|e| e.mapped_lun != mapped_lun);
        entries.len() != before
    }

    pub fn find_entry(&self, mapped_lun: u64) -> Option<Arc<DevEntry>> {
        self.lun_entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|e| e.mapped_lun == mapped_lun)
            .cloned()
    }

    /// Visit every mapped LUN in mapping order while holding the read lock
    pub fn for_each_entry(&self, mut f: impl FnMut(&DevEntry)) {
        let entries = self.lun_entries.read().unwrap_or_else(|e| e.into_inner());
        for entry in entries.iter() {
            f(entry);
        }
    }

    pub fn lun_count(&self) -> usize {
        self.lun_entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// An I_T nexus
#[derive(Debug)]
pub struct Session {
    pub node_acl: Arc<NodeAcl>,
    /// Protection operations the fabric supports ([`prot_ops`] bits)
    pub sup_prot_ops: u8,
    /// Protection type negotiated for the session
    pub sess_prot_type: ProtectionType,
}

impl Session {
    pub fn new(node_acl: Arc<NodeAcl>) -> Self {
        Session {
            node_acl,
            sup_prot_ops: 0,
            sess_prot_type: ProtectionType::None,
        }
    }

    pub fn with_protection(mut self, sup_prot_ops: u8, sess_prot_type: ProtectionType) -> Self {
        self.sup_prot_ops = sup_prot_ops;
        self.sess_prot_type = sess_prot_type;
        self
    }

    pub fn initiator_name(&self) -> &str {
        &self.node_acl.initiator_name
    }

    /// Fabric can pass protection information through unmodified
    pub fn supports_prot_pass(&self) -> bool {
        self.sup_prot_ops & (prot_ops::DIN_PASS | prot_ops::DOUT_PASS) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_and_unmap() {
        let acl = NodeAcl::new("iqn.1994-05.com.redhat:client");
        acl.map_lun(0, false);
        acl.map_lun(4, true);
        acl.map_lun(4, false);
        assert_eq!(acl.lun_count(), 2);
        assert!(!acl.find_entry(4).unwrap().read_only);

        assert!(acl.unmap_lun(0));
        assert!(!acl.unmap_lun(0));
        assert_eq!(acl.lun_count(), 1);
    }

    #[test]
    fn test_for_each_entry_preserves_order() {
        let acl = NodeAcl::new("iqn.1994-05.com.redhat:client");
        for lun in [7, 2, 9] {
            acl.map_lun(lun, false);
        }
        let mut seen = Vec::new();
        acl.for_each_entry(|e| seen.push(e.mapped_lun));
        assert_eq!(seen, vec![7, 2, 9]);
    }

    #[test]
    fn test_unit_attention_queue() {
        let entry = DevEntry::new(0, false);
        assert_eq!(entry.take_ua(), None);
        entry.establish_ua(0x29, 0x00);
        entry.establish_ua(0x3F, 0x0E);
        entry.establish_ua(0x29, 0x00);
        assert_eq!(entry.pending_ua_count(), 2);
        assert_eq!(entry.take_ua(), Some(UnitAttention { asc: 0x29, ascq: 0x00 }));
        assert_eq!(entry.take_ua(), Some(UnitAttention { asc: 0x3F, ascq: 0x0E }));
        assert_eq!(entry.take_ua(), None);
    }

    #[test]
    fn test_protection_pass_detection() {
        let acl = Arc::new(NodeAcl::new("iqn.1994-05.com.redhat:client"));
        let sess = Session::new(Arc::clone(&acl));
        assert!(!sess.supports_prot_pass());
        let sess = Session::new(acl).with_protection(prot_ops::DIN_PASS, ProtectionType::Type1);
        assert!(sess.supports_prot_pass());
        assert_eq!(sess.initiator_name(), "iqn.1994-05.com.redhat:client");
    }
}
