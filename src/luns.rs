//! REPORT LUNS emulation

use crate::command::Command;
use crate::error::{SenseReason, SenseResult};

/// Encode a LUN into the 8-byte single level addressing format
pub fn int_to_scsilun(lun: u64) -> [u8; 8] {
    let mut scsilun = [0u8; 8];
    let mut lun = lun;

    for pair in scsilun.chunks_exact_mut(2) {
        pair[0] = ((lun >> 8) & 0xff) as u8;
        pair[1] = (lun & 0xff) as u8;
        lun >>= 16;
    }

    scsilun
}

/// Emulate REPORT LUNS
///
/// Lists the LUNs mapped into the initiator's view, or LUN 0 alone when
/// the command has no session or nothing is mapped.
pub fn emulate_report_luns(cmd: &mut Command<'_>) -> SenseResult<()> {
    let data_length = cmd.data_length as usize;

    let mut luns = Vec::new();
    if let Some(sess) = cmd.session {
        sess.node_acl.for_each_entry(|entry| luns.push(entry.mapped_lun));
    }

    // LUN 0 is always reported, even with an empty mapping
    if luns.is_empty() {
        luns.push(0);
    }

    let lun_list_len = (luns.len() * 8) as u32;
    let mut response = Vec::with_capacity(8 + luns.len() * 8);
    response.extend_from_slice(&lun_list_len.to_be_bytes());
    response.extend_from_slice(&[0u8; 4]);
    for lun in &luns {
        response.extend_from_slice(&int_to_scsilun(*lun));
    }

    match cmd.map_data() {
        Some(mut map) => {
            // The header keeps the full list length even when truncated
            let n = response.len().min(data_length).min(map.len());
            map[..n].copy_from_slice(&response[..n]);
        }
        None if data_length > 0 => return Err(SenseReason::CommunicationFailure),
        None => {}
    }

    log::debug!("REPORT LUNS: {} LUNs", luns.len());
    cmd.complete_with_length(8 + lun_list_len);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::scsi::opcode;
    use crate::session::{NodeAcl, Session};
    use crate::target::{Lun, TargetPort};
    use std::sync::Arc;

    fn report_luns_cdb(alloc: u32) -> [u8; 12] {
        let a = alloc.to_be_bytes();
        [opcode::REPORT_LUNS, 0, 0, 0, 0, 0, a[0], a[1], a[2], a[3], 0, 0]
    }

    fn setup() -> (Device, Lun) {
        let dev = Device::builder().capacity(8).build().unwrap();
        let lun = Lun::new(0, Arc::new(TargetPort::builder().build().unwrap()));
        (dev, lun)
    }

    #[test]
    fn test_int_to_scsilun() {
        assert_eq!(int_to_scsilun(0), [0; 8]);
        assert_eq!(int_to_scsilun(1), [0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(int_to_scsilun(0x4123), [0x41, 0x23, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            int_to_scsilun(0x0001_0203),
            [0x02, 0x03, 0x00, 0x01, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_mapped_luns_reported_in_order() {
        let (dev, lun) = setup();
        let acl = Arc::new(NodeAcl::new("iqn.init"));
        acl.map_lun(0, false);
        acl.map_lun(3, false);
        acl.map_lun(300, true);
        let sess = Session::new(acl);

        let mut cmd = Command::new(&report_luns_cdb(64), 64, &dev, &lun).with_session(&sess);
        emulate_report_luns(&mut cmd).unwrap();

        let data = cmd.data();
        assert_eq!(&data[0..4], &[0, 0, 0, 24]);
        assert_eq!(&data[8..16], &[0; 8]);
        assert_eq!(&data[16..18], &[0, 3]);
        assert_eq!(&data[24..26], &[0x01, 0x2c]);
        assert_eq!(cmd.completion().unwrap().length, Some(32));
    }

    #[test]
    fn test_short_allocation_counts_all_luns() {
        let (dev, lun) = setup();
        let acl = Arc::new(NodeAcl::new("iqn.init"));
        for l in 0..4 {
            acl.map_lun(l, false);
        }
        let sess = Session::new(acl);

        let mut cmd = Command::new(&report_luns_cdb(16), 16, &dev, &lun).with_session(&sess);
        emulate_report_luns(&mut cmd).unwrap();
        assert_eq!(&cmd.data()[0..4], &[0, 0, 0, 32]);
        assert_eq!(cmd.completion().unwrap().length, Some(40));
    }

    #[test]
    fn test_lun0_without_session() {
        let (dev, lun) = setup();
        let mut cmd = Command::new(&report_luns_cdb(16), 16, &dev, &lun);
        emulate_report_luns(&mut cmd).unwrap();
        assert_eq!(&cmd.data()[0..4], &[0, 0, 0, 8]);
        assert_eq!(cmd.completion().unwrap().length, Some(16));
    }

    #[test]
    fn test_lun0_with_empty_acl() {
        let (dev, lun) = setup();
        let sess = Session::new(Arc::new(NodeAcl::new("iqn.init")));
        let mut cmd = Command::new(&report_luns_cdb(8), 8, &dev, &lun).with_session(&sess);
        emulate_report_luns(&mut cmd).unwrap();
        assert_eq!(&cmd.data()[0..4], &[0, 0, 0, 8]);
        assert_eq!(cmd.completion().unwrap().length, Some(16));
    }

    #[test]
    fn test_unmappable_buffer() {
        let (dev, lun) = setup();
        let mut cmd = Command::new(&report_luns_cdb(16), 16, &dev, &lun).without_data_buffer();
        assert_eq!(
            emulate_report_luns(&mut cmd),
            Err(SenseReason::CommunicationFailure)
        );

        let mut cmd = Command::new(&report_luns_cdb(0), 0, &dev, &lun).without_data_buffer();
        emulate_report_luns(&mut cmd).unwrap();
    }
}
