// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Represents an entry in the ASC/ASCQ table.
pub struct Entry {
    asc: u8,
    ascq: u8,
    desc: &'static str,
}

const fn e(asc: u8, ascq: u8, desc: &'static str) -> Entry {
    Entry { asc, ascq, desc }
}

/// Subset of SPC-4 Annex D that storage arrays actually report during
/// block I/O and third-party copy.
static ASC_ASCQ: &[Entry] = &[
    e(0x00, 0x00, "No additional sense information"),
    e(0x00, 0x16, "Operation in progress"),
    e(0x00, 0x17, "Cleaning requested"),
    e(0x00, 0x1D, "ATA pass through information available"),
    e(0x02, 0x00, "No seek complete"),
    e(0x03, 0x00, "Peripheral device write fault"),
    e(0x04, 0x00, "Logical unit not ready, cause not reportable"),
    e(0x04, 0x01, "Logical unit is in process of becoming ready"),
    e(0x04, 0x02, "Logical unit not ready, initializing command required"),
    e(0x04, 0x03, "Logical unit not ready, manual intervention required"),
    e(0x04, 0x04, "Logical unit not ready, format in progress"),
    e(0x04, 0x05, "Logical unit not ready, rebuild in progress"),
    e(0x04, 0x06, "Logical unit not ready, recalculation in progress"),
    e(0x04, 0x07, "Logical unit not ready, operation in progress"),
    e(0x04, 0x08, "Logical unit not ready, long write in progress"),
    e(0x04, 0x09, "Logical unit not ready, self-test in progress"),
    e(0x04, 0x0A, "Logical unit not accessible, asymmetric access state transition"),
    e(0x04, 0x0B, "Logical unit not accessible, target port in standby state"),
    e(0x04, 0x0C, "Logical unit not accessible, target port in unavailable state"),
    e(0x04, 0x10, "Logical unit not ready, auxiliary memory not accessible"),
    e(0x04, 0x11, "Logical unit not ready, notify (enable spinup) required"),
    e(0x04, 0x14, "Logical unit not ready, space allocation in progress"),
    e(0x04, 0x1B, "Logical unit not ready, sanitize in progress"),
    e(0x08, 0x00, "Logical unit communication failure"),
    e(0x08, 0x01, "Logical unit communication time-out"),
    e(0x0C, 0x00, "Write error"),
    e(0x0C, 0x02, "Write error - auto reallocation failed"),
    e(0x0D, 0x00, "Error detected by third party temporary initiator"),
    e(0x0D, 0x01, "Third party device failure"),
    e(0x0D, 0x02, "Copy target device not reachable"),
    e(0x0D, 0x03, "Incorrect copy target device type"),
    e(0x0D, 0x04, "Copy target device data underrun"),
    e(0x0D, 0x05, "Copy target device data overrun"),
    e(0x10, 0x01, "Logical block guard check failed"),
    e(0x11, 0x00, "Unrecovered read error"),
    e(0x14, 0x01, "Record not found"),
    e(0x17, 0x00, "Recovered data with no error correction applied"),
    e(0x17, 0x01, "Recovered data with retries"),
    e(0x18, 0x00, "Recovered data with error correction applied"),
    e(0x1A, 0x00, "Parameter list length error"),
    e(0x1D, 0x00, "Miscompare during verify operation"),
    e(0x20, 0x00, "Invalid command operation code"),
    e(0x21, 0x00, "Logical block address out of range"),
    e(0x23, 0x00, "Invalid token operation, cause not reportable"),
    e(0x23, 0x01, "Invalid token operation, unsupported token type"),
    e(0x23, 0x02, "Invalid token operation, remote token usage not supported"),
    e(0x23, 0x04, "Invalid token operation, token unknown"),
    e(0x23, 0x05, "Invalid token operation, token corrupt"),
    e(0x23, 0x06, "Invalid token operation, token revoked"),
    e(0x23, 0x07, "Invalid token operation, token expired"),
    e(0x23, 0x08, "Invalid token operation, token cancelled"),
    e(0x23, 0x09, "Invalid token operation, token deleted"),
    e(0x23, 0x0A, "Invalid token operation, invalid token length"),
    e(0x24, 0x00, "Invalid field in CDB"),
    e(0x25, 0x00, "Logical unit not supported"),
    e(0x26, 0x00, "Invalid field in parameter list"),
    e(0x26, 0x04, "Invalid release of persistent reservation"),
    e(0x26, 0x06, "Too many target descriptors"),
    e(0x26, 0x07, "Unsupported target descriptor type code"),
    e(0x26, 0x08, "Too many segment descriptors"),
    e(0x26, 0x09, "Unsupported segment descriptor type code"),
    e(0x26, 0x0A, "Unexpected inexact segment"),
    e(0x26, 0x0B, "Inline data length exceeded"),
    e(0x26, 0x0C, "Invalid operation for copy source or destination"),
    e(0x26, 0x0D, "Copy segment granularity violation"),
    e(0x27, 0x00, "Write protected"),
    e(0x28, 0x00, "Not ready to ready change, medium may have changed"),
    e(0x29, 0x00, "Power on, reset, or bus device reset occurred"),
    e(0x29, 0x01, "Power on occurred"),
    e(0x29, 0x02, "SCSI bus reset occurred"),
    e(0x29, 0x03, "Bus device reset function occurred"),
    e(0x29, 0x04, "Device internal reset"),
    e(0x29, 0x07, "I_T nexus loss occurred"),
    e(0x2A, 0x00, "Parameters changed"),
    e(0x2A, 0x01, "Mode parameters changed"),
    e(0x2A, 0x06, "Asymmetric access state changed"),
    e(0x2A, 0x09, "Capacity data has changed"),
    e(0x2C, 0x00, "Command sequence error"),
    e(0x2F, 0x00, "Commands cleared by another initiator"),
    e(0x31, 0x00, "Medium format corrupted"),
    e(0x38, 0x07, "Thin provisioning soft threshold reached"),
    e(0x3A, 0x00, "Medium not present"),
    e(0x3F, 0x01, "Microcode has been changed"),
    e(0x3F, 0x03, "Inquiry data has changed"),
    e(0x3F, 0x0E, "Reported luns data has changed"),
    e(0x44, 0x00, "Internal target failure"),
    e(0x47, 0x00, "SCSI parity error"),
    e(0x4B, 0x00, "Data phase error"),
    e(0x4E, 0x00, "Overlapped commands attempted"),
    e(0x55, 0x03, "Insufficient resources"),
    e(0x55, 0x06, "Auxiliary memory out of space"),
    e(0x5D, 0x00, "Failure prediction threshold exceeded"),
];

static ASC_ASCQ_MAP: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    let mut m: HashMap<u16, &'static str> = HashMap::with_capacity(ASC_ASCQ.len());
    for e in ASC_ASCQ {
        m.insert(((e.asc as u16) << 8) | e.ascq as u16, e.desc);
    }
    m
});

impl Entry {
    /// Looks up the description for a given ASC/ASCQ code.
    #[inline]
    pub fn lookup(asc: u8, ascq: u8) -> Option<&'static str> {
        let k = ((asc as u16) << 8) | (ascq as u16);
        ASC_ASCQ_MAP.get(&k).copied()
    }
}

/// Return the SPC-4 description for a given ASC/ASCQ pair.
///
/// * Vendor-specific qualifiers (0x80..=0xFF) and pairs missing from the
///   table yield `"UNSPECIFIED / vendor specific"`.
#[inline]
pub fn asc_ascq_to_str(asc: u8, ascq: u8) -> &'static str {
    Entry::lookup(asc, ascq).unwrap_or("UNSPECIFIED / vendor specific")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_pairs() {
        assert_eq!(
            asc_ascq_to_str(0x04, 0x01),
            "Logical unit is in process of becoming ready"
        );
        assert_eq!(asc_ascq_to_str(0x04, 0x99), "UNSPECIFIED / vendor specific");
    }
}
