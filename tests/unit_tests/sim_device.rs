//! In-memory block array answering the commands the crate issues.
//!
//! Every LUN keeps its blocks in a `Vec<u8>`; several handles may point at
//! the same LUN. Faults are scripted per LUN and opcode and consumed in
//! order before the command itself is looked at.

use std::{
    collections::{HashMap, VecDeque},
    ops::Range,
    sync::{Arc, Mutex},
    time::Duration,
};

use spt_rs::{
    cfg::config::Config,
    exec::submit::{SubmitOutcome, SubmitRequest, Submitter},
};

/// Sense key, ASC, ASCQ.
pub type Sense = (u8, u8, u8);

pub const INVALID_OPCODE: Sense = (0x05, 0x20, 0x00);
pub const LBA_OUT_OF_RANGE: Sense = (0x05, 0x21, 0x00);
pub const INVALID_FIELD: Sense = (0x05, 0x24, 0x00);
pub const INVALID_PARAM: Sense = (0x05, 0x26, 0x00);
pub const TOKEN_UNKNOWN: Sense = (0x05, 0x23, 0x04);
pub const TARGET_UNREACHABLE: Sense = (0x0A, 0x0D, 0x02);
pub const UNIT_ATTENTION: Sense = (0x06, 0x29, 0x00);
pub const BECOMING_READY: Sense = (0x02, 0x04, 0x01);

pub const CHECK_CONDITION: u8 = 0x02;
pub const BUSY: u8 = 0x08;
pub const EAGAIN: i32 = 11;
pub const EIO: i32 = 5;

const ZERO_TOKEN_TYPE: [u8; 4] = [0xFF, 0xFF, 0x00, 0x01];

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Check(Sense),
    Status(u8),
    Os(i32),
}

pub struct Lun {
    pub block_size: u32,
    pub blocks: u64,
    pub naa: [u8; 8],
    /// MAXIMUM UNMAP LBA COUNT in the Block Limits page; `None` rejects
    /// the page like an older target.
    pub max_unmap: Option<u32>,
    pub data: Vec<u8>,
    /// Every CDB this LUN received, faulted ones included.
    pub cdbs: Vec<Vec<u8>>,
    faults: VecDeque<(u8, Fault)>,
}

impl Lun {
    pub fn block(&self, lba: u64) -> &[u8] {
        let bs = self.block_size as usize;
        let at = lba as usize * bs;
        &self.data[at..at + bs]
    }

    pub fn count(&self, opcode: u8) -> usize {
        self.cdbs.iter().filter(|c| c[0] == opcode).count()
    }
}

#[derive(Default)]
pub struct Array {
    pub luns: Vec<Lun>,
    tokens: HashMap<Vec<u8>, Vec<u8>>,
    results: HashMap<(usize, u32), Vec<u8>>,
    next_token: u64,
    /// Replaces the ROD token descriptor length in token information.
    pub token_desc_len: Option<u32>,
    /// Replaces the copy operation status in token information.
    pub copy_status: Option<u8>,
}

pub type SharedArray = Arc<Mutex<Array>>;

fn be(b: &[u8]) -> u64 {
    b.iter().fold(0u64, |acc, &x| (acc << 8) | x as u64)
}

fn put(dst: &mut [u8], src: &[u8]) -> usize {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

fn range_list(param: &[u8], at: usize) -> Result<Vec<(u64, u64)>, Sense> {
    let len = be(param.get(at - 2..at).ok_or(INVALID_PARAM)?) as usize;
    let list = param.get(at..at + len).ok_or(INVALID_PARAM)?;
    Ok(list
        .chunks_exact(16)
        .map(|d| (be(&d[..8]), be(&d[8..12])))
        .collect())
}

impl Array {
    pub fn shared() -> SharedArray {
        Arc::new(Mutex::new(Array::default()))
    }

    pub fn add_lun(&mut self, blocks: u64, block_size: u32) -> usize {
        let idx = self.luns.len();
        self.luns.push(Lun {
            block_size,
            blocks,
            naa: [0x60, 0x0A, 0x0B, 0x0C, 0x00, 0x00, 0x00, idx as u8 + 1],
            max_unmap: Some(0x0010_0000),
            data: vec![0u8; (blocks * block_size as u64) as usize],
            cdbs: Vec::new(),
            faults: VecDeque::new(),
        });
        idx
    }

    /// Give every block distinct content derived from its LBA.
    pub fn fill_distinct(&mut self, lun: usize) {
        let l = &mut self.luns[lun];
        let bs = l.block_size as usize;
        for (i, b) in l.data.iter_mut().enumerate() {
            let lba = i / bs;
            *b = (lba as u8).wrapping_mul(31).wrapping_add((i % bs) as u8) | 1;
        }
    }

    pub fn inject(&mut self, lun: usize, opcode: u8, fault: Fault) {
        self.luns[lun].faults.push_back((opcode, fault));
    }

    fn take_fault(&mut self, lun: usize, opcode: u8) -> Option<Fault> {
        let faults = &mut self.luns[lun].faults;
        match faults.front() {
            Some(&(op, fault)) if op == opcode => {
                faults.pop_front();
                Some(fault)
            },
            _ => None,
        }
    }

    fn extent(&self, lun: usize, lba: u64, blocks: u64) -> Result<Range<usize>, Sense> {
        let l = &self.luns[lun];
        if lba.checked_add(blocks).is_none_or(|end| end > l.blocks) {
            return Err(LBA_OUT_OF_RANGE);
        }
        let bs = l.block_size as usize;
        Ok(lba as usize * bs..(lba + blocks) as usize * bs)
    }

    fn read(&self, lun: usize, lba: u64, blocks: u64, data: &mut [u8]) -> Result<usize, Sense> {
        let r = self.extent(lun, lba, blocks)?;
        Ok(put(data, &self.luns[lun].data[r]))
    }

    fn write(&mut self, lun: usize, lba: u64, blocks: u64, data: &[u8]) -> Result<usize, Sense> {
        let r = self.extent(lun, lba, blocks)?;
        Ok(put(&mut self.luns[lun].data[r], data))
    }

    fn inquiry(&self, lun: usize, cdb: &[u8], data: &mut [u8]) -> Result<usize, Sense> {
        if cdb[1] & 0x01 == 0 {
            let mut b = [0u8; 36];
            b[2] = 0x06;
            b[4] = 31;
            b[5] = 0x08;
            b[8..16].copy_from_slice(b"SIMARRAY");
            b[16..32].copy_from_slice(b"VIRTUAL DISK    ");
            b[32..36].copy_from_slice(b"0001");
            return Ok(put(data, &b));
        }
        if cdb[2] == 0xB0 {
            let max_unmap = self.luns[lun].max_unmap.ok_or(INVALID_FIELD)?;
            let mut b = [0u8; 64];
            b[1] = 0xB0;
            b[3] = 0x3C;
            b[8..12].copy_from_slice(&0x1000u32.to_be_bytes());
            b[20..24].copy_from_slice(&max_unmap.to_be_bytes());
            b[24..28].copy_from_slice(&1u32.to_be_bytes());
            return Ok(put(data, &b));
        }
        if cdb[2] != 0x83 {
            return Err(INVALID_FIELD);
        }
        let mut b = vec![0x00, 0x83, 0x00, 12, 0x01, 0x03, 0x00, 0x08];
        b.extend_from_slice(&self.luns[lun].naa);
        Ok(put(data, &b))
    }

    fn capacity(&self, lun: usize, long: bool, data: &mut [u8]) -> usize {
        let l = &self.luns[lun];
        let last = l.blocks - 1;
        if long {
            let mut b = [0u8; 32];
            b[..8].copy_from_slice(&last.to_be_bytes());
            b[8..12].copy_from_slice(&l.block_size.to_be_bytes());
            put(data, &b)
        } else {
            let mut b = [0u8; 8];
            b[..4].copy_from_slice(&(last.min(u32::MAX as u64) as u32).to_be_bytes());
            b[4..].copy_from_slice(&l.block_size.to_be_bytes());
            put(data, &b)
        }
    }

    fn token_info(&self, service_action: u8, token: Option<&[u8]>, count: u64) -> Vec<u8> {
        let mut b = vec![0u8; 32];
        b[4] = service_action;
        b[5] = self.copy_status.unwrap_or(0x01);
        b[12] = 0xF1; // blocks
        b[16..24].copy_from_slice(&count.to_be_bytes());
        if let Some(t) = token {
            b.extend_from_slice(&self.token_desc_len.unwrap_or(514).to_be_bytes());
            b.extend_from_slice(&[0, 0]);
            b.extend_from_slice(t);
        }
        let avail = (b.len() - 4) as u32;
        b[..4].copy_from_slice(&avail.to_be_bytes());
        b
    }

    fn populate_token(&mut self, lun: usize, cdb: &[u8], param: &[u8]) -> Result<usize, Sense> {
        let list_id = be(&cdb[6..10]) as u32;
        let mut body = Vec::new();
        for (lba, n) in range_list(param, 16)? {
            let r = self.extent(lun, lba, n)?;
            body.extend_from_slice(&self.luns[lun].data[r]);
        }
        self.next_token += 1;
        let mut token = vec![0u8; 512];
        token[..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        token[6..8].copy_from_slice(&0x01F8u16.to_be_bytes());
        token[8..16].copy_from_slice(&self.next_token.to_be_bytes());
        let blocks = body.len() as u64 / self.luns[lun].block_size as u64;
        let info = self.token_info(0x10, Some(&token), blocks);
        self.tokens.insert(token, body);
        self.results.insert((lun, list_id), info);
        Ok(param.len())
    }

    fn write_using_token(&mut self, lun: usize, cdb: &[u8], param: &[u8]) -> Result<usize, Sense> {
        let list_id = be(&cdb[6..10]) as u32;
        let token = param.get(16..528).ok_or(INVALID_PARAM)?;
        let body = if token[..4] == ZERO_TOKEN_TYPE {
            None
        } else {
            Some(self.tokens.get(token).ok_or(TOKEN_UNKNOWN)?.clone())
        };
        let mut off = 0usize;
        for (lba, n) in range_list(param, 536)? {
            let r = self.extent(lun, lba, n)?;
            let len = r.len();
            let dst = &mut self.luns[lun].data[r];
            match &body {
                Some(b) => {
                    let end = (off + len).min(b.len());
                    put(dst, &b[off.min(end)..end]);
                },
                None => dst.fill(0),
            }
            off += len;
        }
        let blocks = off as u64 / self.luns[lun].block_size as u64;
        let info = self.token_info(0x11, None, blocks);
        self.results.insert((lun, list_id), info);
        Ok(param.len())
    }

    fn extended_copy(&mut self, param: &[u8]) -> Result<usize, Sense> {
        let cscd_len = be(param.get(2..4).ok_or(INVALID_PARAM)?) as usize;
        let seg_len = be(param.get(8..12).ok_or(INVALID_PARAM)?) as usize;
        let cscds = param.get(16..16 + cscd_len).ok_or(INVALID_PARAM)?;
        let targets = cscds
            .chunks_exact(32)
            .map(|d| {
                let id = &d[8..8 + d[7] as usize];
                self.luns
                    .iter()
                    .position(|l| l.naa[..] == *id)
                    .ok_or(TARGET_UNREACHABLE)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let start = 16 + cscd_len;
        let segments = param.get(start..start + seg_len).ok_or(INVALID_PARAM)?;
        for d in segments.chunks_exact(28) {
            let src = *targets.get(be(&d[4..6]) as usize).ok_or(INVALID_PARAM)?;
            let dst = *targets.get(be(&d[6..8]) as usize).ok_or(INVALID_PARAM)?;
            let blocks = be(&d[10..12]);
            let r = self.extent(src, be(&d[12..20]), blocks)?;
            let bytes = self.luns[src].data[r].to_vec();
            let w = self.extent(dst, be(&d[20..28]), blocks)?;
            self.luns[dst].data[w].copy_from_slice(&bytes);
        }
        Ok(param.len())
    }

    fn dispatch(&mut self, lun: usize, cdb: &[u8], data: &mut [u8]) -> Result<usize, Sense> {
        match cdb[0] {
            0x00 => Ok(0),
            0x12 => self.inquiry(lun, cdb, data),
            0x25 => Ok(self.capacity(lun, false, data)),
            0x9E if cdb[1] & 0x1F == 0x10 => Ok(self.capacity(lun, true, data)),
            0x28 => self.read(lun, be(&cdb[2..6]), be(&cdb[7..9]), data),
            0x88 => self.read(lun, be(&cdb[2..10]), be(&cdb[10..14]), data),
            0x2A => self.write(lun, be(&cdb[2..6]), be(&cdb[7..9]), data),
            0x8A => self.write(lun, be(&cdb[2..10]), be(&cdb[10..14]), data),
            0x83 => match cdb[1] & 0x1F {
                0x10 => self.populate_token(lun, cdb, data),
                0x11 => self.write_using_token(lun, cdb, data),
                0x00 => self.extended_copy(data),
                _ => Err(INVALID_FIELD),
            },
            0x84 if cdb[1] & 0x1F == 0x07 => {
                let list_id = be(&cdb[2..6]) as u32;
                let info = self.results.get(&(lun, list_id)).ok_or(INVALID_FIELD)?;
                Ok(put(data, info))
            },
            _ => Err(INVALID_OPCODE),
        }
    }
}

fn check_condition(sense: &mut [u8], (key, asc, ascq): Sense) -> SubmitOutcome {
    let mut s = [0u8; 18];
    s[0] = 0x70;
    s[2] = key;
    s[7] = 10;
    s[12] = asc;
    s[13] = ascq;
    SubmitOutcome {
        scsi_status: CHECK_CONDITION,
        sense_len: put(sense, &s),
        ..Default::default()
    }
}

/// One handle onto a LUN of a shared array.
pub struct SimDevice {
    array: SharedArray,
    lun: usize,
}

impl SimDevice {
    pub fn boxed(array: &SharedArray, lun: usize) -> Box<dyn Submitter> {
        Box::new(SimDevice {
            array: Arc::clone(array),
            lun,
        })
    }
}

impl Submitter for SimDevice {
    fn submit(&mut self, req: SubmitRequest<'_>, sense: &mut [u8]) -> SubmitOutcome {
        let Ok(mut array) = self.array.lock() else {
            return SubmitOutcome::os_failure(EIO);
        };
        array.luns[self.lun].cdbs.push(req.cdb.to_vec());
        if let Some(fault) = array.take_fault(self.lun, req.cdb[0]) {
            return match fault {
                Fault::Os(errno) => SubmitOutcome::os_failure(errno),
                Fault::Status(status) => SubmitOutcome {
                    scsi_status: status,
                    ..Default::default()
                },
                Fault::Check(s) => check_condition(sense, s),
            };
        }
        let len = req.data.len();
        match array.dispatch(self.lun, req.cdb, req.data) {
            Ok(n) => SubmitOutcome {
                resid: len - n.min(len),
                ..Default::default()
            },
            Err(s) => check_condition(sense, s),
        }
    }

    fn is_os_retryable(&self, os_error: i32) -> bool {
        os_error == EAGAIN
    }
}

/// Defaults with no retry delay, so failure tests run instantly.
pub fn quick_config() -> Config {
    let mut cfg = Config::default();
    cfg.recovery.delay = Duration::ZERO;
    cfg.recovery.retries = 5;
    cfg
}
