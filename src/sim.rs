//! A simulated SWD target for tests.
//!
//! Models posted AP reads, SELECT banking, the CTRL/STAT handshakes, MEM-APs
//! whose TAR auto-increment wraps inside 1 KiB, latched faults, unacknowledged
//! transfers and an authentication-style register AP.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use crate::dp::Dp;
use crate::probe::{DapError, Port, Probe};

pub const AHB_AP_IDR: u32 = 0x2477_0011;
pub const AAP_IDR: u32 = 0x16E6_0001;
pub const AAP_KEY: u32 = 0xCFAC_C118;

const STICKYERR: u32 = 1 << 5;

pub enum SimApKind {
    Mem,
    /// CMD/CMDKEY/STATUS register file of an authentication AP.
    Aap { regs: HashMap<u8, u32>, busy_polls: u32 },
}

pub struct SimAp {
    pub idr: u32,
    pub cfg: u32,
    pub base: u32,
    pub csw: u32,
    pub tar: u32,
    pub kind: SimApKind,
}

pub struct SimState {
    pub idcode: u32,
    pub targetid: u32,
    pub ctrlstat: u32,
    pub select: u32,
    pub rdbuff: u32,
    pub power_ack: bool,
    pub reset_ack: bool,
    /// Number of upcoming CTRL/STAT reads that time out.
    pub ctrlstat_timeouts: u32,
    pub aps: BTreeMap<u8, SimAp>,
    /// Word-addressed memory shared by every MEM-AP.
    pub mem: HashMap<u32, u32>,
    /// Words that read back a fixed value and ignore writes.
    pub fixed: HashMap<u32, u32>,
    /// Words whose access latches STICKYERR.
    pub faulty: HashSet<u32>,
    /// Words whose data read gets no acknowledge at all.
    pub unacked: HashSet<u32>,
    /// Address of every MEM-AP data transfer, in order.
    pub transfers: Vec<u32>,
    pub aborts: Vec<u32>,
    pub aap_erased: bool,
}

impl SimState {
    pub fn new(idcode: u32) -> Self {
        Self {
            idcode,
            targetid: 0,
            ctrlstat: 0,
            select: 0,
            rdbuff: 0,
            power_ack: true,
            reset_ack: true,
            ctrlstat_timeouts: 0,
            aps: BTreeMap::new(),
            mem: HashMap::new(),
            fixed: HashMap::new(),
            faulty: HashSet::new(),
            unacked: HashSet::new(),
            transfers: Vec::new(),
            aborts: Vec::new(),
            aap_erased: false,
        }
    }

    pub fn into_dp(self) -> (Rc<Dp>, Rc<RefCell<SimState>>) {
        let state = Rc::new(RefCell::new(self));
        let dp = Rc::new(Dp::new(Box::new(Sim(state.clone()))));
        (dp, state)
    }

    pub fn add_mem_ap(&mut self, apsel: u8, base: u32) {
        self.aps.insert(
            apsel,
            SimAp {
                idr: AHB_AP_IDR,
                cfg: 0,
                base,
                csw: 0x2300_0052,
                tar: 0,
                kind: SimApKind::Mem,
            },
        );
    }

    pub fn add_aap(&mut self, apsel: u8) {
        self.aps.insert(
            apsel,
            SimAp {
                idr: AAP_IDR,
                cfg: 0,
                base: 0,
                csw: 0,
                tar: 0,
                kind: SimApKind::Aap {
                    regs: HashMap::new(),
                    busy_polls: 0,
                },
            },
        );
    }

    pub fn write_word(&mut self, addr: u32, val: u32) {
        self.mem.insert(addr & !3, val);
    }

    pub fn read_word(&self, addr: u32) -> u32 {
        let addr = addr & !3;
        self.fixed
            .get(&addr)
            .or_else(|| self.mem.get(&addr))
            .copied()
            .unwrap_or(0)
    }

    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            let a = addr + i as u32;
            let shift = (a & 3) * 8;
            let word = self.read_word(a);
            self.write_word(a, (word & !(0xFF << shift)) | (*b as u32) << shift);
        }
    }

    pub fn read_bytes(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len as u32)
            .map(|i| {
                let a = addr + i;
                (self.read_word(a) >> ((a & 3) * 8)) as u8
            })
            .collect()
    }

    /// Lay out CIDR/PIDR for a CoreSight component at `base`.
    pub fn put_component(&mut self, base: u32, class: u8, pidr: u64) {
        let cid = [0x0D, class << 4, 0x05, 0xB1];
        for (i, b) in cid.iter().enumerate() {
            self.write_word(base.wrapping_add(0xFF0 + 4 * i as u32), *b as u32);
        }
        for i in 0..4 {
            self.write_word(base.wrapping_add(0xFE0 + 4 * i), (pidr >> (8 * i)) as u32 & 0xFF);
            self.write_word(base.wrapping_add(0xFD0 + 4 * i), (pidr >> (32 + 8 * i)) as u32 & 0xFF);
        }
    }

    pub fn put_rom_table(&mut self, base: u32, entries: &[u32]) {
        self.put_component(base, 0x1, 0x4_000B_B4C3);
        for (i, e) in entries.iter().enumerate() {
            self.write_word(base + 4 * i as u32, *e);
        }
    }

    fn mem_transfer(&mut self, addr: u32) -> bool {
        self.transfers.push(addr);
        if self.faulty.contains(&(addr & !3)) {
            self.ctrlstat |= STICKYERR;
            return false;
        }
        true
    }

    fn ap_read(&mut self, apsel: u8, reg: u8) -> u32 {
        let Some(ap) = self.aps.get_mut(&apsel) else {
            return 0;
        };
        match reg {
            0xFC => return ap.idr,
            0xF8 => return ap.base,
            0xF4 => return ap.cfg,
            _ => {}
        }
        let addr = match &mut ap.kind {
            SimApKind::Mem => match reg {
                0x00 => return ap.csw,
                0x04 => return ap.tar,
                0x0C => {
                    let addr = ap.tar;
                    ap.tar = advance(ap.csw, ap.tar);
                    addr
                }
                _ => return 0,
            },
            SimApKind::Aap { regs, busy_polls } => {
                if reg == 0x08 && *busy_polls > 0 {
                    *busy_polls -= 1;
                    return 1;
                }
                return regs.get(&reg).copied().unwrap_or(0);
            }
        };
        if self.mem_transfer(addr) {
            self.read_word(addr)
        } else {
            0
        }
    }

    fn ap_write(&mut self, apsel: u8, reg: u8, val: u32) {
        let Some(ap) = self.aps.get_mut(&apsel) else {
            return;
        };
        let (addr, bytes) = match &mut ap.kind {
            SimApKind::Mem => match reg {
                0x00 => {
                    ap.csw = val;
                    return;
                }
                0x04 => {
                    ap.tar = val;
                    return;
                }
                0x0C => {
                    let addr = ap.tar;
                    ap.tar = advance(ap.csw, ap.tar);
                    (addr, 1u32 << (ap.csw & 7))
                }
                _ => return,
            },
            SimApKind::Aap { regs, busy_polls } => {
                regs.insert(reg, val);
                if reg == 0x00 && val == 1 && regs.get(&0x04) == Some(&AAP_KEY) {
                    *busy_polls = 3;
                    self.aap_erased = true;
                }
                return;
            }
        };
        if !self.mem_transfer(addr) || self.fixed.contains_key(&(addr & !3)) {
            return;
        }
        let mask = if bytes == 4 {
            u32::MAX
        } else {
            ((1 << (bytes * 8)) - 1) << ((addr & 3) * 8)
        };
        let word = self.read_word(addr);
        self.write_word(addr, (word & !mask) | (val & mask));
    }
}

/// TAR after one transfer: auto-increment only carries within the low 10 bits.
fn advance(csw: u32, tar: u32) -> u32 {
    if (csw >> 4) & 3 != 1 {
        return tar;
    }
    let bytes = 1 << (csw & 7);
    (tar & !0x3FF) | (tar.wrapping_add(bytes) & 0x3FF)
}

pub struct Sim(pub Rc<RefCell<SimState>>);

impl Probe for Sim {
    fn raw_read(&mut self, port: Port, addr: u8) -> Result<u32, anyhow::Error> {
        let s = &mut *self.0.borrow_mut();
        match port {
            Port::Dp => match addr {
                0x0 => Ok(s.idcode),
                0x4 if s.select & 0xF == 2 => Ok(s.targetid),
                0x4 => {
                    if s.ctrlstat_timeouts > 0 {
                        s.ctrlstat_timeouts -= 1;
                        return Err(DapError::Timeout.into());
                    }
                    Ok(s.ctrlstat)
                }
                0xC => Ok(s.rdbuff),
                _ => Ok(0),
            },
            Port::Ap => {
                let apsel = (s.select >> 24) as u8;
                let reg = (s.select & 0xF0) as u8 | (addr & 0xF);
                if reg == 0x0C && s.aps.get(&apsel).is_some_and(|ap| s.unacked.contains(&(ap.tar & !3))) {
                    return Err(DapError::NoAcknowledge.into());
                }
                let val = s.ap_read(apsel, reg);
                Ok(std::mem::replace(&mut s.rdbuff, val))
            }
        }
    }

    fn raw_write(&mut self, port: Port, addr: u8, val: u32) -> Result<(), anyhow::Error> {
        let s = &mut *self.0.borrow_mut();
        match port {
            Port::Dp => match addr {
                0x0 => {
                    s.aborts.push(val);
                    let clears = [(4, 1), (3, 7), (2, 5), (1, 4)];
                    for (abort_bit, ctrl_bit) in clears {
                        if val & (1 << abort_bit) != 0 {
                            s.ctrlstat &= !(1 << ctrl_bit);
                        }
                    }
                }
                0x4 if s.select & 0xF == 0 => {
                    let sticky = s.ctrlstat & 0xB2;
                    let mut ctrl = sticky | (val & (1 << 30 | 1 << 28 | 1 << 26));
                    if s.power_ack {
                        ctrl |= (val & (1 << 30 | 1 << 28)) << 1;
                    }
                    if s.reset_ack {
                        ctrl |= (val & 1 << 26) << 1;
                    }
                    s.ctrlstat = ctrl;
                }
                0x8 => s.select = val,
                _ => {}
            },
            Port::Ap => {
                let apsel = (s.select >> 24) as u8;
                let reg = (s.select & 0xF0) as u8 | (addr & 0xF);
                s.ap_write(apsel, reg, val);
            }
        }
        Ok(())
    }
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
