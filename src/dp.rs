use std::cell::{Cell, RefCell};

use anyhow::{bail, Context};
use tracing::{debug, trace};

use crate::config::Config;
use crate::probe::{self, Port, Probe};
use crate::timeout::Timeout;

/// Debug port architecture version, from DPIDR.VERSION.
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum DpVersion {
    V0,
    V1,
    V2,
    Other(u8),
}

impl From<u8> for DpVersion {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::V0,
            1 => Self::V1,
            2 => Self::V2,
            v => Self::Other(v),
        }
    }
}

/// One debug port, shared by every AP discovered behind it.
///
/// Hold it in an `Rc`: APs keep a strong reference, so the DP lives until
/// the last AP (and any target built on it) is dropped.
pub struct Dp {
    inner: RefCell<DpInner>,
    idcode: Cell<u32>,
    targetid: Cell<Option<u32>>,
}

struct DpInner {
    probe: Box<dyn Probe>,
    last_select: Option<regs::Select>,
}

impl Dp {
    pub fn new(probe: Box<dyn Probe>) -> Self {
        Self {
            inner: RefCell::new(DpInner {
                probe,
                last_select: None,
            }),
            idcode: Cell::new(0),
            targetid: Cell::new(None),
        }
    }

    /// DPIDR as read by [`Dp::init`].
    pub fn idcode(&self) -> u32 {
        self.idcode.get()
    }

    /// TARGETID, only present on DPv2.
    pub fn targetid(&self) -> Option<u32> {
        self.targetid.get()
    }

    pub fn version(&self) -> DpVersion {
        regs::DPIDR(self.idcode()).version().into()
    }

    /// Bring the link up: power-up handshake, debug reset pulse and identification.
    #[tracing::instrument(skip_all)]
    pub fn init(&self, config: &Config) -> Result<(), anyhow::Error> {
        let inner = &mut *self.inner.borrow_mut();

        let mut ctrl = match inner.read_ctrl() {
            Ok(ctrl) => ctrl,
            Err(e) if probe::is_timeout(&e) => {
                debug!("CTRL/STAT read timed out, sending DAPABORT");
                let mut abort = regs::Abort(0);
                abort.set_dapabort(true);
                inner.write_abort(abort)?;
                inner.read_ctrl().context("DP not responding after DAPABORT")?
            }
            Err(e) => return Err(e),
        };

        ctrl.set_csyspwrupreq(true);
        ctrl.set_cdbgpwrupreq(true);
        inner.write_ctrl(ctrl)?;

        let timeout = Timeout::from_ms(config.power_up_timeout_ms);
        loop {
            let ctrl = inner.read_ctrl()?;
            if ctrl.csyspwrupack() && ctrl.cdbgpwrupack() {
                break;
            }
            if timeout.is_expired() {
                bail!("powerup timeout")
            }
        }

        // Some parts never assert CDBGRSTACK, so both halves of the
        // handshake give up quietly after the reset timeout.
        ctrl.set_cdbgrstreq(true);
        inner.write_ctrl(ctrl)?;
        let timeout = Timeout::new(config.reset_timeout_ms);
        loop {
            if inner.read_ctrl()?.cdbgrstack() {
                break;
            }
            if timeout.is_expired() {
                debug!("no CDBGRSTACK, continuing");
                break;
            }
        }

        ctrl.set_cdbgrstreq(false);
        inner.write_ctrl(ctrl)?;
        let timeout = Timeout::new(config.reset_timeout_ms);
        loop {
            if !inner.read_ctrl()?.cdbgrstack() {
                break;
            }
            if timeout.is_expired() {
                debug!("CDBGRSTACK stuck high, continuing");
                break;
            }
        }

        let idcode = inner.read(regs::DPIDR_ADDR)?;
        self.idcode.set(idcode);
        debug!("dpidr {:#010x}", idcode);

        if regs::DPIDR(idcode).version() == 2 {
            inner.select(|s| s.set_dp_bank_sel(2))?;
            let targetid = inner.read(regs::TARGETID_ADDR)?;
            inner.select(|s| s.set_dp_bank_sel(0))?;
            let t = regs::TARGETID(targetid);
            debug!(
                "targetid {:#010x}: designer {:#x} part {:#x} rev {}",
                targetid,
                t.tdesigner(),
                t.tpartno(),
                t.trevision()
            );
            self.targetid.set(Some(targetid));
        }

        Ok(())
    }

    pub fn read(&self, addr: u8) -> Result<u32, anyhow::Error> {
        let inner = &mut *self.inner.borrow_mut();
        inner.read(addr)
    }

    pub fn write(&self, addr: u8, val: u32) -> Result<(), anyhow::Error> {
        let inner = &mut *self.inner.borrow_mut();
        inner.write(addr, val)
    }

    pub fn read_ap(&self, ap: u8, addr: u8) -> Result<u32, anyhow::Error> {
        let inner = &mut *self.inner.borrow_mut();
        inner.select(|s| {
            s.set_ap_sel(ap);
            s.set_ap_bank_sel(addr >> 4)
        })?;
        inner.probe.raw_read(Port::Ap, addr & 0xF)?;
        inner.read(regs::RDBUFF_ADDR)
    }

    pub fn write_ap(&self, ap: u8, addr: u8, val: u32) -> Result<(), anyhow::Error> {
        let inner = &mut *self.inner.borrow_mut();
        inner.select(|s| {
            s.set_ap_sel(ap);
            s.set_ap_bank_sel(addr >> 4)
        })?;
        inner.probe.raw_write(Port::Ap, addr & 0xF, val)?;
        inner.read(regs::RDBUFF_ADDR)?;
        Ok(())
    }

    /// A single transfer with no SELECT update and no RDBUFF drain.
    ///
    /// Used by the memory engine to stream DRW accesses once CSW/TAR are set up.
    pub fn raw_read(&self, port: Port, addr: u8) -> Result<u32, anyhow::Error> {
        self.inner.borrow_mut().probe.raw_read(port, addr)
    }

    pub fn raw_write(&self, port: Port, addr: u8, val: u32) -> Result<(), anyhow::Error> {
        self.inner.borrow_mut().probe.raw_write(port, addr, val)
    }

    /// Read the sticky error flags and clear any that are set.
    ///
    /// Returns true if a fault was latched since the last call.
    pub fn error(&self) -> Result<bool, anyhow::Error> {
        let inner = &mut *self.inner.borrow_mut();
        let ctrl = inner.read_ctrl()?;

        let mut abort = regs::Abort(0);
        abort.set_stkerrclr(ctrl.sticky_err());
        abort.set_stkcmpclr(ctrl.stick_cmp());
        abort.set_orunerrclr(ctrl.sticky_orun());
        abort.set_wderrclr(ctrl.w_data_err());
        if abort.0 == 0 {
            return Ok(false);
        }

        trace!("sticky flags in {:?}, clearing", ctrl);
        inner.write_abort(abort)?;
        Ok(true)
    }
}

impl DpInner {
    fn read(&mut self, addr: u8) -> Result<u32, anyhow::Error> {
        self.probe.raw_read(Port::Dp, addr)
    }

    fn write(&mut self, addr: u8, val: u32) -> Result<(), anyhow::Error> {
        self.probe.raw_write(Port::Dp, addr, val)
    }

    fn read_ctrl(&mut self) -> Result<regs::Ctrl, anyhow::Error> {
        self.read(regs::CTRL_ADDR).map(regs::Ctrl)
    }

    fn write_ctrl(&mut self, val: regs::Ctrl) -> Result<(), anyhow::Error> {
        self.write(regs::CTRL_ADDR, val.0)
    }

    fn write_abort(&mut self, val: regs::Abort) -> Result<(), anyhow::Error> {
        self.write(regs::ABORT_ADDR, val.0)
    }

    fn select(&mut self, f: impl FnOnce(&mut regs::Select)) -> Result<(), anyhow::Error> {
        let mut select = self.last_select.unwrap_or(regs::Select(0));
        f(&mut select);

        if self.last_select == Some(select) {
            return Ok(());
        }

        // forget the cached value until the write has gone through.
        self.last_select = None;

        trace!("select {:?}", select);
        self.write(regs::SELECT_ADDR, select.0)?;

        self.last_select = Some(select);

        Ok(())
    }
}

pub mod regs {
    use bitfield::bitfield;

    pub const ABORT_ADDR: u8 = 0x0;
    pub const DPIDR_ADDR: u8 = 0x0;
    pub const CTRL_ADDR: u8 = 0x4;
    /// TARGETID shares address 0x4 with CTRL/STAT, in DP bank 2.
    pub const TARGETID_ADDR: u8 = 0x4;
    pub const SELECT_ADDR: u8 = 0x8;
    pub const RDBUFF_ADDR: u8 = 0xC;

    bitfield! {
        /// ABORT (write-only, DP address 0x0)
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct Abort(u32);
        impl Debug;
        /// Clears CTRL/STAT.STICKYORUN.
        pub _, set_orunerrclr: 4;
        /// Clears CTRL/STAT.WDATAERR.
        pub _, set_wderrclr: 3;
        /// Clears CTRL/STAT.STICKYERR.
        pub _, set_stkerrclr: 2;
        /// Clears CTRL/STAT.STICKYCMP.
        pub _, set_stkcmpclr: 1;
        /// Cancels the AP transaction in flight. Only needed after a run of WAIT responses.
        pub _, set_dapabort: 0;
    }

    bitfield! {
        /// CTRL/STAT (DP address 0x4, bank 0)
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct Ctrl(u32);
        impl Debug;
        pub csyspwrupack, _: 31;
        pub csyspwrupreq, set_csyspwrupreq: 30;
        pub cdbgpwrupack, _: 29;
        pub cdbgpwrupreq, set_cdbgpwrupreq: 28;
        /// Not implemented by every part; may stay low after CDBGRSTREQ.
        pub cdbgrstack, _: 27;
        pub cdbgrstreq, set_cdbgrstreq: 26;
        pub u16, trn_cnt, set_trn_cnt: 23, 12;
        pub u8, mask_lane, set_mask_lane: 11, 8;
        pub w_data_err, _ : 7;
        pub read_ok, _ : 6;
        /// An AP transaction returned FAULT. Cleared through ABORT.STKERRCLR.
        pub sticky_err, _: 5;
        pub stick_cmp, _: 4;
        pub u8, trn_mode, _: 3, 2;
        pub sticky_orun, _: 1;
        pub orun_detect, set_orun_detect: 0;
    }

    bitfield! {
        /// SELECT (DP address 0x8)
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct Select(u32);
        impl Debug;
        pub u8, ap_sel, set_ap_sel: 31, 24;
        /// Bank of four AP registers visible at 0x0..0xC.
        pub u8, ap_bank_sel, set_ap_bank_sel: 7, 4;
        /// DP register at 0x4: 0 CTRL/STAT, 1 DLCR, 2 TARGETID, 3 DLPIDR, 4 EVENTSTAT.
        pub u8, dp_bank_sel, set_dp_bank_sel: 3, 0;
    }

    bitfield! {
        /// DPIDR (DP address 0x0, read)
        #[derive(Clone, Eq, PartialEq)]
        pub struct DPIDR(u32);
        impl Debug;
        pub u8, revision, _: 31, 28;
        pub u8, part_no, _: 27, 20;
        pub min, _: 16;
        /// 1 for DPv1, 2 for DPv2. DPv0 has no DPIDR.
        pub u8, version, _: 15, 12;
        pub designer, _: 11, 1;
        pub u8, jep_cc, _: 11, 8;
        pub u8, jep_id, _: 7, 1;
    }

    bitfield! {
        /// TARGETID (DP address 0x4, bank 2, DPv2 only)
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct TARGETID(u32);
        impl Debug;
        pub u8, trevision, _: 31, 28;
        pub u16, tpartno, _: 27, 12;
        pub u16, tdesigner, _: 11, 1;
    }
}
