use std::rc::Rc;

use tracing::debug;

use crate::dp::Dp;

/// An access port behind a [`Dp`].
///
/// Every `Ap` keeps its DP alive. Cloning the `Rc<Ap>` is how a target
/// holds on to the port after discovery has moved on.
pub struct Ap {
    dp: Rc<Dp>,
    apsel: u8,
    idr: u32,
    base: u32,
    csw: regs::Csw,
}

impl Ap {
    /// Probe APSEL `apsel`. `Ok(None)` means nothing answers there (IDR reads zero).
    pub fn new(dp: Rc<Dp>, apsel: u8) -> Result<Option<Self>, anyhow::Error> {
        let idr = dp.read_ap(apsel, regs::IDR_ADDR)?;
        if idr == 0 {
            return Ok(None);
        }

        let cfg = dp.read_ap(apsel, regs::CFG_ADDR)?;
        let base = dp.read_ap(apsel, regs::BASE_ADDR)?;
        let mut csw = regs::Csw(dp.read_ap(apsel, regs::CSW_ADDR)?);
        csw.set_size(0);
        csw.set_addr_inc(0);
        if csw.tr_in_prog() {
            debug!("AP {}: transaction in progress, target may not be usable", apsel);
            csw.set_tr_in_prog(false);
        }

        let id = regs::Idr(idr);
        debug!(
            "AP {:3}: IDR={:08x} (class {} type {} rev {}) CFG={:08x} BASE={:08x} CSW={:08x}",
            apsel,
            idr,
            id.class(),
            id.ap_type(),
            id.revision(),
            cfg,
            base,
            csw.0
        );

        Ok(Some(Self {
            dp,
            apsel,
            idr,
            base,
            csw,
        }))
    }

    pub fn dp(&self) -> &Rc<Dp> {
        &self.dp
    }

    pub fn apsel(&self) -> u8 {
        self.apsel
    }

    pub fn idr(&self) -> u32 {
        self.idr
    }

    /// Raw BASE register.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// CSW with SIZE, ADDRINC and TRINPROG cleared; memory accesses OR their settings into it.
    pub fn csw(&self) -> regs::Csw {
        self.csw
    }

    /// Address of the first debug component, if BASE points at one.
    pub fn debug_base(&self) -> Option<u32> {
        let base = regs::Base(self.base);
        if self.base == regs::BASE_NOT_PRESENT || !base.present() {
            return None;
        }
        Some(self.base & !3)
    }

    pub fn read(&self, addr: u8) -> Result<u32, anyhow::Error> {
        self.dp.read_ap(self.apsel, addr)
    }

    pub fn write(&self, addr: u8, val: u32) -> Result<(), anyhow::Error> {
        self.dp.write_ap(self.apsel, addr, val)
    }
}

pub mod regs {
    use bitfield::bitfield;

    pub const CSW_ADDR: u8 = 0x00;
    pub const TAR_ADDR: u8 = 0x04;
    pub const DRW_ADDR: u8 = 0x0C;
    pub const CFG_ADDR: u8 = 0xF4;
    pub const BASE_ADDR: u8 = 0xF8;
    pub const IDR_ADDR: u8 = 0xFC;

    /// Legacy "no debug entries" BASE value.
    pub const BASE_NOT_PRESENT: u32 = 0xFFFF_FFFF;

    pub const CSW_SIZE_BYTE: u8 = 0;
    pub const CSW_SIZE_HALFWORD: u8 = 1;
    pub const CSW_SIZE_WORD: u8 = 2;
    pub const CSW_ADDRINC_SINGLE: u8 = 1;

    bitfield! {
        /// CSW, MEM-AP Control/Status Word (AP address 0x00)
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct Csw(u32);
        impl Debug;
        pub dbg_sw_enable, set_dbg_sw_enable: 31;
        pub u8, prot, set_prot: 30, 24;
        pub spiden, _: 23;
        pub u8, mode, set_mode: 11, 8;
        /// A transfer is still in progress on the memory bus.
        pub tr_in_prog, set_tr_in_prog: 7;
        pub device_en, _: 6;
        /// 0 off, 1 single, 2 packed.
        pub u8, addr_inc, set_addr_inc: 5, 4;
        /// 0 byte, 1 halfword, 2 word.
        pub u8, size, set_size: 2, 0;
    }

    bitfield! {
        /// BASE, debug base address (AP address 0xF8)
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct Base(u32);
        impl Debug;
        pub present, _: 0;
    }

    bitfield! {
        /// IDR, AP identification register (AP address 0xFC)
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct Idr(u32);
        impl Debug;
        pub u8, revision, _: 31, 28;
        pub u8, class, _: 16, 13;
        pub u8, ap_type, _: 3, 0;
    }
}
