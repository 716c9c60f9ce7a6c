//! Block memory access through a MEM-AP.

use scroll::{Pread, Pwrite, LE};
use tracing::trace;

use crate::ap::{regs, Ap};
use crate::dp::regs::RDBUFF_ADDR;
use crate::probe::Port;

/// TAR auto-increment is only guaranteed within a 1 KiB block.
const AUTOINC_BOUNDARY: u32 = 0x400;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Align {
    Byte,
    HalfWord,
    Word,
}

impl Align {
    /// Coarsest access width `x` is aligned to.
    pub fn of(x: u32) -> Self {
        if x & 3 == 0 {
            Self::Word
        } else if x & 1 == 0 {
            Self::HalfWord
        } else {
            Self::Byte
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::HalfWord => 2,
            Self::Word => 4,
        }
    }

    fn csw_size(self) -> u8 {
        match self {
            Self::Byte => regs::CSW_SIZE_BYTE,
            Self::HalfWord => regs::CSW_SIZE_HALFWORD,
            Self::Word => regs::CSW_SIZE_WORD,
        }
    }
}

fn crosses_boundary(a: u32, b: u32) -> bool {
    (a ^ b) & !(AUTOINC_BOUNDARY - 1) != 0
}

/// Pull the element for `addr` out of its byte lane.
fn extract(dest: &mut [u8], addr: u32, val: u32) {
    let val = val >> ((addr & 3) * 8);
    dest.copy_from_slice(&val.to_le_bytes()[..dest.len()]);
}

/// Place the element for `addr` in its byte lane.
fn pack(src: &[u8], addr: u32) -> u32 {
    let mut word = [0u8; 4];
    word[..src.len()].copy_from_slice(src);
    u32::from_le_bytes(word) << ((addr & 3) * 8)
}

impl Ap {
    fn mem_access_setup(&self, addr: u32, align: Align) -> Result<(), anyhow::Error> {
        let mut csw = self.csw();
        csw.set_addr_inc(regs::CSW_ADDRINC_SINGLE);
        csw.set_size(align.csw_size());
        self.write(regs::CSW_ADDR, csw.0)?;
        self.dp().raw_write(Port::Ap, regs::TAR_ADDR, addr)
    }

    /// Read `dest.len()` bytes starting at `src`.
    ///
    /// Faults are not reported here; check [`Dp::error`](crate::dp::Dp::error) afterwards.
    pub fn mem_read(&self, dest: &mut [u8], src: u32) -> Result<(), anyhow::Error> {
        if dest.is_empty() {
            return Ok(());
        }
        let align = Align::of(src).min(Align::of(dest.len() as u32));
        let width = align.bytes();
        trace!("mem_read {:#010x} len {} width {}", src, dest.len(), width);

        self.mem_access_setup(src, align)?;
        let dp = self.dp();
        // Reads are posted: this one only starts the first transfer.
        dp.raw_read(Port::Ap, regs::DRW_ADDR)?;

        let mut chunks = dest.chunks_exact_mut(width);
        let count = chunks.len();
        let mut addr = src;
        let mut tar = src;
        for chunk in chunks.by_ref().take(count - 1) {
            let val = dp.raw_read(Port::Ap, regs::DRW_ADDR)?;
            extract(chunk, addr, val);
            addr = addr.wrapping_add(width as u32);
            if crosses_boundary(addr, tar) {
                tar = addr;
                dp.raw_write(Port::Ap, regs::TAR_ADDR, addr)?;
                dp.raw_read(Port::Ap, regs::DRW_ADDR)?;
            }
        }

        let val = dp.raw_read(Port::Dp, RDBUFF_ADDR)?;
        if let Some(last) = chunks.next() {
            extract(last, addr, val);
        }
        Ok(())
    }

    /// Write `src` to target memory at `dest`.
    pub fn mem_write(&self, dest: u32, src: &[u8]) -> Result<(), anyhow::Error> {
        if src.is_empty() {
            return Ok(());
        }
        let align = Align::of(dest).min(Align::of(src.len() as u32));
        self.mem_write_sized(dest, src, align)
    }

    /// Write with an explicit access width. `src.len()` must be a multiple of it.
    pub fn mem_write_sized(&self, dest: u32, src: &[u8], align: Align) -> Result<(), anyhow::Error> {
        if src.is_empty() {
            return Ok(());
        }
        let width = align.bytes();
        trace!("mem_write {:#010x} len {} width {}", dest, src.len(), width);

        self.mem_access_setup(dest, align)?;
        let dp = self.dp();
        let mut addr = dest;
        let mut tar = dest;
        for chunk in src.chunks_exact(width) {
            dp.raw_write(Port::Ap, regs::DRW_ADDR, pack(chunk, addr))?;
            addr = addr.wrapping_add(width as u32);
            if crosses_boundary(addr, tar) {
                tar = addr;
                dp.raw_write(Port::Ap, regs::TAR_ADDR, addr)?;
            }
        }
        Ok(())
    }

    pub fn mem_read32(&self, addr: u32) -> Result<u32, anyhow::Error> {
        let mut buf = [0u8; 4];
        self.mem_read(&mut buf, addr)?;
        Ok(buf.pread_with::<u32>(0, LE)?)
    }

    pub fn mem_write32(&self, addr: u32, val: u32) -> Result<(), anyhow::Error> {
        let mut buf = [0u8; 4];
        buf.pwrite_with(val, 0, LE)?;
        self.mem_write(addr, &buf)
    }

    pub fn mem_read16(&self, addr: u32) -> Result<u16, anyhow::Error> {
        let mut buf = [0u8; 2];
        self.mem_read(&mut buf, addr)?;
        Ok(buf.pread_with::<u16>(0, LE)?)
    }
}
