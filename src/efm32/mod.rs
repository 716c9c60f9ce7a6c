//! Silicon Labs EFM32, EZR32 and EFR32 parts.
//!
//! The family is read from the Device Information (DI) page, whose layout
//! depends on the chip series. Flash is driven through the MSC: erase by
//! page from the debugger, programming via a small stub run on the core.

use std::fmt::{self, Write as _};
use std::rc::Rc;

use scroll::{Pread, Pwrite, LE};
use tracing::{debug, trace, Level};

use crate::cortexm;
use crate::target::{Command, FlashDriver, FlashRegion, Target, TargetError};

pub mod aap;
pub mod devices;

use devices::{DiLayout, Device, PkgInfo};

pub const INFO_BASE: u32 = 0x0FE0_0000;
pub const USER_DATA_BASE: u32 = INFO_BASE;
/// Series 2 parts have no lock bits page in flash.
pub const LOCK_BITS_BASE: u32 = INFO_BASE + 0x4000;
pub const BOOTLOADER_BASE: u32 = INFO_BASE + 0x10000;
pub const CLW0_ADDR: u32 = LOCK_BITS_BASE + 4 * 122;
pub const CLW0_BOOTLOADER_ENABLE: u32 = 1 << 1;

pub const SRAM_BASE: u32 = 0x2000_0000;

const LOCK_KEY: u32 = 0x1B71;
const MASSLOCK_KEY: u32 = 0x631A;

const WRITECTRL_WREN: u32 = 1 << 0;

const WRITECMD_LADDRIM: u32 = 1 << 0;
const WRITECMD_ERASEPAGE: u32 = 1 << 1;
const WRITECMD_WRITEONCE: u32 = 1 << 3;
const WRITECMD_ERASEMAIN0: u32 = 1 << 8;

const STATUS_BUSY: u32 = 1 << 0;

/// Series 2 MSC base, with its own register layout.
const MSC_SERIES2: u32 = 0x4003_0000;
const MSC_GECKO: u32 = 0x400C_0000;

/// Memory System Controller register addresses.
#[derive(Copy, Clone, Debug)]
struct Msc(u32);

impl Msc {
    fn series2(self) -> bool {
        self.0 == MSC_SERIES2
    }

    fn writectrl(self) -> u32 {
        self.0 + if self.series2() { 0x0C } else { 0x08 }
    }

    fn writecmd(self) -> u32 {
        self.0 + if self.series2() { 0x10 } else { 0x0C }
    }

    fn addrb(self) -> u32 {
        self.0 + if self.series2() { 0x14 } else { 0x10 }
    }

    fn wdata(self) -> u32 {
        self.0 + 0x18
    }

    fn status(self) -> u32 {
        self.0 + 0x1C
    }

    fn if_(self) -> u32 {
        self.0 + if self.series2() { 0x20 } else { 0x30 }
    }

    fn lock(self) -> u32 {
        self.0 + if self.series2() || self.0 == MSC_GECKO { 0x3C } else { 0x40 }
    }

    fn masslock(self) -> u32 {
        self.0 + if self.series2() { 0x40 } else { 0x54 }
    }
}

/// Thumb routine writing r2 bytes from r1 to flash at r0, one word at a
/// time. r3 points to the MSC ADDRB, WRITECMD, WDATA and STATUS addresses.
/// Ends on a breakpoint.
const FLASH_STUB: [u16; 24] = [
    0x2A00, // cmp   r2, #0
    0xD013, // beq   done
    0x681C, // ldr   r4, [r3, #0]
    0x6020, // str   r0, [r4]
    0x685C, // ldr   r4, [r3, #4]
    0x2501, // movs  r5, #LADDRIM
    0x6025, // str   r5, [r4]
    0x680D, // ldr   r5, [r1]
    0x689C, // ldr   r4, [r3, #8]
    0x6025, // str   r5, [r4]
    0x685C, // ldr   r4, [r3, #4]
    0x2508, // movs  r5, #WRITEONCE
    0x6025, // str   r5, [r4]
    0x68DC, // ldr   r4, [r3, #12]
    0x6825, // ldr   r5, [r4]
    0x2601, // movs  r6, #BUSY
    0x4235, // tst   r5, r6
    0xD1FB, // bne   busy
    0x3004, // adds  r0, #4
    0x3104, // adds  r1, #4
    0x3A04, // subs  r2, #4
    0xE7E9, // b     loop
    0xBE00, // done: bkpt #0
    0xBF00, // nop
];

const STUB_PARAMS: u32 = SRAM_BASE + 0x30;
const STUB_BUFFER: u32 = SRAM_BASE + 0x40;

fn stub_image() -> Result<[u8; FLASH_STUB.len() * 2], scroll::Error> {
    let mut image = [0u8; FLASH_STUB.len() * 2];
    for (i, insn) in FLASH_STUB.iter().enumerate() {
        image.pwrite_with(*insn, i * 2, LE)?;
    }
    Ok(image)
}

/// What the probe learned about the chip. Shared by its flash regions and commands.
struct Efm32 {
    device: &'static Device,
    di: &'static DiLayout,
}

impl Efm32 {
    fn msc(&self) -> Msc {
        Msc(self.device.msc)
    }

    fn unlock(&self, target: &Target) -> Result<(), anyhow::Error> {
        let msc = self.msc();
        target.mem_write32(msc.lock(), LOCK_KEY)?;
        target.mem_write32(msc.writectrl(), WRITECTRL_WREN)
    }

    /// Poll until the MSC is idle. Unbounded: a controller that stays busy hangs here.
    fn wait_idle(&self, target: &Target) -> Result<(), anyhow::Error> {
        let status = self.msc().status();
        while target.mem_read32(status)? & STATUS_BUSY != 0 {
            if target.check_error()? {
                return Err(TargetError::Fault.into());
            }
        }
        if target.check_error()? {
            return Err(TargetError::Fault.into());
        }
        Ok(())
    }

    fn unique(&self, target: &Target) -> Result<u64, anyhow::Error> {
        let lo = target.mem_read32(self.di.unique_lo)? as u64;
        let hi = target.mem_read32(self.di.unique_hi)? as u64;
        Ok(hi << 32 | lo)
    }

    fn cmd_erase_mass(&self, target: &Target, out: &mut dyn fmt::Write) -> Result<(), anyhow::Error> {
        let msc = self.msc();
        target.mem_write32(msc.writectrl(), WRITECTRL_WREN)?;
        target.mem_write32(msc.masslock(), MASSLOCK_KEY)?;
        target.mem_write32(msc.writecmd(), WRITECMD_ERASEMAIN0)?;
        self.wait_idle(target)?;
        target.mem_write32(msc.masslock(), 0)?;
        writeln!(out, "Erase successful!")?;
        Ok(())
    }

    fn cmd_serial(&self, target: &Target, out: &mut dyn fmt::Write) -> Result<(), anyhow::Error> {
        let unique = self.unique(target)?;
        writeln!(out, "Unique Number: 0x{:016x}", unique)?;
        Ok(())
    }

    fn cmd_efm_info(&self, target: &Target, out: &mut dyn fmt::Write) -> Result<(), anyhow::Error> {
        let (di, device) = (self.di, self.device);
        writeln!(out, "DI version {} ({}) base 0x{:08x}\n", di.version, di.series(), di.base)?;

        let part_number = di.part_number(target.mem_read32(di.part)?);
        let (flash_kib, ram_kib) = devices::msize_kib(target.mem_read32(di.msize)?);
        let reported = di.page_size(target.mem_read32(di.meminfo)?);
        writeln!(
            out,
            "{} {} F{} = {} {}kiB flash, {}kiB ram",
            device.name, part_number, flash_kib, device.description, flash_kib, ram_kib
        )?;
        match reported {
            Some(reported) => {
                writeln!(
                    out,
                    "Device says flash page size is {} bytes, we're using {} bytes",
                    reported, device.page_size
                )?;
                if reported < device.page_size {
                    writeln!(out, "This is bad, flash writes may be corrupted")?;
                }
            }
            None => writeln!(
                out,
                "Device doesn't report a valid flash page size, we're using {} bytes",
                device.page_size
            )?,
        }
        writeln!(out)?;

        if let Some(addr) = di.pkginfo {
            let pkg = PkgInfo::from(target.mem_read32(addr)?);
            writeln!(
                out,
                "Package {} {} pins",
                devices::pkgtype_name(pkg.pkgtype).unwrap_or("unknown"),
                pkg.pincount
            )?;
            writeln!(
                out,
                "Temperature grade {}",
                devices::tempgrade_name(pkg.tempgrade).unwrap_or("unknown")
            )?;
            writeln!(out)?;
        }

        if let (Some(addr), true) = (di.radio, device.has_radio) {
            writeln!(out, "Radio si{}\n", target.mem_read16(addr)?)?;
        }
        Ok(())
    }

    /// Query CLW0's bootloader bit, or clear it with `disable`. Flash bits
    /// only go from 1 to 0, so `enable` rewrites the word unchanged.
    fn cmd_bootloader(&self, target: &Target, args: &[&str], out: &mut dyn fmt::Write) -> Result<(), anyhow::Error> {
        if self.device.bootloader_size == 0 {
            writeln!(out, "This device has no bootloader.")?;
            return Err(TargetError::Unsupported("bootloader").into());
        }

        let mut clw0 = target.mem_read32(CLW0_ADDR)?;
        let Some(arg) = args.get(1) else {
            let enabled = clw0 & CLW0_BOOTLOADER_ENABLE != 0;
            writeln!(out, "Bootloader {}", if enabled { "enabled" } else { "disabled" })?;
            return Ok(());
        };
        if !arg.starts_with('e') {
            clw0 &= !CLW0_BOOTLOADER_ENABLE;
        }

        let msc = self.msc();
        self.unlock(target)?;
        target.mem_write32(msc.addrb(), CLW0_ADDR)?;
        target.mem_write32(msc.writecmd(), WRITECMD_LADDRIM)?;
        target.mem_write32(msc.wdata(), clw0)?;
        target.mem_write32(msc.writecmd(), WRITECMD_WRITEONCE)?;
        self.wait_idle(target)
    }
}

impl FlashDriver for Efm32 {
    fn erase(&self, target: &Target, region: &FlashRegion, addr: u32, len: u32) -> Result<(), anyhow::Error> {
        let msc = self.msc();
        self.unlock(target)?;

        let mut addr = addr;
        let mut len = len;
        while len > 0 {
            trace!("erase page {:#010x}", addr);
            target.mem_write32(msc.addrb(), addr)?;
            target.mem_write32(msc.writecmd(), WRITECMD_LADDRIM)?;
            target.mem_write32(msc.writecmd(), WRITECMD_ERASEPAGE)?;
            self.wait_idle(target)?;

            addr = addr.wrapping_add(region.block_size);
            len = len.saturating_sub(region.block_size);
        }
        Ok(())
    }

    fn write(&self, target: &Target, _region: &FlashRegion, dest: u32, src: &[u8]) -> Result<(), anyhow::Error> {
        let msc = self.msc();

        let mut params = [0u8; 16];
        for (i, reg) in [msc.addrb(), msc.writecmd(), msc.wdata(), msc.status()].into_iter().enumerate() {
            params.pwrite_with(reg, i * 4, LE)?;
        }

        // The stub programs whole words.
        let mut buf = src.to_vec();
        buf.resize(src.len().next_multiple_of(4), 0xFF);

        self.unlock(target)?;
        target.mem_write(SRAM_BASE, &stub_image()?)?;
        target.mem_write(STUB_PARAMS, &params)?;
        target.mem_write(STUB_BUFFER, &buf)?;
        cortexm::run_stub(target, SRAM_BASE, [dest, STUB_BUFFER, buf.len() as u32, STUB_PARAMS])?;

        let msc_if = target.mem_read32(msc.if_())?;
        debug!("flash write done MSC_IF={:08x}", msc_if);
        Ok(())
    }
}

fn di_version(dpidr: u32) -> Option<u8> {
    match dpidr {
        // Cortex-M3, Cortex-M4
        0x2BA0_1477 => Some(3),
        // Cortex-M0+
        0x0BC1_1477 => Some(2),
        // Cortex-M33
        0x6BA0_2477 => Some(4),
        _ => None,
    }
}

fn dump_di(target: &Target, di: &DiLayout) -> Result<(), anyhow::Error> {
    let mut page = vec![0u8; devices::DI_PAGE_SIZE as usize];
    target.mem_read(&mut page, di.base)?;
    for (i, line) in page.chunks_exact(16).enumerate() {
        let mut s = String::new();
        for off in (0..16).step_by(4) {
            write!(s, " {:08x}", line.pread_with::<u32>(off, LE)?)?;
        }
        trace!("DI[{:03x}]{}", (di.base as usize + i * 16) & 0xFFF, s);
    }
    Ok(())
}

/// Identify the chip behind a Cortex-M target and describe its memories.
pub fn probe(target: &mut Target) -> Result<bool, anyhow::Error> {
    let dpidr = target.ap().dp().idcode();
    let Some(di) = di_version(dpidr).and_then(devices::di_layout) else {
        trace!("DPIDR {:#010x} is not an EFM32", dpidr);
        return Ok(false);
    };

    if tracing::enabled!(Level::TRACE) {
        dump_di(target, di)?;
    }

    let part = target.mem_read32(di.part)?;
    let msize = target.mem_read32(di.msize)?;
    if target.check_error()? {
        debug!("fault reading DI version {}", di.version);
        return Ok(false);
    }

    let family = di.part_family(part);
    debug!("DI version {} part family {}", di.version, family);
    let Some(device) = devices::lookup_device(family) else {
        return Ok(false);
    };

    let part_number = di.part_number(part);
    let (flash_kib, ram_kib) = devices::msize_kib(msize);
    let flash_size = flash_kib as u32 * 0x400;
    let page_size = device.page_size;

    target.set_driver(format!(
        "{} {} F{} {}",
        device.name, part_number, flash_kib, device.description
    ));
    target.set_inhibit_srst(true);
    debug!("flash size {} page size {}", flash_size, page_size);

    let driver = Rc::new(Efm32 { device, di });
    let region = |start, length| FlashRegion {
        start,
        length,
        block_size: page_size,
        buf_size: page_size,
        driver: driver.clone(),
    };

    target.add_ram(SRAM_BASE, ram_kib as u32 * 0x400);
    target.add_flash(region(0, flash_size));
    if device.user_data_size != 0 {
        target.add_flash(region(USER_DATA_BASE, device.user_data_size));
    }
    if device.bootloader_size != 0 {
        target.add_flash(region(BOOTLOADER_BASE, device.bootloader_size));
    }
    target.add_commands("EFM32", commands(&driver));

    Ok(true)
}

fn commands(efm: &Rc<Efm32>) -> Vec<Command> {
    let (e1, e2, e3, e4) = (efm.clone(), efm.clone(), efm.clone(), efm.clone());
    vec![
        Command::new("erase_mass", "Erase entire flash memory", move |t, _, out| {
            e1.cmd_erase_mass(t, out)
        }),
        Command::new("serial", "Prints unique number", move |t, _, out| e2.cmd_serial(t, out)),
        Command::new("efm_info", "Prints information about the device", move |t, _, out| {
            e3.cmd_efm_info(t, out)
        }),
        Command::new("bootloader", "Bootloader status in CLW0", move |t, args, out| {
            e4.cmd_bootloader(t, args, out)
        }),
    ]
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::ap::Ap;
    use crate::config::Config;
    use crate::cortexm::{DFSR_ADDR, DFSR_BKPT, DHCSR_ADDR};
    use crate::sim::{self, SimState};
    use crate::target::{CoreKind, TargetKind};

    const MSC: u32 = 0x400E_0000;

    /// A Pearl Gecko: family 81, part 1234, 256 KiB flash, 32 KiB RAM.
    fn pearl_gecko() -> SimState {
        let mut sim = SimState::new(0x2BA0_1477);
        sim.add_mem_ap(0, 0xE00F_F003);
        let di = devices::DI_V3_BASE;
        sim.write_word(di + 0x4C, 81 << 16 | 1234);
        sim.write_word(di + 0x48, 32 << 16 | 256);
        sim.write_word(di + 0x34, 0x0130_4D00);
        sim.write_word(di + 0x40, 0x89AB_CDEF);
        sim.write_word(di + 0x44, 0x0123_4567);
        sim
    }

    /// A bare Cortex-M target on AP 0 of an initialized DP.
    fn cortexm_target(sim: SimState) -> (Target, Rc<RefCell<SimState>>) {
        sim::init_logging();
        let (dp, sim) = sim.into_dp();
        dp.init(&Config::default()).unwrap();
        let ap = Rc::new(Ap::new(dp, 0).unwrap().unwrap());
        let target = Target::new(
            "ARM Cortex-M",
            TargetKind::Core {
                ap,
                core: CoreKind::CortexM { cpuid: 0x410F_C241 },
            },
            Config::default(),
        );
        (target, sim)
    }

    fn probed(sim: SimState) -> (Target, Rc<RefCell<SimState>>) {
        let (mut target, sim) = cortexm_target(sim);
        assert!(probe(&mut target).unwrap());
        (target, sim)
    }

    fn run(target: &Target, args: &[&str]) -> (bool, String) {
        let mut out = String::new();
        let ok = target.run_command(args, &mut out);
        (ok, out)
    }

    #[test]
    fn msc_layouts() {
        let s1 = Msc(0x400E_0000);
        assert_eq!((s1.writectrl(), s1.writecmd(), s1.addrb()), (0x400E_0008, 0x400E_000C, 0x400E_0010));
        assert_eq!((s1.if_(), s1.lock(), s1.masslock()), (0x400E_0030, 0x400E_0040, 0x400E_0054));

        let gecko = Msc(MSC_GECKO);
        assert_eq!(gecko.lock(), 0x400C_003C);

        let s2 = Msc(MSC_SERIES2);
        assert_eq!((s2.writectrl(), s2.writecmd(), s2.addrb()), (0x4003_000C, 0x4003_0010, 0x4003_0014));
        assert_eq!((s2.if_(), s2.lock(), s2.masslock()), (0x4003_0020, 0x4003_003C, 0x4003_0040));
        assert_eq!((s2.wdata(), s2.status()), (0x4003_0018, 0x4003_001C));
    }

    #[test]
    fn probe_describes_memories() {
        let (t, _sim) = probed(pearl_gecko());
        assert_eq!(t.driver(), "EFM32PG1B 1234 F256 Pearl Gecko");
        assert!(t.inhibit_srst());
        assert_eq!(t.ram()[0].start, SRAM_BASE);
        assert_eq!(t.ram()[0].length, 32 * 1024);

        let flash: Vec<_> = t.flash().iter().map(|r| (r.start, r.length, r.block_size)).collect();
        assert_eq!(
            flash,
            [(0, 256 * 1024, 2048), (USER_DATA_BASE, 2048, 2048), (BOOTLOADER_BASE, 10240, 2048)]
        );

        let names: Vec<_> = t.commands()[0].commands.iter().map(|c| c.name).collect();
        assert_eq!(t.commands()[0].name, "EFM32");
        assert_eq!(names, ["erase_mass", "serial", "efm_info", "bootloader"]);
    }

    #[test]
    fn unknown_family_rejected() {
        let mut sim = pearl_gecko();
        sim.write_word(devices::DI_V3_BASE + 0x4C, 9 << 16);
        let (mut t, sim) = cortexm_target(sim);
        assert!(!probe(&mut t).unwrap());
        assert!(sim.borrow().transfers.contains(&(devices::DI_V3_BASE + 0x4C)));
        assert_eq!(t.driver(), "ARM Cortex-M");
        assert!(t.flash().is_empty());
    }

    #[test]
    fn other_dp_rejected() {
        let mut sim = pearl_gecko();
        sim.idcode = 0x0BB1_1477;
        let (mut t, sim) = cortexm_target(sim);
        assert_eq!(t.ap().dp().idcode(), 0x0BB1_1477);
        sim.borrow_mut().transfers.clear();
        assert!(!probe(&mut t).unwrap());
        assert!(sim.borrow().transfers.is_empty());
        assert!(t.flash().is_empty());
    }

    #[test]
    fn page_erase() {
        let (t, sim) = probed(pearl_gecko());
        t.flash_erase(0x800, 0x1000).unwrap();

        let sim = sim.borrow();
        assert_eq!(sim.read_word(MSC + 0x40), LOCK_KEY);
        assert_eq!(sim.read_word(MSC + 0x08), WRITECTRL_WREN);
        assert_eq!(sim.read_word(MSC + 0x10), 0x1000);
        assert_eq!(sim.read_word(MSC + 0x0C), WRITECMD_ERASEPAGE);
        let addrb_writes = sim.transfers.iter().filter(|&&a| a == MSC + 0x10).count();
        assert_eq!(addrb_writes, 2);
    }

    #[test]
    fn erase_fault_reported() {
        let (t, sim) = probed(pearl_gecko());
        sim.borrow_mut().faulty.insert(MSC + 0x1C);
        let err = t.flash_erase(0, 2048).unwrap_err();
        assert!(matches!(err.downcast_ref::<TargetError>(), Some(TargetError::Fault)));
    }

    #[test]
    fn mass_erase() {
        let (t, sim) = probed(pearl_gecko());
        let (ok, out) = run(&t, &["erase_mass"]);
        assert!(ok);
        assert_eq!(out, "Erase successful!\n");
        let sim = sim.borrow();
        assert_eq!(sim.read_word(MSC + 0x0C), WRITECMD_ERASEMAIN0);
        assert_eq!(sim.read_word(MSC + 0x54), 0);
        assert!(sim.transfers.contains(&(MSC + 0x54)));
    }

    #[test]
    fn serial() {
        let (t, _sim) = probed(pearl_gecko());
        assert_eq!(run(&t, &["serial"]), (true, "Unique Number: 0x0123456789abcdef\n".into()));
    }

    #[test]
    fn efm_info() {
        let (t, _sim) = probed(pearl_gecko());
        let (ok, out) = run(&t, &["efm_info"]);
        assert!(ok);
        assert_eq!(
            out,
            "DI version 3 (EFR32xG1x) base 0x0fe081b0\n\n\
             EFM32PG1B 1234 F256 = Pearl Gecko 256kiB flash, 32kiB ram\n\
             Device says flash page size is 2048 bytes, we're using 2048 bytes\n\n\
             Package QFN 48 pins\n\
             Temperature grade -40 to 85degC\n\n"
        );
    }

    #[test]
    fn efm_info_blank_page_size() {
        let mut sim = pearl_gecko();
        sim.write_word(devices::DI_V3_BASE + 0x34, 0xFFFF_FFFF);
        let (t, _sim) = probed(sim);
        let (ok, out) = run(&t, &["efm_info"]);
        assert!(ok);
        assert!(out.contains("Device doesn't report a valid flash page size, we're using 2048 bytes\n"));
        assert!(!out.contains("This is bad"));
    }

    #[test]
    fn efm_info_ezr32_radio() {
        let mut sim = SimState::new(0x0BC1_1477);
        sim.add_mem_ap(0, 0xE00F_F003);
        let di = devices::DI_V2_BASE;
        sim.write_word(di + 0x54, 120 << 16 | 330);
        sim.write_word(di + 0x50, 32 << 16 | 128);
        // reports 1 KiB pages
        sim.write_word(di + 0x3C, 0);
        sim.write_word(di + 0x04, 4461);
        let (t, _sim) = probed(sim);

        assert_eq!(t.driver(), "EZR32WG 330 F128 EZR Wonder Gecko");
        assert_eq!(t.flash().len(), 2);
        let (ok, out) = run(&t, &["efm_info"]);
        assert!(ok);
        assert!(out.starts_with("DI version 2 (EZR32xG) base 0x0fe081a8\n\n"));
        assert!(out.contains("This is bad, flash writes may be corrupted\n"));
        assert!(out.ends_with("Radio si4461\n\n"));

        let (ok, out) = run(&t, &["bootloader"]);
        assert!(!ok);
        assert_eq!(out, "This device has no bootloader.\n");
    }

    #[test]
    fn bootloader_query_and_disable() {
        let mut sim = pearl_gecko();
        sim.write_word(CLW0_ADDR, 0xFFFF_FFFF);
        let (t, sim) = probed(sim);

        assert_eq!(run(&t, &["bootloader"]), (true, "Bootloader enabled\n".into()));

        assert!(run(&t, &["bootloader", "disable"]).0);
        let s = sim.borrow();
        assert_eq!(s.read_word(MSC + 0x10), CLW0_ADDR);
        assert_eq!(s.read_word(MSC + 0x18), 0xFFFF_FFFD);
        assert_eq!(s.read_word(MSC + 0x0C), WRITECMD_WRITEONCE);
        drop(s);

        sim.borrow_mut().write_word(CLW0_ADDR, 0xFFFF_FFFD);
        assert_eq!(run(&t, &["bootloader"]), (true, "Bootloader disabled\n".into()));
    }

    #[test]
    fn write_runs_stub() {
        let mut sim = pearl_gecko();
        sim.fixed.insert(DHCSR_ADDR, 0x0003_0000);
        sim.fixed.insert(DFSR_ADDR, DFSR_BKPT);
        let (t, sim) = probed(sim);

        t.flash_write(0x400, &[1, 2, 3, 4, 5]).unwrap();

        let sim = sim.borrow();
        assert_eq!(sim.read_word(SRAM_BASE), 0xD013_2A00);
        assert_eq!(sim.read_word(SRAM_BASE + 0x2C), 0xBF00_BE00);
        assert_eq!(
            sim.read_bytes(STUB_PARAMS, 16),
            [0x10, 0, 0x0E, 0x40, 0x0C, 0, 0x0E, 0x40, 0x18, 0, 0x0E, 0x40, 0x1C, 0, 0x0E, 0x40]
        );
        assert_eq!(sim.read_bytes(STUB_BUFFER, 8), [1, 2, 3, 4, 5, 0xFF, 0xFF, 0xFF]);
        assert_eq!(sim.read_word(MSC + 0x40), LOCK_KEY);
    }
}
