//! AP enumeration and CoreSight ROM table walking.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::ap::Ap;
use crate::config::Config;
use crate::coresight::{self, Arch, ComponentClass, Pidr};
use crate::dp::Dp;

/// Highest APSEL is 255.
const AP_COUNT: u16 = 256;
/// Give up on a DP after this many APSELs with nothing behind them.
const MAX_VOID_APS: u32 = 8;

/// Receives what discovery finds.
pub trait Prober {
    /// Called for every AP that answers, before its ROM table is walked.
    /// May keep a clone of the AP.
    fn ap_hooks(&mut self, ap: &Rc<Ap>) {
        let _ = ap;
    }

    /// A Cortex-M SCS was found on `ap`, or `forced` when falling back
    /// to assuming one. Returns whether a target was created.
    fn cortexm(&mut self, ap: &Rc<Ap>, forced: bool) -> bool;

    /// A Cortex-A debug unit was found at `debug_base`.
    fn cortexa(&mut self, ap: &Rc<Ap>, debug_base: u32) -> bool;
}

/// Initialize the DP and enumerate everything behind it.
///
/// Returns whether any core prober was dispatched.
pub fn scan(dp: &Rc<Dp>, config: &Config, prober: &mut dyn Prober) -> Result<bool, anyhow::Error> {
    dp.init(config)?;
    enumerate_aps(dp, config, prober)
}

#[tracing::instrument(skip_all, fields(dpidr = dp.idcode()))]
pub fn enumerate_aps(dp: &Rc<Dp>, config: &Config, prober: &mut dyn Prober) -> Result<bool, anyhow::Error> {
    // The pass holds its own reference so hooks can't drop the DP from under it.
    let dp = dp.clone();

    let mut probed = false;
    let mut void_aps = 0;
    let mut last_base = None;
    let mut fallback: Option<Rc<Ap>> = None;

    for apsel in 0..AP_COUNT {
        if void_aps >= MAX_VOID_APS {
            break;
        }
        let apsel = apsel as u8;

        let Some(ap) = Ap::new(dp.clone(), apsel)? else {
            void_aps += 1;
            if apsel == 0 {
                debug!("AP 0 not present, giving up on this DP");
                return Ok(false);
            }
            continue;
        };

        if last_base == Some(ap.base()) {
            debug!("AP {}: duplicate base", apsel);
            break;
        }
        last_base = Some(ap.base());

        let ap = Rc::new(ap);
        prober.ap_hooks(&ap);

        if ap.debug_base().is_none() {
            // no debug entries, nothing left to do with this AP
            continue;
        }

        match walk(&ap, config, prober) {
            Ok(true) => probed = true,
            Ok(false) => {
                if fallback.is_none() {
                    fallback = Some(ap.clone());
                }
            }
            Err(e) => warn!("AP {}: walking components failed: {:#}", apsel, e),
        }
    }

    if !probed && dp.idcode() & 0xFFF == 0x477 {
        if let Some(ap) = fallback {
            debug!("AP {}: forcing cortexm probe", ap.apsel());
            prober.cortexm(&ap, true);
            probed = true;
        }
    }

    Ok(probed)
}

/// Walk the component tree starting at the AP's debug base.
pub fn walk(ap: &Rc<Ap>, config: &Config, prober: &mut dyn Prober) -> Result<bool, anyhow::Error> {
    let Some(base) = ap.debug_base() else {
        return Ok(false);
    };
    let mut walker = Walker { ap, config, prober };
    walker.component(base, 0, 0)
}

struct Walker<'a> {
    ap: &'a Rc<Ap>,
    config: &'a Config,
    prober: &'a mut dyn Prober,
}

impl Walker<'_> {
    /// Four ID registers, one byte each.
    fn read_id(&self, addr: u32) -> Result<u32, anyhow::Error> {
        let mut res = 0;
        for i in 0..4 {
            let x = self.ap.mem_read32(addr.wrapping_add(4 * i))?;
            res |= (x & 0xFF) << (i * 8);
        }
        Ok(res)
    }

    fn read_pidr(&self, addr: u32) -> Result<Pidr, anyhow::Error> {
        let hi = self.read_id(addr.wrapping_add(coresight::PIDR4_OFFSET))? as u64;
        let lo = self.read_id(addr.wrapping_add(coresight::PIDR0_OFFSET))? as u64;
        Ok(Pidr(hi << 32 | lo))
    }

    fn component(&mut self, addr: u32, depth: u32, entry: u32) -> Result<bool, anyhow::Error> {
        if depth > self.config.max_rom_depth {
            warn!(depth, "{:#010x}: ROM tables nested too deep, not following", addr);
            return Ok(false);
        }

        let addr = addr & !3;
        let pidr = self.read_pidr(addr)?;
        let cidr = self.read_id(addr.wrapping_add(coresight::CIDR0_OFFSET))?;

        if self.ap.dp().error()? {
            debug!(depth, "{:#010x}: fault reading ID registers", addr);
            return Ok(false);
        }

        let Some(class) = ComponentClass::from_cidr(cidr) else {
            debug!(
                depth,
                entry,
                "{:#010x}: {:#010x} does not match preamble {:#010x}",
                addr,
                cidr,
                coresight::CID_PREAMBLE
            );
            return Ok(false);
        };

        if class == ComponentClass::RomTable {
            return self.rom_table(addr, depth, pidr);
        }

        if !pidr.is_arm() {
            debug!(depth, "{:#010x}: PIDR {:?} does not match ARM JEP-106", addr, pidr);
            return Ok(false);
        }

        let Some(part) = coresight::find_part(pidr.part_number()) else {
            debug!(depth, "{:#010x}: {} - Unknown (PIDR = {:?})", addr, class, pidr);
            return Ok(false);
        };

        debug!(
            depth,
            entry,
            "{:#010x}: {} - {} {} (PIDR = {:?})",
            addr,
            class,
            part.name,
            part.description,
            pidr
        );

        if let Some(expected) = part.class {
            if expected != class {
                warn!(depth, "{:#010x}: \"{}\" does not match expected \"{}\"", addr, class, expected);
            }
        }

        let arch = match part.arch {
            Arch::V8 => self.armv8_arch(addr)?,
            arch => arch,
        };
        match arch {
            Arch::CortexM => {
                debug!(depth, "-> cortexm_probe");
                self.prober.cortexm(self.ap, false);
            }
            Arch::CortexA => {
                debug!(depth, "-> cortexa_probe");
                self.prober.cortexa(self.ap, addr);
            }
            Arch::NoSupport | Arch::V8 => {}
        }

        Ok(true)
    }

    fn rom_table(&mut self, addr: u32, depth: u32, pidr: Pidr) -> Result<bool, anyhow::Error> {
        let memtype =
            self.ap.mem_read32(addr.wrapping_add(coresight::ROM_MEMTYPE_OFFSET))? & coresight::ROM_MEMTYPE_SYSMEM;
        if self.ap.dp().error()? {
            debug!(depth, "fault reading ROM table MEMTYPE");
        }
        debug!(depth, "ROM: table BASE={:#010x} SYSMEM={} PIDR {:?}", addr, memtype, pidr);

        let mut res = false;
        for i in 0..coresight::ROM_MAX_ENTRIES {
            let entry = self.ap.mem_read32(addr.wrapping_add(i * 4))?;
            if self.ap.dp().error()? {
                debug!(depth, "fault reading ROM table entry {}", i);
            }

            if entry == 0 {
                break;
            }

            if entry & coresight::ROM_ENTRY_PRESENT == 0 {
                debug!(depth, "{} entry {:#010x} -> not present", i, entry);
                continue;
            }

            let child = addr.wrapping_add(entry & coresight::ROM_ENTRY_OFFSET_MASK);
            res |= self.component(child, depth + 1, i)?;
        }
        debug!(depth, "ROM: table END");

        Ok(res)
    }

    /// Resolve an ARMv8 part through DEVARCH, or DEVTYPE when DEVARCH is absent.
    fn armv8_arch(&self, addr: u32) -> Result<Arch, anyhow::Error> {
        let devarch = self.ap.mem_read32(addr.wrapping_add(coresight::DEVARCH_OFFSET))?;

        if devarch & coresight::DEVARCH_PRESENT != 0 {
            let archid = (devarch & coresight::DEVARCH_ARCHID_MASK) as u16;
            return Ok(match coresight::find_archid(archid) {
                Some(info) => {
                    debug!("{:#010x}: DEVARCH {} {}", addr, info.name, info.description);
                    info.arch
                }
                None => {
                    debug!("{:#010x}: unknown DEVARCH archid {:#06x}", addr, archid);
                    Arch::NoSupport
                }
            });
        }

        let devtype = self.ap.mem_read32(addr.wrapping_add(coresight::DEVTYPE_OFFSET))?;
        Ok(match coresight::find_devtype(devtype) {
            Some(info) => {
                debug!("{:#010x}: DEVTYPE {} {}", addr, info.name, info.description);
                info.arch
            }
            None => Arch::NoSupport,
        })
    }
}
