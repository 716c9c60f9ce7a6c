//! Cortex-M cores: target creation and running code on the core.

use std::rc::Rc;

use anyhow::bail;
use tracing::{debug, warn};

use crate::ap::Ap;
use crate::efm32;
use crate::target::{CoreKind, Target, TargetError, TargetKind, Targets};
use crate::timeout::Timeout;

pub const CPUID_ADDR: u32 = 0xE000_ED00;
pub const DFSR_ADDR: u32 = 0xE000_ED30;
pub const DHCSR_ADDR: u32 = 0xE000_EDF0;
pub const DCRSR_ADDR: u32 = 0xE000_EDF4;
pub const DCRDR_ADDR: u32 = 0xE000_EDF8;

pub const DFSR_HALTED: u32 = 1 << 0;
pub const DFSR_BKPT: u32 = 1 << 1;
/// Every DFSR flag; writing ones clears them.
const DFSR_ALL: u32 = 0x1F;

pub const REG_PC: u8 = 15;
pub const REG_XPSR: u8 = 16;
const XPSR_THUMB: u32 = 1 << 24;

const HALT_TIMEOUT_MS: u64 = 500;
const REGRDY_TIMEOUT_MS: u64 = 100;

type DeviceProbe = fn(&mut Target) -> Result<bool, anyhow::Error>;

/// Vendor probes tried on every new Cortex-M target, first match wins.
const DEVICE_PROBES: &[(&str, DeviceProbe)] = &[("efm32", efm32::probe)];

bitfield::bitfield! {
    /// CPUID Base Register
    #[derive(Copy, Clone)]
    pub struct Cpuid(u32);
    impl Debug;
    pub u8, implementer, _: 31, 24;
    pub u8, variant, _: 23, 20;
    pub u16, partno, _: 15, 4;
    pub u8, revision, _: 3, 0;
}

bitfield::bitfield! {
    /// Debug Halting Control and Status Register
    ///
    /// Writes are ignored unless the key is set with [`Dhcsr::enable_write`].
    #[derive(Copy, Clone, Default)]
    pub struct Dhcsr(u32);
    impl Debug;
    pub s_reset_st, _: 25;
    pub s_retire_st, _: 24;
    pub s_lockup, _: 19;
    pub s_sleep, _: 18;
    pub s_halt, _: 17;
    pub s_regrdy, _: 16;
    pub c_maskints, set_c_maskints: 3;
    pub c_step, set_c_step: 2;
    pub c_halt, set_c_halt: 1;
    pub c_debugen, set_c_debugen: 0;
}

impl Dhcsr {
    pub fn enable_write(&mut self) {
        self.0 &= !(0xffff << 16);
        self.0 |= 0xa05f << 16;
    }
}

bitfield::bitfield! {
    /// Debug Core Register Selector Register
    #[derive(Copy, Clone, Default)]
    pub struct Dcrsr(u32);
    impl Debug;
    /// 1 for a write to the selected register, 0 for a read.
    pub _, set_regwnr: 16;
    pub u8, _, set_regsel: 6, 0;
}

/// Create a Cortex-M target on `ap` and let the vendor probes refine it.
///
/// A `forced` probe keeps the target even when CPUID can't be read.
pub fn probe(ap: &Rc<Ap>, forced: bool, targets: &mut Targets) -> Result<bool, anyhow::Error> {
    let cpuid = ap.mem_read32(CPUID_ADDR)?;
    if ap.dp().error()? {
        if !forced {
            debug!("AP {}: fault reading CPUID", ap.apsel());
            return Ok(false);
        }
        debug!("AP {}: fault reading CPUID, continuing anyway", ap.apsel());
    }

    let id = Cpuid(cpuid);
    debug!(
        "CPUID {:#010x} implementer {:#04x} part {:#05x} r{}p{}",
        cpuid,
        id.implementer(),
        id.partno(),
        id.variant(),
        id.revision()
    );

    let mut target = Target::new(
        "ARM Cortex-M",
        TargetKind::Core {
            ap: ap.clone(),
            core: CoreKind::CortexM { cpuid },
        },
        *targets.config(),
    );

    for (name, probe) in DEVICE_PROBES {
        match probe(&mut target) {
            Ok(true) => {
                debug!("{} probe matched", name);
                break;
            }
            Ok(false) => {}
            Err(e) => warn!("{} probe failed: {:#}", name, e),
        }
    }

    targets.push(target);
    Ok(true)
}

fn wait_dhcsr(ap: &Ap, timeout: &Timeout, what: &'static str, done: fn(&Dhcsr) -> bool) -> Result<(), anyhow::Error> {
    loop {
        let dhcsr = Dhcsr(ap.mem_read32(DHCSR_ADDR)?);
        if ap.dp().error()? {
            return Err(TargetError::Fault.into());
        }
        if done(&dhcsr) {
            return Ok(());
        }
        if timeout.is_expired() {
            return Err(TargetError::Timeout(what).into());
        }
    }
}

pub fn halt(ap: &Ap) -> Result<(), anyhow::Error> {
    let mut dhcsr = Dhcsr::default();
    dhcsr.enable_write();
    dhcsr.set_c_debugen(true);
    dhcsr.set_c_halt(true);
    ap.mem_write32(DHCSR_ADDR, dhcsr.0)?;
    wait_dhcsr(ap, &Timeout::new(HALT_TIMEOUT_MS), "core halt", Dhcsr::s_halt)
}

pub fn resume(ap: &Ap) -> Result<(), anyhow::Error> {
    let mut dhcsr = Dhcsr::default();
    dhcsr.enable_write();
    dhcsr.set_c_debugen(true);
    ap.mem_write32(DHCSR_ADDR, dhcsr.0)
}

/// Write core register `reg` (0-12 general purpose, 15 PC, 16 xPSR). The core must be halted.
pub fn write_core_reg(ap: &Ap, reg: u8, val: u32) -> Result<(), anyhow::Error> {
    ap.mem_write32(DCRDR_ADDR, val)?;
    let mut dcrsr = Dcrsr::default();
    dcrsr.set_regsel(reg);
    dcrsr.set_regwnr(true);
    ap.mem_write32(DCRSR_ADDR, dcrsr.0)?;
    wait_dhcsr(ap, &Timeout::new(REGRDY_TIMEOUT_MS), "register transfer", Dhcsr::s_regrdy)
}

/// Run the routine at `entry` with r0-r3 set to `args` until it hits a breakpoint.
///
/// Bounded by `stub_timeout_ms` from the target's config.
pub fn run_stub(target: &Target, entry: u32, args: [u32; 4]) -> Result<(), anyhow::Error> {
    let TargetKind::Core {
        ap,
        core: CoreKind::CortexM { .. },
    } = target.kind()
    else {
        return Err(TargetError::Unsupported("stub execution").into());
    };

    halt(ap)?;
    ap.mem_write32(DFSR_ADDR, DFSR_ALL)?;
    for (reg, val) in args.into_iter().enumerate() {
        write_core_reg(ap, reg as u8, val)?;
    }
    write_core_reg(ap, REG_PC, entry)?;
    write_core_reg(ap, REG_XPSR, XPSR_THUMB)?;
    resume(ap)?;

    let timeout = Timeout::from_ms(target.config().stub_timeout_ms);
    wait_dhcsr(ap, &timeout, "stub completion", Dhcsr::s_halt)?;

    let dfsr = ap.mem_read32(DFSR_ADDR)?;
    if dfsr & DFSR_BKPT == 0 {
        bail!("stub halted without reaching its breakpoint (DFSR={:#010x})", dfsr);
    }
    Ok(())
}
