//! EFM32 Authentication Access Port.
//!
//! An extra AP on the SW-DP that stays reachable when the part is locked.
//! Its one command, DEVICEERASE, clears flash, SRAM and the lock bits page.
//! User data and the bootloader survive; a device with a bootloader will
//! try to boot from it once the main AP is back.

use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ap::regs::Idr;
use crate::ap::Ap;
use crate::target::{Command, Target, TargetError, TargetKind, Targets};
use crate::timeout::Timeout;

/// IDR with the revision and variant masked out.
pub const AAP_IDR: u32 = 0x06E6_0001;
pub const AAP_IDR_MASK: u32 = 0x0FFF_FF0F;

pub const CMD_ADDR: u8 = 0x00;
pub const CMDKEY_ADDR: u8 = 0x04;
pub const STATUS_ADDR: u8 = 0x08;

pub const CMD_DEVICEERASE: u32 = 1 << 0;
pub const CMDKEY: u32 = 0xCFAC_C118;

pub const STATUS_ERASEBUSY: u32 = 1 << 0;
pub const STATUS_LOCKED: u32 = 1 << 1;

pub fn is_aap(idr: u32) -> bool {
    idr & AAP_IDR_MASK == AAP_IDR
}

/// Register an authentication port target if `ap` is one.
pub fn probe(ap: &Rc<Ap>, targets: &mut Targets) -> Result<bool, anyhow::Error> {
    if !is_aap(ap.idr()) {
        trace!("AP {}: not an EFM32 AAP (IDR={:08x})", ap.apsel(), ap.idr());
        return Ok(false);
    }

    // Revisions 1 and 2 both exist.
    let revision = Idr(ap.idr()).revision();
    let status = ap.read(STATUS_ADDR)?;
    debug!(
        "AP {}: EFM32 AAP rev.{} STATUS={:08x} locked={}",
        ap.apsel(),
        revision,
        status,
        status & STATUS_LOCKED != 0
    );

    let mut target = Target::new(
        format!("EFM32 Authentication Access Port rev.{}", revision),
        TargetKind::AuthPort { ap: ap.clone() },
        *targets.config(),
    );
    let group = target.driver().to_string();
    target.add_commands(
        group,
        vec![Command::new("erase_mass", "Erase entire flash memory", device_erase)],
    );
    targets.push(target);
    Ok(true)
}

/// Issue DEVICEERASE and wait for it, bounded by `aap_erase_timeout_ms`.
fn device_erase(target: &Target, _args: &[&str], _out: &mut dyn fmt::Write) -> Result<(), anyhow::Error> {
    let ap = target.ap();

    let status = ap.read(STATUS_ADDR)?;
    debug!("AAP STATUS={:08x}", status);
    if status & STATUS_ERASEBUSY != 0 {
        return Err(TargetError::Busy("AAP device erase").into());
    }

    debug!("issuing DEVICEERASE");
    ap.write(CMDKEY_ADDR, CMDKEY)?;
    ap.write(CMD_ADDR, CMD_DEVICEERASE)?;

    let timeout = Timeout::from_ms(target.config().aap_erase_timeout_ms);
    while ap.read(STATUS_ADDR)? & STATUS_ERASEBUSY != 0 {
        if timeout.is_expired() {
            return Err(TargetError::Timeout("AAP device erase").into());
        }
    }

    debug!("AAP STATUS={:08x}", ap.read(STATUS_ADDR)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::discovery;
    use crate::sim::{self, SimState, AAP_IDR as SIM_AAP_IDR};

    fn scan(sim: SimState) -> (Vec<Target>, Rc<std::cell::RefCell<SimState>>) {
        sim::init_logging();
        let (dp, sim) = sim.into_dp();
        let mut targets = Targets::new(Config::default());
        discovery::scan(&dp, &Config::default(), &mut targets).unwrap();
        (targets.into_vec(), sim)
    }

    fn locked_part() -> SimState {
        let mut sim = SimState::new(0x2BA0_1477);
        // main AP with its debug entries hidden
        sim.add_mem_ap(0, 0x0000_0002);
        sim.add_aap(1);
        sim
    }

    #[test]
    fn idr_match() {
        assert!(is_aap(SIM_AAP_IDR));
        assert!(is_aap(0x26E6_00F1));
        assert!(!is_aap(0x2477_0011));
    }

    #[test]
    fn found_through_discovery() {
        let (targets, _sim) = scan(locked_part());
        assert_eq!(targets.len(), 1);
        let t = &targets[0];
        assert_eq!(t.driver(), "EFM32 Authentication Access Port rev.1");
        assert!(matches!(t.kind(), TargetKind::AuthPort { .. }));
        assert_eq!(t.commands()[0].commands[0].name, "erase_mass");
    }

    #[test]
    fn device_erase_waits_for_completion() {
        let (targets, sim) = scan(locked_part());
        let mut out = String::new();
        assert!(targets[0].run_command(&["erase_mass"], &mut out));

        let sim = sim.borrow();
        assert!(sim.aap_erased);
        let crate::sim::SimApKind::Aap { busy_polls, .. } = &sim.aps[&1].kind else {
            unreachable!()
        };
        assert_eq!(*busy_polls, 0);
    }

    #[test]
    fn busy_port_refuses_erase() {
        let (targets, sim) = scan(locked_part());
        if let Some(crate::sim::SimApKind::Aap { regs, .. }) = sim.borrow_mut().aps.get_mut(&1).map(|ap| &mut ap.kind) {
            regs.insert(STATUS_ADDR, STATUS_ERASEBUSY);
        }

        let mut out = String::new();
        assert!(!targets[0].run_command(&["erase_mass"], &mut out));
        assert!(!sim.borrow().aap_erased);
    }
}
