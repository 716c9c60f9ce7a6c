//! Cortex-A cores. Only identified, no run control.

use std::rc::Rc;

use tracing::debug;

use crate::ap::Ap;
use crate::target::{CoreKind, Target, TargetKind, Targets};

/// Debug ID Register, at the start of the debug unit.
pub const DBGDIDR_OFFSET: u32 = 0x000;

pub fn probe(ap: &Rc<Ap>, debug_base: u32, targets: &mut Targets) -> Result<bool, anyhow::Error> {
    let didr = ap.mem_read32(debug_base.wrapping_add(DBGDIDR_OFFSET))?;
    if ap.dp().error()? {
        debug!("{:#010x}: fault reading DBGDIDR", debug_base);
        return Ok(false);
    }
    debug!(
        "{:#010x}: DBGDIDR {:#010x} ({} breakpoints, {} watchpoints)",
        debug_base,
        didr,
        (didr >> 24 & 0xF) + 1,
        (didr >> 28) + 1
    );

    targets.push(Target::new(
        "ARM Cortex-A",
        TargetKind::Core {
            ap: ap.clone(),
            core: CoreKind::CortexA { debug_base, didr },
        },
        *targets.config(),
    ));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sim::SimState;

    #[test]
    fn creates_target_with_debug_base() {
        let mut sim = SimState::new(0x4BA0_0477);
        sim.add_mem_ap(0, 0x8000_0003);
        sim.write_word(0x8001_0000, 0x3515_F005);
        let (dp, _sim) = sim.into_dp();
        let ap = Rc::new(Ap::new(dp, 0).unwrap().unwrap());

        let mut targets = Targets::new(Config::default());
        assert!(probe(&ap, 0x8001_0000, &mut targets).unwrap());
        let t = targets.iter().next().unwrap();
        assert_eq!(t.driver(), "ARM Cortex-A");
        assert!(matches!(
            t.kind(),
            TargetKind::Core {
                core: CoreKind::CortexA {
                    debug_base: 0x8001_0000,
                    didr: 0x3515_F005
                },
                ..
            }
        ));
    }

    #[test]
    fn fault_creates_nothing() {
        let mut sim = SimState::new(0x4BA0_0477);
        sim.add_mem_ap(0, 0x8000_0003);
        sim.faulty.insert(0x8001_0000);
        let (dp, _sim) = sim.into_dp();
        let ap = Rc::new(Ap::new(dp, 0).unwrap().unwrap());

        let mut targets = Targets::new(Config::default());
        assert!(!probe(&ap, 0x8001_0000, &mut targets).unwrap());
        assert!(targets.is_empty());
    }
}
