#![recursion_limit = "256"] // required by bitfield!
#![deny(unused_must_use)]

//! ARM Debug Interface v5 target discovery.
//!
//! A [`probe::Probe`] moves raw DP/AP register values; [`dp::Dp`] and
//! [`ap::Ap`] build the session on top of it and [`discovery::scan`] walks
//! every access port and CoreSight ROM table behind the DP, handing what it
//! finds to a [`discovery::Prober`]. [`target::Targets`] is the prober that
//! turns Cortex-M/A cores and EFM32 parts into [`target::Target`]s.

pub mod ap;
pub mod config;
pub mod coresight;
pub mod cortexa;
pub mod cortexm;
pub mod discovery;
pub mod dp;
pub mod efm32;
pub mod mem;
pub mod probe;
pub mod target;
pub mod timeout;

#[cfg(test)]
mod sim;
