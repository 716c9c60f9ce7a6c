//! Debug targets produced by discovery.

use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::ap::Ap;
use crate::config::Config;
use crate::discovery::Prober;
use crate::{cortexa, cortexm, efm32};

#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum TargetError {
    /// {0} is not supported by this target
    Unsupported(&'static str),
    /// no flash region contains address {0:#010x}
    NoFlashRegion(u32),
    /// bus fault accessing target memory
    Fault,
    /// timed out waiting for {0}
    Timeout(&'static str),
    /// {0} is busy
    Busy(&'static str),
    /// unknown command `{0}`
    UnknownCommand(String),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RamRegion {
    pub start: u32,
    pub length: u32,
}

/// Erase and program operations for one kind of flash.
pub trait FlashDriver {
    /// Erase every block touched by `addr..addr + len`.
    fn erase(&self, target: &Target, region: &FlashRegion, addr: u32, len: u32) -> Result<(), anyhow::Error>;

    /// Program `src` at `dest`. `src` never spans more than one buffer.
    fn write(&self, target: &Target, region: &FlashRegion, dest: u32, src: &[u8]) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct FlashRegion {
    pub start: u32,
    pub length: u32,
    /// Erase granularity.
    pub block_size: u32,
    /// Largest write handed to the driver at once.
    pub buf_size: u32,
    pub driver: Rc<dyn FlashDriver>,
}

impl FlashRegion {
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr - self.start < self.length
    }
}

impl fmt::Debug for FlashRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashRegion")
            .field("start", &format_args!("{:#010x}", self.start))
            .field("length", &self.length)
            .field("block_size", &self.block_size)
            .field("buf_size", &self.buf_size)
            .finish()
    }
}

pub type CommandHandler = Rc<dyn Fn(&Target, &[&str], &mut dyn fmt::Write) -> Result<(), anyhow::Error>>;

#[derive(Clone)]
pub struct Command {
    pub name: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

impl Command {
    pub fn new(
        name: &'static str,
        help: &'static str,
        handler: impl Fn(&Target, &[&str], &mut dyn fmt::Write) -> Result<(), anyhow::Error> + 'static,
    ) -> Self {
        Self {
            name,
            help,
            handler: Rc::new(handler),
        }
    }
}

#[derive(Clone)]
pub struct CommandGroup {
    pub name: String,
    pub commands: Vec<Command>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CoreKind {
    CortexM { cpuid: u32 },
    CortexA { debug_base: u32, didr: u32 },
}

pub enum TargetKind {
    /// A CPU core reachable through a MEM-AP.
    Core { ap: Rc<Ap>, core: CoreKind },
    /// A vendor authentication port. Only its commands do anything.
    AuthPort { ap: Rc<Ap> },
}

pub struct Target {
    driver: String,
    kind: TargetKind,
    config: Config,
    ram: Vec<RamRegion>,
    flash: Vec<FlashRegion>,
    commands: Vec<CommandGroup>,
    inhibit_srst: bool,
}

impl Target {
    pub fn new(driver: impl Into<String>, kind: TargetKind, config: Config) -> Self {
        Self {
            driver: driver.into(),
            kind,
            config,
            ram: Vec::new(),
            flash: Vec::new(),
            commands: Vec::new(),
            inhibit_srst: false,
        }
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn set_driver(&mut self, driver: impl Into<String>) {
        self.driver = driver.into();
    }

    pub fn kind(&self) -> &TargetKind {
        &self.kind
    }

    pub fn ap(&self) -> &Rc<Ap> {
        match &self.kind {
            TargetKind::Core { ap, .. } | TargetKind::AuthPort { ap } => ap,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ram(&self) -> &[RamRegion] {
        &self.ram
    }

    pub fn flash(&self) -> &[FlashRegion] {
        &self.flash
    }

    pub fn commands(&self) -> &[CommandGroup] {
        &self.commands
    }

    pub fn inhibit_srst(&self) -> bool {
        self.inhibit_srst
    }

    pub fn set_inhibit_srst(&mut self, inhibit: bool) {
        self.inhibit_srst = inhibit;
    }

    pub fn add_ram(&mut self, start: u32, length: u32) {
        self.ram.push(RamRegion { start, length });
    }

    pub fn add_flash(&mut self, region: FlashRegion) {
        debug!("{}: flash {:?}", self.driver, region);
        self.flash.push(region);
    }

    pub fn add_commands(&mut self, name: impl Into<String>, commands: Vec<Command>) {
        self.commands.push(CommandGroup {
            name: name.into(),
            commands,
        });
    }

    fn mem_ap(&self) -> Result<&Rc<Ap>, TargetError> {
        match &self.kind {
            TargetKind::Core { ap, .. } => Ok(ap),
            TargetKind::AuthPort { .. } => Err(TargetError::Unsupported("memory access")),
        }
    }

    pub fn mem_read(&self, dest: &mut [u8], src: u32) -> Result<(), anyhow::Error> {
        self.mem_ap()?.mem_read(dest, src)
    }

    pub fn mem_write(&self, dest: u32, src: &[u8]) -> Result<(), anyhow::Error> {
        self.mem_ap()?.mem_write(dest, src)
    }

    pub fn mem_read32(&self, addr: u32) -> Result<u32, anyhow::Error> {
        self.mem_ap()?.mem_read32(addr)
    }

    pub fn mem_read16(&self, addr: u32) -> Result<u16, anyhow::Error> {
        self.mem_ap()?.mem_read16(addr)
    }

    pub fn mem_write32(&self, addr: u32, val: u32) -> Result<(), anyhow::Error> {
        self.mem_ap()?.mem_write32(addr, val)
    }

    /// Read and clear the latched fault state of the link.
    pub fn check_error(&self) -> Result<bool, anyhow::Error> {
        match &self.kind {
            TargetKind::Core { ap, .. } => ap.dp().error(),
            TargetKind::AuthPort { .. } => Err(TargetError::Unsupported("error check").into()),
        }
    }

    pub fn halt(&self) -> Result<(), anyhow::Error> {
        match &self.kind {
            TargetKind::Core {
                ap,
                core: CoreKind::CortexM { .. },
            } => cortexm::halt(ap),
            _ => Err(TargetError::Unsupported("halt").into()),
        }
    }

    pub fn resume(&self) -> Result<(), anyhow::Error> {
        match &self.kind {
            TargetKind::Core {
                ap,
                core: CoreKind::CortexM { .. },
            } => cortexm::resume(ap),
            _ => Err(TargetError::Unsupported("resume").into()),
        }
    }

    fn flash_region(&self, addr: u32) -> Result<&FlashRegion, TargetError> {
        self.flash
            .iter()
            .find(|r| r.contains(addr))
            .ok_or(TargetError::NoFlashRegion(addr))
    }

    pub fn flash_erase(&self, addr: u32, len: u32) -> Result<(), anyhow::Error> {
        let region = self.flash_region(addr)?;
        region.driver.erase(self, region, addr, len)
    }

    /// Program `src` at `dest`, split on the region's buffer boundaries.
    pub fn flash_write(&self, dest: u32, src: &[u8]) -> Result<(), anyhow::Error> {
        let region = self.flash_region(dest)?;
        let mut addr = dest;
        let mut rest = src;
        while !rest.is_empty() {
            let room = region.buf_size - (addr - region.start) % region.buf_size;
            let (chunk, tail) = rest.split_at(rest.len().min(room as usize));
            region.driver.write(self, region, addr, chunk)?;
            addr = addr.wrapping_add(chunk.len() as u32);
            rest = tail;
        }
        Ok(())
    }

    fn find_command(&self, name: &str) -> Option<&Command> {
        self.commands
            .iter()
            .flat_map(|g| g.commands.iter())
            .find(|c| c.name == name)
    }

    /// Run a registered command. `args[0]` is the command name.
    ///
    /// Returns whether it succeeded; failures are logged.
    pub fn run_command(&self, args: &[&str], out: &mut dyn fmt::Write) -> bool {
        let Some(name) = args.first() else {
            return false;
        };
        let Some(cmd) = self.find_command(name) else {
            warn!("{}: {}", self.driver, TargetError::UnknownCommand(name.to_string()));
            return false;
        };
        let handler = cmd.handler.clone();
        match handler(self, args, out) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: command {} failed: {:#}", self.driver, name, e);
                false
            }
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("driver", &self.driver)
            .field("ram", &self.ram)
            .field("flash", &self.flash)
            .field("inhibit_srst", &self.inhibit_srst)
            .finish()
    }
}

/// Collects the targets found while scanning a DP.
pub struct Targets {
    config: Config,
    list: Vec<Target>,
}

impl Targets {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            list: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn push(&mut self, target: Target) {
        debug!("new target: {}", target.driver());
        self.list.push(target);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn into_vec(self) -> Vec<Target> {
        self.list
    }
}

impl Prober for Targets {
    fn ap_hooks(&mut self, ap: &Rc<Ap>) {
        if let Err(e) = efm32::aap::probe(ap, self) {
            warn!("AP {}: EFM32 AAP probe failed: {:#}", ap.apsel(), e);
        }
    }

    fn cortexm(&mut self, ap: &Rc<Ap>, forced: bool) -> bool {
        cortexm::probe(ap, forced, self).unwrap_or_else(|e| {
            warn!("AP {}: cortexm probe failed: {:#}", ap.apsel(), e);
            false
        })
    }

    fn cortexa(&mut self, ap: &Rc<Ap>, debug_base: u32) -> bool {
        cortexa::probe(ap, debug_base, self).unwrap_or_else(|e| {
            warn!("AP {}: cortexa probe failed: {:#}", ap.apsel(), e);
            false
        })
    }
}
