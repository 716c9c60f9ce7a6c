//! CoreSight component identification: CIDR/PIDR decoding and the tables of
//! known ARM parts.

use std::fmt;

pub const CIDR0_OFFSET: u32 = 0xFF0;
pub const PIDR0_OFFSET: u32 = 0xFE0;
pub const PIDR4_OFFSET: u32 = 0xFD0;
pub const DEVARCH_OFFSET: u32 = 0xFBC;
pub const DEVTYPE_OFFSET: u32 = 0xFCC;
/// ROM tables only: bit 0 set when system memory is visible from this AP.
pub const ROM_MEMTYPE_OFFSET: u32 = 0xFCC;
pub const ROM_MEMTYPE_SYSMEM: u32 = 1 << 0;

pub const CID_PREAMBLE: u32 = 0xB105_000D;
pub const CID_CLASS_MASK: u32 = 0x0000_F000;
pub const CID_CLASS_SHIFT: u32 = 12;

pub const PIDR_REV_MASK: u64 = 0x0_FFF0_0000;
pub const PIDR_PN_MASK: u64 = 0x0_0000_0FFF;
/// JEP-106 continuation code 4, identity 0x3B, "JEP-106 used" bit.
pub const PIDR_ARM_BITS: u64 = 0x4_000B_B000;

pub const DEVARCH_PRESENT: u32 = 1 << 20;
pub const DEVARCH_ARCHID_MASK: u32 = 0xFFFF;

pub const ROM_ENTRY_PRESENT: u32 = 1 << 0;
pub const ROM_ENTRY_OFFSET_MASK: u32 = 0xFFFF_F000;
/// A ROM table occupies at most 0xEFC bytes of entries.
pub const ROM_MAX_ENTRIES: u32 = 960;

/// Component class, CIDR1[7:4].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ComponentClass {
    GenericVerification,
    RomTable,
    Debug,
    PeripheralTestBlock,
    DataEngineSubsystem,
    GenericIp,
    PrimeCell,
    /// A reserved class value.
    Unknown(u8),
}

impl ComponentClass {
    pub fn from_nibble(class: u8) -> Self {
        match class {
            0x0 => Self::GenericVerification,
            0x1 => Self::RomTable,
            0x9 => Self::Debug,
            0xB => Self::PeripheralTestBlock,
            0xD => Self::DataEngineSubsystem,
            0xE => Self::GenericIp,
            0xF => Self::PrimeCell,
            other => Self::Unknown(other),
        }
    }

    /// Decode from a packed CIDR. `None` if the preamble doesn't match.
    pub fn from_cidr(cidr: u32) -> Option<Self> {
        if cidr & !CID_CLASS_MASK != CID_PREAMBLE {
            return None;
        }
        Some(Self::from_nibble(((cidr & CID_CLASS_MASK) >> CID_CLASS_SHIFT) as u8))
    }
}

impl fmt::Display for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GenericVerification => "Generic verification component",
            Self::RomTable => "ROM Table",
            Self::Debug => "Debug component",
            Self::PeripheralTestBlock => "Peripheral Test Block",
            Self::DataEngineSubsystem => "OptimoDE Data Engine SubSystem component",
            Self::GenericIp => "Generic IP component",
            Self::PrimeCell => "PrimeCell peripheral",
            Self::Unknown(_) => "Reserved component class",
        };
        f.write_str(s)
    }
}

/// Peripheral ID, PIDR4..7 in the upper half and PIDR0..3 in the lower.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Pidr(pub u64);

impl Pidr {
    pub fn is_arm(&self) -> bool {
        self.0 & !(PIDR_REV_MASK | PIDR_PN_MASK) == PIDR_ARM_BITS
    }

    pub fn part_number(&self) -> u16 {
        (self.0 & PIDR_PN_MASK) as u16
    }
}

impl fmt::Debug for Pidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}{:08x}", (self.0 >> 32) as u32, self.0 as u32)
    }
}

/// What a component says about the core behind it.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Arch {
    NoSupport,
    CortexM,
    CortexA,
    /// ARMv8 part: the architecture comes from DEVARCH or DEVTYPE.
    V8,
}

#[derive(Debug)]
pub struct PartInfo {
    pub part_number: u16,
    pub arch: Arch,
    /// Class the component is expected to report, if known.
    pub class: Option<ComponentClass>,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct ArchIdInfo {
    pub archid: u16,
    pub arch: Arch,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct DevTypeInfo {
    /// Major type in the high nibble, sub type in the low nibble.
    pub id: u8,
    pub arch: Arch,
    pub name: &'static str,
    pub description: &'static str,
}

macro_rules! part {
    ($pn:expr, $arch:ident, $class:expr, $name:expr, $desc:expr) => {
        PartInfo {
            part_number: $pn,
            arch: Arch::$arch,
            class: $class,
            name: $name,
            description: $desc,
        }
    };
}

const GIPC: Option<ComponentClass> = Some(ComponentClass::GenericIp);
const DC: Option<ComponentClass> = Some(ComponentClass::Debug);

/// ARM-designed parts, adopted from OpenOCD's list.
pub static PARTS: &[PartInfo] = &[
    part!(0x000, CortexM, GIPC, "Cortex-M3 SCS", "(System Control Space)"),
    part!(0x001, NoSupport, None, "Cortex-M3 ITM", "(Instrumentation Trace Module)"),
    part!(0x002, NoSupport, None, "Cortex-M3 DWT", "(Data Watchpoint and Trace)"),
    part!(0x003, NoSupport, None, "Cortex-M3 FBP", "(Flash Patch and Breakpoint)"),
    part!(0x008, CortexM, GIPC, "Cortex-M0 SCS", "(System Control Space)"),
    part!(0x00a, NoSupport, None, "Cortex-M0 DWT", "(Data Watchpoint and Trace)"),
    part!(0x00b, NoSupport, None, "Cortex-M0 BPU", "(Breakpoint Unit)"),
    part!(0x00c, CortexM, GIPC, "Cortex-M4 SCS", "(System Control Space)"),
    part!(0x00d, NoSupport, None, "CoreSight ETM11", "(Embedded Trace)"),
    part!(0x00e, NoSupport, None, "Cortex-M7 FBP", "(Flash Patch and Breakpoint)"),
    part!(0x101, NoSupport, None, "System TSGEN", "(Time Stamp Generator)"),
    part!(0x490, NoSupport, None, "Cortex-A15 GIC", "(Generic Interrupt Controller)"),
    part!(0x4c7, NoSupport, None, "Cortex-M7 PPB", "(Private Peripheral Bus ROM Table)"),
    part!(0x906, NoSupport, None, "CoreSight CTI", "(Cross Trigger)"),
    part!(0x907, NoSupport, None, "CoreSight ETB", "(Trace Buffer)"),
    part!(0x908, NoSupport, None, "CoreSight CSTF", "(Trace Funnel)"),
    part!(0x910, NoSupport, None, "CoreSight ETM9", "(Embedded Trace)"),
    part!(0x912, NoSupport, None, "CoreSight TPIU", "(Trace Port Interface Unit)"),
    part!(0x913, NoSupport, None, "CoreSight ITM", "(Instrumentation Trace Macrocell)"),
    part!(0x914, NoSupport, None, "CoreSight SWO", "(Single Wire Output)"),
    part!(0x917, NoSupport, None, "CoreSight HTM", "(AHB Trace Macrocell)"),
    part!(0x920, NoSupport, None, "CoreSight ETM11", "(Embedded Trace)"),
    part!(0x921, NoSupport, None, "Cortex-A8 ETM", "(Embedded Trace)"),
    part!(0x922, NoSupport, None, "Cortex-A8 CTI", "(Cross Trigger)"),
    part!(0x923, NoSupport, None, "Cortex-M3 TPIU", "(Trace Port Interface Unit)"),
    part!(0x924, NoSupport, None, "Cortex-M3 ETM", "(Embedded Trace)"),
    part!(0x925, NoSupport, None, "Cortex-M4 ETM", "(Embedded Trace)"),
    part!(0x930, NoSupport, None, "Cortex-R4 ETM", "(Embedded Trace)"),
    part!(0x932, NoSupport, None, "CoreSight MTB-M0+", "(Simple Execution Trace)"),
    part!(0x941, NoSupport, None, "CoreSight TPIU-Lite", "(Trace Port Interface Unit)"),
    part!(0x950, NoSupport, None, "CoreSight Component", "(unidentified Cortex-A9 component)"),
    part!(0x955, NoSupport, None, "CoreSight Component", "(unidentified Cortex-A5 component)"),
    part!(0x956, NoSupport, None, "Cortex-A7 ETM", "(Embedded Trace)"),
    part!(0x95f, NoSupport, None, "Cortex-A15 PTM", "(Program Trace Macrocell)"),
    part!(0x961, NoSupport, None, "CoreSight TMC", "(Trace Memory Controller)"),
    part!(0x962, NoSupport, None, "CoreSight STM", "(System Trace Macrocell)"),
    part!(0x963, NoSupport, None, "CoreSight STM", "(System Trace Macrocell)"),
    part!(0x975, NoSupport, None, "Cortex-M7 ETM", "(Embedded Trace)"),
    part!(0x9a0, NoSupport, None, "CoreSight PMU", "(Performance Monitoring Unit)"),
    part!(0x9a1, NoSupport, None, "Cortex-M4 TPIU", "(Trace Port Interface Unit)"),
    part!(0x9a9, NoSupport, None, "Cortex-M7 TPIU", "(Trace Port Interface Unit)"),
    part!(0x9a5, NoSupport, None, "Cortex-A5 ETM", "(Embedded Trace)"),
    part!(0x9a7, NoSupport, None, "Cortex-A7 PMU", "(Performance Monitor Unit)"),
    part!(0x9af, NoSupport, None, "Cortex-A15 PMU", "(Performance Monitor Unit)"),
    part!(0xc05, CortexA, DC, "Cortex-A5 Debug", "(Debug Unit)"),
    part!(0xc07, CortexA, DC, "Cortex-A7 Debug", "(Debug Unit)"),
    part!(0xc08, CortexA, DC, "Cortex-A8 Debug", "(Debug Unit)"),
    part!(0xc09, CortexA, DC, "Cortex-A9 Debug", "(Debug Unit)"),
    part!(0xc0f, NoSupport, None, "Cortex-A15 Debug", "(Debug Unit)"),
    part!(0xc14, NoSupport, None, "Cortex-R4 Debug", "(Debug Unit)"),
    part!(0xcd0, NoSupport, None, "Atmel DSU", "(Device Service Unit)"),
    part!(0xd21, V8, None, "Cortex-M33", "()"),
];

macro_rules! archid {
    ($id:expr, $arch:ident, $name:expr, $desc:expr) => {
        ArchIdInfo {
            archid: $id,
            arch: Arch::$arch,
            name: $name,
            description: $desc,
        }
    };
}

/// DEVARCH.ARCHID values of ARMv8 components.
pub static ARCHIDS: &[ArchIdInfo] = &[
    archid!(0x0a00, NoSupport, "RAS", "()"),
    archid!(0x0a01, NoSupport, "ITM", "(Instrumentation Trace Macrocell)"),
    archid!(0x0a02, NoSupport, "DWT", "(Data Watchpoint and Trace)"),
    archid!(0x0a03, NoSupport, "FPB", "(Flash Patch and Breakpoint)"),
    archid!(0x0a04, CortexM, "SCS", "(System Control Space)"),
    archid!(0x0a10, NoSupport, "PC", "(PC sample-based profiling)"),
    archid!(0x0a17, NoSupport, "MAP", "(Memory Access Port)"),
    archid!(0x0a27, NoSupport, "JAP", "(JTAG Access Port)"),
    archid!(0x0a31, NoSupport, "BTR", "(Basic Trace Router)"),
    archid!(0x0a37, NoSupport, "PR", "(Power Requestor)"),
    archid!(0x0a47, NoSupport, "UAP", "(Unknown Access Port)"),
    archid!(0x0a50, NoSupport, "HSSTP", "()"),
    archid!(0x0a63, NoSupport, "STM", "(System Trace Macrocell)"),
    archid!(0x0a75, NoSupport, "ELA", "(CoreSight ELA)"),
    archid!(0x0af7, NoSupport, "ROM", "(CoreSight ROM)"),
    archid!(0x1a01, NoSupport, "ITM", "(Instrumentation Trace Macrocell)"),
    archid!(0x1a02, NoSupport, "DWT", "(Data Watchpoint and Trace)"),
    archid!(0x1a03, NoSupport, "FPB", "(Flash Patch and Breakpoint)"),
    archid!(0x1a14, NoSupport, "CTI", "(Cross Trigger Interface)"),
    // ARMv8-M
    archid!(0x2a04, CortexM, "SCS", "(System Control Space)"),
    archid!(0x2a16, NoSupport, "PMU", "(Performance Monitor)"),
    archid!(0x4a13, NoSupport, "ETM", "(Embedded Trace Macrocell)"),
    // ARMv8-R
    archid!(0x6a05, NoSupport, "SCS", "(System Control Space)"),
    // ARMv8.0-A, v8.1-A, v8.2-A
    archid!(0x6a15, CortexA, "SCS", "(System Control Space)"),
    archid!(0x7a15, CortexA, "SCS", "(System Control Space)"),
    archid!(0x8a15, CortexA, "SCS", "(System Control Space)"),
];

macro_rules! devtype {
    ($id:expr, $name:expr, $desc:expr) => {
        DevTypeInfo {
            id: $id,
            arch: Arch::NoSupport,
            name: $name,
            description: $desc,
        }
    };
}

/// DEVTYPE values, for components without a DEVARCH.
pub static DEVTYPES: &[DevTypeInfo] = &[
    devtype!(0x00, "Miscellaneous", "(Other, undefined)"),
    devtype!(0x04, "Miscellaneous", "(Validation component)"),
    devtype!(0x10, "Trace Sink", "(Other)"),
    devtype!(0x11, "Trace Sink", "(Trace port (TPIU))"),
    devtype!(0x12, "Trace Sink", "(Buffer (ETB))"),
    devtype!(0x13, "Trace Sink", "(Basic trace router)"),
    devtype!(0x20, "Trace Link", "(Other)"),
    devtype!(0x21, "Trace Link", "(Trace funnel, Router)"),
    devtype!(0x22, "Trace Link", "(Filter)"),
    devtype!(0x23, "Trace Link", "(FIFO, Large Buffer)"),
    devtype!(0x30, "Trace Source", "(Other)"),
    devtype!(0x31, "Trace Source", "(Processor core)"),
    devtype!(0x32, "Trace Source", "(DSP)"),
    devtype!(0x33, "Trace Source", "(Data Engine or coprocessor)"),
    devtype!(0x34, "Trace Source", "(Bus activity)"),
    devtype!(0x36, "Trace Source", "(Software activity)"),
    devtype!(0x40, "Debug Control", "(Other)"),
    devtype!(0x41, "Debug Control", "(Trigger Matrix (ECT))"),
    devtype!(0x42, "Debug Control", "(Debug Authentication Module)"),
    devtype!(0x43, "Debug Control", "(Power requestor)"),
    devtype!(0x50, "Debug Logic", "(Other)"),
    devtype!(0x51, "Debug Logic", "(Processor core)"),
    devtype!(0x52, "Debug Logic", "(DSP)"),
    devtype!(0x53, "Debug Logic", "(Data Engine or coprocessor)"),
    devtype!(0x54, "Debug Logic", "(Bus activity)"),
    devtype!(0x55, "Debug Logic", "(Memory (BIST))"),
    devtype!(0x60, "Performance Monitor", "(Other)"),
    devtype!(0x61, "Performance Monitor", "(Processor)"),
    devtype!(0x62, "Performance Monitor", "(DSP)"),
    devtype!(0x63, "Performance Monitor", "(Data Engine or coprocessor)"),
    devtype!(0x64, "Performance Monitor", "(Bus activity)"),
    devtype!(0x65, "Performance Monitor", "(Memory Management Unit (MMU))"),
];

pub fn find_part(part_number: u16) -> Option<&'static PartInfo> {
    PARTS.iter().find(|p| p.part_number == part_number)
}

pub fn find_archid(archid: u16) -> Option<&'static ArchIdInfo> {
    ARCHIDS.iter().find(|a| a.archid == archid)
}

/// Look up a raw DEVTYPE register value.
pub fn find_devtype(devtype: u32) -> Option<&'static DevTypeInfo> {
    let major = (devtype & 0x0F) as u8;
    let sub = ((devtype & 0xF0) >> 4) as u8;
    let id = major << 4 | sub;
    DEVTYPES.iter().find(|d| d.id == id)
}
