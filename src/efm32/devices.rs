//! EFM32/EFR32/EZR32 device and Device Information (DI) tables.

/// Per-family parameters.
#[derive(Debug)]
pub struct Device {
    pub family: u8,
    /// DI layout this family uses.
    pub di_version: u8,
    pub name: &'static str,
    /// Page size used for erase and write. Smaller than or equal to what the DI reports.
    pub page_size: u32,
    /// MSC register block base.
    pub msc: u32,
    pub has_radio: bool,
    pub user_data_size: u32,
    pub bootloader_size: u32,
    pub description: &'static str,
}

macro_rules! device {
    ($family:expr, $di:expr, $name:expr, $page:expr, $msc:expr, $radio:expr, $ud:expr, $bl:expr, $desc:expr) => {
        Device {
            family: $family,
            di_version: $di,
            name: $name,
            page_size: $page,
            msc: $msc,
            has_radio: $radio,
            user_data_size: $ud,
            bootloader_size: $bl,
            description: $desc,
        }
    };
}

/// Searched in order; a repeated family resolves to its first entry.
pub static DEVICES: &[Device] = &[
    device!(71, 1, "EFM32G", 512, 0x400C_0000, false, 512, 0, "Gecko"),
    device!(72, 1, "EFM32GG", 2048, 0x400C_0000, false, 4096, 0, "Giant Gecko"),
    device!(73, 1, "EFM32TG", 512, 0x400C_0000, false, 512, 0, "Tiny Gecko"),
    device!(74, 1, "EFM32LG", 2048, 0x400C_0000, false, 2048, 0, "Leopard Gecko"),
    device!(75, 1, "EFM32WG", 2048, 0x400C_0000, false, 2048, 0, "Wonder Gecko"),
    device!(76, 1, "EFM32ZG", 1024, 0x400C_0000, false, 1024, 0, "Zero Gecko"),
    device!(77, 1, "EFM32HG", 1024, 0x400C_0000, false, 1024, 0, "Happy Gecko"),
    device!(120, 2, "EZR32WG", 2048, 0x400C_0000, true, 2048, 0, "EZR Wonder Gecko"),
    device!(121, 2, "EZR32LG", 2048, 0x400C_0000, true, 2048, 0, "EZR Leopard Gecko"),
    device!(122, 2, "EZR32HG", 1024, 0x400C_0000, true, 1024, 0, "EZR Happy Gecko"),
    device!(81, 3, "EFM32PG1B", 2048, 0x400E_0000, false, 2048, 10240, "Pearl Gecko"),
    device!(83, 3, "EFM32JG1B", 2048, 0x400E_0000, false, 2048, 10240, "Jade Gecko"),
    device!(85, 3, "EFM32PG12B", 2048, 0x400E_0000, false, 2048, 32768, "Pearl Gecko 12"),
    device!(87, 3, "EFM32JG12B", 2048, 0x400E_0000, false, 2048, 32768, "Jade Gecko 12"),
    device!(100, 3, "EFM32GG11B", 4096, 0x4000_0000, false, 4096, 32768, "Giant Gecko 11"),
    device!(103, 3, "EFM32TG11B", 2048, 0x4000_0000, false, 2048, 18432, "Tiny Gecko 11"),
    device!(106, 3, "EFM32GG12B", 2048, 0x4000_0000, false, 2048, 32768, "Giant Gecko 12"),
    device!(16, 3, "EFR32MG1P", 2048, 0x400E_0000, true, 2048, 10240, "Mighty Gecko"),
    device!(17, 3, "EFR32MG1B", 2048, 0x400E_0000, true, 2048, 10240, "Mighty Gecko"),
    device!(18, 3, "EFR32MG1V", 2048, 0x400E_0000, true, 2048, 10240, "Mighty Gecko"),
    device!(19, 3, "EFR32BG1P", 2048, 0x400E_0000, true, 2048, 10240, "Blue Gecko"),
    device!(20, 3, "EFR32BG1B", 2048, 0x400E_0000, true, 2048, 10240, "Blue Gecko"),
    device!(21, 3, "EFR32BG1V", 2048, 0x400E_0000, true, 2048, 10240, "Blue Gecko"),
    device!(25, 3, "EFR32FG1P", 2048, 0x400E_0000, true, 2048, 10240, "Flex Gecko"),
    device!(26, 3, "EFR32FG1B", 2048, 0x400E_0000, true, 2048, 10240, "Flex Gecko"),
    device!(27, 3, "EFR32FG1V", 2048, 0x400E_0000, true, 2048, 10240, "Flex Gecko"),
    device!(28, 3, "EFR32MG12P", 2048, 0x400E_0000, true, 2048, 32768, "Mighty Gecko"),
    device!(29, 3, "EFR32MG12B", 2048, 0x400E_0000, true, 2048, 32768, "Mighty Gecko"),
    device!(30, 3, "EFR32MG12V", 2048, 0x400E_0000, true, 2048, 32768, "Mighty Gecko"),
    device!(31, 3, "EFR32BG12P", 2048, 0x400E_0000, true, 2048, 32768, "Blue Gecko"),
    device!(32, 3, "EFR32BG12B", 2048, 0x400E_0000, true, 2048, 32768, "Blue Gecko"),
    device!(33, 3, "EFR32BG12V", 2048, 0x400E_0000, true, 2048, 32768, "Blue Gecko"),
    device!(37, 3, "EFR32FG12P", 2048, 0x400E_0000, true, 2048, 32768, "Flex Gecko"),
    device!(38, 3, "EFR32FG12B", 2048, 0x400E_0000, true, 2048, 32768, "Flex Gecko"),
    device!(39, 3, "EFR32FG12V", 2048, 0x400E_0000, true, 2048, 32768, "Flex Gecko"),
    device!(40, 3, "EFR32MG13P", 2048, 0x400E_0000, true, 2048, 16384, "Mighty Gecko"),
    device!(41, 3, "EFR32MG13B", 2048, 0x400E_0000, true, 2048, 16384, "Mighty Gecko"),
    device!(42, 3, "EFR32MG13V", 2048, 0x400E_0000, true, 2048, 16384, "Mighty Gecko"),
    device!(43, 3, "EFR32BG13P", 2048, 0x400E_0000, true, 2048, 16384, "Blue Gecko"),
    device!(44, 3, "EFR32BG13B", 2048, 0x400E_0000, true, 2048, 16384, "Blue Gecko"),
    device!(45, 3, "EFR32BG13V", 2048, 0x400E_0000, true, 2048, 16384, "Blue Gecko"),
    device!(45, 3, "EFR32ZG13P", 2048, 0x400E_0000, true, 2048, 16384, "Zero Gecko"),
    device!(49, 3, "EFR32FG13P", 2048, 0x400E_0000, true, 2048, 16384, "Flex Gecko"),
    device!(50, 3, "EFR32FG13B", 2048, 0x400E_0000, true, 2048, 16384, "Flex Gecko"),
    device!(51, 3, "EFR32FG13V", 2048, 0x400E_0000, true, 2048, 16384, "Flex Gecko"),
    device!(52, 3, "EFR32MG14P", 2048, 0x400E_0000, true, 2048, 16384, "Mighty Gecko"),
    device!(53, 3, "EFR32MG14B", 2048, 0x400E_0000, true, 2048, 16384, "Mighty Gecko"),
    device!(54, 3, "EFR32MG14V", 2048, 0x400E_0000, true, 2048, 16384, "Mighty Gecko"),
    device!(55, 3, "EFR32BG14P", 2048, 0x400E_0000, true, 2048, 16384, "Blue Gecko"),
    device!(56, 3, "EFR32BG14B", 2048, 0x400E_0000, true, 2048, 16384, "Blue Gecko"),
    device!(57, 3, "EFR32BG14V", 2048, 0x400E_0000, true, 2048, 16384, "Blue Gecko"),
    device!(58, 3, "EFR32ZG14P", 2048, 0x400E_0000, true, 2048, 16384, "Zero Gecko"),
    device!(61, 3, "EFR32FG14P", 2048, 0x400E_0000, true, 2048, 16384, "Flex Gecko"),
    device!(62, 3, "EFR32FG14B", 2048, 0x400E_0000, true, 2048, 16384, "Flex Gecko"),
    device!(63, 3, "EFR32FG14V", 2048, 0x400E_0000, true, 2048, 16384, "Flex Gecko"),
    device!(128, 4, "EFR32xG21", 8192, 0x4003_0000, true, 1024, 0, "Flex Gecko"),
    device!(129, 4, "EFR32xG21", 8192, 0x4003_0000, true, 1024, 0, "Mighty Gecko"),
    device!(130, 4, "EFR32xG21", 8192, 0x4003_0000, true, 1024, 0, "Blue Gecko"),
    device!(221, 4, "EFR32xG22", 8192, 0x4003_0000, true, 1024, 0, "Flex Gecko"),
    device!(222, 4, "EFR32xG22", 8192, 0x4003_0000, true, 1024, 0, "Mighty Gecko"),
    device!(223, 4, "EFR32xG22", 8192, 0x4003_0000, true, 1024, 0, "Blue Gecko"),
];

pub fn lookup_device(family: u8) -> Option<&'static Device> {
    DEVICES.iter().find(|d| d.family == family)
}

/// Where one DI version keeps each field, as absolute addresses.
#[derive(Debug)]
pub struct DiLayout {
    pub version: u8,
    pub base: u32,
    pub part: u32,
    pub msize: u32,
    pub meminfo: u32,
    pub unique_lo: u32,
    pub unique_hi: u32,
    /// Package/temperature/pin-count word, where the layout has one.
    pub pkginfo: Option<u32>,
    /// Radio part number, 16 bits wide.
    pub radio: Option<u32>,
}

pub const DI_V1_BASE: u32 = super::INFO_BASE + 0x081B0;
pub const DI_V2_BASE: u32 = super::INFO_BASE + 0x081A8;
pub const DI_V3_BASE: u32 = super::INFO_BASE + 0x081B0;
pub const DI_V4_BASE: u32 = super::INFO_BASE + 0x08000;

/// Size of the page holding the DI.
pub const DI_PAGE_SIZE: u32 = 0x1000;

pub static DI_LAYOUTS: &[DiLayout] = &[
    // EFM32xG
    DiLayout {
        version: 1,
        base: DI_V1_BASE,
        part: DI_V1_BASE + 0x4C,
        msize: DI_V1_BASE + 0x48,
        meminfo: DI_V1_BASE + 0x34,
        unique_lo: DI_V1_BASE + 0x40,
        unique_hi: DI_V1_BASE + 0x44,
        pkginfo: None,
        radio: None,
    },
    // EZR32xG
    DiLayout {
        version: 2,
        base: DI_V2_BASE,
        part: DI_V2_BASE + 0x54,
        msize: DI_V2_BASE + 0x50,
        meminfo: DI_V2_BASE + 0x3C,
        unique_lo: DI_V2_BASE + 0x48,
        unique_hi: DI_V2_BASE + 0x4C,
        pkginfo: None,
        radio: Some(DI_V2_BASE + 0x04),
    },
    // EFR32xG1x
    DiLayout {
        version: 3,
        base: DI_V3_BASE,
        part: DI_V3_BASE + 0x4C,
        msize: DI_V3_BASE + 0x48,
        meminfo: DI_V3_BASE + 0x34,
        unique_lo: DI_V3_BASE + 0x40,
        unique_hi: DI_V3_BASE + 0x44,
        pkginfo: Some(DI_V3_BASE + 0x34),
        radio: None,
    },
    // EFR32xG2x, unique number is the EUI64
    DiLayout {
        version: 4,
        base: DI_V4_BASE,
        part: DI_V4_BASE + 0x04,
        msize: DI_V4_BASE + 0x0C,
        meminfo: DI_V4_BASE + 0x08,
        unique_lo: DI_V4_BASE + 0x48,
        unique_hi: DI_V4_BASE + 0x4C,
        pkginfo: Some(DI_V4_BASE + 0x10),
        radio: None,
    },
];

pub fn di_layout(version: u8) -> Option<&'static DiLayout> {
    DI_LAYOUTS.iter().find(|l| l.version == version)
}

impl DiLayout {
    /// Human-readable series name for `efm_info`.
    pub fn series(&self) -> &'static str {
        match self.version {
            1 => "EFM32xG",
            2 => "EZR32xG",
            3 => "EFR32xG1x",
            _ => "EFR32xG2x",
        }
    }

    pub fn part_number(&self, part: u32) -> u16 {
        part as u16
    }

    pub fn part_family(&self, part: u32) -> u8 {
        if self.version == 4 {
            let num = (part >> 16 & 0x3F) as u8;
            let family = (part >> 24 & 0x3F) as u8;
            num.wrapping_add(family)
        } else {
            (part >> 16) as u8
        }
    }

    /// Page size the chip reports, in bytes. `None` for an exponent that doesn't fit, as on a blank DI.
    pub fn page_size(&self, meminfo: u32) -> Option<u32> {
        let exp = if self.version == 4 { meminfo & 0xFF } else { meminfo >> 24 & 0xFF };
        1u32.checked_shl(exp + 10)
    }
}

/// Flash and RAM sizes in KiB from MSIZE.
pub fn msize_kib(msize: u32) -> (u16, u16) {
    (msize as u16, (msize >> 16) as u16)
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PkgInfo {
    pub tempgrade: u8,
    pub pkgtype: u8,
    pub pincount: u8,
}

impl From<u32> for PkgInfo {
    fn from(raw: u32) -> Self {
        Self {
            tempgrade: raw as u8,
            pkgtype: (raw >> 8) as u8,
            pincount: (raw >> 16) as u8,
        }
    }
}

static PKGTYPES: &[(u8, &str)] = &[(74, "WLCSP"), (76, "BGA"), (77, "QFN"), (81, "QFxP")];

static TEMPGRADES: &[(u8, &str)] = &[
    (0, "-40 to 85degC"),
    (1, "-40 to 125degC"),
    (2, "-40 to 105degC"),
    (3, "0 to 70degC"),
];

pub fn pkgtype_name(pkgtype: u8) -> Option<&'static str> {
    PKGTYPES.iter().find(|(id, _)| *id == pkgtype).map(|(_, name)| *name)
}

pub fn tempgrade_name(tempgrade: u8) -> Option<&'static str> {
    TEMPGRADES.iter().find(|(id, _)| *id == tempgrade).map(|(_, name)| *name)
}
