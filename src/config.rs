//! Tunables for link bring-up, discovery and flash programming.

/// Poll bounds and discovery limits.
///
/// Timeouts that are `None` poll forever, which is what the hardware
/// handshakes traditionally do.
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bound on each half of the CDBGRSTREQ/CDBGRSTACK handshake.
    pub reset_timeout_ms: u64,
    /// Bound on the CSYSPWRUPACK/CDBGPWRUPACK wait.
    pub power_up_timeout_ms: Option<u64>,
    /// Deepest ROM table nesting that will be followed.
    pub max_rom_depth: u32,
    /// Bound on the authentication port's device erase.
    pub aap_erase_timeout_ms: Option<u64>,
    /// Bound on a flash loader stub run.
    pub stub_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reset_timeout_ms: 200,
            power_up_timeout_ms: None,
            max_rom_depth: 8,
            aap_erase_timeout_ms: None,
            stub_timeout_ms: None,
        }
    }
}
