//! Raw register access to a debug port, supplied by the physical SWD/JTAG driver.

/// Which side of the DAP a raw access targets.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Port {
    Dp,
    Ap,
}

/// An error in the communication with an access port or
/// debug port.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq, Copy)]
pub enum DapError {
    /// The target device did not respond to the request.
    #[error("Target device did not respond to request.")]
    NoAcknowledge,
    /// The target kept answering WAIT until the transfer timed out.
    #[error("Transfer timed out.")]
    Timeout,
}

/// Single register transfers on the wire.
///
/// AP reads are posted: the value returned by an AP read belongs to the
/// previous AP read, and the last one is collected from RDBUFF.
///
/// A FAULT acknowledge is not reported as an error. Implementations latch it
/// into CTRL/STAT.STICKYERR, where [`Dp::error`](crate::dp::Dp::error) picks it up.
pub trait Probe {
    fn raw_read(&mut self, port: Port, addr: u8) -> Result<u32, anyhow::Error>;
    fn raw_write(&mut self, port: Port, addr: u8, val: u32) -> Result<(), anyhow::Error>;
}

/// Is this error a transport timeout?
pub fn is_timeout(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<DapError>(), Some(DapError::Timeout))
}
