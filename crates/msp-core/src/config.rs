//! Experiment-side MSP configuration, replacing the C preprocessor defines
//! `MSP_EXP_ADDR` / `MSP_EXP_MTU` with a validated value constructed at
//! runtime.

use msp_proto::{max_frame_size, AddrOutOfRange, ExpAddr};
use thiserror::Error;

/// Errors raised while constructing an [`ExperimentConfig`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The experiment address does not fit in 7 bits.
    #[error(transparent)]
    InvalidAddr(#[from] AddrOutOfRange),
    /// The configured MTU is zero, which can never carry a data frame (a
    /// data frame requires at least one byte of payload).
    #[error("MTU must be nonzero")]
    ZeroMtu,
}

/// The experiment's link-layer identity and maximum transmission unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExperimentConfig {
    addr: ExpAddr,
    mtu: u32,
}

impl ExperimentConfig {
    /// Builds a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddr`] if `addr` doesn't fit 7 bits, or
    /// [`ConfigError::ZeroMtu`] if `mtu` is zero.
    pub const fn new(addr: u8, mtu: u32) -> Result<Self, ConfigError> {
        let addr = match ExpAddr::new(addr) {
            Ok(addr) => addr,
            Err(e) => return Err(ConfigError::InvalidAddr(e)),
        };
        if mtu == 0 {
            return Err(ConfigError::ZeroMtu);
        }
        Ok(Self { addr, mtu })
    }

    /// The experiment's 7-bit MSP address.
    #[must_use]
    pub const fn addr(&self) -> ExpAddr {
        self.addr
    }

    /// The configured maximum transmission unit, in bytes.
    #[must_use]
    pub const fn mtu(&self) -> u32 {
        self.mtu
    }

    /// The largest frame (header or data) this configuration can produce or
    /// accept, per `MSP_EXP_MAX_FRAME_SIZE`.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        max_frame_size(self.mtu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_address_over_seven_bits() {
        assert!(matches!(
            ExperimentConfig::new(0x80, 507),
            Err(ConfigError::InvalidAddr(_))
        ));
    }

    #[test]
    fn rejects_zero_mtu() {
        assert_eq!(ExperimentConfig::new(0x35, 0), Err(ConfigError::ZeroMtu));
    }

    #[test]
    fn accepts_cubes_configuration() {
        let config = ExperimentConfig::new(0x35, 507).unwrap();
        assert_eq!(config.addr().value(), 0x35);
        assert_eq!(config.mtu(), 507);
        assert_eq!(config.max_frame_size(), 512);
    }
}
