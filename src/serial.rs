//! RS-232 modem control lines.
//!
//! DTR and RTS are outputs; CTS, DSR and RI are inputs read from the modem
//! status word. The lines are usually active-low on the wire (configurable
//! in the chip EEPROM); values are passed through unmodified, so `true`
//! typically means "active".

use crate::consts::modem;
use crate::device::Device;
use crate::error::Result;
use log::trace;

/// Snapshot of the 16-bit modem status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemStatus(pub u16);

impl ModemStatus {
    /// Clear To Send.
    pub fn cts(self) -> bool {
        self.0 & modem::CTS_MASK != 0
    }

    /// Data Set Ready.
    pub fn dsr(self) -> bool {
        self.0 & modem::DSR_MASK != 0
    }

    /// Ring Indicator.
    pub fn ri(self) -> bool {
        self.0 & modem::RI_MASK != 0
    }

    pub fn raw(self) -> u16 {
        self.0
    }
}

impl Device {
    /// Polls the modem status word.
    pub fn modem_status(&self) -> Result<ModemStatus> {
        let ctx = self.context("modem_status")?;
        let mut status = 0u16;
        let res = self.driver.library().poll_modem_status(ctx, &mut status);
        self.check(ctx, res)?;
        trace!("modem status {:#06X}", status);
        Ok(ModemStatus(status))
    }

    pub fn cts(&self) -> Result<bool> {
        Ok(self.modem_status()?.cts())
    }

    pub fn dsr(&self) -> Result<bool> {
        Ok(self.modem_status()?.dsr())
    }

    pub fn ri(&self) -> Result<bool> {
        Ok(self.modem_status()?.ri())
    }

    /// Last DTR state set on this session, `None` if never set.
    pub fn dtr(&self) -> Option<bool> {
        self.dtr
    }

    /// Drives DTR. The native call is skipped when the line already holds
    /// `state`.
    pub fn set_dtr(&mut self, state: bool) -> Result<()> {
        let ctx = self.context("set_dtr")?;
        if self.dtr != Some(state) {
            let res = self.driver.library().set_dtr(ctx, state);
            self.check(ctx, res)?;
        }
        self.dtr = Some(state);
        Ok(())
    }

    /// Last RTS state set on this session, `None` if never set.
    pub fn rts(&self) -> Option<bool> {
        self.rts
    }

    /// Drives RTS. The native call is skipped when the line already holds
    /// `state`.
    pub fn set_rts(&mut self, state: bool) -> Result<()> {
        let ctx = self.context("set_rts")?;
        if self.rts != Some(state) {
            let res = self.driver.library().set_rts(ctx, state);
            self.check(ctx, res)?;
        }
        self.rts = Some(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bits() {
        let status = ModemStatus((1 << 4) | (1 << 6));
        assert!(status.cts());
        assert!(!status.dsr());
        assert!(status.ri());
        assert_eq!(ModemStatus(0).raw(), 0);
    }
}
