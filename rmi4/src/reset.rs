//! Rediscovery after the device reports a reset.

use alloc::sync::Weak;

use log::{error, info, warn};
use utils::debug_ex;

use crate::{
    driver::Rmi4Core,
    error::Rmi4Error,
    irq::IrqControl,
    notify::{NotificationEvent, NotificationHandler},
    scanner,
};

/// Runs [Rmi4Core::reset] on [NotificationEvent::DRIVER_RESET].
pub(crate) struct ResetListener {
    core: Weak<Rmi4Core>,
}

impl ResetListener {
    pub fn new(core: Weak<Rmi4Core>) -> ResetListener {
        ResetListener { core }
    }
}

impl NotificationHandler for ResetListener {
    fn on_notification(&self, event: NotificationEvent) {
        if !event.contains(NotificationEvent::DRIVER_RESET) {
            warn!("Notification {:?} not handled", event);
            return;
        }
        let Some(core) = self.core.upgrade() else {
            return;
        };
        if let Err(err) = core.reset() {
            error!("{}: reset failed: {}", core.name(), err);
        }
    }
}

impl Rmi4Core {
    /// Rediscover the device after a reset.
    ///
    /// The attention line is masked for the whole sequence. If the rescan or the
    /// repopulation fails, the previous catalog and functions stay in place.
    /// Subscriptions and force-disable counts survive, and the enable bits of every
    /// subscribed function are written again.
    pub fn reset(&self) -> Result<(), Rmi4Error> {
        let line = self.platform.attn_line;
        let masked = self.is_irq_requested();
        if masked {
            self.line.mask(line);
        }
        let result = self.rediscover();
        if masked {
            self.line.unmask(line);
        }
        result
    }

    fn rediscover(&self) -> Result<(), Rmi4Error> {
        let catalog = {
            let _pdt = self.pdt.lock();
            scanner::scan(&*self.accessor, self.platform.irq_read_len).inspect_err(|err| {
                error!("{}: failed to rescan PDT: {}", self.name(), err);
            })?
        };

        self.registry.populate(&catalog).inspect_err(|err| {
            error!("{}: failed to populate function data: {}", self.name(), err);
        })?;

        let ctl = IrqControl::new(&*self.accessor, &catalog);
        *self.pdt.lock() = catalog;
        let ctl = ctl?;

        if let Err(err) = ctl.disable_all() {
            warn!("{}: failed to clear IRQ state: {}", self.name(), err);
        }
        if let Err(err) = self.registry.reenable_subscribed(&ctl) {
            warn!("{}: failed to re-enable IRQs: {}", self.name(), err);
        }

        self.registry.register_all(&*self.bus).inspect_err(|err| {
            error!("{}: failed to register functions: {}", self.name(), err);
        })?;

        debug_ex!("{}: reset complete", self.name());
        info!("{}: driver reset, {} functions", self.name(), self.registry.len());
        Ok(())
    }
}
