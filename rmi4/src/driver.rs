//! One driver instance bound to one device.
//!
//! [Rmi4Core] owns the catalog, the function registry and the notification list
//! of a device, and exposes the consumer API function drivers use.
//!
//! Locking:
//! - `pdt` guards every scan, every address translation and catalog replacement.
//! - The registry's own lock guards function objects and subscriber lists.
//! - `pdt` is never held while the registry lock is taken. Interrupt control copies
//!   the F01 entry out of the catalog first.

use alloc::{
    string::{String, ToString},
    sync::{Arc, Weak},
};
use core::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use spin::Mutex;
use utils::debug_ex;

use crate::{
    catalog::Catalog,
    error::Rmi4Error,
    function::FunctionInfo,
    irq::{Demux, DemuxState, Dispatch, IrqControl, IrqHandler, IrqToken},
    notify::{NotificationEvent, NotificationHandler, NotifyList, NotifyToken},
    pdt::Region,
    platform::{AttentionHandler, AttentionLine, PlatformData, TriggerFlags},
    registry::{FunctionBus, FunctionRegistry},
    reset::ResetListener,
    scanner,
    transport::RegisterAccessor,
};

pub struct Rmi4Core {
    name: String,
    pub(crate) accessor: Arc<dyn RegisterAccessor>,
    pub(crate) line: Arc<dyn AttentionLine>,
    pub(crate) bus: Arc<dyn FunctionBus>,
    pub(crate) platform: PlatformData,
    irq_flags: TriggerFlags,
    pub(crate) pdt: Mutex<Catalog>,
    pub(crate) registry: FunctionRegistry,
    notify: NotifyList,
    pub(crate) props_lock: Mutex<()>,
    demux: Demux,
    gpio_requested: AtomicBool,
    pub(crate) irq_requested: AtomicBool,
    reset_token: Mutex<Option<NotifyToken>>,
}

/// Forwards attention events from the line to the core without keeping it alive.
struct CoreAttention(Weak<Rmi4Core>);

impl AttentionHandler for CoreAttention {
    fn on_attention(&self) {
        let Some(core) = self.0.upgrade() else {
            return;
        };
        if let Err(err) = core.handle_attention() {
            error!("{}: attention handling failed: {}", core.name, err);
        }
    }
}

/// Releases everything a failed probe acquired, newest first.
struct ProbeUnwind<'a> {
    core: &'a Rmi4Core,
    armed: bool,
}

impl Drop for ProbeUnwind<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("{}: probe failed, releasing resources", self.core.name);
        self.core.release_line();
        self.core.registry.clear();
        self.core.pdt.lock().clear();
    }
}

/// Lifecycle
impl Rmi4Core {
    /// Discover the functions of a device and bind the driver to it.
    ///
    /// Steps, in order: scan, populate, disable all interrupts, validate the
    /// attention line, request the GPIO (unless shared), request the line interrupt,
    /// subscribe to reset notifications, register functions. A failure releases
    /// everything acquired so far in reverse order.
    pub fn probe(
        name: &str,
        accessor: Arc<dyn RegisterAccessor>,
        line: Arc<dyn AttentionLine>,
        bus: Arc<dyn FunctionBus>,
        platform: PlatformData,
    ) -> Result<Arc<Rmi4Core>, Rmi4Error> {
        debug_ex!("{}: probing", name);

        let catalog = scanner::scan(&*accessor, platform.irq_read_len).inspect_err(|_| {
            warn!("{}: failed to scan PDT, touch may not work", name);
        })?;
        let registry = FunctionRegistry::new(platform.func_data.clone());
        registry.populate(&catalog)?;

        let irq_flags = if platform.irq_is_shared {
            platform.irq_flags | TriggerFlags::SHARED
        } else {
            platform.irq_flags
        };

        let core = Arc::new(Rmi4Core {
            name: name.to_string(),
            accessor,
            line,
            bus,
            platform,
            irq_flags,
            pdt: Mutex::new(catalog),
            registry,
            notify: NotifyList::new(),
            props_lock: Mutex::new(()),
            demux: Demux::new(),
            gpio_requested: AtomicBool::new(false),
            irq_requested: AtomicBool::new(false),
            reset_token: Mutex::new(None),
        });
        let mut unwind = ProbeUnwind {
            core: &core,
            armed: true,
        };

        core.irq_control()?.disable_all()?;
        debug_ex!("{}: all IRQs disabled", core.name);

        let attn = core.platform.attn_line;
        if attn == 0 {
            error!("{}: attention line is required", core.name);
            return Err(Rmi4Error::InvalidArgument {
                info: "attention line 0",
            });
        }
        if !core.platform.irq_is_shared {
            core.line.request_gpio(attn).inspect_err(|err| {
                error!("{}: failed to request gpio {}: {}", core.name, attn, err);
            })?;
            core.gpio_requested.store(true, Ordering::Release);
        }

        core.request_line_irq()?;

        let listener = Arc::new(ResetListener::new(Arc::downgrade(&core)));
        let token = core
            .notify
            .request(NotificationEvent::DRIVER_RESET, listener)?;
        *core.reset_token.lock() = Some(token);

        core.registry.register_all(&*core.bus).inspect_err(|err| {
            error!("{}: failed to register functions: {}", core.name, err);
        })?;

        unwind.armed = false;
        drop(unwind);
        info!("{}: probed, {} functions", core.name, core.registry.len());
        Ok(core)
    }

    /// Release the reset subscription, the line interrupt and the GPIO, newest first.
    fn release_line(&self) {
        if let Some(token) = self.reset_token.lock().take() {
            self.notify.release(token);
        }
        self.free_line_irq();
        if self.gpio_requested.swap(false, Ordering::AcqRel) {
            self.line.free_gpio(self.platform.attn_line);
        }
    }

    /// Unbind from the device.
    ///
    /// Every step runs even when an earlier one fails; the first error is returned.
    pub fn remove(&self) -> Result<(), Rmi4Error> {
        debug_ex!("{}: removing", self.name);
        let mut result = self.registry.unregister_all(&*self.bus);

        self.release_line();

        if let Err(err) = self.irq_control().and_then(|ctl| ctl.disable_all()) {
            warn!("{}: failed to disable IRQs on remove: {}", self.name, err);
            result = result.and(Err(err));
        }

        self.registry.clear();
        self.pdt.lock().clear();
        result
    }

    pub fn suspend(&self) {
        debug_ex!("{}: suspending", self.name);
        self.free_line_irq();
    }

    pub fn resume(self: &Arc<Self>) -> Result<(), Rmi4Error> {
        debug_ex!("{}: resuming", self.name);
        self.request_line_irq()
    }

    fn request_line_irq(self: &Arc<Self>) -> Result<(), Rmi4Error> {
        if self.irq_requested.load(Ordering::Acquire) {
            return Ok(());
        }
        let handler = Arc::new(CoreAttention(Arc::downgrade(self)));
        self.line
            .request_irq(self.platform.attn_line, self.irq_flags, handler)
            .inspect_err(|err| {
                error!(
                    "{}: failed to request irq on line {}: {}",
                    self.name, self.platform.attn_line, err
                );
            })?;
        self.irq_requested.store(true, Ordering::Release);
        Ok(())
    }

    fn free_line_irq(&self) {
        if self.irq_requested.swap(false, Ordering::AcqRel) {
            self.line.free_irq(self.platform.attn_line);
        }
    }
}

/// Register access
impl Rmi4Core {
    /// Read `buf.len()` bytes at `offset` inside `region` of function `func_id`.
    pub fn read(&self, func_id: u8, region: Region, offset: u16, buf: &mut [u8]) -> Result<(), Rmi4Error> {
        let catalog = self.pdt.lock();
        let entry = catalog
            .get(func_id)
            .ok_or(Rmi4Error::NoSuchFunction { func_id })?;
        let addr = entry.address(region, offset)?;
        self.accessor.read_exact(addr, buf).inspect_err(|err| {
            error!("{}: F{:02X} read at {:#06x} failed: {}", self.name, func_id, addr, err);
        })?;
        Ok(())
    }

    pub fn write(&self, func_id: u8, region: Region, offset: u16, data: &[u8]) -> Result<(), Rmi4Error> {
        let catalog = self.pdt.lock();
        let entry = catalog
            .get(func_id)
            .ok_or(Rmi4Error::NoSuchFunction { func_id })?;
        let addr = entry.address(region, offset)?;
        self.accessor.write_all(addr, data).inspect_err(|err| {
            error!("{}: F{:02X} write at {:#06x} failed: {}", self.name, func_id, addr, err);
        })?;
        Ok(())
    }

    /// [Rmi4Core::read] with a raw region selector (0 query, 1 command, 2 control, 3 data).
    pub fn read_raw(&self, func_id: u8, region: u8, offset: u16, buf: &mut [u8]) -> Result<(), Rmi4Error> {
        self.read(func_id, Region::try_from(region)?, offset, buf)
    }

    pub fn write_raw(&self, func_id: u8, region: u8, offset: u16, data: &[u8]) -> Result<(), Rmi4Error> {
        self.write(func_id, Region::try_from(region)?, offset, data)
    }

    /// Rescan the PDT and replace the catalog. Function objects are left untouched.
    ///
    /// The attention line is masked while the catalog is swapped.
    pub fn read_pdt(&self) -> Result<(), Rmi4Error> {
        let line = self.platform.attn_line;
        let masked = self.is_irq_requested();
        if masked {
            self.line.mask(line);
        }
        let result = scanner::scan(&*self.accessor, self.platform.irq_read_len).map(|fresh| {
            *self.pdt.lock() = fresh;
        });
        if masked {
            self.line.unmask(line);
        }
        result
    }

    /// Snapshot of the current catalog.
    pub fn catalog(&self) -> Catalog {
        self.pdt.lock().clone()
    }
}

/// Interrupts and notifications
impl Rmi4Core {
    pub(crate) fn irq_control(&self) -> Result<IrqControl<'_>, Rmi4Error> {
        IrqControl::new(&*self.accessor, &self.pdt.lock())
    }

    pub fn request_irq(&self, func_id: u8, handler: Arc<dyn IrqHandler>) -> Result<IrqToken, Rmi4Error> {
        let ctl = self.irq_control()?;
        self.registry.request_irq(&ctl, func_id, handler)
    }

    pub fn free_irq(&self, func_id: u8, token: IrqToken) -> Result<(), Rmi4Error> {
        let ctl = self.irq_control()?;
        self.registry.free_irq(&ctl, func_id, token)
    }

    /// Force-disable (`true`) or release one force-disable (`false`) on every
    /// function outside the essential set.
    pub fn set_non_essential_irqs(&self, disable: bool) -> Result<(), Rmi4Error> {
        let ctl = self.irq_control()?;
        self.registry.set_non_essential_irqs(&ctl, disable)
    }

    pub fn request_notification(
        &self,
        events: NotificationEvent,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<NotifyToken, Rmi4Error> {
        self.notify.request(events, handler)
    }

    pub fn release_notification(&self, token: NotifyToken) -> bool {
        self.notify.release(token)
    }

    /// Deliver `event` to every interested subscriber. Return the number invoked.
    pub fn notify(&self, event: NotificationEvent) -> usize {
        debug_ex!("{}: notify {:?}", self.name, event);
        self.notify.notify(event)
    }

    /// Run the demultiplexer once, as the attention handler does.
    pub fn handle_attention(&self) -> Result<Dispatch, Rmi4Error> {
        let ctl = self.irq_control()?;
        self.demux.run(&ctl, &self.registry)
    }

    pub fn demux_state(&self) -> DemuxState {
        self.demux.state()
    }
}

/// Accessors
impl Rmi4Core {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trigger flags the line interrupt is requested with.
    pub fn irq_flags(&self) -> TriggerFlags {
        self.irq_flags
    }

    pub fn is_irq_requested(&self) -> bool {
        self.irq_requested.load(Ordering::Acquire)
    }

    pub fn get_function(&self, func_id: u8) -> Option<FunctionInfo> {
        self.registry.get_function(func_id)
    }

    /// A handle bound to one registered function.
    pub fn function(self: &Arc<Self>, func_id: u8) -> Result<FunctionHandle, Rmi4Error> {
        if !self.registry.contains(func_id) {
            return Err(Rmi4Error::NoSuchFunction { func_id });
        }
        Ok(FunctionHandle {
            core: self.clone(),
            func_id,
        })
    }
}

/// The view a function driver gets of the core it is bound to.
#[derive(Clone)]
pub struct FunctionHandle {
    core: Arc<Rmi4Core>,
    func_id: u8,
}

impl FunctionHandle {
    pub fn func_id(&self) -> u8 {
        self.func_id
    }

    pub fn core(&self) -> &Arc<Rmi4Core> {
        &self.core
    }

    pub fn read(&self, region: Region, offset: u16, buf: &mut [u8]) -> Result<(), Rmi4Error> {
        self.core.read(self.func_id, region, offset, buf)
    }

    pub fn write(&self, region: Region, offset: u16, data: &[u8]) -> Result<(), Rmi4Error> {
        self.core.write(self.func_id, region, offset, data)
    }

    pub fn request_irq(&self, handler: Arc<dyn IrqHandler>) -> Result<IrqToken, Rmi4Error> {
        self.core.request_irq(self.func_id, handler)
    }

    pub fn free_irq(&self, token: IrqToken) -> Result<(), Rmi4Error> {
        self.core.free_irq(self.func_id, token)
    }

    pub fn set_non_essential_irqs(&self, disable: bool) -> Result<(), Rmi4Error> {
        self.core.set_non_essential_irqs(disable)
    }

    pub fn read_pdt(&self) -> Result<(), Rmi4Error> {
        self.core.read_pdt()
    }

    pub fn notify(&self, event: NotificationEvent) -> usize {
        self.core.notify(event)
    }

    pub fn info(&self) -> Option<FunctionInfo> {
        self.core.get_function(self.func_id)
    }
}
