//! The function registry: function objects, bus registration and IRQ subscriptions.

use alloc::{sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicUsize, Ordering};

use config::irq::{ESSENTIAL_FUNCTIONS, MAX_IRQ_SOURCES};
use log::{info, warn};
use spin::Mutex;
use utils::{DisableCounter, debug_ex};

use crate::{
    catalog::Catalog,
    error::Rmi4Error,
    function::{Function, FunctionData, FunctionInfo, FunctionRecord, Subscriber, function_name},
    irq::{IrqControl, IrqHandler, IrqMask, IrqToken},
};

/// The external bus function drivers bind on.
pub trait FunctionBus: Send + Sync {
    fn register_function(&self, data: &FunctionData) -> Result<(), Rmi4Error>;
    fn unregister_function(&self, data: &FunctionData) -> Result<(), Rmi4Error>;
}

/// Function objects of one device, kept in discovery order.
pub struct FunctionRegistry {
    functions: Mutex<Vec<Function>>,
    platform: Vec<FunctionData>,
    next_token: AtomicUsize,
    #[cfg(test)]
    fail_staging: core::sync::atomic::AtomicBool,
}

impl FunctionRegistry {
    /// `platform` holds the static function records merged into matching functions.
    pub fn new(platform: Vec<FunctionData>) -> FunctionRegistry {
        FunctionRegistry {
            functions: Mutex::new(Vec::new()),
            platform,
            next_token: AtomicUsize::new(0),
            #[cfg(test)]
            fail_staging: core::sync::atomic::AtomicBool::new(false),
        }
    }

    fn new_function(&self, func_id: u8) -> Result<Function, Rmi4Error> {
        #[cfg(test)]
        if self.fail_staging.load(Ordering::Relaxed) {
            return Err(Rmi4Error::Alloc);
        }
        let matching = self.platform.iter().filter(|d| d.func_id == func_id);
        let mut records = Vec::new();
        records.try_reserve(1 + matching.clone().count())?;
        records.push(FunctionRecord {
            data: FunctionData::local(func_id),
            is_local: true,
        });
        records.extend(matching.map(|data| FunctionRecord {
            data: data.clone(),
            is_local: false,
        }));

        Ok(Function {
            func_id,
            name: function_name(func_id),
            records,
            irq_mask: IrqMask::empty(),
            is_registered: false,
            subscribers: Vec::new(),
            force_disabled: DisableCounter::new(),
        })
    }

    /// Create missing functions for `catalog` and recompute every interrupt mask.
    ///
    /// New functions are staged first and only committed once every allocation has
    /// succeeded, so a failure leaves the registry exactly as it was. Existing
    /// functions keep their subscribers and force-disable counts. Functions absent
    /// from `catalog` are kept with their last mask.
    pub fn populate(&self, catalog: &Catalog) -> Result<(), Rmi4Error> {
        let mut functions = self.functions.lock();

        let mut staged: Vec<Function> = Vec::new();
        for entry in catalog.iter() {
            let func_id = entry.function_number();
            if functions.iter().any(|f| f.func_id == func_id) {
                continue;
            }
            staged.try_reserve(1)?;
            staged.push(self.new_function(func_id)?);
        }

        let mut masks: Vec<(u8, IrqMask)> = Vec::new();
        masks.try_reserve(catalog.len())?;
        let mut next_bit = 0usize;
        for entry in catalog.iter() {
            let count = entry.pdt.interrupt_source_count() as usize;
            masks.push((entry.function_number(), IrqMask::from_range(next_bit, count)));
            next_bit += count;
        }
        if next_bit > MAX_IRQ_SOURCES {
            warn!(
                "{} interrupt sources exceed the {} supported, upper bits ignored",
                next_bit, MAX_IRQ_SOURCES
            );
        }

        functions.try_reserve(staged.len())?;
        for func in staged.iter() {
            debug_ex!("Created function {}", func.name);
        }
        functions.append(&mut staged);

        for func in functions.iter_mut() {
            if let Some((_, mask)) = masks.iter().find(|(id, _)| *id == func.func_id) {
                func.irq_mask = *mask;
                debug_ex!("{} irq mask {:#x}", func.name, *func.irq_mask);
            }
        }
        Ok(())
    }

    pub fn get_function(&self, func_id: u8) -> Option<FunctionInfo> {
        self.functions
            .lock()
            .iter()
            .find(|f| f.func_id == func_id)
            .map(Function::info)
    }

    pub fn contains(&self, func_id: u8) -> bool {
        self.functions.lock().iter().any(|f| f.func_id == func_id)
    }

    pub fn len(&self) -> usize {
        self.functions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every function object.
    pub fn clear(&self) {
        self.functions.lock().clear();
    }

    /// Register the records of every function not registered yet.
    ///
    /// A record the bus refuses is logged and skipped; its function is still
    /// marked registered.
    pub fn register_all(&self, bus: &dyn FunctionBus) -> Result<(), Rmi4Error> {
        let mut functions = self.functions.lock();
        if functions.is_empty() {
            warn!("No functions to register");
            return Err(Rmi4Error::NoFunctionsFound);
        }

        for func in functions.iter_mut().filter(|f| !f.is_registered) {
            for record in func.records.iter() {
                match bus.register_function(&record.data) {
                    Ok(()) => info!("Registered {} ({})", record.data.func_name, func.name),
                    Err(err) => warn!(
                        "Failed to register {} for {}: {}",
                        record.data.func_name, func.name, err
                    ),
                }
            }
            func.is_registered = true;
        }
        Ok(())
    }

    /// Unregister every registered function, then drop all function objects.
    ///
    /// Stops at the first record the bus refuses and returns its error. Functions
    /// are only dropped when every record was unregistered.
    pub fn unregister_all(&self, bus: &dyn FunctionBus) -> Result<(), Rmi4Error> {
        let mut functions = self.functions.lock();
        for func in functions.iter_mut().filter(|f| f.is_registered) {
            for record in func.records.iter() {
                bus.unregister_function(&record.data).inspect_err(|err| {
                    warn!("Failed to unregister {}: {}", record.data.func_name, err)
                })?;
            }
            func.is_registered = false;
        }

        for func in functions.iter().filter(|f| !f.subscribers.is_empty()) {
            warn!(
                "{} still has {} IRQ subscribers",
                func.name,
                func.subscribers.len()
            );
        }
        functions.clear();
        Ok(())
    }

    /// Subscribe `handler` to the interrupts of `func_id`.
    ///
    /// The first subscriber enables the function's bits in hardware, unless the
    /// function is force-disabled. A failed enable leaves the subscriber list as it was.
    pub(crate) fn request_irq(
        &self,
        ctl: &IrqControl,
        func_id: u8,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<IrqToken, Rmi4Error> {
        let mut functions = self.functions.lock();
        let func = functions
            .iter_mut()
            .find(|f| f.func_id == func_id)
            .ok_or(Rmi4Error::NoSuchFunction { func_id })?;

        func.subscribers.try_reserve(1)?;
        if func.subscribers.is_empty() && !func.force_disabled.is_disabled() {
            ctl.set_state(func_id, func.irq_mask, true)?;
        }

        let token = IrqToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        func.subscribers.push(Subscriber { token, handler });
        debug_ex!("{} subscriber {:?} added", func.name, token);
        Ok(token)
    }

    /// Remove the subscription `token` from `func_id`.
    ///
    /// The function's bits are disabled before its last subscriber is dropped. If
    /// that fails the subscription stays in place.
    pub(crate) fn free_irq(&self, ctl: &IrqControl, func_id: u8, token: IrqToken) -> Result<(), Rmi4Error> {
        let mut functions = self.functions.lock();
        let func = functions
            .iter_mut()
            .find(|f| f.func_id == func_id)
            .ok_or(Rmi4Error::NoSuchFunction { func_id })?;

        let Some(pos) = func.subscribers.iter().position(|s| s.token == token) else {
            warn!("{}: no IRQ subscription {:?}", func.name, token);
            return Err(Rmi4Error::NotSubscribed { func_id });
        };
        if func.subscribers.len() == 1 && !func.force_disabled.is_disabled() {
            ctl.set_state(func_id, func.irq_mask, false)?;
        }
        func.subscribers.remove(pos);
        Ok(())
    }

    /// Nest a force-disable (or undo one) on every non-essential function.
    ///
    /// Hardware is only touched on the outermost transition and only for functions
    /// with subscribers. Every function is visited; the first error is returned.
    pub(crate) fn set_non_essential_irqs(&self, ctl: &IrqControl, disable: bool) -> Result<(), Rmi4Error> {
        let functions = self.functions.lock();
        let mut result = Ok(());
        for func in functions
            .iter()
            .filter(|f| !ESSENTIAL_FUNCTIONS.contains(&f.func_id))
        {
            let transition = if disable {
                func.force_disabled.disable()
            } else {
                func.force_disabled.enable()
            };
            if !transition || func.subscribers.is_empty() {
                continue;
            }
            if let Err(err) = ctl.set_state(func.func_id, func.irq_mask, !disable) {
                warn!("{}: failed to update IRQ state: {}", func.name, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Set the enable bits of every function that has subscribers and is not
    /// force-disabled.
    pub(crate) fn reenable_subscribed(&self, ctl: &IrqControl) -> Result<(), Rmi4Error> {
        let functions = self.functions.lock();
        let mut result = Ok(());
        for func in functions.iter().filter(|f| f.wants_irq()) {
            debug_ex!("Re-enabling IRQ {}", func.name);
            if let Err(err) = ctl.set_state(func.func_id, func.irq_mask, true) {
                warn!("{}: failed to re-enable IRQ: {}", func.name, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Handlers due for `status`, in registry order.
    ///
    /// A function is due when its mask is contained in `status` and it is not
    /// force-disabled. An empty mask is contained in any status.
    pub(crate) fn pending(&self, status: IrqMask) -> Vec<(u8, Arc<dyn IrqHandler>)> {
        let functions = self.functions.lock();
        functions
            .iter()
            .filter(|f| f.irq_mask.is_subset_of(&status) && !f.force_disabled.is_disabled())
            .flat_map(|f| {
                f.subscribers
                    .iter()
                    .map(move |s| (f.func_id, s.handler.clone()))
            })
            .collect()
    }
}
