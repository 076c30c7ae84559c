//! Test doubles: an in-memory register file, a PDT image builder, and recording
//! bus, line and handler collaborators.

use alloc::{collections::BTreeMap, sync::Arc, vec, vec::Vec};

use config::pdt::{PAGE_SIZE, PDT_END_SCAN_LOCATION, PDT_ENTRY_SIZE, PDT_START_SCAN_LOCATION};
use log::LevelFilter;
use spin::Mutex;

use crate::{
    error::Rmi4Error,
    function::FunctionData,
    irq::IrqHandler,
    platform::{AttentionHandler, AttentionLine, TriggerFlags},
    registry::FunctionBus,
    transport::{RegisterAccessor, TransportError},
};

const REGISTER_SPACE: usize = 0x1_0000;

struct DeviceState {
    regs: Vec<u8>,
    reads: Vec<(u16, usize)>,
    writes: Vec<(u16, Vec<u8>)>,
    read_fault: Option<TransportError>,
    write_fault: Option<TransportError>,
    short_reads: Vec<u16>,
}

/// A 64K register file with fault injection and an access log.
pub(crate) struct MockDevice {
    state: Mutex<DeviceState>,
}

impl MockDevice {
    pub fn new() -> MockDevice {
        MockDevice {
            state: Mutex::new(DeviceState {
                regs: vec![0; REGISTER_SPACE],
                reads: Vec::new(),
                writes: Vec::new(),
                read_fault: None,
                write_fault: None,
                short_reads: Vec::new(),
            }),
        }
    }

    /// Set registers without going through the access log.
    pub fn poke(&self, addr: u16, data: &[u8]) {
        let mut state = self.state.lock();
        let start = addr as usize;
        state.regs[start..start + data.len()].copy_from_slice(data);
    }

    pub fn peek(&self, addr: u16, len: usize) -> Vec<u8> {
        let state = self.state.lock();
        let start = addr as usize;
        state.regs[start..start + len].to_vec()
    }

    pub fn reads(&self) -> Vec<(u16, usize)> {
        self.state.lock().reads.clone()
    }

    pub fn writes(&self) -> Vec<(u16, Vec<u8>)> {
        self.state.lock().writes.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.reads.clear();
        state.writes.clear();
    }

    pub fn fail_reads(&self, fault: Option<TransportError>) {
        self.state.lock().read_fault = fault;
    }

    pub fn fail_writes(&self, fault: Option<TransportError>) {
        self.state.lock().write_fault = fault;
    }

    /// Make reads starting at `addr` return one byte less than requested.
    pub fn short_read_at(&self, addr: u16) {
        self.state.lock().short_reads.push(addr);
    }
}

impl RegisterAccessor for MockDevice {
    fn read(&self, addr: u16, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if let Some(fault) = state.read_fault {
            return Err(fault);
        }
        state.reads.push((addr, buf.len()));

        let start = addr as usize;
        let mut len = buf.len().min(REGISTER_SPACE - start);
        if state.short_reads.contains(&addr) {
            len = len.saturating_sub(1);
        }
        buf[..len].copy_from_slice(&state.regs[start..start + len]);
        Ok(len)
    }

    fn write(&self, addr: u16, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if let Some(fault) = state.write_fault {
            return Err(fault);
        }
        state.writes.push((addr, data.to_vec()));

        let start = addr as usize;
        let len = data.len().min(REGISTER_SPACE - start);
        state.regs[start..start + len].copy_from_slice(&data[..len]);
        Ok(len)
    }
}

/// Builds PDT pages into a [MockDevice].
///
/// Every function gets the same register bases, offset by its page.
pub(crate) struct PdtImage {
    pages: BTreeMap<u8, Vec<[u8; PDT_ENTRY_SIZE]>>,
}

impl PdtImage {
    pub const QUERY_BASE: u8 = 0x20;
    pub const COMMAND_BASE: u8 = 0x28;
    pub const CONTROL_BASE: u8 = 0x30;
    pub const DATA_BASE: u8 = 0x38;
    /// F01 interrupt enable register when F01 sits on page 0.
    pub const ENABLE_REG: u16 = Self::CONTROL_BASE as u16 + 1;
    /// F01 interrupt status register when F01 sits on page 0.
    pub const STATUS_REG: u16 = Self::DATA_BASE as u16 + 1;

    pub fn new() -> PdtImage {
        PdtImage {
            pages: BTreeMap::new(),
        }
    }

    pub fn function(self, page: u8, func: u8, irqs: u8) -> PdtImage {
        self.function_with(
            page,
            func,
            irqs,
            [
                Self::QUERY_BASE,
                Self::COMMAND_BASE,
                Self::CONTROL_BASE,
                Self::DATA_BASE,
            ],
        )
    }

    pub fn function_with(self, page: u8, func: u8, irqs: u8, bases: [u8; 4]) -> PdtImage {
        self.entry(
            page,
            [bases[0], bases[1], bases[2], bases[3], irqs & 0x07, func],
        )
    }

    pub fn terminator(self, page: u8, value: u8) -> PdtImage {
        self.entry(page, [0, 0, 0, 0, 0, value])
    }

    fn entry(mut self, page: u8, raw: [u8; PDT_ENTRY_SIZE]) -> PdtImage {
        self.pages.entry(page).or_default().push(raw);
        self
    }

    /// Clear the PDT area of every page, then lay the entries out downwards from
    /// each page's scan start.
    pub fn write_to(&self, dev: &MockDevice) {
        let area = (PDT_START_SCAN_LOCATION - PDT_END_SCAN_LOCATION) as usize + PDT_ENTRY_SIZE;
        for page in 0..=u8::MAX {
            dev.poke(page as u16 * PAGE_SIZE + PDT_END_SCAN_LOCATION, &vec![0; area]);
        }
        for (page, entries) in self.pages.iter() {
            let start = *page as u16 * PAGE_SIZE + PDT_START_SCAN_LOCATION;
            for (i, raw) in entries.iter().enumerate() {
                dev.poke(start - (i * PDT_ENTRY_SIZE) as u16, raw);
            }
        }
    }

    pub fn build(&self) -> MockDevice {
        let dev = MockDevice::new();
        self.write_to(&dev);
        dev
    }
}

struct BusState {
    registered: Vec<u8>,
    unregistered: Vec<u8>,
    failing: Option<u8>,
}

/// Records the function number of every successful (un)registration.
pub(crate) struct MockBus {
    state: Mutex<BusState>,
}

impl MockBus {
    pub fn new() -> MockBus {
        MockBus {
            state: Mutex::new(BusState {
                registered: Vec::new(),
                unregistered: Vec::new(),
                failing: None,
            }),
        }
    }

    pub fn fail_on(&self, func_id: u8) {
        self.state.lock().failing = Some(func_id);
    }

    pub fn fail_on_none(&self) {
        self.state.lock().failing = None;
    }

    pub fn registered(&self) -> Vec<u8> {
        self.state.lock().registered.clone()
    }

    pub fn unregistered(&self) -> Vec<u8> {
        self.state.lock().unregistered.clone()
    }
}

impl FunctionBus for MockBus {
    fn register_function(&self, data: &FunctionData) -> Result<(), Rmi4Error> {
        let mut state = self.state.lock();
        if state.failing == Some(data.func_id) {
            return Err(Rmi4Error::Registration {
                func_id: data.func_id,
            });
        }
        state.registered.push(data.func_id);
        Ok(())
    }

    fn unregister_function(&self, data: &FunctionData) -> Result<(), Rmi4Error> {
        let mut state = self.state.lock();
        if state.failing == Some(data.func_id) {
            return Err(Rmi4Error::Registration {
                func_id: data.func_id,
            });
        }
        state.unregistered.push(data.func_id);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineEvent {
    RequestGpio(u32),
    FreeGpio(u32),
    RequestIrq(u32),
    FreeIrq(u32),
    Mask(u32),
    Unmask(u32),
}

struct LineState {
    events: Vec<LineEvent>,
    handler: Option<Arc<dyn AttentionHandler>>,
    last_flags: Option<TriggerFlags>,
    fail_gpio: bool,
    fail_irq: bool,
}

/// Records line operations and delivers attention on [MockLine::fire].
pub(crate) struct MockLine {
    state: Mutex<LineState>,
}

impl MockLine {
    pub fn new() -> MockLine {
        MockLine {
            state: Mutex::new(LineState {
                events: Vec::new(),
                handler: None,
                last_flags: None,
                fail_gpio: false,
                fail_irq: false,
            }),
        }
    }

    pub fn events(&self) -> Vec<LineEvent> {
        self.state.lock().events.clone()
    }

    pub fn last_flags(&self) -> Option<TriggerFlags> {
        self.state.lock().last_flags
    }

    pub fn fail_gpio_request(&self, fail: bool) {
        self.state.lock().fail_gpio = fail;
    }

    pub fn fail_irq_request(&self, fail: bool) {
        self.state.lock().fail_irq = fail;
    }

    /// Invoke the registered attention handler, if any.
    pub fn fire(&self) {
        let handler = self.state.lock().handler.clone();
        if let Some(handler) = handler {
            handler.on_attention();
        }
    }
}

impl AttentionLine for MockLine {
    fn request_gpio(&self, line: u32) -> Result<(), Rmi4Error> {
        let mut state = self.state.lock();
        if state.fail_gpio {
            return Err(Rmi4Error::Platform {
                info: "gpio busy",
            });
        }
        state.events.push(LineEvent::RequestGpio(line));
        Ok(())
    }

    fn free_gpio(&self, line: u32) {
        self.state.lock().events.push(LineEvent::FreeGpio(line));
    }

    fn request_irq(
        &self,
        line: u32,
        flags: TriggerFlags,
        handler: Arc<dyn AttentionHandler>,
    ) -> Result<(), Rmi4Error> {
        let mut state = self.state.lock();
        if state.fail_irq {
            return Err(Rmi4Error::Platform {
                info: "irq unavailable",
            });
        }
        state.events.push(LineEvent::RequestIrq(line));
        state.handler = Some(handler);
        state.last_flags = Some(flags);
        Ok(())
    }

    fn free_irq(&self, line: u32) {
        let mut state = self.state.lock();
        state.events.push(LineEvent::FreeIrq(line));
        state.handler = None;
    }

    fn mask(&self, line: u32) {
        self.state.lock().events.push(LineEvent::Mask(line));
    }

    fn unmask(&self, line: u32) {
        self.state.lock().events.push(LineEvent::Unmask(line));
    }
}

/// Remembers the function number of every interrupt it receives.
pub(crate) struct RecordingHandler {
    calls: Mutex<Vec<u8>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<RecordingHandler> {
        Arc::new(RecordingHandler {
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<u8> {
        self.calls.lock().clone()
    }
}

impl IrqHandler for RecordingHandler {
    fn handle_irq(&self, func_id: u8) {
        self.calls.lock().push(func_id);
    }
}

fn print_sink(args: core::fmt::Arguments) {
    std::println!("{}", args);
}

/// Install the console logger once per test binary.
pub(crate) fn init_logger() {
    let _ = crate::logging::init(print_sink, LevelFilter::Debug);
}
