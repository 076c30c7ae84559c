//! Board-supplied configuration and the attention line collaborator.

use alloc::{sync::Arc, vec::Vec};

use bitflags::bitflags;

use crate::{catalog::IrqReadLen, error::Rmi4Error, function::FunctionData};

bitflags! {
    /// Trigger configuration passed along when requesting the attention interrupt.
    pub struct TriggerFlags: u32 {
        const RISING    = 0x0000_0001;
        const FALLING   = 0x0000_0002;
        const HIGH      = 0x0000_0004;
        const LOW       = 0x0000_0008;
        const SHARED    = 0x0000_0080;
        const ONESHOT   = 0x0000_2000;
    }
}

/// Static description of one device instance.
#[derive(Debug, Clone)]
pub struct PlatformData {
    /// GPIO carrying the attention signal. Zero is not a valid line.
    pub attn_line: u32,
    pub irq_flags: TriggerFlags,
    /// Another device owns the GPIO; only the interrupt is requested.
    pub irq_is_shared: bool,
    /// Static function records, merged into discovered functions by number.
    pub func_data: Vec<FunctionData>,
    pub irq_read_len: IrqReadLen,
}

impl PlatformData {
    pub fn new(attn_line: u32) -> PlatformData {
        PlatformData {
            attn_line,
            irq_flags: TriggerFlags::FALLING | TriggerFlags::ONESHOT,
            irq_is_shared: false,
            func_data: Vec::new(),
            irq_read_len: IrqReadLen::default(),
        }
    }

    pub fn with_flags(mut self, flags: TriggerFlags) -> PlatformData {
        self.irq_flags = flags;
        self
    }

    pub fn shared(mut self, shared: bool) -> PlatformData {
        self.irq_is_shared = shared;
        self
    }

    pub fn with_function(mut self, data: FunctionData) -> PlatformData {
        self.func_data.push(data);
        self
    }

    pub fn with_read_len(mut self, policy: IrqReadLen) -> PlatformData {
        self.irq_read_len = policy;
        self
    }
}

/// Called from the platform interrupt context when the attention line fires.
pub trait AttentionHandler: Send + Sync {
    fn on_attention(&self);
}

/// The GPIO and interrupt line the device signals attention on.
pub trait AttentionLine: Send + Sync {
    fn request_gpio(&self, line: u32) -> Result<(), Rmi4Error>;
    fn free_gpio(&self, line: u32);
    fn request_irq(
        &self,
        line: u32,
        flags: TriggerFlags,
        handler: Arc<dyn AttentionHandler>,
    ) -> Result<(), Rmi4Error>;
    fn free_irq(&self, line: u32);
    /// Stop delivering attention events until [AttentionLine::unmask].
    fn mask(&self, line: u32);
    fn unmask(&self, line: u32);
}
