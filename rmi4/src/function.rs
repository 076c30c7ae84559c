//! Function objects owned by the registry.

use alloc::{boxed::Box, format, string::String, sync::Arc, vec::Vec};

use utils::DisableCounter;

use crate::irq::{IrqHandler, IrqMask, IrqToken};

/// A record handed to the function bus so a function driver can bind to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionData {
    pub func_id: u8,
    pub func_name: Box<str>,
}

impl FunctionData {
    pub fn new(func_id: u8, func_name: &str) -> FunctionData {
        FunctionData {
            func_id,
            func_name: func_name.into(),
        }
    }

    /// The record generated for a discovered function, named `fXX`.
    pub fn local(func_id: u8) -> FunctionData {
        FunctionData {
            func_id,
            func_name: function_name(func_id).into_boxed_str(),
        }
    }
}

pub(crate) fn function_name(func_id: u8) -> String {
    format!("f{:02X}", func_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    pub data: FunctionData,
    /// Generated by the core rather than taken from platform data.
    pub is_local: bool,
}

pub(crate) struct Subscriber {
    pub token: IrqToken,
    pub handler: Arc<dyn IrqHandler>,
}

pub(crate) struct Function {
    pub func_id: u8,
    pub name: String,
    pub records: Vec<FunctionRecord>,
    pub irq_mask: IrqMask,
    pub is_registered: bool,
    pub subscribers: Vec<Subscriber>,
    pub force_disabled: DisableCounter,
}

impl Function {
    /// Whether the hardware enable bits of this function should be set.
    pub fn wants_irq(&self) -> bool {
        !self.subscribers.is_empty() && !self.force_disabled.is_disabled()
    }

    pub fn info(&self) -> FunctionInfo {
        FunctionInfo {
            func_id: self.func_id,
            name: self.name.clone(),
            irq_mask: self.irq_mask,
            is_registered: self.is_registered,
            subscribers: self.subscribers.len(),
            force_disable_count: self.force_disabled.get_count(),
            records: self.records.clone(),
        }
    }
}

/// Snapshot of a function object, taken under the registry lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub func_id: u8,
    pub name: String,
    pub irq_mask: IrqMask,
    pub is_registered: bool,
    pub subscribers: usize,
    pub force_disable_count: usize,
    pub records: Vec<FunctionRecord>,
}
