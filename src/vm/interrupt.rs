use crate::vm::cpu::Cpu;
use crate::vm::error::Result;

/// What a host service did with a raised vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    Done,
    /// The vector is claimed but this function number is not provided.
    Unimplemented(u8),
    /// The guest asked to exit with this return code.
    Terminate(u8),
}

/// A host-side implementation of one or more software interrupts.
///
/// Called synchronously from `INT`; it may change any register, flag or
/// memory byte and execution resumes after the `INT` with those changes.
pub trait InterruptHandler {
    fn handle(&mut self, vector: u8, cpu: &mut Cpu) -> Result<Service>;

    fn name(&self) -> &'static str;
}

struct VectorMapping {
    start: u8,
    end: u8,
    handler_idx: usize,
}

/// Vector ranges mapped to host handlers. First registration wins on overlap.
#[derive(Default)]
pub struct InterruptBus {
    handlers: Vec<Box<dyn InterruptHandler>>,
    mappings: Vec<VectorMapping>,
}

impl InterruptBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, start: u8, end: u8, handler: Box<dyn InterruptHandler>) {
        let idx = self.handlers.len();
        self.handlers.push(handler);
        self.mappings.push(VectorMapping {
            start,
            end,
            handler_idx: idx,
        });
    }

    pub fn handler_mut(&mut self, vector: u8) -> Option<&mut Box<dyn InterruptHandler>> {
        let idx = self
            .mappings
            .iter()
            .find(|mapping| mapping.start <= vector && vector <= mapping.end)?
            .handler_idx;
        self.handlers.get_mut(idx)
    }

    pub fn is_claimed(&self, vector: u8) -> bool {
        self.mappings
            .iter()
            .any(|mapping| mapping.start <= vector && vector <= mapping.end)
    }
}
