use crate::objects::object::ObjectRef;

/// An active invocation: the function being run, the offset of its next
/// instruction, and where its window of the operand stack begins.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    function: ObjectRef,
    ip: usize,
    slot_base: usize,
}

impl CallFrame {
    pub fn new(function: ObjectRef, slot_base: usize) -> Self {
        CallFrame {
            function,
            ip: 0,
            slot_base,
        }
    }

    #[inline(always)]
    pub fn function(&self) -> ObjectRef {
        self.function
    }

    #[inline(always)]
    pub fn ip(&mut self) -> &mut usize {
        &mut self.ip
    }

    #[inline(always)]
    pub fn current_ip(&self) -> usize {
        self.ip
    }

    /// Stack index of slot zero, which holds the callee itself.
    #[inline(always)]
    pub fn slot_base(&self) -> usize {
        self.slot_base
    }
}
