/// Number of values addressable by a one-byte operand.
pub const UINT8_COUNT: usize = u8::MAX as usize + 1;

pub const MAX_FRAMES_SIZE: usize = 64;
pub const MAX_STACK_SIZE: usize = MAX_FRAMES_SIZE * UINT8_COUNT;

pub const MAX_LOCALS: usize = UINT8_COUNT;
pub const MAX_CONSTANTS: usize = UINT8_COUNT;
pub const MAX_ARGUMENTS: usize = u8::MAX as usize;

pub const TABLE_MAX_LOAD: f64 = 0.75;
