//! Bounds and well-known values shared between the AST and VM sides.

/// Zero page: the first 256 bytes of memory, reserved for fast-access
/// variables.
pub const ZERO_PAGE_END: u16 = 0x00ff;

/// Valid range for an explicit module/block load address.
pub const LOAD_ADDRESS_MIN: u16 = 0x0200;
pub const LOAD_ADDRESS_MAX: u16 = 0xffff;

/// The reserved name for a zero-page block. Unlike every other symbol name,
/// this one is allowed to appear more than once within the same scope.
pub const ZERO_PAGE_BLOCK_NAME: &str = "ZP";

/// Byte/word array dimension bounds (inclusive).
pub const ARRAY_DIM_MIN: u32 = 1;
pub const ARRAY_DIM_MAX: u32 = 256;

/// Matrix dimension bounds (inclusive), for each of the two axes.
pub const MATRIX_DIM_MIN: u32 = 1;
pub const MATRIX_DIM_MAX: u32 = 128;

/// Matrix interleave bounds (inclusive).
pub const MATRIX_INTERLEAVE_MIN: u32 = 1;
pub const MATRIX_INTERLEAVE_MAX: u32 = 256;

/// Coercion bounds for the BYTE/WORD data types.
pub const BYTE_MIN: i64 = 0;
pub const BYTE_MAX: i64 = 255;
pub const SBYTE_MIN: i64 = -128;
pub const SBYTE_MAX: i64 = 127;
pub const WORD_MIN: i64 = 0;
pub const WORD_MAX: i64 = 65535;
pub const SWORD_MIN: i64 = -32768;
pub const SWORD_MAX: i64 = 32767;

/// Platform float bounds, matching the 5-byte MFLPT representation's range.
pub const FLOAT_MIN: f64 = -1.7014118e+38;
pub const FLOAT_MAX: f64 = 1.7014118e+38;

/// The default memory-mapped character-out address.
pub const DEFAULT_CHAROUT_ADDRESS: u16 = 0xd000;
/// The default memory-mapped character-in address.
pub const DEFAULT_CHARIN_ADDRESS: u16 = 0xd001;

/// The wall-clock period, in seconds, of the cooperative timer program.
pub const TIMER_PERIOD_SECS: f64 = 1.0 / 60.0;

/// How many main-program steps elapse between yields to let a UI thread
/// refresh, when a character screen is enabled.
pub const SCREEN_YIELD_STEPS: usize = 1000;

/// The maximum number of cycles a program may execute before being forcibly
/// halted. Mirrors `gdlk`'s `MAX_CYCLE_COUNT` infinite-loop guard.
pub const MAX_CYCLE_COUNT: usize = 10_000_000;

/// Prefix used for interned float constants, e.g. `mos65_float_const_1`.
pub const FLOAT_CONST_PREFIX: &str = "mos65_float_const_";
