//! The runtime half of the crate: the VM's program model, flattener,
//! interpreter, memory/syscalls, and screen/keyboard collaborator.
//!
//! Grounded in the teacher's `core/src/models.rs` (`HardwareSpec`/
//! `ProgramSpec` as plain, serializable data containers with little
//! behavior of their own) for the two configuration structs below.

pub mod flatten;
pub mod interp;
pub mod memory;
pub mod program;
pub mod screen;

use serde::{Deserialize, Serialize};

/// The machine a program executes on: memory-mapped I/O addresses, any
/// read-only ranges, and the optional character-screen region. Needed both
/// to build a [memory::Memory] before execution and to report it back to
/// callers (e.g. a CLI printing what a `.toml` hardware file resolved to).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HardwareSpec {
    pub charout_address: u16,
    pub charin_address: u16,
    pub read_only_ranges: Vec<(u16, u16)>,
    pub charscreen: Option<CharScreenSpec>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharScreenSpec {
    pub address: u16,
    pub width: usize,
    pub height: usize,
}

impl HardwareSpec {
    /// Build a [memory::Memory] configured per this spec.
    pub fn build_memory(&self) -> memory::Memory {
        let mut mem = memory::Memory::new();
        mem.set_io_addresses(self.charout_address, self.charin_address);
        for &(start, end) in &self.read_only_ranges {
            mem.add_read_only_range(start, end);
        }
        if let Some(screen) = self.charscreen {
            mem.enable_charscreen(screen.address, screen.width, screen.height);
        }
        mem
    }
}

impl Default for HardwareSpec {
    fn default() -> Self {
        Self {
            charout_address: crate::consts::DEFAULT_CHAROUT_ADDRESS,
            charin_address: crate::consts::DEFAULT_CHARIN_ADDRESS,
            read_only_ranges: Vec::new(),
            charscreen: None,
        }
    }
}

/// The input a program runs against: a byte stream consumed by `input`/
/// `getchr` syscalls, handed out one queued line at a time. Only needed at
/// runtime, mirroring the teacher's `ProgramSpec`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramSpec {
    /// Lines handed out in order to successive `input`/`getchr` syscalls.
    pub input_lines: Vec<String>,
}

impl ProgramSpec {
    pub fn new(input_lines: Vec<String>) -> Self {
        Self { input_lines }
    }

    /// Build a [memory::System] whose input sink drains `input_lines` in
    /// order, yielding an empty string once exhausted.
    pub fn build_system(&self) -> memory::System {
        let mut lines: std::collections::VecDeque<String> =
            self.input_lines.iter().cloned().collect();
        memory::System::new(Box::new(move || lines.pop_front().unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_spec_default_matches_consts() {
        let spec = HardwareSpec::default();
        assert_eq!(spec.charout_address, crate::consts::DEFAULT_CHAROUT_ADDRESS);
        assert_eq!(spec.charin_address, crate::consts::DEFAULT_CHARIN_ADDRESS);
    }

    #[test]
    fn test_program_spec_feeds_input_in_order() {
        let spec = ProgramSpec::new(vec!["first".into(), "second".into()]);
        let mut system = spec.build_system();
        assert_eq!(system.syscall_getchr(), b'f');
        assert_eq!(system.syscall_getchr(), b's');
    }
}
