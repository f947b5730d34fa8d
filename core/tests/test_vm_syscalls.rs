//! Memory-mapped I/O and syscall integration (spec §4.6): a `printchr`
//! SYSCALL instruction should route through `System`/`Memory` to whatever
//! sink the hardware was built with, exactly as a real character-out
//! address would.

use std::io::Write;
use std::sync::{Arc, Mutex};

use mos65::datatype::DataType;
use mos65::vm::flatten::flatten_and_link;
use mos65::vm::interp::Interpreter;
use mos65::vm::memory::{Memory, System};
use mos65::vm::program::{Block, InstrArg, Instruction, Opcode, Value, Variable};

#[derive(Clone, Default)]
struct CapturingSink(Arc<Mutex<Vec<u8>>>);

impl Write for CapturingSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn printchr_syscall_writes_through_to_the_configured_sink() {
    let sink = CapturingSink::default();
    let captured = sink.0.clone();

    let mut main = Block::new("main");
    main.variables.push(Variable {
        name: "letter".into(),
        datatype: DataType::Byte,
        value: Value::byte(b'!'),
        is_const: false,
    });
    main.instructions.push(Instruction::new(
        Opcode::Push,
        vec![InstrArg::Name("letter".into())],
    ));
    main.instructions.push(Instruction::new(
        Opcode::Syscall,
        vec![InstrArg::Name("printchr".into())],
    ));

    let program = mos65::vm::program::Program { blocks: vec![main] };
    let flat = flatten_and_link(&program);

    let memory = Memory::with_sink(Box::new(sink));
    let system = System::new(Box::new(|| String::new()));
    let mut interp = Interpreter::new(flat, None, memory, system).unwrap();
    interp.run().unwrap();

    assert_eq!(&*captured.lock().unwrap(), b"!");
}

#[test]
fn getchr_syscall_drains_the_queued_input_lines_in_order() {
    use mos65::vm::ProgramSpec;

    let program_spec = ProgramSpec::new(vec!["hi".into(), "there".into()]);
    let mut system = program_spec.build_system();
    assert_eq!(system.syscall_getchr(), b'h');
    assert_eq!(system.syscall_getchr(), b't');
    // Exhausted: further reads yield the null byte, never a panic.
    assert_eq!(system.syscall_getchr(), 0);
}
