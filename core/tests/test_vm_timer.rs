//! Timer interleave (spec §4.5 step 3 / §8 scenario 7): a configured timer
//! program runs to completion once per `TIMER_PERIOD_SECS`, each run
//! starting from a fresh synthetic call frame and leaving the timer stack
//! empty again once it returns.

use std::thread::sleep;
use std::time::Duration;

use mos65::datatype::DataType;
use mos65::vm::flatten::flatten_and_link;
use mos65::vm::interp::Interpreter;
use mos65::vm::memory::{Memory, System};
use mos65::vm::program::{Block, InstrArg, Instruction, Opcode, Program, Value, Variable};

fn byte_var(name: &str, value: u8) -> Variable {
    Variable {
        name: name.into(),
        datatype: DataType::Byte,
        value: Value::byte(value),
        is_const: false,
    }
}

#[test]
fn timer_program_fires_and_returns_the_stack_to_empty() {
    let mut main = Block::new("main");
    main.instructions.push(Instruction::new(Opcode::Nop, vec![]));
    main.instructions
        .push(Instruction::new(Opcode::Terminate, vec![]));
    let main_program = Program {
        blocks: vec![main],
    };

    let mut timer = Block::new("timer");
    timer.variables.push(byte_var("ticks", 0));
    timer.variables.push(byte_var("one", 1));
    timer.instructions.push(Instruction::new(
        Opcode::Push,
        vec![InstrArg::Name("ticks".into())],
    ));
    timer.instructions.push(Instruction::new(
        Opcode::Push,
        vec![InstrArg::Name("one".into())],
    ));
    timer
        .instructions
        .push(Instruction::new(Opcode::Add, vec![]));
    timer.instructions.push(Instruction::new(
        Opcode::Pop,
        vec![InstrArg::Name("ticks".into())],
    ));
    timer.instructions.push(Instruction::new(
        Opcode::Return,
        vec![InstrArg::Int(0)],
    ));
    let timer_program = Program {
        blocks: vec![timer],
    };

    let main_flat = flatten_and_link(&main_program);
    let timer_flat = flatten_and_link(&timer_program);

    let memory = Memory::new();
    let system = System::new(Box::new(|| String::new()));
    let mut interp =
        Interpreter::new(main_flat, Some(timer_flat), memory, system).unwrap();

    // Let more than one timer period elapse before the first step, so the
    // very first call is guaranteed to service the timer rather than race
    // the clock.
    sleep(Duration::from_millis(50));
    interp.step().unwrap();

    assert_eq!(
        interp.variable("timer.ticks").unwrap().payload,
        mos65::vm::program::Payload::Int(1)
    );
    assert_eq!(interp.timer_stack_depth(), 0);
}
