//! Flattener & linker (spec §4.4): turns a `Program` (nested `Block`s) into
//! one linear `Instruction` list plus merged variable/label maps keyed by
//! dotted path, then wires `next`/`alt_next` per opcode class. Grounded in
//! the teacher's `delabel.rs` (index rewriting into absolute targets) and
//! `tinyvm/vm.py`'s `flatten`/`connect_instruction_pointers`.

use crate::vm::program::{Block, InstrArg, Instruction, Opcode, Program, Variable};
use std::collections::HashMap;

/// The output of flattening one `Program`: one flat instruction list plus
/// the dotted-path variable and label maps that index into it.
#[derive(Clone, Debug, Default)]
pub struct FlatProgram {
    pub instructions: Vec<Instruction>,
    pub variables: HashMap<String, Variable>,
    pub labels: HashMap<String, usize>,
}

/// Flatten `program`, append a TERMINATE, and link `next`/`alt_next`
/// pointers. This is the sole entry point; `flatten_block` and `link` below
/// are its two phases.
pub fn flatten_and_link(program: &Program) -> FlatProgram {
    let mut flat = FlatProgram::default();
    for block in &program.blocks {
        flatten_block(block, &block.name, &mut flat);
    }
    flat.instructions.push(Instruction::new(Opcode::Terminate, vec![]));
    link(&mut flat);
    flat
}

/// Recursively flatten `block` under dotted `prefix`, appending its own
/// instructions (with string args rewritten to dotted form) before
/// recursing into sub-blocks, matching `tinyvm`'s depth-first "parent then
/// children" append order.
fn flatten_block(block: &Block, prefix: &str, out: &mut FlatProgram) {
    let base = out.instructions.len();

    for (label, local_index) in &block.labels {
        out.labels
            .insert(format!("{}.{}", prefix, label), base + local_index);
    }
    for var in &block.variables {
        out.variables
            .insert(format!("{}.{}", prefix, var.name), var.clone());
    }

    for instr in &block.instructions {
        let mut rewritten = instr.clone();
        // SYSCALL's first argument is a selector, not a name -- left as-is
        // per spec §4.4 step 1.
        let skip_first = instr.opcode == Opcode::Syscall;
        for (i, arg) in rewritten.args.iter_mut().enumerate() {
            if skip_first && i == 0 {
                continue;
            }
            if let InstrArg::Name(name) = arg {
                if !name.contains('.') {
                    *arg = InstrArg::Name(format!("{}.{}", prefix, name));
                }
            }
        }
        out.instructions.push(rewritten);
    }

    for sub in &block.blocks {
        let sub_prefix = format!("{}.{}", prefix, sub.name);
        flatten_block(sub, &sub_prefix, out);
    }
}

/// Wire `next`/`alt_next` across the whole flat list, per spec §4.4 step 3:
/// JUMP sets `next` to the resolved label target; JUMP_IF_{TRUE,FALSE} keep
/// `next` as fall-through and set `alt_next` to the label; CALL sets `next`
/// to the callee's label and `alt_next` to the fall-through (the return
/// site); everything else's `next` is the textual successor.
fn link(flat: &mut FlatProgram) {
    let len = flat.instructions.len();
    for i in 0..len {
        let fallthrough = if i + 1 < len { Some(i + 1) } else { None };
        let opcode = flat.instructions[i].opcode;
        let target = match opcode {
            Opcode::Jump
            | Opcode::JumpIfTrue
            | Opcode::JumpIfFalse
            | Opcode::Call
            | Opcode::JumpIfStatusSet
            | Opcode::JumpIfStatusClear => flat.instructions[i]
                .args
                .last()
                .and_then(InstrArg::as_name)
                .and_then(|name| flat.labels.get(name))
                .copied(),
            _ => None,
        };

        let instr = &mut flat.instructions[i];
        match opcode {
            Opcode::Jump => {
                instr.next = target;
            }
            Opcode::JumpIfTrue
            | Opcode::JumpIfFalse
            | Opcode::JumpIfStatusSet
            | Opcode::JumpIfStatusClear => {
                instr.next = fallthrough;
                instr.alt_next = target;
            }
            Opcode::Call => {
                instr.next = target;
                instr.alt_next = fallthrough;
            }
            Opcode::Terminate => {
                instr.next = None;
            }
            _ => {
                instr.next = fallthrough;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::vm::program::Value;

    #[test]
    fn test_flatten_every_instruction_has_next_except_terminate() {
        let mut block = Block::new("main");
        block.instructions.push(Instruction::new(
            Opcode::Push,
            vec![InstrArg::Name("x".into())],
        ));
        block
            .instructions
            .push(Instruction::new(Opcode::Nop, vec![]));
        block.variables.push(Variable {
            name: "x".into(),
            datatype: DataType::Byte,
            value: Value::byte(1),
            is_const: false,
        });
        let program = Program {
            blocks: vec![block],
        };
        let flat = flatten_and_link(&program);
        for (i, instr) in flat.instructions.iter().enumerate() {
            if instr.opcode != Opcode::Terminate {
                assert!(instr.next.is_some(), "instruction {} missing next", i);
            }
        }
        assert!(flat.variables.contains_key("main.x"));
    }

    #[test]
    fn test_call_sets_next_and_alt_next() {
        let mut sub = Block::new("sub1");
        sub.labels.insert("entry".into(), 0);
        sub.instructions
            .push(Instruction::new(Opcode::Return, vec![]));

        let mut main = Block::new("main");
        main.instructions.push(Instruction::new(
            Opcode::Call,
            vec![
                InstrArg::Int(0),
                InstrArg::Name("main.sub1.entry".into()),
            ],
        ));
        main.instructions
            .push(Instruction::new(Opcode::Nop, vec![]));

        let program = Program {
            blocks: vec![main, sub],
        };
        let flat = flatten_and_link(&program);
        let call = &flat.instructions[0];
        assert!(call.next.is_some());
        assert!(call.alt_next.is_some());
    }
}
