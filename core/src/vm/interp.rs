//! Dispatch loop, typed value stack, and timer interleaving (spec §4.5).
//! Grounded in the teacher's `machine.rs` (`execute_next_inner -> Result<
//! bool, (Error, Span)>`, one handler per opcode) and `tinyvm/vm.py`'s
//! `dispatch_table`/`timer_irq` structure.

use crate::consts::{MAX_CYCLE_COUNT, SCREEN_YIELD_STEPS, TIMER_PERIOD_SECS};
use crate::datatype::DataType;
use crate::debug;
use crate::error::{ExecutionError, TerminateExecution};
use crate::vm::flatten::FlatProgram;
use crate::vm::memory::{Memory, System};
use crate::vm::program::{CallFrameMarker, InstrArg, Opcode, Payload, StackItem, Value};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Internal dispatch outcome: either a hard runtime error or the
/// `TerminateExecution` sentinel spec §5 describes ("a TerminateExecution
/// signal raised from any opcode, notably TERMINATE, unwinds the dispatch
/// loop cleanly"). `step`/`run_timer_to_completion` catch the latter and
/// return quietly; the former propagates after a stack snapshot is logged.
enum Signal {
    Exec(ExecutionError),
    Terminate(TerminateExecution),
}

impl From<ExecutionError> for Signal {
    fn from(e: ExecutionError) -> Self {
        Signal::Exec(e)
    }
}

/// The typed value stack. Enforces that only `Value`s or
/// `CallFrameMarker`s are ever on it (spec §3.2 invariant), and keeps the
/// last 10 popped items for debug dumps, mirroring `tinyvm`'s
/// `pop_history` deque.
#[derive(Default)]
pub struct Stack {
    items: Vec<StackItem>,
    pop_history: VecDeque<StackItem>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.items.len()
    }

    pub fn push_value(&mut self, value: Value) {
        self.items.push(StackItem::Value(value));
    }

    pub fn push_marker(&mut self, marker: CallFrameMarker) {
        self.items.push(StackItem::Marker(marker));
    }

    /// Insert a `CallFrameMarker` beneath the `n` topmost items (spec §4.5:
    /// CALL "inserts a CallFrameMarker beneath N argument slots").
    pub fn insert_marker_under(&mut self, n: usize, marker: CallFrameMarker) {
        let at = self.items.len().saturating_sub(n);
        self.items.insert(at, StackItem::Marker(marker));
    }

    fn record_pop(&mut self, item: StackItem) -> StackItem {
        self.pop_history.push_back(item.clone());
        if self.pop_history.len() > 10 {
            self.pop_history.pop_front();
        }
        item
    }

    pub fn pop_value(&mut self) -> Result<Value, ExecutionError> {
        match self.items.pop() {
            Some(StackItem::Value(v)) => {
                self.record_pop(StackItem::Value(v.clone()));
                Ok(v)
            }
            Some(other @ StackItem::Marker(_)) => {
                self.record_pop(other);
                Err(ExecutionError::StackUnderflow)
            }
            None => Err(ExecutionError::StackUnderflow),
        }
    }

    /// Pop Values until (and including) the nearest `CallFrameMarker`,
    /// returning the marker and the values popped above it, deepest last.
    /// Used by RETURN: "pops the CallFrameMarker positioned beneath [the
    /// return values]".
    pub fn pop_through_marker(
        &mut self,
        above: usize,
    ) -> Result<CallFrameMarker, ExecutionError> {
        if above >= self.items.len() {
            return Err(ExecutionError::StackUnderflow);
        }
        let marker_index = self.items.len() - 1 - above;
        match self.items.remove(marker_index) {
            StackItem::Marker(m) => Ok(m),
            StackItem::Value(_) => Err(ExecutionError::CallStackEmpty),
        }
    }

    pub fn dup_top(&mut self) -> Result<(), ExecutionError> {
        let top = self.items.last().cloned().ok_or(ExecutionError::StackUnderflow)?;
        self.items.push(top);
        Ok(())
    }

    pub fn dup_top2(&mut self) -> Result<(), ExecutionError> {
        if self.items.len() < 2 {
            return Err(ExecutionError::StackUnderflow);
        }
        let len = self.items.len();
        let a = self.items[len - 2].clone();
        let b = self.items[len - 1].clone();
        self.items.push(a);
        self.items.push(b);
        Ok(())
    }

    pub fn swap_top(&mut self) -> Result<(), ExecutionError> {
        let len = self.items.len();
        if len < 2 {
            return Err(ExecutionError::StackUnderflow);
        }
        self.items.swap(len - 1, len - 2);
        Ok(())
    }

    /// The top `n` items plus the last 10 popped, for a debug dump on an
    /// unhandled error (spec §5: "dump a stack debug snapshot").
    pub fn debug_stack(&self, n: usize) -> String {
        let top: Vec<_> = self
            .items
            .iter()
            .rev()
            .take(n)
            .map(|i| format!("{:?}", i))
            .collect();
        let history: Vec<_> = self.pop_history.iter().map(|i| format!("{:?}", i)).collect();
        format!("top {}: {:?}\nlast popped: {:?}", n, top, history)
    }
}

/// Which execution context is currently running.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Context {
    Main,
    Timer,
}

/// The interpreter: owns both programs, both stacks, the shared variable
/// space, memory, and the syscall collaborator.
pub struct Interpreter {
    main: FlatProgram,
    timer: Option<FlatProgram>,
    main_stack: Stack,
    timer_stack: Stack,
    variables: HashMap<String, Value>,
    const_vars: std::collections::HashSet<String>,
    pub memory: Memory,
    pub system: System,
    main_pc: Option<usize>,
    timer_pc: Option<usize>,
    last_timer_fire: Instant,
    steps_since_yield: usize,
    cycles: usize,
}

impl Interpreter {
    pub fn new(main: FlatProgram, timer: Option<FlatProgram>, memory: Memory, system: System) -> Result<Self, ExecutionError> {
        verify_dispatch_complete()?;

        let mut variables = HashMap::new();
        let mut const_vars = std::collections::HashSet::new();
        for (name, var) in main.variables.iter().chain(timer.iter().flat_map(|t| t.variables.iter())) {
            variables.insert(name.clone(), var.value.clone());
            if var.is_const {
                const_vars.insert(name.clone());
            }
        }

        Ok(Self {
            main_pc: Some(0),
            timer_pc: None,
            main,
            timer,
            main_stack: Stack::new(),
            timer_stack: Stack::new(),
            variables,
            const_vars,
            memory,
            system,
            last_timer_fire: Instant::now(),
            steps_since_yield: 0,
            cycles: 0,
        })
    }

    pub fn main_stack_depth(&self) -> usize {
        self.main_stack.depth()
    }

    pub fn timer_stack_depth(&self) -> usize {
        self.timer_stack.depth()
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Run until TERMINATE, a fatal error, or the cycle limit, per spec §5's
    /// cancellation rule: TerminateExecution unwinds cleanly and returns Ok.
    pub fn run(&mut self) -> Result<(), ExecutionError> {
        loop {
            match self.step() {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Execute a single main-program step (after first servicing the timer
    /// if due). Returns `Ok(true)` to keep running, `Ok(false)` on a clean
    /// TERMINATE.
    pub fn step(&mut self) -> Result<bool, ExecutionError> {
        if self.cycles >= MAX_CYCLE_COUNT {
            return Err(ExecutionError::CycleLimitExceeded(MAX_CYCLE_COUNT));
        }
        self.cycles += 1;

        self.maybe_run_timer();

        let pc = match self.main_pc {
            Some(pc) => pc,
            None => return Ok(false),
        };

        match self.execute_at(Context::Main, pc) {
            Ok(Some(next)) => {
                self.main_pc = Some(next);
            }
            Ok(None) => {
                self.main_pc = None;
                return Ok(false);
            }
            Err(Signal::Terminate(_)) => {
                self.main_pc = None;
                return Ok(false);
            }
            Err(Signal::Exec(e)) => {
                debug!(println!("main stack at error: {}", self.main_stack.debug_stack(8)));
                return Err(e);
            }
        }

        if self.memory.charscreen_enabled() {
            self.steps_since_yield += 1;
            if self.steps_since_yield >= SCREEN_YIELD_STEPS {
                self.steps_since_yield = 0;
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        Ok(true)
    }

    /// Check the monotonic clock and, if `TIMER_PERIOD_SECS` has elapsed,
    /// run the timer program to completion (spec §4.5's timer interleave).
    fn maybe_run_timer(&mut self) {
        if self.timer.is_none() {
            return;
        }
        if self.last_timer_fire.elapsed() < Duration::from_secs_f64(TIMER_PERIOD_SECS) {
            return;
        }
        self.last_timer_fire = Instant::now();
        self.run_timer_to_completion();
    }

    fn run_timer_to_completion(&mut self) {
        self.timer_pc = Some(0);
        self.timer_stack.push_marker(CallFrameMarker { return_pc: None });

        loop {
            let pc = match self.timer_pc {
                Some(pc) => pc,
                None => break,
            };
            match self.execute_at(Context::Timer, pc) {
                Ok(Some(next)) => self.timer_pc = Some(next),
                Ok(None) => {
                    self.timer_pc = None;
                    break;
                }
                Err(Signal::Terminate(_)) => {
                    self.timer_pc = None;
                    break;
                }
                Err(Signal::Exec(_)) => {
                    debug!(println!("timer stack at error: {}", self.timer_stack.debug_stack(8)));
                    self.timer_pc = None;
                    break;
                }
            }
        }
    }

    fn program_for(&self, ctx: Context) -> &FlatProgram {
        match ctx {
            Context::Main => &self.main,
            Context::Timer => self.timer.as_ref().expect("timer program missing"),
        }
    }

    fn stack_for(&mut self, ctx: Context) -> &mut Stack {
        match ctx {
            Context::Main => &mut self.main_stack,
            Context::Timer => &mut self.timer_stack,
        }
    }

    /// Execute the instruction at flat index `pc`, returning the next index
    /// to run (`None` on a clean halt of that context).
    fn execute_at(&mut self, ctx: Context, pc: usize) -> Result<Option<usize>, Signal> {
        let instr = self
            .program_for(ctx)
            .instructions
            .get(pc)
            .cloned()
            .ok_or(ExecutionError::InvalidJumpTarget(pc))?;

        match instr.opcode {
            Opcode::Terminate => return Err(Signal::Terminate(TerminateExecution)),
            Opcode::Nop => {}
            Opcode::Push => {
                let name = arg_name(&instr, 0)?;
                let value = self.read_variable(&name)?;
                self.stack_for(ctx).push_value(value);
            }
            Opcode::Push2 | Opcode::Push3 => {
                for i in 0..instr.args.len() {
                    let name = arg_name(&instr, i)?;
                    let value = self.read_variable(&name)?;
                    self.stack_for(ctx).push_value(value);
                }
            }
            Opcode::Pop => {
                let name = arg_name(&instr, 0)?;
                let value = self.stack_for(ctx).pop_value()?;
                self.write_variable(&name, value)?;
            }
            Opcode::Pop2 | Opcode::Pop3 => {
                for i in 0..instr.args.len() {
                    let name = arg_name(&instr, i)?;
                    let value = self.stack_for(ctx).pop_value()?;
                    self.write_variable(&name, value)?;
                }
            }
            Opcode::Dup => self.stack_for(ctx).dup_top()?,
            Opcode::Dup2 => self.stack_for(ctx).dup_top2()?,
            Opcode::Swap => self.stack_for(ctx).swap_top()?,
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let b = self.stack_for(ctx).pop_value()?;
                let a = self.stack_for(ctx).pop_value()?;
                let result = apply_arith(instr.opcode, a, b)?;
                self.stack_for(ctx).push_value(result);
            }
            Opcode::And | Opcode::Or | Opcode::Xor => {
                let b = self.stack_for(ctx).pop_value()?;
                let a = self.stack_for(ctx).pop_value()?;
                let result = match instr.opcode {
                    Opcode::And => a.truthy() && b.truthy(),
                    Opcode::Or => a.truthy() || b.truthy(),
                    Opcode::Xor => a.truthy() != b.truthy(),
                    _ => unreachable!(),
                };
                self.stack_for(ctx).push_value(Value::boolean(result));
            }
            Opcode::Not => {
                let a = self.stack_for(ctx).pop_value()?;
                self.stack_for(ctx).push_value(Value::boolean(!a.truthy()));
            }
            Opcode::Test => {
                let a = self.stack_for(ctx).pop_value()?;
                self.stack_for(ctx).push_value(Value::boolean(a.truthy()));
            }
            Opcode::CmpEq
            | Opcode::CmpLt
            | Opcode::CmpGt
            | Opcode::CmpLte
            | Opcode::CmpGte => {
                let b = self.stack_for(ctx).pop_value()?;
                let a = self.stack_for(ctx).pop_value()?;
                let result = apply_compare(instr.opcode, &a, &b)?;
                self.stack_for(ctx).push_value(Value::boolean(result));
            }
            Opcode::Call => {
                let nargs = match instr.args.first() {
                    Some(InstrArg::Int(n)) => *n as usize,
                    _ => 0,
                };
                let return_pc = instr.alt_next;
                self.stack_for(ctx)
                    .insert_marker_under(nargs, CallFrameMarker { return_pc });
                return Ok(instr.next);
            }
            Opcode::Return => {
                let kreturns = match instr.args.first() {
                    Some(InstrArg::Int(n)) => *n as usize,
                    _ => 0,
                };
                let marker = self.stack_for(ctx).pop_through_marker(kreturns)?;
                return Ok(marker.return_pc);
            }
            Opcode::Jump => return Ok(instr.next),
            Opcode::JumpIfTrue | Opcode::JumpIfFalse => {
                let cond = self.stack_for(ctx).pop_value()?;
                let take = cond.truthy() == (instr.opcode == Opcode::JumpIfTrue);
                return Ok(if take { instr.alt_next } else { instr.next });
            }
            Opcode::JumpIfStatusSet | Opcode::JumpIfStatusClear => {
                let flag = match instr.args.first() {
                    Some(InstrArg::Name(n)) => n.chars().next().unwrap_or('?'),
                    _ => '?',
                };
                return Err(ExecutionError::UnsupportedStatusJump { flag });
            }
            Opcode::Syscall => {
                self.execute_syscall(ctx, &instr)?;
            }
        }
        Ok(instr.next)
    }

    fn execute_syscall(&mut self, ctx: Context, instr: &crate::vm::program::Instruction) -> Result<(), ExecutionError> {
        let selector = match instr.args.first() {
            Some(InstrArg::Name(n)) => n.clone(),
            _ => return Err(ExecutionError::UnknownSyscall("<missing>".into())),
        };
        match selector.as_str() {
            "printchr" => {
                let v = self.stack_for(ctx).pop_value()?;
                let byte = v.as_i64().unwrap_or(0) as u8;
                self.system.syscall_printchr(&mut self.memory, byte)?;
            }
            "printstr" => {
                let len_v = self.stack_for(ctx).pop_value()?;
                let addr_v = self.stack_for(ctx).pop_value()?;
                let len = len_v.as_i64().unwrap_or(0) as usize;
                let addr = addr_v.as_i64().unwrap_or(0) as u16;
                self.system.syscall_printstr(&mut self.memory, addr, len)?;
            }
            "input" => {
                let bytes = self.system.syscall_input();
                self.stack_for(ctx).push_value(Value {
                    datatype: DataType::ArrayByte,
                    payload: Payload::Bytes(bytes.clone()),
                    length: bytes.len(),
                    height: 0,
                });
            }
            "getchr" => {
                let byte = self.system.syscall_getchr();
                self.stack_for(ctx).push_value(Value::byte(byte));
            }
            "delay" => {
                let v = self.stack_for(ctx).pop_value()?;
                self.system.syscall_delay(v.as_i64().unwrap_or(0) as u64);
            }
            "memwrite_byte" => {
                let value = self.stack_for(ctx).pop_value()?;
                let address = self.stack_for(ctx).pop_value()?;
                self.system.syscall_memwrite_byte(
                    &mut self.memory,
                    address.as_i64().unwrap_or(0) as u16,
                    value.as_i64().unwrap_or(0) as u8,
                )?;
            }
            "memwrite_sbyte" => {
                let value = self.stack_for(ctx).pop_value()?;
                let address = self.stack_for(ctx).pop_value()?;
                self.system.syscall_memwrite_sbyte(
                    &mut self.memory,
                    address.as_i64().unwrap_or(0) as u16,
                    value.as_i64().unwrap_or(0) as i8,
                )?;
            }
            "memwrite_word" => {
                let value = self.stack_for(ctx).pop_value()?;
                let address = self.stack_for(ctx).pop_value()?;
                self.system.syscall_memwrite_word(
                    &mut self.memory,
                    address.as_i64().unwrap_or(0) as u16,
                    value.as_i64().unwrap_or(0) as u16,
                )?;
            }
            "memwrite_sword" => {
                let value = self.stack_for(ctx).pop_value()?;
                let address = self.stack_for(ctx).pop_value()?;
                self.system.syscall_memwrite_sword(
                    &mut self.memory,
                    address.as_i64().unwrap_or(0) as u16,
                    value.as_i64().unwrap_or(0) as i16,
                )?;
            }
            "memwrite_float" => {
                let value = self.stack_for(ctx).pop_value()?;
                let address = self.stack_for(ctx).pop_value()?;
                self.system.syscall_memwrite_float(
                    &mut self.memory,
                    address.as_i64().unwrap_or(0) as u16,
                    value.as_f64().unwrap_or(0.0),
                )?;
            }
            "memwrite_str" => {
                let value = self.stack_for(ctx).pop_value()?;
                let address = self.stack_for(ctx).pop_value()?;
                let bytes = match &value.payload {
                    Payload::Bytes(b) => b.clone(),
                    _ => return Err(ExecutionError::TypeMismatch {
                        expected: DataType::ArrayByte,
                        found: value.datatype,
                    }),
                };
                self.system.syscall_memwrite_str(
                    &mut self.memory,
                    address.as_i64().unwrap_or(0) as u16,
                    &bytes,
                )?;
            }
            "memread_byte" => {
                let address = self.stack_for(ctx).pop_value()?;
                let byte = self
                    .system
                    .syscall_memread_byte(&mut self.memory, address.as_i64().unwrap_or(0) as u16)?;
                self.stack_for(ctx).push_value(Value::byte(byte));
            }
            "decimalstr_signed" => {
                let v = self.stack_for(ctx).pop_value()?;
                let bytes = self.system.syscall_decimalstr_signed(v.as_i64().unwrap_or(0));
                self.stack_for(ctx).push_value(Value {
                    datatype: DataType::ArrayByte,
                    length: bytes.len(),
                    height: 0,
                    payload: Payload::Bytes(bytes),
                });
            }
            "decimalstr_unsigned" => {
                let v = self.stack_for(ctx).pop_value()?;
                let bytes = self
                    .system
                    .syscall_decimalstr_unsigned(v.as_i64().unwrap_or(0) as u64);
                self.stack_for(ctx).push_value(Value {
                    datatype: DataType::ArrayByte,
                    length: bytes.len(),
                    height: 0,
                    payload: Payload::Bytes(bytes),
                });
            }
            "hexstr_signed" => {
                let v = self.stack_for(ctx).pop_value()?;
                let bytes = self.system.syscall_hexstr_signed(v.as_i64().unwrap_or(0));
                self.stack_for(ctx).push_value(Value {
                    datatype: DataType::ArrayByte,
                    length: bytes.len(),
                    height: 0,
                    payload: Payload::Bytes(bytes),
                });
            }
            "hexstr_unsigned" => {
                let v = self.stack_for(ctx).pop_value()?;
                let bytes = self
                    .system
                    .syscall_hexstr_unsigned(v.as_i64().unwrap_or(0) as u64);
                self.stack_for(ctx).push_value(Value {
                    datatype: DataType::ArrayByte,
                    length: bytes.len(),
                    height: 0,
                    payload: Payload::Bytes(bytes),
                });
            }
            other => return Err(ExecutionError::UnknownSyscall(other.to_string())),
        }
        Ok(())
    }

    fn read_variable(&self, name: &str) -> Result<Value, ExecutionError> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::UndefinedVariable(name.to_string()))
    }

    fn write_variable(&mut self, name: &str, value: Value) -> Result<(), ExecutionError> {
        if self.const_vars.contains(name) {
            return Err(ExecutionError::ConstAssignment {
                name: name.to_string(),
            });
        }
        let slot = self
            .variables
            .get_mut(name)
            .ok_or_else(|| ExecutionError::UndefinedVariable(name.to_string()))?;
        *slot = value;
        Ok(())
    }
}

/// Hand-maintained mirror of the opcodes `execute_at`'s match handles,
/// written independently of `Opcode::ALL` the same way `tinyvm`'s
/// `dispatch_table` dict literal is written independently of its `Opcode`
/// enum -- if a new variant is added to one and not the other, this list
/// falls out of sync with it rather than with itself.
const DISPATCHED: &[Opcode] = &[
    Opcode::Terminate,
    Opcode::Nop,
    Opcode::Push,
    Opcode::Push2,
    Opcode::Push3,
    Opcode::Pop,
    Opcode::Pop2,
    Opcode::Pop3,
    Opcode::Dup,
    Opcode::Dup2,
    Opcode::Swap,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::And,
    Opcode::Or,
    Opcode::Xor,
    Opcode::Not,
    Opcode::Test,
    Opcode::CmpEq,
    Opcode::CmpLt,
    Opcode::CmpGt,
    Opcode::CmpLte,
    Opcode::CmpGte,
    Opcode::Call,
    Opcode::Return,
    Opcode::Jump,
    Opcode::JumpIfTrue,
    Opcode::JumpIfFalse,
    Opcode::Syscall,
    Opcode::JumpIfStatusSet,
    Opcode::JumpIfStatusClear,
];

/// Every opcode `Opcode::ALL` declares must appear in `DISPATCHED`, checked
/// at interpreter construction time (spec §4.5: "a missing entry is a fatal
/// initialization error").
fn verify_dispatch_complete() -> Result<(), ExecutionError> {
    let dispatched: std::collections::HashSet<Opcode> = DISPATCHED.iter().copied().collect();
    for op in Opcode::ALL {
        if !dispatched.contains(op) {
            return Err(ExecutionError::UnknownSyscall(format!("{:?}", op)));
        }
    }
    Ok(())
}

fn arg_name(instr: &crate::vm::program::Instruction, index: usize) -> Result<String, ExecutionError> {
    match instr.args.get(index) {
        Some(InstrArg::Name(n)) => Ok(n.clone()),
        _ => Err(ExecutionError::UndefinedVariable(format!("<arg {}>", index))),
    }
}

/// ADD/SUB/MUL/DIV: preserve the type of `a` (the deeper operand). Per spec
/// §9's resolved open question, MUL genuinely multiplies.
fn apply_arith(op: Opcode, a: Value, b: Value) -> Result<Value, ExecutionError> {
    if a.datatype != DataType::Float && b.datatype == DataType::Float {
        return Err(ExecutionError::TypeMismatch {
            expected: a.datatype,
            found: b.datatype,
        });
    }

    if a.datatype == DataType::Float {
        let x = a.as_f64().ok_or(ExecutionError::TypeMismatch {
            expected: DataType::Float,
            found: b.datatype,
        })?;
        let y = b.as_f64().ok_or(ExecutionError::TypeMismatch {
            expected: DataType::Float,
            found: b.datatype,
        })?;
        let result = match op {
            Opcode::Add => x + y,
            Opcode::Sub => x - y,
            Opcode::Mul => x * y,
            Opcode::Div => {
                if y == 0.0 {
                    return Err(ExecutionError::DivisionByZero);
                }
                x / y
            }
            _ => unreachable!(),
        };
        return Ok(Value::scalar(DataType::Float, Payload::Float(result)));
    }

    let x = a.as_i64().ok_or(ExecutionError::TypeMismatch {
        expected: a.datatype,
        found: b.datatype,
    })?;
    let y = b.as_i64().ok_or(ExecutionError::TypeMismatch {
        expected: a.datatype,
        found: b.datatype,
    })?;
    let raw = match op {
        Opcode::Add => x.wrapping_add(y),
        Opcode::Sub => x.wrapping_sub(y),
        Opcode::Mul => x.wrapping_mul(y),
        Opcode::Div => {
            if y == 0 {
                return Err(ExecutionError::DivisionByZero);
            }
            x.wrapping_div(y)
        }
        _ => unreachable!(),
    };

    let wrapped = match a.datatype {
        DataType::Byte => raw.rem_euclid(256),
        DataType::Word => raw.rem_euclid(65536),
        DataType::SByte => {
            if !(-128..=127).contains(&raw) {
                return Err(ExecutionError::TypeMismatch {
                    expected: DataType::SByte,
                    found: DataType::SByte,
                });
            }
            raw
        }
        DataType::SWord => {
            if !(-32768..=32767).contains(&raw) {
                return Err(ExecutionError::TypeMismatch {
                    expected: DataType::SWord,
                    found: DataType::SWord,
                });
            }
            raw
        }
        _ => raw,
    };

    Ok(Value::scalar(a.datatype, Payload::Int(wrapped)))
}

fn apply_compare(op: Opcode, a: &Value, b: &Value) -> Result<bool, ExecutionError> {
    if a.datatype != DataType::Float && b.datatype == DataType::Float {
        return Err(ExecutionError::TypeMismatch {
            expected: a.datatype,
            found: b.datatype,
        });
    }
    let x = a.as_f64().ok_or(ExecutionError::TypeMismatch {
        expected: a.datatype,
        found: b.datatype,
    })?;
    let y = b.as_f64().ok_or(ExecutionError::TypeMismatch {
        expected: a.datatype,
        found: b.datatype,
    })?;
    Ok(match op {
        Opcode::CmpEq => x == y,
        Opcode::CmpLt => x < y,
        Opcode::CmpGt => x > y,
        Opcode::CmpLte => x <= y,
        Opcode::CmpGte => x >= y,
        _ => unreachable!(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::flatten::flatten_and_link;
    use crate::vm::program::{Block, Instruction, Program, Variable};

    fn system() -> System {
        System::new(Box::new(|| String::new()))
    }

    #[test]
    fn test_vm_arithmetic_byte_wrap() {
        let mut block = Block::new("main");
        block.variables.push(Variable {
            name: "a".into(),
            datatype: DataType::Byte,
            value: Value::byte(250),
            is_const: false,
        });
        block.variables.push(Variable {
            name: "b".into(),
            datatype: DataType::Byte,
            value: Value::byte(10),
            is_const: false,
        });
        block.instructions.push(Instruction::new(Opcode::Push, vec![InstrArg::Name("a".into())]));
        block.instructions.push(Instruction::new(Opcode::Push, vec![InstrArg::Name("b".into())]));
        block.instructions.push(Instruction::new(Opcode::Add, vec![]));
        let program = Program { blocks: vec![block] };
        let flat = flatten_and_link(&program);
        let mut interp = Interpreter::new(flat, None, Memory::new(), system()).unwrap();
        interp.run().unwrap();
        assert_eq!(interp.main_stack.pop_value().unwrap().as_i64(), Some(4));
    }

    #[test]
    fn test_vm_call_return_stack_depth() {
        let mut callee = Block::new("add_one");
        callee.labels.insert("entry".into(), 0);
        callee.instructions.push(Instruction::new(Opcode::Pop, vec![InstrArg::Name("arg".into())]));
        callee.variables.push(Variable {
            name: "arg".into(),
            datatype: DataType::Byte,
            value: Value::byte(0),
            is_const: false,
        });
        callee.variables.push(Variable {
            name: "one".into(),
            datatype: DataType::Byte,
            value: Value::byte(1),
            is_const: true,
        });
        callee.instructions.push(Instruction::new(Opcode::Push, vec![InstrArg::Name("arg".into())]));
        callee.instructions.push(Instruction::new(Opcode::Push, vec![InstrArg::Name("one".into())]));
        callee.instructions.push(Instruction::new(Opcode::Add, vec![]));
        callee.instructions.push(Instruction::new(Opcode::Return, vec![InstrArg::Int(1)]));

        let mut main = Block::new("main");
        main.variables.push(Variable {
            name: "seven".into(),
            datatype: DataType::Byte,
            value: Value::byte(7),
            is_const: true,
        });
        main.instructions.push(Instruction::new(Opcode::Push, vec![InstrArg::Name("seven".into())]));
        main.instructions.push(Instruction::new(
            Opcode::Call,
            vec![InstrArg::Int(1), InstrArg::Name("add_one.entry".into())],
        ));
        main.instructions.push(Instruction::new(Opcode::Terminate, vec![]));

        let program = Program { blocks: vec![main, callee] };
        let flat = flatten_and_link(&program);
        let mut interp = Interpreter::new(flat, None, Memory::new(), system()).unwrap();
        let depth_before = interp.main_stack_depth();
        interp.run().unwrap();
        assert_eq!(interp.main_stack.pop_value().unwrap().as_i64(), Some(8));
        assert_eq!(interp.main_stack_depth(), depth_before);
    }
}
