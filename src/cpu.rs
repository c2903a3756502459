use serde::Serialize;
use std::convert::TryFrom;
use std::fmt;

use crate::alu::{alu, apply_flags, compare, INTERRUPT_FLAG, NEGATIVE_FLAG, ZERO_FLAG};
use crate::config::{Config, FaultPolicy};
use crate::context::{CpuContext, NUM_REGISTERS};
use crate::error::CpuFault;
use crate::instruction::{instruction_name, Instruction, Opcode};
use crate::memory::{DataMemory, DDRB, PCICR, PCIE0, PCMSK0, PINB, PORTB};
use crate::metrics::{
    record_fault, record_instruction, record_interrupt, record_interrupt_return, record_phase,
    record_reset, update_status_flags, Timer,
};
use crate::program::{ProgramImage, ProgramStore, PCINT0_VECTOR};
use crate::snapshot::CpuSnapshot;
use crate::stack::Stack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum Phase {
    Fetch = 0,
    Decode = 1,
    Execute = 2,
}

impl Phase {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Phase::Fetch),
            1 => Some(Phase::Decode),
            2 => Some(Phase::Execute),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Fetch => "Fetch",
            Phase::Decode => "Decode",
            Phase::Execute => "Execute",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The control unit: register file, program counter, status register and the
/// fetch/decode/execute state machine, plus the stack and data space it owns.
///
/// The machine advances one phase per [`step_phase`](Self::step_phase). After
/// every phase the pin register is compared with the previous sample, so a
/// pin-change interrupt can preempt an instruction between its decode and
/// execute phases.
#[derive(Debug)]
pub struct ControlUnit<P: ProgramStore = ProgramImage> {
    program: P,
    data: DataMemory,
    stack: Stack,
    registers: [u8; NUM_REGISTERS],

    pc: u8,
    mar: u8,
    ir: u32,
    status: u8,

    opcode: u8,
    operand1: u8,
    operand2: u8,
    phase: Phase,

    last_pin_input: u8,
    fault_policy: FaultPolicy,
    pending_fault: Option<CpuFault>,
}

impl<P: ProgramStore> ControlUnit<P> {
    pub fn new(program: P) -> Self {
        Self::with_config(program, &Config::default())
    }

    pub fn with_config(program: P, config: &Config) -> Self {
        ControlUnit {
            program,
            data: DataMemory::new(config.data_memory_size),
            stack: Stack::new(config.stack_capacity),
            registers: [0; NUM_REGISTERS],
            pc: 0,
            mar: 0,
            ir: 0,
            status: 0,
            opcode: 0,
            operand1: 0,
            operand2: 0,
            phase: Phase::Fetch,
            last_pin_input: 0,
            fault_policy: config.fault_policy,
            pending_fault: None,
        }
    }

    /// Zero all owned state and return to the fetch phase.
    pub fn reset(&mut self) {
        self.reset_with_reason("request");
    }

    fn reset_with_reason(&mut self, reason: &str) {
        self.data.reset();
        self.stack.reset();
        self.registers = [0; NUM_REGISTERS];
        self.pc = 0;
        self.mar = 0;
        self.ir = 0;
        self.status = 0;
        self.opcode = 0;
        self.operand1 = 0;
        self.operand2 = 0;
        self.phase = Phase::Fetch;
        self.last_pin_input = 0;

        log::info!("control unit reset ({})", reason);
        record_reset(reason);
    }

    /// Advance exactly one phase, then run the interrupt monitor.
    ///
    /// The machine state evolves the same way under every fault policy; with
    /// [`FaultPolicy::Report`] the first fault seen during the phase is also
    /// returned.
    pub fn step_phase(&mut self) -> Result<(), CpuFault> {
        self.pending_fault = None;
        record_phase(self.phase.name());
        log::trace!("{} at pc=0x{:02X}", self.phase, self.pc);

        match self.phase {
            Phase::Fetch => self.fetch(),
            Phase::Decode => self.decode(),
            Phase::Execute => self.execute(),
        }

        self.monitor_interrupts();
        update_status_flags(self.status);

        match (self.fault_policy, self.pending_fault.take()) {
            (FaultPolicy::Report, Some(fault)) => Err(fault),
            _ => Ok(()),
        }
    }

    /// Run phases until the machine is back at a fetch boundary: one full
    /// instruction cycle, or less if an interrupt is taken on the way.
    pub fn step_instruction(&mut self) -> Result<(), CpuFault> {
        let mut first_fault = None;
        loop {
            if let Err(fault) = self.step_phase() {
                first_fault.get_or_insert(fault);
            }
            if self.phase == Phase::Fetch {
                break;
            }
        }
        first_fault.map_or(Ok(()), Err)
    }

    /// Run up to `phases` phases, stopping at the first reported fault.
    pub fn run(&mut self, phases: usize) -> Result<(), CpuFault> {
        for _ in 0..phases {
            self.step_phase()?;
        }
        Ok(())
    }

    /// Drive the pin register, the one input the environment controls.
    pub fn set_pin_input(&mut self, value: u8) {
        self.data.write(PINB, value);
    }

    pub fn inspect(&self) -> CpuSnapshot {
        CpuSnapshot {
            subroutine: self.program.describe(self.mar).to_string(),
            instruction: instruction_name(self.opcode),
            phase: self.phase,
            pc: self.pc,
            mar: self.mar,
            ir: self.ir,
            status: self.status,
            registers: self.registers,
            ddrb: self.data.read(DDRB),
            portb: self.data.read(PORTB),
            pinb: self.data.read(PINB),
            stack_depth: self.stack.len(),
        }
    }

    // Getters
    pub fn get_pc(&self) -> u8 { self.pc }
    pub fn get_mar(&self) -> u8 { self.mar }
    pub fn get_ir(&self) -> u32 { self.ir }
    pub fn get_status(&self) -> u8 { self.status }
    pub fn get_phase(&self) -> Phase { self.phase }
    pub fn get_opcode(&self) -> u8 { self.opcode }
    pub fn get_operands(&self) -> (u8, u8) { (self.operand1, self.operand2) }
    pub fn get_registers(&self) -> &[u8; NUM_REGISTERS] { &self.registers }
    pub fn stack(&self) -> &Stack { &self.stack }
    pub fn data_memory(&self) -> &DataMemory { &self.data }
    pub fn program(&self) -> &P { &self.program }
    pub fn fault_policy(&self) -> FaultPolicy { self.fault_policy }

    /// Panics if `index` is not below 32.
    pub fn get_register(&self, index: u8) -> u8 {
        self.registers[index as usize]
    }

    fn set_register(&mut self, index: u8, value: u8) {
        self.registers[index as usize] = value;
    }

    // Flag operations
    pub fn get_flag(&self, flag: u8) -> bool {
        (self.status & flag) != 0
    }

    fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.get_flag(INTERRUPT_FLAG)
    }

    pub fn equal(&self) -> bool {
        self.get_flag(ZERO_FLAG)
    }

    pub fn lower(&self) -> bool {
        self.get_flag(NEGATIVE_FLAG)
    }

    pub fn greater(&self) -> bool {
        !self.lower() && !self.equal()
    }

    // Phases
    fn fetch(&mut self) {
        self.ir = self.program.read(self.pc);
        self.mar = self.pc;
        self.pc = self.pc.wrapping_add(1);
        self.phase = Phase::Decode;
    }

    fn decode(&mut self) {
        let instruction = Instruction::decode(self.ir);
        self.opcode = instruction.opcode;
        self.operand1 = instruction.operand1;
        self.operand2 = instruction.operand2;
        self.phase = Phase::Execute;
    }

    fn execute(&mut self) {
        let timer = Timer::new();
        // RETI overwrites this with the phase saved in its frame.
        self.phase = Phase::Fetch;

        match Opcode::try_from(self.opcode) {
            Ok(op) => {
                log::debug!("0x{:02X}: {}", self.mar, Instruction::decode(self.ir));
                self.execute_opcode(op);
                record_instruction(op.code(), op.mnemonic(), timer.elapsed());
            }
            Err(opcode) => self.raise(CpuFault::UnknownOpcode {
                opcode,
                address: self.mar,
            }),
        }
    }

    fn execute_opcode(&mut self, op: Opcode) {
        let (a, b) = (self.operand1, self.operand2);

        match op {
            Opcode::Nop => {}
            Opcode::Ldi => self.set_register(a, b),
            Opcode::Mov => self.set_register(a, self.get_register(b)),
            Opcode::Out => self.data.write(a as u16, self.get_register(b)),
            Opcode::In => self.set_register(a, self.data.read(b as u16)),
            Opcode::Sts => self.store_direct(a as u16, b),
            Opcode::Lds => self.load_direct(a, b as u16),

            Opcode::Ori | Opcode::Andi | Opcode::Xori | Opcode::Addi | Opcode::Subi => {
                self.apply_alu(op, a, b)
            }
            Opcode::Or | Opcode::And | Opcode::Xor | Opcode::Add | Opcode::Sub => {
                self.apply_alu(op, a, self.get_register(b))
            }
            Opcode::Inc | Opcode::Dec => self.apply_alu(op, a, 0),
            Opcode::Clr => self.set_register(a, 0),

            Opcode::Cpi => self.compare(self.get_register(a), b),
            Opcode::Cp => self.compare(self.get_register(a), self.get_register(b)),

            Opcode::Jmp => self.pc = a,
            Opcode::Call => {
                self.push(self.pc);
                self.pc = a;
            }
            Opcode::Ret => {
                if let Some(address) = self.pop() {
                    self.pc = address;
                }
            }
            Opcode::Breq
            | Opcode::Brne
            | Opcode::Brgt
            | Opcode::Brge
            | Opcode::Brlt
            | Opcode::Brle => {
                if self.branch_taken(op) {
                    self.pc = a;
                }
            }

            Opcode::Push => self.push(self.get_register(a)),
            Opcode::Pop => {
                if let Some(value) = self.pop() {
                    self.set_register(a, value);
                }
            }

            Opcode::Sei => self.set_flag(INTERRUPT_FLAG, true),
            Opcode::Cli => self.set_flag(INTERRUPT_FLAG, false),
            Opcode::Reti => self.return_from_interrupt(),
        }
    }

    fn branch_taken(&self, op: Opcode) -> bool {
        match op {
            Opcode::Breq => self.equal(),
            Opcode::Brne => !self.equal(),
            Opcode::Brgt => self.greater(),
            Opcode::Brge => self.greater() || self.equal(),
            Opcode::Brlt => self.lower(),
            Opcode::Brle => self.lower() || self.equal(),
            _ => false,
        }
    }

    fn apply_alu(&mut self, op: Opcode, dest: u8, operand: u8) {
        if let Some(alu_op) = op.alu_op() {
            let result = alu(alu_op, self.get_register(dest), operand);
            self.set_register(dest, result.value);
            self.status = apply_flags(self.status, result.flags);
        }
    }

    fn compare(&mut self, a: u8, b: u8) {
        self.status = apply_flags(self.status, compare(a, b));
    }

    // STS: the source register and, when it has a partner, the next one too.
    fn store_direct(&mut self, address: u16, source: u8) {
        if (source as usize) + 1 < NUM_REGISTERS {
            let word = u16::from_le_bytes([
                self.get_register(source),
                self.get_register(source + 1),
            ]);
            self.data.write_u16(address, word);
        } else {
            self.data.write(address, self.get_register(source));
        }
    }

    fn load_direct(&mut self, dest: u8, address: u16) {
        if (dest as usize) + 1 < NUM_REGISTERS {
            let [low, high] = self.data.read_u16(address).to_le_bytes();
            self.set_register(dest, low);
            self.set_register(dest + 1, high);
        } else {
            self.set_register(dest, self.data.read(address));
        }
    }

    fn push(&mut self, value: u8) {
        if let Err(err) = self.stack.push(value) {
            self.raise(CpuFault::from_stack(err, self.mar));
        }
    }

    fn pop(&mut self) -> Option<u8> {
        match self.stack.pop() {
            Ok(value) => Some(value),
            Err(err) => {
                self.raise(CpuFault::from_stack(err, self.mar));
                None
            }
        }
    }

    fn raise(&mut self, fault: CpuFault) {
        log::warn!("{}", fault);
        record_fault(fault.kind());
        self.pending_fault.get_or_insert(fault);
    }

    // Interrupts
    pub fn capture_context(&self) -> CpuContext {
        CpuContext {
            pc: self.pc,
            mar: self.mar,
            status: self.status,
            ir: self.ir,
            opcode: self.opcode,
            operand1: self.operand1,
            operand2: self.operand2,
            phase: self.phase as u8,
            registers: self.registers,
        }
    }

    /// Load a saved context. A context whose phase byte is not a valid phase
    /// resets the whole machine.
    pub fn restore_context(&mut self, context: CpuContext) {
        let Some(phase) = Phase::from_byte(context.phase) else {
            log::warn!(
                "restored context has invalid phase {}, resetting",
                context.phase
            );
            self.reset_with_reason("invalid_phase");
            return;
        };

        self.pc = context.pc;
        self.mar = context.mar;
        self.status = context.status;
        self.ir = context.ir;
        self.opcode = context.opcode;
        self.operand1 = context.operand1;
        self.operand2 = context.operand2;
        self.phase = phase;
        self.registers = context.registers;
    }

    /// Save the full context on the stack and continue at `vector`.
    pub fn generate_interrupt(&mut self, vector: u8) {
        let context = self.capture_context();
        if let Err(err) = context.push_onto(&mut self.stack) {
            self.raise(CpuFault::from_stack(err, self.mar));
        }

        log::info!(
            "interrupt at pc=0x{:02X} ({}), jumping to 0x{:02X}",
            self.pc,
            self.phase,
            vector
        );
        record_interrupt();

        self.pc = vector;
        self.phase = Phase::Fetch;
    }

    fn return_from_interrupt(&mut self) {
        // Slots that cannot be popped keep their current value.
        let current = self.capture_context();
        let (context, result) = CpuContext::pop_from(&mut self.stack, &current);
        if let Err(err) = result {
            self.raise(CpuFault::from_stack(err, self.mar));
        }

        record_interrupt_return();
        self.restore_context(context);
        log::info!("return from interrupt to pc=0x{:02X} ({})", self.pc, self.phase);
    }

    fn monitor_interrupts(&mut self) {
        let current_input = self.data.read(PINB);
        let changed = (self.last_pin_input ^ current_input) & self.data.read(PCMSK0);
        let armed = self.interrupt_enabled() && self.data.read(PCICR) & (1 << PCIE0) != 0;
        self.last_pin_input = current_input;

        if armed && changed != 0 {
            self.generate_interrupt(PCINT0_VECTOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alu::{CARRY_FLAG, OVERFLOW_FLAG};
    use crate::context::FRAME_SIZE;
    use crate::instruction::assemble;

    const R16: u8 = 16;
    const R17: u8 = 17;

    fn cpu_with(words: Vec<u32>) -> ControlUnit {
        ControlUnit::new(ProgramImage::new(words))
    }

    fn reporting(words: Vec<u32>, stack_capacity: usize) -> ControlUnit {
        let config = Config {
            stack_capacity,
            fault_policy: FaultPolicy::Report,
            ..Config::default()
        };
        ControlUnit::with_config(ProgramImage::new(words), &config)
    }

    fn run_instructions(cpu: &mut ControlUnit, count: usize) {
        for _ in 0..count {
            cpu.step_instruction().unwrap();
        }
    }

    fn arm_pin_change(cpu: &mut ControlUnit, mask: u8) {
        cpu.status |= INTERRUPT_FLAG;
        cpu.data.write(PCICR, 1 << PCIE0);
        cpu.data.write(PCMSK0, mask);
    }

    #[test]
    fn test_phase_sequence() {
        let mut cpu = cpu_with(vec![assemble(Opcode::Ldi, R16, 0x2A)]);
        assert_eq!(cpu.get_phase(), Phase::Fetch);

        cpu.step_phase().unwrap();
        assert_eq!(cpu.get_phase(), Phase::Decode);
        assert_eq!(cpu.get_ir(), 0x01_10_2A);
        assert_eq!(cpu.get_mar(), 0);
        assert_eq!(cpu.get_pc(), 1);
        assert_eq!(cpu.get_opcode(), 0);

        cpu.step_phase().unwrap();
        assert_eq!(cpu.get_phase(), Phase::Execute);
        assert_eq!(cpu.get_opcode(), Opcode::Ldi.code());
        assert_eq!(cpu.get_operands(), (R16, 0x2A));
        assert_eq!(cpu.get_register(R16), 0);

        cpu.step_phase().unwrap();
        assert_eq!(cpu.get_phase(), Phase::Fetch);
        assert_eq!(cpu.get_register(R16), 0x2A);
    }

    #[test]
    fn test_ldi_every_register() {
        let words = (0..NUM_REGISTERS as u8)
            .map(|r| assemble(Opcode::Ldi, r, r.wrapping_mul(7).wrapping_add(3)))
            .collect();
        let mut cpu = cpu_with(words);
        run_instructions(&mut cpu, NUM_REGISTERS);

        for r in 0..NUM_REGISTERS as u8 {
            assert_eq!(cpu.get_register(r), r.wrapping_mul(7).wrapping_add(3));
        }
    }

    #[test]
    fn test_mov_in_out() {
        let mut cpu = cpu_with(vec![
            assemble(Opcode::Ldi, R16, 0x21),
            assemble(Opcode::Out, PORTB as u8, R16),
            assemble(Opcode::In, R17, PORTB as u8),
            assemble(Opcode::Mov, 3, R17),
        ]);
        run_instructions(&mut cpu, 4);

        assert_eq!(cpu.data_memory().read(PORTB), 0x21);
        assert_eq!(cpu.get_register(R17), 0x21);
        assert_eq!(cpu.get_register(3), 0x21);
    }

    #[test]
    fn test_sub_five_minus_three() {
        let mut cpu = cpu_with(vec![
            assemble(Opcode::Ldi, R16, 5),
            assemble(Opcode::Ldi, R17, 3),
            assemble(Opcode::Sub, R16, R17),
        ]);
        run_instructions(&mut cpu, 3);

        assert_eq!(cpu.get_register(R16), 2);
        assert!(!cpu.get_flag(ZERO_FLAG));
        assert!(!cpu.get_flag(NEGATIVE_FLAG));
    }

    #[test]
    fn test_cpi_sets_zero_without_mutation() {
        let mut cpu = cpu_with(vec![assemble(Opcode::Cpi, R16, 0x00)]);
        run_instructions(&mut cpu, 1);

        assert!(cpu.get_flag(ZERO_FLAG));
        assert_eq!(cpu.get_register(R16), 0);
    }

    #[test]
    fn test_alu_flags_overwrite_and_keep_interrupt() {
        let mut cpu = cpu_with(vec![
            assemble(Opcode::Ldi, R16, 0x80),
            assemble(Opcode::Addi, R16, 0x80),
            assemble(Opcode::Addi, R16, 0x01),
        ]);
        cpu.status = INTERRUPT_FLAG;
        run_instructions(&mut cpu, 2);
        assert_eq!(cpu.get_register(R16), 0);
        assert_eq!(
            cpu.get_status(),
            INTERRUPT_FLAG | ZERO_FLAG | OVERFLOW_FLAG | CARRY_FLAG
        );

        run_instructions(&mut cpu, 1);
        assert_eq!(cpu.get_register(R16), 1);
        assert_eq!(cpu.get_status(), INTERRUPT_FLAG);
    }

    #[test]
    fn test_clr_leaves_flags() {
        let mut cpu = cpu_with(vec![
            assemble(Opcode::Ldi, R16, 0xFF),
            assemble(Opcode::Inc, R16, 0),
            assemble(Opcode::Ldi, R16, 0x55),
            assemble(Opcode::Clr, R16, 0),
        ]);
        run_instructions(&mut cpu, 2);
        let flags = cpu.get_status();
        assert_eq!(flags, ZERO_FLAG | CARRY_FLAG);

        run_instructions(&mut cpu, 2);
        assert_eq!(cpu.get_register(R16), 0);
        assert_eq!(cpu.get_status(), flags);
    }

    #[test]
    fn test_logic_and_register_forms() {
        let mut cpu = cpu_with(vec![
            assemble(Opcode::Ldi, R16, 0b1100_1100),
            assemble(Opcode::Ldi, R17, 0b1010_1010),
            assemble(Opcode::And, R16, R17),
            assemble(Opcode::Ori, R16, 0b0000_0001),
            assemble(Opcode::Xori, R16, 0xFF),
            assemble(Opcode::Add, R16, R17),
            assemble(Opcode::Dec, R17, 0),
        ]);
        run_instructions(&mut cpu, 3);
        assert_eq!(cpu.get_register(R16), 0b1000_1000);
        assert!(cpu.get_flag(NEGATIVE_FLAG));

        run_instructions(&mut cpu, 2);
        assert_eq!(cpu.get_register(R16), 0b0111_0110);

        run_instructions(&mut cpu, 2);
        assert_eq!(cpu.get_register(R16), 0x76u8.wrapping_add(0xAA));
        assert_eq!(cpu.get_register(R17), 0xA9);
    }

    #[test]
    fn test_sts_lds_register_pair() {
        let mut cpu = cpu_with(vec![
            assemble(Opcode::Ldi, 0, 0x34),
            assemble(Opcode::Ldi, 1, 0x12),
            assemble(Opcode::Sts, 100, 0),
            assemble(Opcode::Lds, 20, 100),
        ]);
        run_instructions(&mut cpu, 3);
        assert_eq!(cpu.data_memory().read(100), 0x34);
        assert_eq!(cpu.data_memory().read(101), 0x12);

        run_instructions(&mut cpu, 1);
        assert_eq!(cpu.get_register(20), 0x34);
        assert_eq!(cpu.get_register(21), 0x12);
    }

    #[test]
    fn test_sts_lds_last_register_has_no_partner() {
        let mut cpu = cpu_with(vec![
            assemble(Opcode::Ldi, 31, 0x99),
            assemble(Opcode::Sts, 50, 31),
            assemble(Opcode::Lds, 31, 60),
        ]);
        cpu.data.write(51, 0x11);
        cpu.data.write(60, 0x22);
        run_instructions(&mut cpu, 2);
        assert_eq!(cpu.data_memory().read(50), 0x99);
        assert_eq!(cpu.data_memory().read(51), 0x11);

        run_instructions(&mut cpu, 1);
        assert_eq!(cpu.get_register(31), 0x22);
    }

    #[test]
    fn test_branches() {
        // (flags, opcode, taken)
        let cases = [
            (ZERO_FLAG, Opcode::Breq, true),
            (0, Opcode::Breq, false),
            (0, Opcode::Brne, true),
            (ZERO_FLAG, Opcode::Brne, false),
            (0, Opcode::Brgt, true),
            (ZERO_FLAG, Opcode::Brgt, false),
            (NEGATIVE_FLAG, Opcode::Brgt, false),
            (ZERO_FLAG, Opcode::Brge, true),
            (NEGATIVE_FLAG, Opcode::Brge, false),
            (NEGATIVE_FLAG, Opcode::Brlt, true),
            (ZERO_FLAG, Opcode::Brlt, false),
            (ZERO_FLAG, Opcode::Brle, true),
            (0, Opcode::Brle, false),
        ];

        for (flags, op, taken) in cases {
            let mut cpu = cpu_with(vec![assemble(op, 0x20, 0)]);
            cpu.status = flags;
            run_instructions(&mut cpu, 1);
            let expected = if taken { 0x20 } else { 1 };
            assert_eq!(cpu.get_pc(), expected, "{} with flags {:04b}", op, flags);
        }
    }

    #[test]
    fn test_call_ret() {
        let mut cpu = cpu_with(vec![
            assemble(Opcode::Call, 3, 0),
            assemble(Opcode::Nop, 0, 0),
            assemble(Opcode::Nop, 0, 0),
            assemble(Opcode::Ret, 0, 0),
        ]);
        run_instructions(&mut cpu, 1);
        assert_eq!(cpu.get_pc(), 3);
        assert_eq!(cpu.stack().len(), 1);
        assert_eq!(cpu.stack().top(), Some(1));

        run_instructions(&mut cpu, 1);
        assert_eq!(cpu.get_pc(), 1);
        assert!(cpu.stack().is_empty());
    }

    #[test]
    fn test_push_pop() {
        let mut cpu = cpu_with(vec![
            assemble(Opcode::Ldi, R16, 0xAB),
            assemble(Opcode::Push, R16, 0),
            assemble(Opcode::Clr, R16, 0),
            assemble(Opcode::Pop, R17, 0),
        ]);
        run_instructions(&mut cpu, 4);
        assert_eq!(cpu.get_register(R16), 0);
        assert_eq!(cpu.get_register(R17), 0xAB);
        assert!(cpu.stack().is_empty());
    }

    #[test]
    fn test_sei_cli() {
        let mut cpu = cpu_with(vec![assemble(Opcode::Sei, 0, 0), assemble(Opcode::Cli, 0, 0)]);
        run_instructions(&mut cpu, 1);
        assert!(cpu.interrupt_enabled());
        run_instructions(&mut cpu, 1);
        assert!(!cpu.interrupt_enabled());
    }

    #[test]
    fn test_unknown_opcode_is_noop() {
        let mut cpu = cpu_with(vec![0x7F_01_02, assemble(Opcode::Ldi, R16, 1)]);
        run_instructions(&mut cpu, 1);
        assert_eq!(cpu.get_pc(), 1);
        assert_eq!(cpu.get_registers(), &[0; NUM_REGISTERS]);
        assert_eq!(cpu.inspect().instruction, "Unknown");

        let mut cpu = reporting(vec![0x7F_01_02], 256);
        assert_eq!(
            cpu.step_instruction(),
            Err(CpuFault::UnknownOpcode { opcode: 0x7F, address: 0 })
        );
        assert_eq!(cpu.get_phase(), Phase::Fetch);
    }

    #[test]
    fn test_stack_faults_reported_and_state_kept() {
        let mut cpu = reporting(
            vec![
                assemble(Opcode::Ldi, R16, 1),
                assemble(Opcode::Push, R16, 0),
                assemble(Opcode::Push, R16, 0),
                assemble(Opcode::Pop, R17, 0),
                assemble(Opcode::Pop, R17, 0),
                assemble(Opcode::Ret, 0, 0),
            ],
            1,
        );
        cpu.run(6).unwrap();
        assert_eq!(
            cpu.step_instruction(),
            Err(CpuFault::StackOverflow { address: 2 })
        );
        assert_eq!(cpu.stack().top(), Some(1));

        cpu.step_instruction().unwrap();
        assert_eq!(cpu.get_register(R17), 1);
        assert_eq!(
            cpu.step_instruction(),
            Err(CpuFault::StackUnderflow { address: 4 })
        );
        assert_eq!(cpu.get_register(R17), 1);

        assert_eq!(
            cpu.step_instruction(),
            Err(CpuFault::StackUnderflow { address: 5 })
        );
        assert_eq!(cpu.get_pc(), 6);
    }

    #[test]
    fn test_stack_faults_silent_by_default() {
        let mut cpu = cpu_with(vec![assemble(Opcode::Pop, R16, 0), assemble(Opcode::Ret, 0, 0)]);
        assert_eq!(cpu.fault_policy(), FaultPolicy::Silent);
        assert!(cpu.step_instruction().is_ok());
        assert!(cpu.step_instruction().is_ok());
        assert_eq!(cpu.get_pc(), 2);
    }

    #[test]
    fn test_pin_change_interrupt_within_one_phase() {
        let mut cpu = cpu_with(vec![assemble(Opcode::Jmp, 0, 0)]);
        arm_pin_change(&mut cpu, 1 << 5);
        cpu.set_pin_input(1 << 5);

        cpu.step_phase().unwrap();
        assert_eq!(cpu.get_pc(), PCINT0_VECTOR);
        assert_eq!(cpu.get_phase(), Phase::Fetch);
        assert_eq!(cpu.stack().len(), FRAME_SIZE);
        // The saved pc sits at the bottom of the frame.
        assert_eq!(cpu.stack().bottom(), Some(1));
    }

    #[test]
    fn test_no_interrupt_without_enables() {
        let configure = |status: u8, pcicr: u8, mask: u8| {
            let mut cpu = cpu_with(vec![assemble(Opcode::Jmp, 0, 0)]);
            cpu.status = status;
            cpu.data.write(PCICR, pcicr);
            cpu.data.write(PCMSK0, mask);
            cpu.set_pin_input(1 << 5);
            cpu.step_phase().unwrap();
            cpu
        };

        assert!(configure(0, 1, 1 << 5).stack().is_empty());
        assert!(configure(INTERRUPT_FLAG, 0, 1 << 5).stack().is_empty());
        assert!(configure(INTERRUPT_FLAG, 1, 1 << 4).stack().is_empty());
        assert!(!configure(INTERRUPT_FLAG, 1, 1 << 5).stack().is_empty());
    }

    #[test]
    fn test_sample_updates_while_disabled() {
        let mut cpu = cpu_with(vec![assemble(Opcode::Jmp, 0, 0)]);
        cpu.data.write(PCICR, 1 << PCIE0);
        cpu.data.write(PCMSK0, 1 << 5);
        cpu.set_pin_input(1 << 5);
        cpu.step_phase().unwrap();

        cpu.status |= INTERRUPT_FLAG;
        cpu.step_phase().unwrap();
        assert!(cpu.stack().is_empty());

        cpu.set_pin_input(0);
        cpu.step_phase().unwrap();
        assert_eq!(cpu.stack().len(), FRAME_SIZE);
    }

    #[test]
    fn test_several_changed_bits_push_one_frame() {
        let mut cpu = cpu_with(vec![assemble(Opcode::Jmp, 0, 0)]);
        arm_pin_change(&mut cpu, 0xFF);
        cpu.set_pin_input(0b1010_0101);
        cpu.step_phase().unwrap();
        assert_eq!(cpu.stack().len(), FRAME_SIZE);
    }

    #[test]
    fn test_interrupt_then_reti_restores_context() {
        let mut cpu = cpu_with(vec![assemble(Opcode::Reti, 0, 0)]);
        for (i, r) in cpu.registers.iter_mut().enumerate() {
            *r = 0xA0 ^ i as u8;
        }
        cpu.pc = 0x2C;
        cpu.mar = 0x2B;
        cpu.status = INTERRUPT_FLAG | NEGATIVE_FLAG | CARRY_FLAG;
        cpu.ir = 0x13_10_11;
        cpu.opcode = 0x13;
        cpu.operand1 = 0x10;
        cpu.operand2 = 0x11;
        cpu.phase = Phase::Execute;
        let saved = cpu.capture_context();

        cpu.generate_interrupt(0x00);
        assert_eq!(cpu.stack().len(), FRAME_SIZE);
        cpu.registers[5] = 0;

        // Fetch, decode and execute the RETI at the vector.
        cpu.step_phase().unwrap();
        cpu.step_phase().unwrap();
        cpu.step_phase().unwrap();

        assert_eq!(cpu.capture_context(), saved);
        assert!(cpu.stack().is_empty());
    }

    #[test]
    fn test_interrupt_mid_instruction_resumes_phase() {
        let mut words = vec![assemble(Opcode::Ldi, R16, 5); 2];
        words.push(assemble(Opcode::Reti, 0, 0));
        let mut cpu = cpu_with(words);
        arm_pin_change(&mut cpu, 1 << 5);
        cpu.set_pin_input(1 << 5);

        // Fetch of LDI, then preempted before decode.
        cpu.step_phase().unwrap();
        assert_eq!(cpu.get_pc(), PCINT0_VECTOR);

        // Fetch, decode and execute the RETI.
        cpu.run(3).unwrap();
        assert_eq!(cpu.get_phase(), Phase::Decode);
        assert_eq!(cpu.get_pc(), 1);
        assert_eq!(cpu.get_mar(), 0);
        assert_eq!(cpu.get_register(R16), 0);

        cpu.step_instruction().unwrap();
        assert_eq!(cpu.get_register(R16), 5);
        assert_eq!(cpu.get_pc(), 1);
    }

    #[test]
    fn test_invalid_phase_in_frame_resets() {
        let mut cpu = cpu_with(vec![assemble(Opcode::Ldi, R16, 9)]);
        run_instructions(&mut cpu, 1);
        cpu.data.write(200, 0x55);

        let mut context = cpu.capture_context();
        context.phase = 7;
        cpu.restore_context(context);

        assert_eq!(cpu.get_phase(), Phase::Fetch);
        assert_eq!(cpu.get_pc(), 0);
        assert_eq!(cpu.get_register(R16), 0);
        assert_eq!(cpu.data_memory().read(200), 0);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let mut cpu = cpu_with(vec![
            assemble(Opcode::Ldi, R16, 9),
            assemble(Opcode::Push, R16, 0),
            assemble(Opcode::Out, DDRB as u8, R16),
            assemble(Opcode::Sei, 0, 0),
        ]);
        run_instructions(&mut cpu, 4);
        cpu.set_pin_input(0xFF);
        cpu.reset();

        let snapshot = cpu.inspect();
        assert_eq!(snapshot.pc, 0);
        assert_eq!(snapshot.ir, 0);
        assert_eq!(snapshot.status, 0);
        assert_eq!(snapshot.registers, [0; NUM_REGISTERS]);
        assert_eq!(snapshot.ddrb, 0);
        assert_eq!(snapshot.pinb, 0);
        assert_eq!(snapshot.stack_depth, 0);
        assert_eq!(snapshot.phase, Phase::Fetch);
        assert_eq!(cpu.last_pin_input, 0);
    }

    #[test]
    fn test_inspect() {
        let program = ProgramImage::new(vec![assemble(Opcode::Ldi, R16, 0x21)])
            .with_label("start", 0..1);
        let mut cpu = ControlUnit::new(program);
        run_instructions(&mut cpu, 1);
        cpu.set_pin_input(0x20);

        let snapshot = cpu.inspect();
        assert_eq!(snapshot.subroutine, "start");
        assert_eq!(snapshot.instruction, "LDI");
        assert_eq!(snapshot.registers[16], 0x21);
        assert_eq!(snapshot.pinb, 0x20);
        assert_eq!(snapshot.pc, 1);
    }
}
