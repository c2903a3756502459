use serde::Serialize;
use std::fmt;

use crate::context::NUM_REGISTERS;
use crate::cpu::Phase;

/// Read-only view of the control unit, enough to render the front panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuSnapshot {
    pub subroutine: String,
    pub instruction: &'static str,
    pub phase: Phase,
    pub pc: u8,
    pub mar: u8,
    pub ir: u32,
    pub status: u8,
    pub registers: [u8; NUM_REGISTERS],
    pub ddrb: u8,
    pub portb: u8,
    pub pinb: u8,
    pub stack_depth: usize,
}

impl CpuSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

const RULE: &str =
    "--------------------------------------------------------------------------------";

impl fmt::Display for CpuSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "Subroutine:\t\t\t\t\t{}", self.subroutine)?;
        writeln!(f, "Current instruction:\t\t\t\t{}", self.instruction)?;
        writeln!(f, "Current state:\t\t\t\t\t{}", self.phase)?;
        writeln!(f)?;
        writeln!(f, "Program counter:\t\t\t\t{}", self.pc)?;
        writeln!(f, "Instruction register:\t\t\t\t{:x}", self.ir)?;
        writeln!(f, "Status register (INZVC):\t\t\t{:05b}", self.status & 0x1F)?;
        writeln!(f, "Stack depth:\t\t\t\t\t{}", self.stack_depth)?;
        writeln!(f)?;
        writeln!(f, "Content in CPU register R16:\t\t\t{:08b}", self.registers[16])?;
        writeln!(f, "Content in CPU register R24:\t\t\t{:08b}", self.registers[24])?;
        writeln!(f)?;
        writeln!(f, "Content in data direction register DDRB:\t{:08b}", self.ddrb)?;
        writeln!(f, "Content in data register PORTB:\t\t\t{:08b}", self.portb)?;
        writeln!(f, "Content in pin register PINB:\t\t\t{:08b}", self.pinb)?;
        writeln!(f)?;
        for (row, chunk) in self.registers.chunks(8).enumerate() {
            write!(f, "R{:<2}-R{:<2}:", row * 8, row * 8 + 7)?;
            for value in chunk {
                write!(f, " {:02X}", value)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "{}", RULE)
    }
}
