use serde::{Deserialize, Serialize};

use crate::error::StackError;
use crate::stack::Stack;

pub const NUM_REGISTERS: usize = 32;

/// Bytes occupied on the stack by one saved context.
pub const FRAME_SIZE: usize = 10 + NUM_REGISTERS;

/// Everything the control unit saves on interrupt entry.
///
/// The phase is kept as its raw byte so a damaged frame can be detected when
/// it is restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CpuContext {
    pub pc: u8,
    pub mar: u8,
    pub status: u8,
    pub ir: u32,
    pub opcode: u8,
    pub operand1: u8,
    pub operand2: u8,
    pub phase: u8,
    pub registers: [u8; NUM_REGISTERS],
}

impl CpuContext {
    /// Frame bytes in push order.
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0; FRAME_SIZE];
        bytes[0] = self.pc;
        bytes[1] = self.mar;
        bytes[2] = self.status;
        bytes[3] = (self.ir >> 16) as u8;
        bytes[4] = (self.ir >> 8) as u8;
        bytes[5] = self.ir as u8;
        bytes[6] = self.opcode;
        bytes[7] = self.operand1;
        bytes[8] = self.operand2;
        bytes[9] = self.phase;
        bytes[10..].copy_from_slice(&self.registers);
        bytes
    }

    pub fn from_bytes(bytes: &[u8; FRAME_SIZE]) -> Self {
        let mut registers = [0; NUM_REGISTERS];
        registers.copy_from_slice(&bytes[10..]);

        CpuContext {
            pc: bytes[0],
            mar: bytes[1],
            status: bytes[2],
            ir: (bytes[3] as u32) << 16 | (bytes[4] as u32) << 8 | bytes[5] as u32,
            opcode: bytes[6],
            operand1: bytes[7],
            operand2: bytes[8],
            phase: bytes[9],
            registers,
        }
    }

    /// Push the frame byte by byte. On overflow the bytes already pushed stay
    /// on the stack and the rest are dropped.
    pub fn push_onto(&self, stack: &mut Stack) -> Result<(), StackError> {
        let mut result = Ok(());
        for byte in self.to_bytes() {
            if let Err(err) = stack.push(byte) {
                result = result.and(Err(err));
            }
        }
        result
    }

    /// Pop a frame in exact reverse push order. Bytes that cannot be popped
    /// are taken from `current`.
    pub fn pop_from(stack: &mut Stack, current: &CpuContext) -> (Self, Result<(), StackError>) {
        let mut bytes = current.to_bytes();
        let mut result = Ok(());
        for slot in bytes.iter_mut().rev() {
            match stack.pop() {
                Ok(byte) => *slot = byte,
                Err(err) => result = result.and(Err(err)),
            }
        }
        (CpuContext::from_bytes(&bytes), result)
    }
}
