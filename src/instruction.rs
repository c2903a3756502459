use serde::Serialize;
use std::convert::TryFrom;
use std::fmt;

use crate::alu::AluOp;

/// The closed instruction set of the control unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,
    Ldi = 0x01,
    Mov = 0x02,
    Out = 0x03,
    In = 0x04,
    Sts = 0x05,
    Lds = 0x06,
    Ori = 0x07,
    Andi = 0x08,
    Xori = 0x09,
    Or = 0x0A,
    And = 0x0B,
    Xor = 0x0C,
    Clr = 0x0D,
    Inc = 0x0E,
    Dec = 0x0F,
    Addi = 0x10,
    Subi = 0x11,
    Add = 0x12,
    Sub = 0x13,
    Cpi = 0x14,
    Cp = 0x15,
    Jmp = 0x16,
    Call = 0x17,
    Ret = 0x18,
    Breq = 0x19,
    Brne = 0x1A,
    Brgt = 0x1B,
    Brge = 0x1C,
    Brlt = 0x1D,
    Brle = 0x1E,
    Push = 0x1F,
    Pop = 0x20,
    Sei = 0x21,
    Cli = 0x22,
    Reti = 0x23,
}

impl Opcode {
    pub const ALL: [Opcode; 36] = [
        Opcode::Nop,
        Opcode::Ldi,
        Opcode::Mov,
        Opcode::Out,
        Opcode::In,
        Opcode::Sts,
        Opcode::Lds,
        Opcode::Ori,
        Opcode::Andi,
        Opcode::Xori,
        Opcode::Or,
        Opcode::And,
        Opcode::Xor,
        Opcode::Clr,
        Opcode::Inc,
        Opcode::Dec,
        Opcode::Addi,
        Opcode::Subi,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Cpi,
        Opcode::Cp,
        Opcode::Jmp,
        Opcode::Call,
        Opcode::Ret,
        Opcode::Breq,
        Opcode::Brne,
        Opcode::Brgt,
        Opcode::Brge,
        Opcode::Brlt,
        Opcode::Brle,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Sei,
        Opcode::Cli,
        Opcode::Reti,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Ldi => "LDI",
            Opcode::Mov => "MOV",
            Opcode::Out => "OUT",
            Opcode::In => "IN",
            Opcode::Sts => "STS",
            Opcode::Lds => "LDS",
            Opcode::Ori => "ORI",
            Opcode::Andi => "ANDI",
            Opcode::Xori => "XORI",
            Opcode::Or => "OR",
            Opcode::And => "AND",
            Opcode::Xor => "XOR",
            Opcode::Clr => "CLR",
            Opcode::Inc => "INC",
            Opcode::Dec => "DEC",
            Opcode::Addi => "ADDI",
            Opcode::Subi => "SUBI",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Cpi => "CPI",
            Opcode::Cp => "CP",
            Opcode::Jmp => "JMP",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::Breq => "BREQ",
            Opcode::Brne => "BRNE",
            Opcode::Brgt => "BRGT",
            Opcode::Brge => "BRGE",
            Opcode::Brlt => "BRLT",
            Opcode::Brle => "BRLE",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Sei => "SEI",
            Opcode::Cli => "CLI",
            Opcode::Reti => "RETI",
        }
    }

    /// The ALU operation performed by register-updating and compare
    /// instructions.
    pub fn alu_op(self) -> Option<AluOp> {
        match self {
            Opcode::Ori | Opcode::Or => Some(AluOp::Or),
            Opcode::Andi | Opcode::And => Some(AluOp::And),
            Opcode::Xori | Opcode::Xor => Some(AluOp::Xor),
            Opcode::Inc => Some(AluOp::Inc),
            Opcode::Dec => Some(AluOp::Dec),
            Opcode::Addi | Opcode::Add => Some(AluOp::Add),
            Opcode::Subi | Opcode::Sub | Opcode::Cpi | Opcode::Cp => Some(AluOp::Sub),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .get(code as usize)
            .copied()
            .filter(|op| op.code() == code)
            .ok_or(code)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Mnemonic for a raw opcode byte, "Unknown" if it is not part of the set.
pub fn instruction_name(code: u8) -> &'static str {
    Opcode::try_from(code).map(Opcode::mnemonic).unwrap_or("Unknown")
}

/// One 24-bit instruction word: `opcode<<16 | operand1<<8 | operand2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Instruction {
    pub opcode: u8,
    pub operand1: u8,
    pub operand2: u8,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand1: u8, operand2: u8) -> Self {
        Instruction {
            opcode: opcode.code(),
            operand1,
            operand2,
        }
    }

    pub fn encode(&self) -> u32 {
        (self.opcode as u32) << 16 | (self.operand1 as u32) << 8 | self.operand2 as u32
    }

    /// Bits above the low 24 are ignored.
    pub fn decode(word: u32) -> Self {
        Instruction {
            opcode: (word >> 16) as u8,
            operand1: (word >> 8) as u8,
            operand2: word as u8,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 0x{:02X}, 0x{:02X}",
            instruction_name(self.opcode),
            self.operand1,
            self.operand2
        )
    }
}

/// Pack an instruction word, the way a program image is assembled.
pub fn assemble(opcode: Opcode, operand1: u8, operand2: u8) -> u32 {
    Instruction::new(opcode, operand1, operand2).encode()
}
