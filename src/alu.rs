use serde::Serialize;

// Status register flags
pub const CARRY_FLAG: u8 = 1 << 0;
pub const OVERFLOW_FLAG: u8 = 1 << 1;
pub const ZERO_FLAG: u8 = 1 << 2;
pub const NEGATIVE_FLAG: u8 = 1 << 3;
pub const INTERRUPT_FLAG: u8 = 1 << 4;

/// The condition flags written by ALU and compare instructions.
pub const NZVC_MASK: u8 = NEGATIVE_FLAG | ZERO_FLAG | OVERFLOW_FLAG | CARRY_FLAG;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AluOp {
    Or,
    And,
    Xor,
    Inc,
    Dec,
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    /// N/Z/V/C bits in their status register positions.
    pub flags: u8,
}

/// Run one ALU operation. `b` is ignored by INC and DEC.
///
/// The operation is carried out on a 16-bit working value so the carry out
/// of bit 7 is still visible in bit 8 before truncation.
pub fn alu(op: AluOp, a: u8, b: u8) -> AluResult {
    let (wide, b) = match op {
        AluOp::Or => ((a | b) as u16, b),
        AluOp::And => ((a & b) as u16, b),
        AluOp::Xor => ((a ^ b) as u16, b),
        AluOp::Inc => ((a as u16).wrapping_add(1), 0),
        AluOp::Dec => ((a as u16).wrapping_sub(1), 0),
        AluOp::Add => ((a as u16).wrapping_add(b as u16), b),
        AluOp::Sub => ((a as u16).wrapping_sub(b as u16), b),
    };

    AluResult {
        value: wide as u8,
        flags: status_bits(wide, a, b),
    }
}

/// Flags of `a - b`; no result value is produced.
pub fn compare(a: u8, b: u8) -> u8 {
    alu(AluOp::Sub, a, b).flags
}

/// Derive N/Z/V/C from a widened result and its operands.
///
/// V uses the two's-complement addition test (operands share a sign that the
/// result does not) for subtraction as well.
pub fn status_bits(result: u16, a: u8, b: u8) -> u8 {
    let byte = result as u8;
    let mut nzvc = 0;

    if byte & 0x80 != 0 {
        nzvc |= NEGATIVE_FLAG;
    }
    if byte == 0 {
        nzvc |= ZERO_FLAG;
    }
    if (a ^ b) & 0x80 == 0 && (a ^ byte) & 0x80 != 0 {
        nzvc |= OVERFLOW_FLAG;
    }
    if result & 0x100 != 0 {
        nzvc |= CARRY_FLAG;
    }
    nzvc
}

/// Replace the N/Z/V/C bits of `status`, keeping the interrupt flag.
pub fn apply_flags(status: u8, nzvc: u8) -> u8 {
    (status & !NZVC_MASK) | (nzvc & NZVC_MASK)
}
