//! # AVR-style 8-bit Microcontroller Emulator
//!
//! A phase-accurate emulator of a small 8-bit microcontroller with an
//! AVR-flavoured instruction set. The control unit runs a three-phase
//! fetch/decode/execute cycle and checks for pin-change interrupts after
//! every phase, so an interrupt can preempt an instruction half way through.
//!
//! ## Features
//!
//! - 32 general purpose registers, N/Z/V/C/I status register
//! - 24-bit instruction words `{opcode, operand1, operand2}`
//! - Bounded byte stack shared by CALL/RET, PUSH/POP and interrupt frames
//! - Data space with memory-mapped port B and pin-change interrupt registers
//! - Sample "blink-on-button" firmware and an interactive front end
//!
//! ## Example
//!
//! ```rust
//! use avr_emulator::cpu::ControlUnit;
//! use avr_emulator::instruction::{assemble, Opcode};
//! use avr_emulator::program::ProgramImage;
//!
//! let program = ProgramImage::new(vec![
//!     assemble(Opcode::Ldi, 16, 5),
//!     assemble(Opcode::Ldi, 17, 3),
//!     assemble(Opcode::Sub, 16, 17),
//! ]);
//!
//! let mut cpu = ControlUnit::new(program);
//! for _ in 0..3 {
//!     cpu.step_instruction().unwrap();
//! }
//!
//! assert_eq!(cpu.get_register(16), 2);
//! ```

pub mod alu;
pub mod config;
pub mod context;
pub mod cpu;
pub mod error;
pub mod firmware;
pub mod instruction;
pub mod memory;
pub mod metrics;
pub mod program;
pub mod snapshot;
pub mod stack;

pub use config::{Config, FaultPolicy};
pub use cpu::{ControlUnit, Phase};
pub use error::{ConfigError, CpuFault, StackError};
pub use memory::DataMemory;
pub use program::{ProgramImage, ProgramStore};
pub use snapshot::CpuSnapshot;
pub use stack::Stack;
