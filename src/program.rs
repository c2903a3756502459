use std::ops::Range;

use crate::instruction::Instruction;

/// Entry point after reset.
pub const RESET_VECTOR: u8 = 0x00;
/// Entry point of the pin-change interrupt.
pub const PCINT0_VECTOR: u8 = 0x02;

pub const UNKNOWN_LABEL: &str = "Unknown";

/// Read-only store of 24-bit instruction words.
pub trait ProgramStore {
    /// Instruction word at `address`; addresses past the end read as NOP.
    fn read(&self, address: u8) -> u32;

    /// Name of the routine containing `address`, for diagnostics.
    fn describe(&self, address: u8) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn instruction(&self, address: u8) -> Instruction {
        Instruction::decode(self.read(address))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub range: Range<u16>,
}

/// An in-memory program image with named routine ranges.
#[derive(Debug, Clone, Default)]
pub struct ProgramImage {
    words: Vec<u32>,
    labels: Vec<Label>,
}

impl ProgramImage {
    pub fn new(words: Vec<u32>) -> Self {
        ProgramImage {
            words,
            labels: Vec::new(),
        }
    }

    /// Name the half-open address range `range`. When ranges overlap the
    /// first one added wins.
    pub fn with_label(mut self, name: impl Into<String>, range: Range<u16>) -> Self {
        self.labels.push(Label {
            name: name.into(),
            range,
        });
        self
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Address of the routine named `name`.
    pub fn address_of(&self, name: &str) -> Option<u8> {
        self.labels
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.range.start as u8)
    }
}

impl ProgramStore for ProgramImage {
    fn read(&self, address: u8) -> u32 {
        self.words.get(address as usize).copied().unwrap_or(0)
    }

    fn describe(&self, address: u8) -> &str {
        self.labels
            .iter()
            .find(|label| label.range.contains(&(address as u16)))
            .map(|label| label.name.as_str())
            .unwrap_or(UNKNOWN_LABEL)
    }

    fn len(&self) -> usize {
        self.words.len()
    }
}

impl From<Vec<u32>> for ProgramImage {
    fn from(words: Vec<u32>) -> Self {
        ProgramImage::new(words)
    }
}
