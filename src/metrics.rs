use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Once;
use std::time::{Duration, Instant};

use crate::alu::{CARRY_FLAG, INTERRUPT_FLAG, NEGATIVE_FLAG, OVERFLOW_FLAG, ZERO_FLAG};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Counter for executed instructions by opcode
    pub static ref INSTRUCTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("avr_instructions_total", "Total number of instructions executed by opcode"),
        &["opcode", "instruction"]
    ).expect("Failed to create instructions counter");

    /// Counter for control unit phases
    pub static ref PHASES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("avr_phases_total", "Total number of control unit phases run"),
        &["phase"]
    ).expect("Failed to create phases counter");

    /// Histogram for execute phase duration
    pub static ref INSTRUCTION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("avr_instruction_duration_seconds", "Time spent in the execute phase")
            .buckets(vec![0.0000001, 0.0000005, 0.000001, 0.000005, 0.00001, 0.0001]),
        &["instruction"]
    ).expect("Failed to create instruction duration histogram");

    /// Counter for interrupts taken
    pub static ref INTERRUPTS_TOTAL: Counter = Counter::new(
        "avr_interrupts_total", "Total number of pin-change interrupts taken"
    ).expect("Failed to create interrupts counter");

    /// Counter for returns from interrupt
    pub static ref INTERRUPT_RETURNS_TOTAL: Counter = Counter::new(
        "avr_interrupt_returns_total", "Total number of RETI instructions executed"
    ).expect("Failed to create interrupt returns counter");

    /// Counter for faults by kind
    pub static ref FAULTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("avr_faults_total", "Stack faults and unknown opcodes observed"),
        &["kind"]
    ).expect("Failed to create faults counter");

    /// Counter for resets by reason
    pub static ref RESETS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("avr_resets_total", "Total number of control unit resets"),
        &["reason"]
    ).expect("Failed to create resets counter");

    /// Gauge for status register flags
    pub static ref STATUS_FLAGS: GaugeVec = GaugeVec::new(
        Opts::new("avr_status_flag", "Current status register flag states (0 or 1)"),
        &["flag"]
    ).expect("Failed to create status flags gauge");
}

static INIT: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(INSTRUCTIONS_TOTAL.clone()))
            .expect("Failed to register instructions counter");

        REGISTRY
            .register(Box::new(PHASES_TOTAL.clone()))
            .expect("Failed to register phases counter");

        REGISTRY
            .register(Box::new(INSTRUCTION_DURATION.clone()))
            .expect("Failed to register instruction duration histogram");

        REGISTRY
            .register(Box::new(INTERRUPTS_TOTAL.clone()))
            .expect("Failed to register interrupts counter");

        REGISTRY
            .register(Box::new(INTERRUPT_RETURNS_TOTAL.clone()))
            .expect("Failed to register interrupt returns counter");

        REGISTRY
            .register(Box::new(FAULTS_TOTAL.clone()))
            .expect("Failed to register faults counter");

        REGISTRY
            .register(Box::new(RESETS_TOTAL.clone()))
            .expect("Failed to register resets counter");

        REGISTRY
            .register(Box::new(STATUS_FLAGS.clone()))
            .expect("Failed to register status flags gauge");
    });
}

/// Record an executed instruction
pub fn record_instruction(opcode: u8, instruction_name: &str, duration: Duration) {
    INSTRUCTIONS_TOTAL
        .with_label_values(&[&format!("0x{:02X}", opcode), instruction_name])
        .inc();

    INSTRUCTION_DURATION
        .with_label_values(&[instruction_name])
        .observe(duration.as_secs_f64());
}

pub fn record_phase(phase: &str) {
    PHASES_TOTAL.with_label_values(&[phase]).inc();
}

pub fn record_interrupt() {
    INTERRUPTS_TOTAL.inc();
}

pub fn record_interrupt_return() {
    INTERRUPT_RETURNS_TOTAL.inc();
}

pub fn record_fault(kind: &str) {
    FAULTS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_reset(reason: &str) {
    RESETS_TOTAL.with_label_values(&[reason]).inc();
}

/// Update status flag metrics
pub fn update_status_flags(status: u8) {
    let flags = [
        ("interrupt", INTERRUPT_FLAG),
        ("negative", NEGATIVE_FLAG),
        ("zero", ZERO_FLAG),
        ("overflow", OVERFLOW_FLAG),
        ("carry", CARRY_FLAG),
    ];

    for (name, mask) in flags {
        STATUS_FLAGS
            .with_label_values(&[name])
            .set(if status & mask != 0 { 1.0 } else { 0.0 });
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn gather_text() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
