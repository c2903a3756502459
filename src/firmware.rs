//! The sample "blink-on-button" firmware.
//!
//! `setup` configures PB0 as the LED output, enables the pull-up on PB5 and
//! arms the pin-change interrupt for that button. The main loop spins while
//! the interrupt handler toggles the LED on every edge that leaves the button
//! pin high. The LED state is mirrored in the `led_enabled` variable at data
//! address 100.

use crate::instruction::{assemble, Opcode};
use crate::memory::{DDRB, PCICR, PCIE0, PCMSK0, PINB, PORTB};
use crate::program::{ProgramImage, PCINT0_VECTOR, RESET_VECTOR};

pub const LED1: u8 = 0;
pub const BUTTON1: u8 = 5;
pub const LED_ENABLED: u8 = 100;

const R16: u8 = 16;
const R24: u8 = 24;

pub const ISR_VECT_END: u8 = PCINT0_VECTOR + 2;
pub const ISR_PCINT0: u8 = ISR_VECT_END;
pub const ISR_PCINT0_END: u8 = ISR_PCINT0 + 4;
pub const MAIN: u8 = ISR_PCINT0 + 5;
pub const MAIN_LOOP: u8 = MAIN + 1;
pub const LED_TOGGLE: u8 = MAIN_LOOP + 1;
pub const LED_TOGGLE_END: u8 = LED_TOGGLE + 4;
pub const LED_ON: u8 = LED_TOGGLE + 5;
pub const LED_OFF: u8 = LED_ON + 6;
pub const SETUP: u8 = LED_OFF + 6;
pub const INIT_INTERRUPTS: u8 = SETUP + 4;
pub const INIT_GLOBALS: u8 = INIT_INTERRUPTS + 5;
pub const BUTTON_IS_PRESSED: u8 = INIT_GLOBALS + 3;
pub const END: u8 = BUTTON_IS_PRESSED + 3;

pub fn blink_on_button() -> ProgramImage {
    use Opcode::*;

    let port = PORTB as u8;
    let words = vec![
        // RESET_vect
        assemble(Jmp, MAIN, 0),
        assemble(Nop, 0, 0),
        // PCINT0_vect
        assemble(Jmp, ISR_PCINT0, 0),
        assemble(Nop, 0, 0),
        // ISR (PCINT0_vect)
        assemble(Call, BUTTON_IS_PRESSED, 0),
        assemble(Cpi, R24, 0x00),
        assemble(Breq, ISR_PCINT0_END, 0),
        assemble(Call, LED_TOGGLE, 0),
        assemble(Reti, 0, 0),
        // main
        assemble(Call, SETUP, 0),
        assemble(Jmp, MAIN_LOOP, 0),
        // led_toggle
        assemble(Lds, R16, LED_ENABLED),
        assemble(Cpi, R16, 0x00),
        assemble(Breq, LED_ON, 0),
        assemble(Jmp, LED_OFF, 0),
        assemble(Ret, 0, 0),
        // led_on
        assemble(In, R16, port),
        assemble(Ori, R16, 1 << LED1),
        assemble(Out, port, R16),
        assemble(Ldi, R16, 0x01),
        assemble(Sts, LED_ENABLED, R16),
        assemble(Jmp, LED_TOGGLE_END, 0),
        // led_off
        assemble(In, R16, port),
        assemble(Andi, R16, !(1 << LED1)),
        assemble(Out, port, R16),
        assemble(Ldi, R16, 0x00),
        assemble(Sts, LED_ENABLED, R16),
        assemble(Jmp, LED_TOGGLE_END, 0),
        // setup
        assemble(Ldi, R16, 1 << LED1),
        assemble(Out, DDRB as u8, R16),
        assemble(Ldi, R16, 1 << BUTTON1),
        assemble(Out, port, R16),
        assemble(Sei, 0, 0),
        assemble(Ldi, R16, 1 << PCIE0),
        assemble(Out, PCICR as u8, R16),
        assemble(Ldi, R16, 1 << BUTTON1),
        assemble(Out, PCMSK0 as u8, R16),
        assemble(Clr, R16, 0),
        assemble(Sts, LED_ENABLED, R16),
        assemble(Ret, 0, 0),
        // button_is_pressed
        assemble(In, R24, PINB as u8),
        assemble(Andi, R24, 1 << BUTTON1),
        assemble(Ret, 0, 0),
    ];

    ProgramImage::new(words)
        .with_label("RESET_vect", RESET_VECTOR as u16..PCINT0_VECTOR as u16)
        .with_label("PCINT0_vect", PCINT0_VECTOR as u16..ISR_VECT_END as u16)
        .with_label("ISR (PCINT0_vect)", ISR_PCINT0 as u16..MAIN as u16)
        .with_label("main", MAIN as u16..LED_TOGGLE as u16)
        .with_label("led_toggle", LED_TOGGLE as u16..LED_ON as u16)
        .with_label("led_on", LED_ON as u16..LED_OFF as u16)
        .with_label("led_off", LED_OFF as u16..SETUP as u16)
        .with_label("setup", SETUP as u16..BUTTON_IS_PRESSED as u16)
        .with_label("button_is_pressed", BUTTON_IS_PRESSED as u16..END as u16)
}
