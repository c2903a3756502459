use clap::{ArgAction, Parser};
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use avr_emulator::config::Config;
use avr_emulator::cpu::ControlUnit;
use avr_emulator::firmware::{self, BUTTON1};
use avr_emulator::metrics::{gather_text, init_metrics};

#[derive(Parser, Debug)]
#[command(name = "avr_emulator")]
#[command(about = "Phase-accurate emulator for an AVR-style 8-bit microcontroller", long_about = None)]
struct Args {
    /// Read configuration from this file instead of ./avr-emu.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run this many phases without the interactive menu
    #[arg(long)]
    phases: Option<usize>,

    /// Drive the button pin high before running
    #[arg(long, action = ArgAction::SetTrue)]
    press_button: bool,

    /// Print the final state as JSON instead of the text panel
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Print Prometheus metrics on exit
    #[arg(long, action = ArgAction::SetTrue)]
    metrics: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load(),
    };
    init_metrics();

    let mut cpu = ControlUnit::with_config(firmware::blink_on_button(), &config);
    log::info!(
        "starting with {} bytes of data memory, stack capacity {}, {:?} faults",
        config.data_memory_size,
        config.stack_capacity,
        config.fault_policy
    );

    if args.press_button {
        cpu.set_pin_input(1 << BUTTON1);
    }

    match args.phases {
        Some(phases) => {
            cpu.run(phases)?;
            print_state(&cpu, args.json)?;
        }
        None => interactive(&mut cpu, args.json)?,
    }

    if args.metrics {
        print!("{}", gather_text()?);
    }

    Ok(())
}

fn print_state(cpu: &ControlUnit, json: bool) -> Result<(), Box<dyn Error>> {
    let snapshot = cpu.inspect();
    if json {
        println!("{}", snapshot.to_json()?);
    } else {
        print!("{}", snapshot);
    }
    Ok(())
}

fn interactive(cpu: &mut ControlUnit, json: bool) -> Result<(), Box<dyn Error>> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    print_state(cpu, json)?;
    loop {
        println!("1) Next instruction cycle  2) Next phase  3) Reset  4) Write PINB  q) Quit");
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;

        // Faults are only returned under the report policy; show them and keep going.
        let outcome = match line.trim() {
            "1" => cpu.step_instruction(),
            "2" => cpu.step_phase(),
            "3" => {
                cpu.reset();
                Ok(())
            }
            "4" => {
                print!("PINB value (0-255, 0x.. for hex): ");
                io::stdout().flush()?;
                let Some(value) = lines.next() else {
                    break;
                };
                match parse_byte(&value?) {
                    Some(value) => cpu.set_pin_input(value),
                    None => println!("Not a byte value"),
                }
                Ok(())
            }
            "q" | "Q" => break,
            "" => continue,
            other => {
                println!("Unknown choice '{}'", other);
                continue;
            }
        };

        if let Err(fault) = outcome {
            println!("Fault: {}", fault);
        }
        print_state(cpu, json)?;
    }

    Ok(())
}

fn parse_byte(input: &str) -> Option<u8> {
    let input = input.trim();
    match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => input.parse().ok(),
    }
}
