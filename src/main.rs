use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_derive::Parser;
use log::{debug, error, warn};
use num_traits::FromPrimitive;

use crate::dos::{DosServices, OemId, SERVICE_VECTOR, TERMINATE_VECTOR};
use crate::io::console::{Console, TerminalConsole};
use crate::vm::error::Result;
use crate::vm::runtime::{Outcome, Runtime};

mod dos;
mod io;
mod utils;
mod vm;


#[derive(Parser, Debug)]
#[command(name = "dos86", version, about = "8086 emulator for DOS .COM programs")]
struct CLI {
    /// Path to the .COM image, loaded at 1000:0100
    program: PathBuf,
    /// Log every instruction with the register state (needs RUST_LOG=debug)
    #[arg(long)]
    trace: bool,
    /// Stop after this many instructions
    #[arg(long)]
    max_instructions: Option<u64>,
    /// Terminal window title
    #[arg(long)]
    title: Option<String>,
    /// Resize the terminal before running (e.g. --window 80x25)
    #[arg(long, value_parser = parse_window)]
    window: Option<(u16, u16)>,
    /// Version reported by INT 21h/30h (e.g. --dos-version 3.30)
    #[arg(long, value_parser = parse_dos_version)]
    dos_version: Option<(u8, u8)>,
    /// OEM reported by INT 21h/30h: ibm, compaq, zenith, att, microsoft or a number
    #[arg(long, value_parser = parse_oem)]
    oem: Option<OemId>,
}

fn parse_window(spec: &str) -> std::result::Result<(u16, u16), String> {
    let (columns, rows) = spec
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected COLUMNSxROWS, got '{}'", spec))?;
    let columns = columns.parse().map_err(|e| format!("columns: {}", e))?;
    let rows = rows.parse().map_err(|e| format!("rows: {}", e))?;
    Ok((columns, rows))
}

fn parse_dos_version(spec: &str) -> std::result::Result<(u8, u8), String> {
    let (major, minor) = spec.split_once('.').unwrap_or((spec, "0"));
    let major = major.parse().map_err(|e| format!("major version: {}", e))?;
    let minor = minor.parse().map_err(|e| format!("minor version: {}", e))?;
    Ok((major, minor))
}

fn parse_oem(spec: &str) -> std::result::Result<OemId, String> {
    match spec.to_ascii_lowercase().as_str() {
        "ibm" => Ok(OemId::Ibm),
        "compaq" => Ok(OemId::Compaq),
        "zenith" => Ok(OemId::Zenith),
        "att" | "at&t" => Ok(OemId::Att),
        "microsoft" | "ms" => Ok(OemId::Microsoft),
        other => {
            let number = match other.strip_prefix("0x") {
                Some(hex) => u8::from_str_radix(hex, 16),
                None => other.parse(),
            }
            .map_err(|_| format!("unknown OEM '{}'", spec))?;
            OemId::from_u8(number).ok_or_else(|| format!("unknown OEM number {:#04X}", number))
        }
    }
}

fn run(args: &CLI) -> Result<Outcome> {
    let program = std::fs::read(&args.program)?;

    let mut console = TerminalConsole::new();
    if let Some(title) = &args.title {
        console.set_title(title)?;
    }
    if let Some((columns, rows)) = args.window {
        console.set_window_size(columns, rows)?;
    }
    match console.window_size() {
        Ok((columns, rows)) => debug!("Console '{}' is {}x{}", console.title(), columns, rows),
        Err(e) => debug!("Console size unavailable: {}", e),
    }

    let mut dos = DosServices::new(console);
    if let Some((major, minor)) = args.dos_version {
        dos = dos.with_version(major, minor);
    }
    if let Some(oem) = args.oem {
        dos = dos.with_oem(oem);
    }

    let mut runtime = Runtime::new().with_trace(args.trace);
    runtime.register_handler(TERMINATE_VECTOR, SERVICE_VECTOR, Box::new(dos));
    runtime.load_program(&program)?;
    debug!("Loaded {} ({} bytes)", args.program.display(), program.len());
    runtime.run(args.max_instructions)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = CLI::parse();

    match run(&args) {
        Ok(Outcome::Exited(code)) => ExitCode::from(code),
        Ok(Outcome::Halted) => ExitCode::SUCCESS,
        Ok(Outcome::LimitReached) => {
            warn!("Stopped after {} instructions", args.max_instructions.unwrap_or_default());
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
