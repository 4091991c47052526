use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use b33arch::{parse_address, DEFAULT_ORIGIN};
use b33emu::{
    hooks::{dump::print_registers, Dump, Trace},
    B33Cpu, BreakpointKind, ChannelHook, CpuEvent, EmuConfig, StopReason,
};
use clap::Parser;
use color_print::cprintln;
use crossbeam_channel::RecvTimeoutError;
use tracing_subscriber::EnvFilter;

const HELP_TEMPLATE: &str = "\
{before-help}{bin} {version}
  {about}

{usage-heading}
{tab}{usage}

{all-args}{after-help}";

const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[clap(version, about = "Emulator for the B33 CPU", help_template = HELP_TEMPLATE)]
struct Args {
    /// B33 executable, or a raw binary loaded at --origin
    file: String,

    /// Load address of a raw binary
    #[clap(long, value_parser = parse_address)]
    origin: Option<u16>,

    /// YAML run configuration
    #[clap(short, long)]
    config: Option<String>,

    /// Milliseconds per instruction
    #[clap(short, long)]
    speed: Option<u64>,

    /// Execution breakpoint (repeatable)
    #[clap(short, long = "breakpoint", value_parser = parse_address)]
    breakpoints: Vec<u16>,

    /// Text typed into the keyboard buffer
    #[clap(short, long)]
    keys: Option<String>,

    /// Stop the program after this many seconds
    #[clap(short, long)]
    timeout: Option<u64>,

    /// Print registers before every instruction
    #[clap(short = 'a', long)]
    dump_all: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    println!("B33 Emulator");

    let config = match &args.config {
        Some(path) => EmuConfig::load(path)?,
        None => EmuConfig::default(),
    };

    println!("+-----------------------------------------------+");
    println!("| {:<45} |", args.file);
    println!("+-----------------------------------------------+");

    let cpu = B33Cpu::new()?;
    let program = cpu
        .load_file_at(&args.file, args.origin.unwrap_or(DEFAULT_ORIGIN))
        .with_context(|| format!("Failed to load {}", args.file))?;
    cpu.set_speed(args.speed.unwrap_or(config.speed));

    println!("[INIT]");
    println!(
        " * Program ${:04X}-${:04X}, entry ${:04X}",
        program.origin,
        program.end().saturating_sub(1),
        program.execution_address
    );

    let dump = Dump::new(config.dump_list(), args.dump_all);
    if !dump.is_empty() {
        println!(" * Dump[{}] {}", dump.len(), args.config.as_deref().unwrap_or(""));
    }
    cpu.add_hook(Box::new(dump));
    cpu.add_hook(Box::new(Trace));
    let (hook, events) = ChannelHook::new();
    cpu.add_hook(Box::new(hook.control_only()));

    let execution = args
        .breakpoints
        .iter()
        .copied()
        .chain(config.breakpoints.iter().map(|a| a.0));
    for addr in execution {
        cpu.add_breakpoint(BreakpointKind::Execution, addr);
    }
    for addr in &config.store_breakpoints {
        cpu.add_breakpoint(BreakpointKind::Store, addr.0);
    }
    for (kind, addr) in cpu.breakpoints() {
        println!(" * Breakpoint {:?} ${:04X}", kind, addr);
    }

    if let Some(keys) = args.keys.as_ref().or(config.keys.as_ref()) {
        cpu.keyboard().type_text(keys);
        println!(" * Keys[{}]", keys.len());
    }

    let mut deadline = args
        .timeout
        .or(config.timeout_secs)
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    println!("[RUN]");
    cpu.start()?;
    loop {
        match events.recv_timeout(POLL) {
            Ok(CpuEvent::BreakpointHit { hit, registers }) => {
                cprintln!(
                    " <y>break</> {:?} ${:04X}",
                    hit.kind,
                    hit.address
                );
                print_registers(&registers);
                cpu.start()?;
            }
            Ok(CpuEvent::Stopped { .. }) => break,
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                if deadline.map_or(false, |d| Instant::now() >= d) {
                    cprintln!(" <r>timeout</>");
                    deadline = None;
                    cpu.stop();
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    cpu.wait_until_stopped(Duration::from_secs(1));

    println!("[EXIT]");
    let reason = cpu.last_stop();
    match &reason {
        Some(StopReason::Fault(fault)) => cprintln!(" <r>{}</>", fault),
        Some(reason) => cprintln!(" <g>{}</>", reason),
        None => {}
    }
    print_registers(&cpu.registers());

    for monitor in [1u8, 2] {
        let rows = cpu.screen_text(monitor);
        if rows.iter().all(|r| r.is_empty()) {
            continue;
        }
        println!(" Monitor {monitor}");
        for (i, row) in rows.iter().enumerate().filter(|(_, r)| !r.is_empty()) {
            println!(" {:>2} | {}", i, row);
        }
    }
    let tones = cpu.tones().try_iter().count();
    if tones > 0 {
        println!(" * Tones[{}]", tones);
    }
    println!("=================================================");

    if let Some(StopReason::Fault(fault)) = reason {
        bail!(fault);
    }
    Ok(())
}
