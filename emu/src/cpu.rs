use std::fmt;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use b33arch::{B33Program, FormatError, Registers, DEFAULT_ORIGIN};
use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{info, warn};

use crate::breakpoint::{BreakpointKind, Breakpoints};
use crate::device::{screen, KeyboardHandle, Screen, Tone};
use crate::hooks::Hook;
use crate::memory::MemoryError;
use crate::processor::{Fault, Processor};

#[derive(Error, Debug)]
pub enum CpuError {
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error("CPU must be stopped")]
    NotStopped,
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("Failed to open file {0}: {1}")]
    FileOpen(String, #[source] io::Error),
    #[error("Failed to start CPU thread: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Running,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Halted,
    Requested,
    Fault(Fault),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Halted => write!(f, "halted"),
            StopReason::Requested => write!(f, "stop requested"),
            StopReason::Fault(fault) => write!(f, "fault: {fault}"),
        }
    }
}

struct Control {
    state: State,
    stop_requested: bool,
    last_stop: Option<StopReason>,
}

struct Shared {
    processor: Mutex<Processor>,
    hooks: Mutex<Vec<Box<dyn Hook>>>,
    breakpoints: Mutex<Breakpoints>,
    control: Mutex<Control>,
    changed: Condvar,
    speed: AtomicU64,
}

impl Shared {
    /// Blocks while paused. `Some` ends the run.
    fn wait_turn(&self) -> Option<StopReason> {
        let mut ctl = self.control.lock();
        loop {
            if ctl.stop_requested {
                return Some(StopReason::Requested);
            }
            match ctl.state {
                State::Running => return None,
                State::Paused => self.changed.wait(&mut ctl),
                State::Stopped => return Some(StopReason::Requested),
            }
        }
    }

    /// One instruction with its events. Returns true on `HLT`.
    fn execute(&self) -> Result<bool, Fault> {
        let mut cpu = self.processor.lock();
        let mut hooks = self.hooks.lock();

        let before = *cpu.registers();
        for hook in hooks.iter_mut() {
            hook.pre_opcode(&cpu, false, before.pc);
        }
        let step = cpu.step()?;
        if let Some(address) = step.store {
            for hook in hooks.iter_mut() {
                hook.post_opcode(&cpu, true, address);
            }
        }
        if *cpu.registers() != before {
            for hook in hooks.iter_mut() {
                hook.registers_changed(&cpu);
            }
        }
        if step.halted {
            return Ok(true);
        }

        let hit = self.breakpoints.lock().check(cpu.registers().pc, step.store);
        if let Some(hit) = hit {
            let mut ctl = self.control.lock();
            if !ctl.stop_requested {
                ctl.state = State::Paused;
                drop(ctl);
                self.changed.notify_all();
                for hook in hooks.iter_mut() {
                    hook.breakpoint_hit(&cpu, hit);
                }
            }
        }
        Ok(false)
    }

    fn throttle(&self) {
        let ms = self.speed.load(Ordering::Relaxed);
        if ms == 0 {
            return;
        }
        let mut ctl = self.control.lock();
        if ctl.state == State::Running && !ctl.stop_requested {
            self.changed.wait_for(&mut ctl, Duration::from_millis(ms));
        }
    }

    fn finish(&self, reason: StopReason) {
        {
            let cpu = self.processor.lock();
            let mut hooks = self.hooks.lock();
            for hook in hooks.iter_mut() {
                hook.stopped(&cpu, &reason);
            }
        }
        match &reason {
            StopReason::Fault(fault) => warn!(%fault, "CPU stopped"),
            _ => info!(%reason, "CPU stopped"),
        }
        let mut ctl = self.control.lock();
        ctl.state = State::Stopped;
        ctl.stop_requested = false;
        ctl.last_stop = Some(reason);
        drop(ctl);
        self.changed.notify_all();
    }

    fn run(&self) {
        let reason = loop {
            if let Some(reason) = self.wait_turn() {
                break reason;
            }
            match self.execute() {
                Ok(true) => break StopReason::Halted,
                Ok(false) => {}
                Err(fault) => break StopReason::Fault(fault),
            }
            self.throttle();
        };
        self.finish(reason);
    }
}

/// A B33 running on its own thread, controlled from any other.
///
/// ```
/// use std::time::Duration;
/// use b33emu::{B33Cpu, StopReason};
///
/// let cpu = B33Cpu::new().unwrap();
/// cpu.load_bytes(&[0x10, 99, 0x01], 0x4000, 0x4000).unwrap();
/// cpu.start().unwrap();
/// assert!(cpu.wait_until_stopped(Duration::from_secs(1)));
/// assert_eq!(cpu.last_stop(), Some(StopReason::Halted));
/// assert_eq!(cpu.registers().a, 99);
/// ```
pub struct B33Cpu {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    keyboard: KeyboardHandle,
    tones: Receiver<Tone>,
}

impl B33Cpu {
    /// CPU with the standard devices attached.
    pub fn new() -> Result<Self, CpuError> {
        let (processor, peripherals) = Processor::with_devices()?;
        let shared = Shared {
            processor: Mutex::new(processor),
            hooks: Mutex::new(Vec::new()),
            breakpoints: Mutex::new(Breakpoints::new()),
            control: Mutex::new(Control {
                state: State::Stopped,
                stop_requested: false,
                last_stop: None,
            }),
            changed: Condvar::new(),
            speed: AtomicU64::new(0),
        };
        Ok(B33Cpu {
            shared: Arc::new(shared),
            thread: Mutex::new(None),
            keyboard: peripherals.keyboard,
            tones: peripherals.tones,
        })
    }

    pub fn state(&self) -> State {
        self.shared.control.lock().state
    }

    pub fn last_stop(&self) -> Option<StopReason> {
        self.shared.control.lock().last_stop.clone()
    }

    pub fn load_bytes(&self, bytes: &[u8], origin: u16, entry: u16) -> Result<(), CpuError> {
        // `start` needs the control lock, so it cannot slip in between the
        // state check and the copy.
        let mut cpu = self.shared.processor.lock();
        let mut ctl = self.shared.control.lock();
        if ctl.state != State::Stopped {
            return Err(CpuError::NotStopped);
        }
        cpu.load(origin, bytes, entry)?;
        ctl.last_stop = None;
        drop(ctl);
        drop(cpu);
        info!(
            "loaded {} bytes at ${:04X}, entry ${:04X}",
            bytes.len(),
            origin,
            entry
        );
        Ok(())
    }

    pub fn load_program(&self, program: &B33Program) -> Result<(), CpuError> {
        self.load_bytes(&program.bytes, program.origin, program.execution_address)
    }

    /// Loads a B33 executable, or a raw binary at the default origin.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<B33Program, CpuError> {
        self.load_file_at(path, DEFAULT_ORIGIN)
    }

    /// Like [`load_file`](Self::load_file), with raw binaries placed at `origin`.
    pub fn load_file_at(
        &self,
        path: impl AsRef<Path>,
        origin: u16,
    ) -> Result<B33Program, CpuError> {
        let path = path.as_ref();
        let data =
            std::fs::read(path).map_err(|e| CpuError::FileOpen(path.display().to_string(), e))?;
        let program = B33Program::from_image(data, origin)?;
        self.load_program(&program)?;
        Ok(program)
    }

    /// Start from `Stopped` or resume from `Paused`.
    pub fn start(&self) -> Result<(), CpuError> {
        let mut ctl = self.shared.control.lock();
        match ctl.state {
            State::Running => Ok(()),
            State::Paused => {
                ctl.state = State::Running;
                drop(ctl);
                self.shared.changed.notify_all();
                info!("CPU resumed");
                Ok(())
            }
            State::Stopped => {
                let mut slot = self.thread.lock();
                if let Some(handle) = slot.take() {
                    // Already past `finish`.
                    let _ = handle.join();
                }
                ctl.state = State::Running;
                ctl.stop_requested = false;
                ctl.last_stop = None;
                let shared = Arc::clone(&self.shared);
                match thread::Builder::new()
                    .name("b33-cpu".into())
                    .spawn(move || shared.run())
                {
                    Ok(handle) => {
                        *slot = Some(handle);
                        info!("CPU started");
                        Ok(())
                    }
                    Err(e) => {
                        ctl.state = State::Stopped;
                        Err(CpuError::Spawn(e))
                    }
                }
            }
        }
    }

    pub fn pause(&self) {
        let mut ctl = self.shared.control.lock();
        if ctl.state == State::Running {
            ctl.state = State::Paused;
            drop(ctl);
            self.shared.changed.notify_all();
            info!("CPU paused");
        }
    }

    /// Ask the loop to stop at the next instruction boundary.
    pub fn stop(&self) {
        let mut ctl = self.shared.control.lock();
        if ctl.state != State::Stopped {
            ctl.stop_requested = true;
            drop(ctl);
            self.shared.changed.notify_all();
        }
    }

    /// Waits until the state leaves `Running`; returns the state then seen.
    pub fn wait_while_running(&self, timeout: Duration) -> State {
        let deadline = Instant::now() + timeout;
        let mut ctl = self.shared.control.lock();
        while ctl.state == State::Running {
            if self
                .shared
                .changed
                .wait_until(&mut ctl, deadline)
                .timed_out()
            {
                break;
            }
        }
        ctl.state
    }

    /// Returns false if still not stopped after `timeout`.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut ctl = self.shared.control.lock();
        while ctl.state != State::Stopped {
            if self
                .shared
                .changed
                .wait_until(&mut ctl, deadline)
                .timed_out()
            {
                break;
            }
        }
        ctl.state == State::Stopped
    }

    pub fn set_speed(&self, ms: u64) {
        self.shared.speed.store(ms, Ordering::Relaxed);
    }

    pub fn speed(&self) -> u64 {
        self.shared.speed.load(Ordering::Relaxed)
    }

    pub fn registers(&self) -> Registers {
        *self.shared.processor.lock().registers()
    }

    pub fn peek(&self, address: u16, bypass_hardware: bool) -> u8 {
        self.shared
            .processor
            .lock()
            .bus_mut()
            .peek(address, bypass_hardware)
    }

    pub fn poke(&self, address: u16, value: u8) {
        self.shared.processor.lock().bus_mut().poke(address, value);
    }

    /// Runs `f` against the processor between two instructions.
    pub fn with_processor<R>(&self, f: impl FnOnce(&Processor) -> R) -> R {
        f(&*self.shared.processor.lock())
    }

    pub fn add_hook(&self, hook: Box<dyn Hook>) {
        self.shared.hooks.lock().push(hook);
    }

    pub fn add_breakpoint(&self, kind: BreakpointKind, address: u16) -> bool {
        self.shared.breakpoints.lock().add(kind, address)
    }

    pub fn remove_breakpoint(&self, kind: BreakpointKind, address: u16) -> bool {
        self.shared.breakpoints.lock().remove(kind, address)
    }

    pub fn clear_breakpoints(&self) {
        self.shared.breakpoints.lock().clear();
    }

    pub fn breakpoints(&self) -> Vec<(BreakpointKind, u16)> {
        self.shared.breakpoints.lock().iter().collect()
    }

    pub fn keyboard(&self) -> KeyboardHandle {
        self.keyboard.clone()
    }

    pub fn tones(&self) -> Receiver<Tone> {
        self.tones.clone()
    }

    /// Rows of monitor 1 or 2; empty for any other monitor number.
    pub fn screen_text(&self, monitor: u8) -> Vec<String> {
        match Screen::base(monitor) {
            Some(base) => screen::text(self.shared.processor.lock().bus(), base),
            None => vec![],
        }
    }
}

impl Drop for B33Cpu {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}
