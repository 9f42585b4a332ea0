use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    thread,
    time::Duration,
};

use tracing::{debug, info};

use heatpump_common::{
    CommandSink, Error, HardwareVerifier, HeatpumpAction, IrConfig, LatchConfig, Result,
};

/// Sends heat pump buttons through LIRC's `irsend`.
pub struct IrsendSink {
    program: String,
    remote: String,
}

impl IrsendSink {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            program: "irsend".to_string(),
            remote: remote.into(),
        }
    }

    fn args(&self, action: HeatpumpAction) -> [&str; 3] {
        ["SEND_ONCE", self.remote.as_str(), action.command()]
    }
}

impl CommandSink for IrsendSink {
    fn send(&mut self, action: HeatpumpAction) -> Result<()> {
        let args = self.args(action);
        debug!("running {} {}", self.program, args.join(" "));

        let status = Command::new(&self.program)
            .args(args)
            .status()
            .map_err(|err| Error::HardwareIo(format!("failed to run {}: {err}", self.program)))?;

        if !status.success() {
            return Err(Error::HardwareIo(format!(
                "{} {} exited with {status}",
                self.program,
                action.command()
            )));
        }
        Ok(())
    }
}

/// Logs commands instead of transmitting them.
#[derive(Debug, Default)]
pub struct LoggingSink {
    sent: u64,
}

impl CommandSink for LoggingSink {
    fn send(&mut self, action: HeatpumpAction) -> Result<()> {
        self.sent += 1;
        info!(count = self.sent, "dry run: would send {}", action.command());
        Ok(())
    }
}

pub fn command_sink(config: &IrConfig) -> Box<dyn CommandSink> {
    if config.dry_run {
        Box::new(LoggingSink::default())
    } else {
        Box::new(IrsendSink::new(config.remote.clone()))
    }
}

/// 74HC373 latch on the IR LED line, driven through sysfs GPIO. Q0 goes high
/// once the LED fires after D0 is raised, and stays high until the next reset.
pub struct SysfsLatchVerifier {
    le: PathBuf,
    d0: PathBuf,
    q0: PathBuf,
    pulse: Duration,
}

impl SysfsLatchVerifier {
    pub fn open(config: &LatchConfig) -> Result<Self> {
        let root = Path::new(&config.gpio_root);
        Ok(Self {
            le: export(root, config.le_pin, "out")?,
            d0: export(root, config.d0_pin, "out")?,
            q0: export(root, config.q0_pin, "in")?,
            pulse: Duration::from_millis(config.pulse_ms),
        })
    }

    fn reset(&mut self) -> Result<()> {
        write_pin(&self.d0, false)?;
        self.strobe()?;
        write_pin(&self.d0, true)
    }

    fn strobe(&mut self) -> Result<()> {
        write_pin(&self.le, true)?;
        thread::sleep(self.pulse);
        write_pin(&self.le, false)?;
        thread::sleep(self.pulse);
        Ok(())
    }

    fn check_q0(&self, step: u8, high: bool) -> Result<()> {
        if read_pin(&self.q0)? == high {
            return Ok(());
        }
        Err(Error::HardwareIo(format!(
            "latch self test {step}/3: Q0 was not {}",
            if high { "HIGH" } else { "LOW" }
        )))
    }
}

impl HardwareVerifier for SysfsLatchVerifier {
    fn self_test(&mut self) -> Result<()> {
        self.reset()?;
        self.check_q0(1, false)?;

        // Latch D0 as if the LED had fired.
        self.strobe()?;
        self.check_q0(2, true)?;

        self.reset()?;
        self.check_q0(3, false)
    }

    fn arm(&mut self) -> Result<()> {
        self.reset()
    }

    fn confirm(&mut self) -> Result<bool> {
        read_pin(&self.q0)
    }
}

fn export(root: &Path, pin: u32, direction: &str) -> Result<PathBuf> {
    let dir = root.join(format!("gpio{pin}"));
    if !dir.exists() {
        fs::write(root.join("export"), pin.to_string()).map_err(|err| gpio_error(pin, err))?;
    }
    fs::write(dir.join("direction"), direction).map_err(|err| gpio_error(pin, err))?;
    Ok(dir.join("value"))
}

fn write_pin(path: &Path, high: bool) -> Result<()> {
    fs::write(path, if high { "1" } else { "0" })
        .map_err(|err| Error::HardwareIo(format!("write {}: {err}", path.display())))
}

fn read_pin(path: &Path) -> Result<bool> {
    let raw = fs::read_to_string(path)
        .map_err(|err| Error::HardwareIo(format!("read {}: {err}", path.display())))?;
    Ok(raw.trim() == "1")
}

fn gpio_error(pin: u32, err: std::io::Error) -> Error {
    Error::HardwareIo(format!("gpio {pin}: {err}"))
}
