use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

/// Name of the log file the simulator writes inside `log_dir`.
pub const LOG_FILE: &str = "logs.log";

/// How to start the simulator executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub executable: PathBuf,
    pub log_dir: PathBuf,
    /// Headless, non-interactive player.
    pub batch_mode: bool,
    /// `Some(true)` passes `--turbo`, `Some(false)` passes `--turbo=0`.
    pub turbo: Option<bool>,
    pub extra_args: Vec<OsString>,
}

impl LaunchOptions {
    pub fn new(executable: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            log_dir: log_dir.into(),
            batch_mode: false,
            turbo: None,
            extra_args: Vec::new(),
        }
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE)
    }

    /// Arguments passed after the executable: a small window, the log file,
    /// then the optional flags and finally `extra_args`.
    pub fn command_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-screen-fullscreen",
            "0",
            "-screen-width",
            "100",
            "-screen-height",
            "100",
            "-logFile",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(self.log_file().into_os_string());

        if self.batch_mode {
            args.push("-batchmode".into());
        }

        match self.turbo {
            Some(true) => args.push("--turbo".into()),
            Some(false) => args.push("--turbo=0".into()),
            None => {}
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    pub(crate) fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.args(self.command_args());
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_arguments() {
        let options = LaunchOptions::new("/opt/col/City.x86_64", "/tmp/col");
        let args = options.command_args();

        assert_eq!(
            args,
            vec![
                OsString::from("-screen-fullscreen"),
                "0".into(),
                "-screen-width".into(),
                "100".into(),
                "-screen-height".into(),
                "100".into(),
                "-logFile".into(),
                PathBuf::from("/tmp/col").join("logs.log").into_os_string(),
            ]
        );
    }

    #[test]
    fn test_optional_flags_precede_extra_args() {
        let options = LaunchOptions {
            batch_mode: true,
            turbo: Some(false),
            extra_args: vec!["-nographics".into()],
            ..LaunchOptions::new("sim", "logs")
        };
        let args = options.command_args();
        let tail: Vec<_> = args[8..].iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(tail, vec!["-batchmode", "--turbo=0", "-nographics"]);
    }

    #[test]
    fn test_turbo_on() {
        let options = LaunchOptions {
            turbo: Some(true),
            ..LaunchOptions::new("sim", "logs")
        };
        assert_eq!(options.command_args().last().unwrap(), "--turbo");
    }
}
