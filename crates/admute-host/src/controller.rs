//! System audio backends.

use crate::error::HostError;
use crate::runner::CommandRunner;

/// Control over the system-wide output mute.
pub trait AudioController: Send + Sync {
    fn set_muted(&self, muted: bool) -> Result<(), HostError>;
    fn is_muted(&self) -> Result<bool, HostError>;
}

impl<T: AudioController + ?Sized> AudioController for Box<T> {
    fn set_muted(&self, muted: bool) -> Result<(), HostError> {
        (**self).set_muted(muted)
    }

    fn is_muted(&self) -> Result<bool, HostError> {
        (**self).is_muted()
    }
}

// ─── macOS ───────────────────────────────────────────────────────

/// macOS output mute through AppleScript.
pub struct OsascriptController<R> {
    runner: R,
}

impl<R: CommandRunner> OsascriptController<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn script(&self, script: &str) -> Result<String, HostError> {
        self.runner.run("osascript", &["-e", script])
    }
}

impl<R: CommandRunner> AudioController for OsascriptController<R> {
    fn set_muted(&self, muted: bool) -> Result<(), HostError> {
        let script = if muted {
            "set volume with output muted"
        } else {
            "set volume without output muted"
        };
        self.script(script).map(|_| ())
    }

    fn is_muted(&self) -> Result<bool, HostError> {
        let out = self.script("output muted of (get volume settings)")?;
        Ok(out.trim().eq_ignore_ascii_case("true"))
    }
}

// ─── Linux (PulseAudio / PipeWire) ───────────────────────────────

const DEFAULT_SINK: &str = "@DEFAULT_SINK@";

/// Default sink mute through `pactl`.
pub struct PactlController<R> {
    runner: R,
}

impl<R: CommandRunner> PactlController<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> AudioController for PactlController<R> {
    fn set_muted(&self, muted: bool) -> Result<(), HostError> {
        let flag = if muted { "1" } else { "0" };
        self.runner
            .run("pactl", &["set-sink-mute", DEFAULT_SINK, flag])
            .map(|_| ())
    }

    fn is_muted(&self) -> Result<bool, HostError> {
        let out = self.runner.run("pactl", &["get-sink-mute", DEFAULT_SINK])?;
        parse_pactl_mute(&out).ok_or_else(|| HostError::UnexpectedOutput {
            program: "pactl".to_owned(),
            output: out.clone(),
        })
    }
}

/// Parse `Mute: yes` / `Mute: no`.
fn parse_pactl_mute(output: &str) -> Option<bool> {
    let value = output.trim().strip_prefix("Mute:")?.trim();
    match value {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

// ─── Selection ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// osascript on macOS, pactl elsewhere.
    Auto,
    Osascript,
    Pactl,
}

impl Backend {
    fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(target_os = "macos") => Self::Osascript,
            Self::Auto => Self::Pactl,
            other => other,
        }
    }
}

pub fn controller_for<R: CommandRunner + 'static>(
    backend: Backend,
    runner: R,
) -> Box<dyn AudioController> {
    match backend.resolve() {
        Backend::Osascript => Box::new(OsascriptController::new(runner)),
        Backend::Pactl | Backend::Auto => Box::new(PactlController::new(runner)),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn osascript_mute_and_unmute_scripts() {
        let runner = ScriptedRunner::ok("");
        let ctl = OsascriptController::new(&runner);
        ctl.set_muted(true).expect("mute");
        ctl.set_muted(false).expect("unmute");
        assert_eq!(
            runner.calls(),
            vec![
                vec!["osascript", "-e", "set volume with output muted"],
                vec!["osascript", "-e", "set volume without output muted"],
            ]
        );
    }

    #[test]
    fn osascript_status_parses_boolean() {
        assert!(OsascriptController::new(ScriptedRunner::ok("true")).is_muted().expect("ok"));
        assert!(OsascriptController::new(ScriptedRunner::ok("True")).is_muted().expect("ok"));
        assert!(!OsascriptController::new(ScriptedRunner::ok("false")).is_muted().expect("ok"));
        // `missing value` when no output device exists.
        assert!(!OsascriptController::new(ScriptedRunner::ok("missing value")).is_muted().expect("ok"));
    }

    #[test]
    fn pactl_targets_default_sink() {
        let runner = ScriptedRunner::ok("");
        PactlController::new(&runner).set_muted(true).expect("mute");
        assert_eq!(
            runner.calls(),
            vec![vec!["pactl", "set-sink-mute", "@DEFAULT_SINK@", "1"]]
        );
    }

    #[test]
    fn pactl_status_parsing() {
        assert_eq!(parse_pactl_mute("Mute: yes"), Some(true));
        assert_eq!(parse_pactl_mute("Mute: no\n"), Some(false));
        assert_eq!(parse_pactl_mute("Stummschalten: ja"), None);

        let err = PactlController::new(ScriptedRunner::ok("garbage"))
            .is_muted()
            .expect_err("unparseable");
        assert!(matches!(err, HostError::UnexpectedOutput { .. }));
    }

    #[test]
    fn backend_errors_pass_through() {
        let ctl = OsascriptController::new(ScriptedRunner::failing("execution error"));
        let err = ctl.set_muted(true).expect_err("fails");
        assert_eq!(err.to_string(), "execution error");
    }

    #[test]
    fn explicit_backend_is_kept() {
        assert_eq!(Backend::Pactl.resolve(), Backend::Pactl);
        assert_eq!(Backend::Osascript.resolve(), Backend::Osascript);
        assert_ne!(Backend::Auto.resolve(), Backend::Auto);
    }
}
