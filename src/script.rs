//! Dynamic call surface with argument checking
//!
//! Scripting callers address the session by method name and pass loosely
//! typed arguments. Arity and type mistakes surface as `InvalidArgument`.

use std::fmt;

use kinect_driver::{Driver, LedOption, StreamKind};
use serde_json::Value;

use crate::error::{SessionError, SessionResult};
use crate::session::DeviceSession;
use crate::sink::SharedSink;

/// Loosely typed call argument
#[derive(Clone)]
pub enum Arg {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Function(SharedSink),
}

impl Arg {
    fn type_name(&self) -> &'static str {
        match self {
            Arg::Null => "null",
            Arg::Bool(_) => "boolean",
            Arg::Number(_) => "number",
            Arg::String(_) => "string",
            Arg::Function(_) => "function",
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Null => write!(f, "null"),
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::Number(n) => write!(f, "{}", n),
            Arg::String(s) => write!(f, "{:?}", s),
            Arg::Function(_) => write!(f, "<function>"),
        }
    }
}

impl From<Value> for Arg {
    /// Arrays and objects have no meaning for any method and map to strings
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Arg::Null,
            Value::Bool(b) => Arg::Bool(b),
            Value::Number(n) => n.as_f64().map(Arg::Number).unwrap_or(Arg::Null),
            Value::String(s) => Arg::String(s),
            other => Arg::String(other.to_string()),
        }
    }
}

impl From<f64> for Arg {
    fn from(n: f64) -> Self {
        Arg::Number(n)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::String(s.to_string())
    }
}

/// Script-facing session
pub struct ScriptSession {
    session: DeviceSession,
}

impl ScriptSession {
    pub fn open(driver: &dyn Driver, index: usize) -> SessionResult<Self> {
        Ok(Self::new(DeviceSession::open(driver, index)?))
    }

    pub fn new(session: DeviceSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Invoke a session method by name
    pub fn call(&self, method: &str, args: &[Arg]) -> SessionResult<Value> {
        match method {
            "startDepth" => self.no_args(method, args, || self.session.start_depth()),
            "stopDepth" => self.no_args(method, args, || self.session.stop_depth()),
            "startVideo" => self.no_args(method, args, || self.session.start_video()),
            "stopVideo" => self.no_args(method, args, || self.session.stop_video()),
            "setDepthCallback" => self.configure_callback(StreamKind::Depth, method, args),
            "setVideoCallback" => self.configure_callback(StreamKind::Video, method, args),
            "unsetDepthCallback" => {
                self.no_args(method, args, || self.session.unset_depth_callback())
            }
            "unsetVideoCallback" => {
                self.no_args(method, args, || self.session.unset_video_callback())
            }
            "setLedOption" | "led" => {
                let option = led_option(method, args)?;
                self.session.set_led_option(option)?;
                Ok(Value::String(option.name().to_string()))
            }
            "setTilt" | "tilt" => {
                let degrees = single_number(method, args)?;
                self.session.set_tilt(degrees)?;
                Ok(Value::from(degrees))
            }
            "pause" => self.no_args(method, args, || self.session.pause()),
            "resume" => self.no_args(method, args, || self.session.resume()),
            "close" => self.no_args(method, args, || self.session.close()),
            _ => Err(SessionError::InvalidArgument(format!(
                "Unknown method: {}",
                method
            ))),
        }
    }

    fn no_args<F>(&self, method: &str, args: &[Arg], op: F) -> SessionResult<Value>
    where
        F: FnOnce() -> SessionResult<()>,
    {
        expect_arity(method, args, 0)?;
        op()?;
        Ok(Value::Null)
    }

    /// One function argument installs a handler, none clears it
    fn configure_callback(
        &self,
        kind: StreamKind,
        method: &str,
        args: &[Arg],
    ) -> SessionResult<Value> {
        match args {
            [] => self.session.unset_callback(kind)?,
            [Arg::Function(sink)] => self.session.set_callback(kind, sink.clone())?,
            [other] => {
                return Err(SessionError::InvalidArgument(format!(
                    "{} expects a function, got {}",
                    method,
                    other.type_name()
                )))
            }
            _ => expect_arity(method, args, 1)?,
        }
        Ok(Value::Null)
    }
}

fn expect_arity(method: &str, args: &[Arg], expected: usize) -> SessionResult<()> {
    if args.len() != expected {
        return Err(SessionError::InvalidArgument(format!(
            "{} expects {} argument(s), got {}",
            method,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn single_number(method: &str, args: &[Arg]) -> SessionResult<f64> {
    expect_arity(method, args, 1)?;
    match &args[0] {
        Arg::Number(n) => Ok(*n),
        other => Err(SessionError::InvalidArgument(format!(
            "{} expects a number, got {}",
            method,
            other.type_name()
        ))),
    }
}

/// LED options are given by name or by driver code
fn led_option(method: &str, args: &[Arg]) -> SessionResult<LedOption> {
    expect_arity(method, args, 1)?;
    match &args[0] {
        Arg::String(name) => name
            .parse()
            .map_err(SessionError::InvalidArgument),
        Arg::Number(code) if code.fract() == 0.0 && (0.0..=255.0).contains(code) => {
            LedOption::from_code(*code as u8).ok_or_else(|| {
                SessionError::InvalidArgument(format!("Unknown LED code: {}", code))
            })
        }
        other => Err(SessionError::InvalidArgument(format!(
            "{} expects an LED option, got {:?}",
            method, other
        ))),
    }
}
