//! JSON-lines script runner.
//!
//! Each non-empty input line is one call:
//!
//! ```text
//! {"method": "setLedOption", "args": ["blink red yellow"]}
//! {"method": "setTilt", "args": [10]}
//! ```
//!
//! Each call prints one JSON result line. Lines starting with `#` are skipped.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use kinect::{Arg, Driver, ScriptSession};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::CommandResult;

#[derive(Debug, Deserialize)]
struct ScriptCall {
    method: String,
    #[serde(default)]
    args: Vec<Value>,
}

/// Run a script file (or stdin) against the session at `index`
pub fn run(driver: &dyn Driver, index: usize, file: Option<&Path>) -> CommandResult {
    let reader: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let script = ScriptSession::open(driver, index)?;

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        println!("{}", execute(&script, line, number + 1));
    }
    Ok(())
}

/// Execute one line, returning its JSON result
fn execute(script: &ScriptSession, line: &str, number: usize) -> Value {
    let call: ScriptCall = match serde_json::from_str(line) {
        Ok(call) => call,
        Err(e) => {
            return json!({
                "line": number,
                "ok": false,
                "error": "ParseError",
                "message": e.to_string(),
            })
        }
    };

    debug!(line = number, method = %call.method, "Script call");
    let args: Vec<Arg> = call.args.into_iter().map(Arg::from).collect();
    match script.call(&call.method, &args) {
        Ok(result) => json!({
            "line": number,
            "method": call.method,
            "ok": true,
            "result": result,
        }),
        Err(e) => json!({
            "line": number,
            "method": call.method,
            "ok": false,
            "error": e.kind(),
            "message": e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinect::VirtualDriver;

    #[test]
    fn test_execute_lines() {
        let driver = VirtualDriver::default();
        let script = ScriptSession::open(&driver, 0).unwrap();

        let ok = execute(&script, r#"{"method": "setTilt", "args": [10]}"#, 1);
        assert_eq!(ok["ok"], json!(true));
        assert_eq!(ok["result"], json!(10.0));

        let bad = execute(&script, r#"{"method": "setTilt", "args": ["up"]}"#, 2);
        assert_eq!(bad["error"], json!("InvalidArgument"));

        let garbage = execute(&script, "setTilt(10)", 3);
        assert_eq!(garbage["error"], json!("ParseError"));

        execute(&script, r#"{"method": "close"}"#, 4);
        let closed = execute(&script, r#"{"method": "close"}"#, 5);
        assert_eq!(closed["error"], json!("InvalidState"));
    }
}
