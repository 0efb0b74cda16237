//! file: core/src/vm/host.rs
//! description: builtin functions available to programs run on the VM.

use crate::vm::value::{Builtin, Value, parse_number};

pub(crate) fn run_builtin(builtin: Builtin, args: &[Value], output: &mut String) -> Result<Vec<Value>, String> {
    match builtin {
        Builtin::Print => {
            let line = args
                .iter()
                .map(|v| String::from_utf8_lossy(&v.to_display_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join("\t");
            output.push_str(&line);
            output.push('\n');
            Ok(Vec::new())
        }
        Builtin::ToString => match args.first() {
            Some(v) => Ok(vec![Value::Str(v.to_display_bytes())]),
            None => Err("bad argument #1 to 'tostring' (value expected)".to_string()),
        },
        Builtin::Type => match args.first() {
            Some(v) => Ok(vec![Value::from(v.type_name())]),
            None => Err("bad argument #1 to 'type' (value expected)".to_string()),
        },
        Builtin::ToNumber => match args.first() {
            Some(v @ (Value::Integer(_) | Value::Float(_))) => Ok(vec![v.clone()]),
            Some(Value::Str(s)) => Ok(vec![parse_number(&String::from_utf8_lossy(s)).unwrap_or(Value::Nil)]),
            Some(_) => Ok(vec![Value::Nil]),
            None => Err("bad argument #1 to 'tonumber' (value expected)".to_string()),
        },
    }
}
