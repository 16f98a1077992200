use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

pub struct CliLogger {
    json: bool,
    no_color: bool,
}

impl CliLogger {
    pub fn new(json: bool, no_color: bool) -> Self {
        Self { json, no_color }
    }

    /// Command output: one compact JSON line, or a titled indented tree.
    pub fn print_serialized<T: Serialize>(&self, command: &str, value: &T) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(value)?);
            return Ok(());
        }

        let rendered = render_value(&serde_json::to_value(value)?, 2);
        println!(
            "{} {}\n{rendered}",
            self.style("tracegrid", "36;1"),
            self.style(command, "37;1")
        );
        Ok(())
    }

    pub fn print_error(&self, code: &str, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "error",
                "code": code,
                "message": msg,
            });
            println!("{out}");
            return;
        }
        eprintln!(
            "{} {} {msg}",
            self.style("error", "31;1"),
            self.style(&format!("[{code}]"), "90")
        );
    }

    pub fn print_warning(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "status": "warning",
                "code": "warning",
                "message": msg,
            });
            eprintln!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("warn", "33;1"));
    }

    fn style(&self, text: &str, ansi: &str) -> String {
        if self.no_color {
            return text.to_string();
        }
        format!("\x1b[{ansi}m{text}\x1b[0m")
    }
}

fn render_value(value: &Value, indent: usize) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Number(v) => v.to_string(),
        Value::String(v) => v.clone(),
        Value::Array(items) => render_array(items, indent),
        Value::Object(map) => render_object(map, indent),
    }
}

/// Arrays of scalars (points, axis ranges) stay on one line.
fn render_array(items: &[Value], indent: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    let pad = " ".repeat(indent);
    if items
        .iter()
        .all(|v| !matches!(v, Value::Object(_) | Value::Array(_)))
    {
        let inline: Vec<String> = items.iter().map(|v| render_value(v, 0)).collect();
        return format!("{pad}[{}]", inline.join(", "));
    }

    let mut out = String::new();
    for item in items {
        match item {
            Value::Object(_) => {
                out.push_str(&format!("{pad}-\n{}\n", render_value(item, indent + 2)));
            }
            Value::Array(inner) if is_scalar_array(inner) => {
                out.push_str(&format!("{pad}- {}\n", render_value(item, 0)));
            }
            Value::Array(_) => {
                out.push_str(&format!("{pad}-\n{}\n", render_value(item, indent + 2)));
            }
            _ => out.push_str(&format!("{pad}- {}\n", render_value(item, indent + 2))),
        }
    }
    out.trim_end().to_string()
}

fn render_object(map: &serde_json::Map<String, Value>, indent: usize) -> String {
    if map.is_empty() {
        return "{}".to_string();
    }

    let pad = " ".repeat(indent);
    let mut out = String::new();
    for (key, value) in map {
        match value {
            Value::Array(items) if is_scalar_array(items) => {
                out.push_str(&format!("{pad}{key}: {}\n", render_value(value, 0)));
            }
            Value::Object(_) | Value::Array(_) => {
                out.push_str(&format!(
                    "{pad}{key}:\n{}\n",
                    render_value(value, indent + 2)
                ));
            }
            _ => out.push_str(&format!(
                "{pad}{key}: {}\n",
                render_value(value, indent + 2)
            )),
        }
    }
    out.trim_end().to_string()
}

fn is_scalar_array(items: &[Value]) -> bool {
    !items.is_empty()
        && items
            .iter()
            .all(|v| !matches!(v, Value::Object(_) | Value::Array(_)))
}
