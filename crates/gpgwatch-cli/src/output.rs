use gpgwatch_core::ports::{INotifier, Notice, NoticeLevel};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {
        // Human formatter doesn't print JSON
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

/// Prints pipeline notices to the terminal
///
/// Failures and warnings go to stderr. In JSON mode each notice is one
/// compact object per line.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleNotifier {
    format: OutputFormat,
}

impl ConsoleNotifier {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl INotifier for ConsoleNotifier {
    fn notify(&self, notice: &Notice) {
        let line = render_notice(notice, self.format);
        match notice.level {
            NoticeLevel::Failure | NoticeLevel::Warning => eprintln!("{line}"),
            NoticeLevel::Info | NoticeLevel::Success => println!("{line}"),
        }
    }
}

fn render_notice(notice: &Notice, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string(notice).unwrap_or_default(),
        OutputFormat::Human => {
            let marker = match notice.level {
                NoticeLevel::Success => "\u{2713}",
                NoticeLevel::Failure => "\u{2717}",
                NoticeLevel::Warning => "\u{26a0}",
                NoticeLevel::Info => " ",
            };
            // continuation lines line up under the message
            notice
                .message
                .lines()
                .enumerate()
                .map(|(i, line)| {
                    if i == 0 {
                        format!("{marker} {line}")
                    } else {
                        format!("  {line}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}
