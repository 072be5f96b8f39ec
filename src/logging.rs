use std::fmt;
use std::io::IsTerminal;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::types::LogFormat;

/// Session verdict carried by a log line, shown as a `[DENY]`/`[ALLOW]` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Deny,
    Allow,
}

impl Verdict {
    fn tag(self, ansi: bool) -> &'static str {
        match (self, ansi) {
            (Verdict::Deny, true) => "\x1b[31m[DENY]\x1b[0m ",
            (Verdict::Deny, false) => "[DENY] ",
            (Verdict::Allow, true) => "\x1b[34m[ALLOW]\x1b[0m ",
            (Verdict::Allow, false) => "[ALLOW] ",
        }
    }
}

const DENY_MARKERS: &[&str] = &[
    "rejected",
    "missing host",
    "timed out",
    "connect failed",
    "auth failed",
    "host key",
    "key not found",
    "key unreadable",
    "shell request failed",
    "session aborted",
];

const ALLOW_MARKERS: &[&str] = &[
    "ssh connection established",
    "shell opened",
    "session completed",
];

fn classify(message: &str) -> Option<Verdict> {
    let lower = message.to_lowercase();
    if DENY_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(Verdict::Deny)
    } else if ALLOW_MARKERS.iter().any(|m| lower.contains(m)) {
        Some(Verdict::Allow)
    } else {
        None
    }
}

/// ANSI color per structured field name.
const FIELD_COLORS: &[(&str, &str)] = &[
    ("user", "36"),
    ("host", "33"),
    ("peer", "35"),
    ("client_ip", "35"),
    ("session_id", "2"),
    ("bytes_up", "32"),
    ("bytes_down", "32"),
    ("duration_ms", "32"),
    ("error", "31"),
    ("reason", "31"),
];

fn field_color(name: &str) -> Option<&'static str> {
    FIELD_COLORS
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, color)| *color)
}

/// Color `name=` at the start of each whitespace-separated token.
fn colorize_fields(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 32);
    for (i, token) in line.split(' ').enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match token.split_once('=') {
            Some((name, value)) => match field_color(name) {
                Some(color) => {
                    out.push_str("\x1b[");
                    out.push_str(color);
                    out.push('m');
                    out.push_str(name);
                    out.push_str("=\x1b[0m");
                    out.push_str(value);
                }
                None => out.push_str(token),
            },
            None => out.push_str(token),
        }
    }
    out
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// Pretty formatter for relay sessions: tags denied and allowed session
/// events and, on a terminal, colors well-known fields.
pub struct SessionFormatter<E> {
    inner: E,
    ansi: bool,
}

impl<E> SessionFormatter<E> {
    pub fn new(inner: E, ansi: bool) -> Self {
        Self { inner, ansi }
    }
}

impl<S, N, E> FormatEvent<S, N> for SessionFormatter<E>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    E: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if let Some(verdict) = classify(&visitor.message) {
            writer.write_str(verdict.tag(self.ansi))?;
        }

        if !self.ansi {
            return self.inner.format_event(ctx, writer, event);
        }
        let mut buf = String::new();
        self.inner.format_event(ctx, Writer::new(&mut buf), event)?;
        writer.write_str(&colorize_fields(&buf))
    }
}

/// Install the global subscriber. `level` is an `EnvFilter` directive;
/// an invalid one falls back to `info`.
pub fn setup_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => {
            let ansi = std::io::stdout().is_terminal();
            builder
                .with_ansi(ansi)
                .event_format(SessionFormatter::new(
                    tracing_subscriber::fmt::format::Format::default().with_ansi(ansi),
                    ansi,
                ))
                .init()
        }
    }
}
