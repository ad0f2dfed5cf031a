//! JSON log lines in the shape Cloud Logging parses from stdout.
//!
//! Each event becomes one object with `severity`, `message` and `time` at the
//! top level, followed by the event's own fields.  The enclosing spans are
//! listed under `spans`, innermost last, with their recorded fields.

use std::fmt;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

/// Event formatter emitting Cloud Logging structured entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudLogFormat;

impl<S, N> FormatEvent<S, N> for CloudLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();

        let mut fields = JsonFields::default();
        event.record(&mut fields);
        let message = fields.0.remove("message").unwrap_or_else(|| Value::from(""));

        let mut entry = Map::new();
        entry.insert("severity".into(), Value::from(severity(meta.level())));
        entry.insert("message".into(), message);
        entry.insert("time".into(), Value::from(chrono::Utc::now().to_rfc3339()));
        entry.insert("target".into(), Value::from(meta.target()));

        if let Some(scope) = ctx.event_scope() {
            let spans: Vec<Value> = scope
                .from_root()
                .map(|span| {
                    let mut obj = Map::new();
                    obj.insert("name".into(), Value::from(span.name()));
                    let ext = span.extensions();
                    if let Some(recorded) = ext.get::<FormattedFields<N>>() {
                        if !recorded.fields.is_empty() {
                            obj.insert("fields".into(), Value::from(recorded.fields.as_str()));
                        }
                    }
                    Value::Object(obj)
                })
                .collect();
            if !spans.is_empty() {
                entry.insert("spans".into(), Value::Array(spans));
            }
        }

        for (key, value) in fields.0 {
            entry.entry(key).or_insert(value);
        }

        writeln!(writer, "{}", Value::Object(entry))
    }
}

/// Cloud Logging `LogSeverity` names.
fn severity(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG | Level::TRACE => "DEBUG",
    }
}

#[derive(Default)]
struct JsonFields(Map<String, Value>);

impl Visit for JsonFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().into(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().into(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().into(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().into(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().into(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().into(), Value::from(format!("{value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<Value> {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .event_format(CloudLogFormat)
                .with_writer(move || writer.clone()),
        );
        tracing::subscriber::with_default(subscriber, f);

        let bytes = out.0.lock().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn entries_use_cloud_logging_keys() {
        let lines = capture(|| {
            tracing::warn!(error = "quota", attempt = 2u64, "backend call failed");
        });

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["severity"], "WARNING");
        assert_eq!(line["message"], "backend call failed");
        assert_eq!(line["error"], "quota");
        assert_eq!(line["attempt"], 2);
        assert!(line.get("level").is_none());
        assert!(line["time"].as_str().is_some());
    }

    #[test]
    fn span_fields_are_attached() {
        let lines = capture(|| {
            let span = tracing::info_span!("turn", session_id = "abc");
            let _enter = span.enter();
            tracing::error!("turn failed");
        });

        let line = &lines[0];
        assert_eq!(line["severity"], "ERROR");
        assert_eq!(line["spans"][0]["name"], "turn");
        assert!(line["spans"][0]["fields"]
            .as_str()
            .unwrap()
            .contains("session_id"));
    }
}
