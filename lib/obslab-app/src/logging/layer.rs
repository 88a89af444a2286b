use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use tracing::{
    field,
    span::{Attributes, Id, Record},
    Event, Subscriber,
};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, Layer as FmtLayer, MakeWriter},
    layer::{self, Context},
    registry::LookupSpan,
    Layer,
};

const TRACE_ID_FIELD: &str = "trace_id";

pub fn build_formatting_layer<S, W>(json: bool, service: String, writer: W) -> Box<dyn layer::Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    if json {
        FmtLayer::new()
            .event_format(JsonLineFormatter::new(service))
            .with_writer(writer)
            .boxed()
    } else {
        FmtLayer::new()
            .event_format(ConsoleFormatter::new(&service))
            .with_writer(writer)
            .boxed()
    }
}

/// Trace identifier attached to a span.
#[derive(Clone)]
struct TraceId(String);

/// Captures a `trace_id` field declared on a span so that events emitted inside it can carry the identifier.
pub struct TraceIdLayer;

impl TraceIdLayer {
    fn store<S>(&self, id: &Id, trace_id: Option<String>, ctx: &Context<'_, S>)
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        if let (Some(trace_id), Some(span)) = (trace_id, ctx.span(id)) {
            span.extensions_mut().replace(TraceId(trace_id));
        }
    }
}

impl<S> Layer<S> for TraceIdLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = TraceIdVisitor::default();
        attrs.record(&mut visitor);
        self.store(id, visitor.0, &ctx);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = TraceIdVisitor::default();
        values.record(&mut visitor);
        self.store(id, visitor.0, &ctx);
    }
}

#[derive(Default)]
struct TraceIdVisitor(Option<String>);

impl field::Visit for TraceIdVisitor {
    fn record_str(&mut self, field: &field::Field, value: &str) {
        if field.name() == TRACE_ID_FIELD {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        if field.name() == TRACE_ID_FIELD {
            self.0 = Some(format!("{:?}", value));
        }
    }
}

/// Finds the trace identifier of the innermost span, in the event's scope, that has one.
fn scoped_trace_id<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    ctx.event_scope()?
        .find_map(|span| span.extensions().get::<TraceId>().map(|trace_id| trace_id.0.clone()))
}

/// Collects event fields as JSON values, holding the message aside.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Vec<(String, Value)>,
}

impl FieldCollector {
    fn push(&mut self, field: &field::Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl field::Visit for FieldCollector {
    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        self.push(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &field::Field, value: &str) {
        self.push(field, Value::String(value.to_string()));
    }

    fn record_f64(&mut self, field: &field::Field, value: f64) {
        let value = Number::from_f64(value).map_or_else(|| Value::String(value.to_string()), Value::Number);
        self.push(field, value);
    }

    fn record_i64(&mut self, field: &field::Field, value: i64) {
        self.push(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &field::Field, value: u64) {
        self.push(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &field::Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_error(&mut self, field: &field::Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, Value::String(value.to_string()));
    }
}

/// Writes each event as a single-line JSON object.
///
/// Every line carries `timestamp`, `level`, `service` and `message`, followed by the event's own fields flattened into
/// the top level. When the event happens inside a span carrying a trace identifier, it is included as `trace_id`.
struct JsonLineFormatter {
    service: String,
}

impl JsonLineFormatter {
    fn new(service: String) -> Self {
        Self { service }
    }
}

impl<S, N> FormatEvent<S, N> for JsonLineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let mut record = Map::new();
        record.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        record.insert(
            "level".to_string(),
            Value::String(event.metadata().level().to_string().to_lowercase()),
        );
        record.insert("service".to_string(), Value::String(self.service.clone()));
        record.insert(
            "message".to_string(),
            Value::String(collector.message.unwrap_or_default()),
        );

        // Event fields never clobber the fixed keys.
        for (name, value) in collector.fields {
            record.entry(name).or_insert(value);
        }

        if let Some(trace_id) = scoped_trace_id(ctx) {
            record
                .entry(TRACE_ID_FIELD.to_string())
                .or_insert(Value::String(trace_id));
        }

        let line = serde_json::to_string(&record).map_err(|_| fmt::Error)?;
        writeln!(writer, "{}", line)
    }
}

/// Writes each event as a human-readable, pipe-separated line.
///
/// Structured fields are written as `key:value` pairs separated by commas, ahead of the message:
///
/// ```text
/// 2024-12-31 23:59:59 UTC | APP2 | INFO | endpoint:"/api/data",status_code:200 | Request completed
/// ```
struct ConsoleFormatter {
    service: String,
}

impl ConsoleFormatter {
    fn new(service: &str) -> Self {
        // "app2-traffic-generator" becomes "APP2TRAFFICGENERATOR".
        let service = service.to_uppercase().replace(['-', ' '], "");
        Self { service }
    }
}

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        write!(
            writer,
            "{} | {} | {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            self.service,
            event.metadata().level()
        )?;

        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        if let Some(trace_id) = scoped_trace_id(ctx) {
            if !collector.fields.iter().any(|(name, _)| name == TRACE_ID_FIELD) {
                collector.fields.push((TRACE_ID_FIELD.to_string(), Value::String(trace_id)));
            }
        }

        for (i, (name, value)) in collector.fields.iter().enumerate() {
            let prefix = if i == 0 { " | " } else { "," };
            write!(writer, "{}{}:{}", prefix, name, value)?;
        }

        if let Some(message) = collector.message.filter(|message| !message.is_empty()) {
            write!(writer, " | {}", message)?;
        }

        writeln!(writer)
    }
}
