use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("streamchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter =
    Counter::new("streamchat.client.request_errors");
pub(crate) static CLIENT_HEADERS_LATENCY: Moments =
    Moments::new("streamchat.client.headers_latency_seconds");

pub(crate) static STREAMS_STARTED: Counter = Counter::new("streamchat.stream.started");
pub(crate) static STREAM_CHUNKS: Counter = Counter::new("streamchat.stream.chunks");
pub(crate) static STREAM_BYTES: Counter = Counter::new("streamchat.stream.bytes");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("streamchat.stream.errors");
pub(crate) static STREAM_CANCELLATIONS: Counter = Counter::new("streamchat.stream.cancellations");
pub(crate) static STREAM_TTFB: Moments = Moments::new("streamchat.stream.ttfb_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("streamchat.stream.duration_seconds");

pub(crate) static SESSION_SUBMITS: Counter = Counter::new("streamchat.session.submits");
pub(crate) static SESSION_STALE_EVENTS: Counter =
    Counter::new("streamchat.session.stale_events");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_HEADERS_LATENCY);

    collector.register_counter(&STREAMS_STARTED);
    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_CANCELLATIONS);
    collector.register_moments(&STREAM_TTFB);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&SESSION_SUBMITS);
    collector.register_counter(&SESSION_STALE_EVENTS);
}
