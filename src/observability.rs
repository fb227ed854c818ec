use biometrics::{Collector, Counter, Moments};

pub(crate) static TRANSPORT_REQUESTS: Counter = Counter::new("banter.transport.requests");
pub(crate) static TRANSPORT_REQUEST_ERRORS: Counter =
    Counter::new("banter.transport.request_errors");
pub(crate) static TRANSPORT_TTFB: Moments = Moments::new("banter.transport.ttfb_seconds");

pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("banter.stream.fragments");
pub(crate) static STREAM_BYTES: Counter = Counter::new("banter.stream.bytes");
pub(crate) static STREAM_PARSE_ERRORS: Counter = Counter::new("banter.stream.parse_errors");

pub(crate) static SESSION_TURNS: Counter = Counter::new("banter.session.turns");
pub(crate) static SESSION_TURN_FAILURES: Counter = Counter::new("banter.session.turn_failures");
pub(crate) static SESSION_CANCELLATIONS: Counter = Counter::new("banter.session.cancellations");
pub(crate) static SESSION_TIMEOUTS: Counter = Counter::new("banter.session.timeouts");
pub(crate) static SESSION_TURN_DURATION: Moments =
    Moments::new("banter.session.turn_duration_seconds");

pub(crate) static STORE_WRITES: Counter = Counter::new("banter.store.writes");
pub(crate) static STORE_ERRORS: Counter = Counter::new("banter.store.errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&TRANSPORT_REQUESTS);
    collector.register_counter(&TRANSPORT_REQUEST_ERRORS);
    collector.register_moments(&TRANSPORT_TTFB);

    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_PARSE_ERRORS);

    collector.register_counter(&SESSION_TURNS);
    collector.register_counter(&SESSION_TURN_FAILURES);
    collector.register_counter(&SESSION_CANCELLATIONS);
    collector.register_counter(&SESSION_TIMEOUTS);
    collector.register_moments(&SESSION_TURN_DURATION);

    collector.register_counter(&STORE_WRITES);
    collector.register_counter(&STORE_ERRORS);
}
