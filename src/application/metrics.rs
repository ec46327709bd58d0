//! Call metrics
//!
//! Recording is a no-op until a recorder is installed (see `interface::api::init_metrics`).

use crate::domain::call::SignalKind;
use crate::domain::history::CallStatus;
use metrics::{counter, describe_counter};

/// Register metric descriptions with the installed recorder
pub fn describe() {
    describe_counter!(
        "pitchlink_calls_started_total",
        "Total number of call sessions started"
    );
    describe_counter!(
        "pitchlink_calls_finalized_total",
        "Total number of call sessions finalized, by status"
    );
    describe_counter!(
        "pitchlink_signals_published_total",
        "Total number of signaling messages published, by type"
    );
    describe_counter!(
        "pitchlink_signals_ignored_total",
        "Total number of relayed messages not addressed to the local participant"
    );
}

pub fn record_call_started() {
    counter!("pitchlink_calls_started_total").increment(1);
}

pub fn record_call_finalized(status: CallStatus) {
    counter!("pitchlink_calls_finalized_total", "status" => status.as_str()).increment(1);
}

pub fn record_signal_published(kind: SignalKind) {
    counter!("pitchlink_signals_published_total", "type" => kind.as_str()).increment(1);
}

pub fn record_signal_ignored() {
    counter!("pitchlink_signals_ignored_total").increment(1);
}
