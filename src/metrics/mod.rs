//! Metrics and observability for snowdrift.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - `server`: Prometheus recorder and the HTTP endpoint serving it

pub mod events;
pub mod server;

pub use server::init;

/// Emit an internal event.
///
/// Calls `InternalEvent::emit()` on the event, which records the
/// corresponding Prometheus metric.
///
/// ```ignore
/// use snowdrift::metrics::events::{DocumentsRead, RecordsWritten};
///
/// emit!(DocumentsRead { collection: "orders".into(), count: 5 });
/// emit!(RecordsWritten { count: 5 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
