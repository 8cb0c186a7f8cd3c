pub mod activity_event;
pub mod alert;

pub use activity_event::{
    redact_metadata, ActivityEvent, EventCategory, EventSeverity, EventStatus, NewActivityEvent,
};
pub use alert::SecurityAlert;
