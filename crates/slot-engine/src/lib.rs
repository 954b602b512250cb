//! # slot-engine
//!
//! Deterministic meeting availability for group booking.
//!
//! Given a set of participants and a date range, the engine computes the
//! windows where everyone is free, slices them into clock-aligned candidate
//! slots with stable identities, gates interactive calendar selection, and
//! drives a booking wizard that re-validates the chosen slot before
//! committing it.
//!
//! ## Modules
//!
//! - [`interval`]: Half-open interval algebra (merge, subtract, intersect)
//! - [`availability`]: Per-participant busy data → common free windows (fails closed)
//! - [`slots`]: Free windows → candidate slots with content-addressed ids
//! - [`guard`]: Allow/deny zone policy for calendar drags and cell styles
//! - [`calendar`]: The calendar widget contract and day-grid helpers
//! - [`wizard`]: Booking state machine with freshness re-validation
//! - [`model`]: Participants, appointments, and their hydration
//! - [`ports`]: Async traits for the external collaborators, plus in-memory fakes
//! - [`wire`]: Request/response DTOs of the remote services
//! - [`config`]: Engine configuration and validated slot policy
//! - [`error`]: Error types

pub mod availability;
pub mod calendar;
pub mod config;
pub mod error;
pub mod guard;
pub mod interval;
pub mod model;
pub mod ports;
pub mod slots;
pub mod wire;
pub mod wizard;

pub use availability::{resolve_from_lookups, AvailabilityResolver, SearchCriteria};
pub use calendar::{CalendarAction, CalendarEvent, CalendarView, EventVariant, InteractionMode};
pub use config::{EngineConfig, SlotPolicy};
pub use error::{EngineError, ServiceError};
pub use guard::{CellState, RangeDecision, SelectionGuard};
pub use interval::{contains, intersect_all, merge_union, overlaps, subtract, Interval};
pub use model::{Appointment, AppointmentId, BusyInterval, FreeWindow, Participant, ParticipantId};
pub use ports::{AppointmentStore, AvailabilitySearch, BusyIntervalSource};
pub use slots::{discretize, discretize_with_policy, Slot, SlotId, SlotState};
pub use wizard::{BookingWizard, Settlement, Step, WizardError};
