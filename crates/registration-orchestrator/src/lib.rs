//! Attendee registration.
//!
//! [`RegistrationOrchestrator::register`] validates input, resolves the event
//! by slug, stores the attendee and then runs the best-effort integration
//! steps. A stored attendee is a successful registration no matter what the
//! providers do afterwards.
//!
//! ```ignore
//! let orchestrator = RegistrationOrchestrator::new(db, gateways, ledger);
//! let report = orchestrator.register("hardtech-summit", &input).await?;
//! println!("{}", report.attendee_id);
//! ```

mod error;
mod orchestrator;
mod pipeline;
mod segment;
mod validation;

pub use error::{RegistrationError, RegistrationResult};
pub use orchestrator::{lifecycle_properties, RegistrationOrchestrator};
pub use pipeline::{RegistrationReport, Step, StepOutcome};
pub use segment::{derive_segment, DEFAULT_SEGMENT};
pub use validation::{validate, FieldError, RegistrationInput, ValidRegistration};
