//! Outcome records for the best-effort steps after the attendee is stored.

use provider_gateways::PersonalizationSource;

/// Best-effort steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Personalize,
    ContactSync,
    LifecycleEvent,
    ConfirmationEmail,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personalize => "personalize",
            Self::ContactSync => "contact_sync",
            Self::LifecycleEvent => "lifecycle_event",
            Self::ConfirmationEmail => "confirmation_email",
        }
    }
}

/// What one step did. None of these fail the registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The call succeeded and its effect is on the attendee record.
    Succeeded,
    /// Defaults were substituted for the missing result.
    Degraded { error: String },
    /// The call failed and a retry ledger entry now holds it.
    Deferred { entry_id: String, error: String },
    /// The call failed with nothing recorded for later.
    Failed { error: String },
    /// Nothing to do.
    Skipped { reason: String },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Ledger entry recorded for this step, if any.
    pub fn ledger_entry(&self) -> Option<&str> {
        match self {
            Self::Deferred { entry_id, .. } => Some(entry_id),
            _ => None,
        }
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct RegistrationReport {
    pub attendee_id: String,
    pub segment: String,
    pub personalization: PersonalizationSource,
    pub steps: Vec<(Step, StepOutcome)>,
}

impl RegistrationReport {
    pub(crate) fn new(attendee_id: String, segment: String) -> Self {
        Self {
            attendee_id,
            segment,
            personalization: PersonalizationSource::Fallback,
            steps: Vec::with_capacity(4),
        }
    }

    pub(crate) fn record(&mut self, step: Step, outcome: StepOutcome) {
        self.steps.push((step, outcome));
    }

    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    /// Ledger entries written during this registration.
    pub fn deferred(&self) -> Vec<&str> {
        self.steps.iter().filter_map(|(_, o)| o.ledger_entry()).collect()
    }

    /// True when every step succeeded or was skipped.
    pub fn all_succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, o)| matches!(o, StepOutcome::Succeeded | StepOutcome::Skipped { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lookup_and_deferred() {
        let mut report = RegistrationReport::new("a-1".into(), "demo".into());
        report.record(Step::Personalize, StepOutcome::Succeeded);
        report.record(
            Step::ContactSync,
            StepOutcome::Deferred {
                entry_id: "l-1".into(),
                error: "503".into(),
            },
        );
        report.record(
            Step::ConfirmationEmail,
            StepOutcome::Skipped {
                reason: "not configured".into(),
            },
        );

        assert!(report.outcome(Step::Personalize).unwrap().is_success());
        assert!(report.outcome(Step::LifecycleEvent).is_none());
        assert_eq!(report.deferred(), vec!["l-1"]);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn skipped_steps_count_as_synced() {
        let mut report = RegistrationReport::new("a-1".into(), "general".into());
        report.record(Step::ContactSync, StepOutcome::Succeeded);
        report.record(
            Step::ConfirmationEmail,
            StepOutcome::Skipped {
                reason: "not configured".into(),
            },
        );
        assert!(report.all_succeeded());
        assert_eq!(Step::LifecycleEvent.as_str(), "lifecycle_event");
    }
}
