use rust_decimal::Decimal;

use crate::events::{LoanEvent, LoanTransition};

/// Receives every transition a ledger commits
///
/// Observers run after the ledger lock has been released, in registration order.
pub trait LoanObserver: Send + Sync {
    /// Called once per committed transition
    fn on_transition(&self, transition: &LoanTransition);
}

/// Emits a structured log event for every transition
#[derive(Debug)]
pub struct TransitionLogger;

impl LoanObserver for TransitionLogger {
    fn on_transition(&self, transition: &LoanTransition) {
        let LoanTransition {
            sequence,
            library_id,
            catalog_id,
            event,
            available_after,
        } = transition;
        match event {
            LoanEvent::Registered { copies, total } => tracing::info!(
                sequence,
                library = %library_id,
                catalog_id = %catalog_id,
                copies,
                total,
                available = available_after,
                "copies registered"
            ),
            LoanEvent::Borrowed { member_id, loan_id, on, due } => tracing::info!(
                sequence,
                library = %library_id,
                catalog_id = %catalog_id,
                member = %member_id,
                loan = %loan_id,
                borrowed_on = %on,
                due = %due,
                available = available_after,
                "copy borrowed"
            ),
            LoanEvent::Returned { member_id, loan_id, on, fine } => tracing::info!(
                sequence,
                library = %library_id,
                catalog_id = %catalog_id,
                member = %member_id,
                loan = %loan_id,
                returned_on = %on,
                fine = %fine,
                available = available_after,
                "copy returned"
            ),
        }
    }
}

/// Warns when a copy comes back late enough to be fined
#[derive(Debug)]
pub struct OverdueNotifier;

impl LoanObserver for OverdueNotifier {
    fn on_transition(&self, transition: &LoanTransition) {
        if let LoanEvent::Returned { member_id, loan_id, fine, .. } = &transition.event {
            if *fine > Decimal::ZERO {
                tracing::warn!(
                    library = %transition.library_id,
                    catalog_id = %transition.catalog_id,
                    member = %member_id,
                    loan = %loan_id,
                    fine = %fine,
                    "overdue return fined"
                );
            }
        }
    }
}
