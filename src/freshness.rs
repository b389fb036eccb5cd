use chrono::NaiveDate;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewParams {
    pub date: NaiveDate,
    pub districts: Vec<String>,
}

/// Tag carried by an in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub params: ViewParams,
}

/// Tracks what a view currently shows and which request it is waiting on.
///
/// A response is rendered only if it was issued for the parameters the view
/// still has and is newer than whatever was rendered last.
#[derive(Debug, Default)]
pub struct ViewState {
    generation: u64,
    params: Option<ViewParams>,
    shown: u64,
    pending: Option<u64>,
}

impl ViewState {
    pub fn issue(&mut self, params: ViewParams) -> Ticket {
        self.generation += 1;
        self.params = Some(params.clone());
        self.pending = Some(self.generation);
        Ticket {
            generation: self.generation,
            params,
        }
    }

    pub fn current(&self) -> Option<&ViewParams> {
        self.params.as_ref()
    }

    /// False while a request for these same parameters is still out.
    pub fn needs_fetch(&self, params: &ViewParams) -> bool {
        self.pending.is_none() || self.params.as_ref() != Some(params)
    }

    pub fn accept(&mut self, ticket: &Ticket) -> bool {
        if self.pending == Some(ticket.generation) {
            self.pending = None;
        }

        let fresh =
            self.params.as_ref() == Some(&ticket.params) && ticket.generation > self.shown;
        if fresh {
            self.shown = ticket.generation;
        } else {
            debug!(
                stale = ticket.generation,
                shown = self.shown,
                date = %ticket.params.date,
                "discarding superseded response"
            );
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(day: u32) -> ViewParams {
        ViewParams {
            date: NaiveDate::from_ymd_opt(2025, 8, day).unwrap(),
            districts: Vec::new(),
        }
    }

    #[test]
    fn latest_ticket_is_accepted() {
        let mut view = ViewState::default();
        let ticket = view.issue(params(15));
        assert!(view.accept(&ticket));
        assert_eq!(view.current(), Some(&params(15)));
    }

    #[test]
    fn late_response_for_old_date_is_rejected() {
        let mut view = ViewState::default();
        let old = view.issue(params(15));
        let new = view.issue(params(16));

        assert!(!view.accept(&old));
        assert!(view.accept(&new));
    }

    #[test]
    fn older_response_for_same_params_is_still_rendered() {
        let mut view = ViewState::default();
        let first = view.issue(params(15));
        let second = view.issue(params(15));

        assert!(view.accept(&first));
        assert!(view.accept(&second));
    }

    #[test]
    fn response_older_than_the_one_shown_is_dropped() {
        let mut view = ViewState::default();
        let first = view.issue(params(15));
        let second = view.issue(params(15));

        assert!(view.accept(&second));
        assert!(!view.accept(&first));
    }

    #[test]
    fn pending_request_suppresses_duplicate_fetches() {
        let mut view = ViewState::default();
        assert!(view.needs_fetch(&params(15)));

        let ticket = view.issue(params(15));
        assert!(!view.needs_fetch(&params(15)));
        assert!(view.needs_fetch(&params(16)));

        view.accept(&ticket);
        assert!(view.needs_fetch(&params(15)));
    }

    #[test]
    fn rejected_response_still_clears_pending() {
        let mut view = ViewState::default();
        let old = view.issue(params(15));
        let new = view.issue(params(16));

        assert!(!view.accept(&old));
        assert!(!view.needs_fetch(&params(16)));
        assert!(view.accept(&new));
        assert!(view.needs_fetch(&params(16)));
    }
}
