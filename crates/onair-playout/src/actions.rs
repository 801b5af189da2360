//! Operator actions as seen by a client.
//!
//! Each action wraps the matching [`PlayoutService`] call and folds the
//! outcome into a [`ClientResponse`]: a success with the result, or an
//! error carrying the numeric code of the failure.

use std::sync::Arc;

use onair_core::{AdLibPieceId, ClientResponse, PartId, PieceId, Rundown, RundownId};

use crate::service::PlayoutService;

/// Client entry point over a shared [`PlayoutService`].
#[derive(Clone)]
pub struct UserActions {
    service: Arc<PlayoutService>,
}

impl UserActions {
    pub fn new(service: Arc<PlayoutService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<PlayoutService> {
        &self.service
    }

    pub fn activate(&self, rundown_id: &RundownId, rehearsal: bool) -> ClientResponse<Rundown> {
        self.service.activate(rundown_id, rehearsal).into()
    }

    pub fn deactivate(&self, rundown_id: &RundownId) -> ClientResponse<Rundown> {
        self.service.deactivate(rundown_id).into()
    }

    pub fn reset(&self, rundown_id: &RundownId) -> ClientResponse<Rundown> {
        self.service.reset_rundown(rundown_id).into()
    }

    pub fn take(&self, rundown_id: &RundownId) -> ClientResponse<Rundown> {
        self.service.take(rundown_id).into()
    }

    pub fn activate_hold(&self, rundown_id: &RundownId) -> ClientResponse<Rundown> {
        self.service.activate_hold(rundown_id).into()
    }

    pub fn set_next(&self, rundown_id: &RundownId, part_id: Option<&PartId>) -> ClientResponse<Rundown> {
        self.service.set_next(rundown_id, part_id, true).into()
    }

    pub fn move_next(
        &self,
        rundown_id: &RundownId,
        part_delta: i32,
        segment_delta: i32,
    ) -> ClientResponse<Option<PartId>> {
        self.service.move_next(rundown_id, part_delta, segment_delta).into()
    }

    pub fn start_adlib(&self, rundown_id: &RundownId, adlib_id: &AdLibPieceId) -> ClientResponse<PieceId> {
        self.service.start_adlib(rundown_id, adlib_id).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::harness;

    #[test]
    fn failures_carry_error_codes() {
        let h = harness(2);
        let actions = UserActions::new(h.service.clone());
        let ro = RundownId::from("ro1");

        let resp = actions.take(&ro);
        assert!(!resp.is_success());
        assert_eq!(resp.error_code(), Some(onair_core::Error::InvalidState(String::new()).code()));

        assert!(actions.activate(&ro, false).is_success());
        let resp = actions.take(&ro);
        assert_eq!(
            resp.into_result().and_then(|r| r.current_part_id),
            Some(PartId::from("p1"))
        );

        let resp = actions.take(&ro);
        assert_eq!(resp.error_code(), Some(onair_core::Error::TooSoon(String::new()).code()));
    }

    #[test]
    fn move_next_with_zero_delta_is_a_validation_error() {
        let h = harness(2);
        let actions = UserActions::new(h.service.clone());
        let resp = actions.move_next(&RundownId::from("ro1"), 0, 0);
        assert_eq!(resp.error_code(), Some(onair_core::Error::Validation(String::new()).code()));
    }
}
