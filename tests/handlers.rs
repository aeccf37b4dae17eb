mod common;

use chainsim::core::{StateId, Time};
use chainsim::error::{Error, Result};
use chainsim::event_handler::{
    EventHandler, FinalTimeEndOfRunEventHandler,
    SingleIndependentActivePeriodicDirectionEndOfChainEventHandler,
};
use chainsim::setting::Setting;
use common::{moving_point, resting_point};
use std::sync::Arc;

#[test]
fn end_of_run_rejects_negative_time() -> Result<()> {
    let setting = Arc::new(Setting::hypercubic(3, 1.0, 1.0, 1, 1, 1)?);
    let err = FinalTimeEndOfRunEventHandler::new(setting, -1.0).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    Ok(())
}

#[test]
fn end_of_run_time_ignores_active_state() -> Result<()> {
    let setting = Arc::new(Setting::hypercubic(3, 1.0, 1.0, 1, 1, 1)?);
    let mut handler = FinalTimeEndOfRunEventHandler::new(setting, 1.0)?;
    for velocity in [vec![1.0, 0.0, 0.0], vec![0.0, 0.0, -7.5]] {
        let active = vec![moving_point(0, vec![0.1, 0.2, 0.3], velocity, 0.4)?];
        let (time, ()) = handler.send_event_time(&active)?;
        assert_eq!(time, Time::from_float(1.0));
        let out = handler.send_out_state(active, ())?;
        assert_eq!(out[0].root().unit.time_stamp(), Some(time));
    }
    Ok(())
}

/// The outgoing unit stops, the nominated unit starts in the next cyclic direction at the
/// candidate time.
#[test]
fn end_of_chain_cycles_direction() -> Result<()> {
    let setting = Arc::new(Setting::hypercubic(3, 1.0, 1.0, 8, 1, 1)?);
    let mut handler =
        SingleIndependentActivePeriodicDirectionEndOfChainEventHandler::new(setting, 0.5, Some(8))?;
    assert_eq!(handler.number_send_event_time_arguments(), 1);
    assert_eq!(handler.number_send_out_state_arguments(), 2);

    let mut active_id = 0;
    let mut time = 0.0;
    let mut velocity = vec![0.8, 0.0, 0.0];
    for round in 1..=6 {
        let active = vec![moving_point(active_id, vec![0.5, 0.5, 0.5], velocity.clone(), time)?];
        let (candidate, nominated) = handler.send_event_time(&active)?;
        assert!((candidate.to_f64() - 0.5 * round as f64).abs() < 1e-12);
        let new_id = nominated.root().unwrap_or_default();

        let confirmed = if new_id == active_id {
            active[0].clone()
        } else {
            resting_point(new_id, vec![0.2, 0.2, 0.2])?
        };
        let out = handler.send_out_state(active, confirmed)?;
        let incoming = out
            .iter()
            .find(|b| b.root_identifier() == &StateId::root_id(new_id))
            .map(|b| &b.root().unit);
        let incoming = incoming.ok_or_else(|| Error::Contract("incoming branch missing".into()))?;
        let expected_direction = round % 3;
        let v = incoming.velocity().unwrap_or_default();
        assert_eq!(v.iter().filter(|c| **c != 0.0).count(), 1);
        assert!((v[expected_direction] - 0.8).abs() < 1e-12);
        assert_eq!(incoming.time_stamp(), Some(candidate));
        if new_id != active_id {
            assert_eq!(out.len(), 2);
            assert!(out[0].root().unit.motion.is_none());
        } else {
            assert_eq!(out.len(), 1);
        }

        active_id = new_id;
        time = candidate.to_f64();
        velocity = v.to_vec();
    }
    Ok(())
}
