use crate::model::Window;
use crate::time::Minutes;

use super::EngineError;

/// Walk each window in `step` increments, emitting `[t, t + duration)` only when
/// it fits entirely inside the window. Output is ordered by start.
///
/// Slots from separate windows never interleave because the windows are
/// sorted and disjoint; conflicts with booked appointments are not filtered here.
pub fn generate_slots(windows: &[Window], duration: Minutes, step: Minutes) -> Result<Vec<Window>, EngineError> {
    if duration <= 0 {
        return Err(EngineError::InvalidDuration {
            field: "duration_minutes",
            value: duration,
        });
    }
    if step <= 0 {
        return Err(EngineError::InvalidDuration {
            field: "step_minutes",
            value: step,
        });
    }

    let mut slots = Vec::new();
    for window in windows {
        let mut t = window.start;
        while let Some(end) = t.checked_add(duration)
            && end <= window.end
        {
            slots.push(Window::new(t, end));
            let Some(next) = t.checked_add(step) else { break };
            t = next;
        }
    }
    Ok(slots)
}
