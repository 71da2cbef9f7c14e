use chrono::{Datelike, Duration, NaiveDate, Weekday};
use types::{SlotGrid, TimeInterval, MAX_GRID_DAYS};

/// Days of the grid in order. Stops early at the end of the calendar.
pub fn grid_days(grid: &SlotGrid) -> Vec<NaiveDate> {
    let wanted = grid.days.min(MAX_GRID_DAYS) as usize;
    let mut out = Vec::with_capacity(wanted);
    let mut day = Some(grid.first_day);
    // Bounded so a grid of only weekend days cannot spin forever.
    for _ in 0..(wanted * 7 + 7) {
        let Some(d) = day else { break };
        if out.len() >= wanted {
            break;
        }
        let weekend = matches!(d.weekday(), Weekday::Sat | Weekday::Sun);
        if !(grid.skip_weekends && weekend) {
            out.push(d);
        }
        day = d.succ_opt();
    }
    out
}

/// Candidate intervals of `length` in chronological order.
///
/// Starts step by the grid granularity, or by `length` when none is set,
/// and every interval ends within its day's window.
pub fn candidate_intervals(grid: &SlotGrid, length: Duration) -> Vec<TimeInterval> {
    if length <= Duration::zero() {
        return Vec::new();
    }
    let step = match grid.granularity_minutes {
        Some(m) if m > 0 => Duration::minutes(i64::from(m)),
        _ => length,
    };

    let mut out = Vec::new();
    for day in grid_days(grid) {
        let day_end = day.and_time(grid.day_end);
        let mut start = day.and_time(grid.day_start);
        while let Some(end) = start.checked_add_signed(length) {
            if end > day_end {
                break;
            }
            if let Ok(iv) = TimeInterval::new(start, end) {
                out.push(iv);
            }
            match start.checked_add_signed(step) {
                Some(next) => start = next,
                None => break,
            }
        }
    }
    out
}
