//! Window boundary alignment over a monotone timestamp axis.
//!
//! All cutoff lists for one observation window are resolved in a single
//! forward scan: each target latches the first index whose timestamp is on
//! or after its cutoff, and the scan exits early at the first timestamp
//! strictly past the window end. The early exit is safe only because the
//! axis is validated non-decreasing before alignment.

use chrono::{Duration, NaiveDateTime};

/// One observation window's boundary dates plus the derived lookback
/// cutoffs. Current cutoffs end at the window end; before cutoffs precede
/// the window start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub window_start_date: NaiveDateTime,
    pub window_end_date: NaiveDateTime,
    pub curr_cutoff_dates: Vec<NaiveDateTime>,
    pub bf_cutoff_dates: Vec<NaiveDateTime>,
}

impl WindowSpec {
    /// Derive the window for a given end boundary. The window is closed:
    /// start = end - obs_window days + 1 second. Current cutoffs are
    /// end - N days + 1 second; before cutoffs are start - N days.
    pub fn for_window_end(
        window_end_date: NaiveDateTime,
        obs_window_days: i64,
        curr_last_n_days: &[i64],
        bf_last_n_days: &[i64],
    ) -> Self {
        let window_start_date =
            window_end_date - Duration::days(obs_window_days) + Duration::seconds(1);
        let curr_cutoff_dates = curr_last_n_days
            .iter()
            .map(|n| window_end_date - Duration::days(*n) + Duration::seconds(1))
            .collect();
        let bf_cutoff_dates = bf_last_n_days
            .iter()
            .map(|n| window_start_date - Duration::days(*n))
            .collect();
        Self {
            window_start_date,
            window_end_date,
            curr_cutoff_dates,
            bf_cutoff_dates,
        }
    }
}

/// Aligned indices into the DateTime axis. `None` means the cutoff was not
/// reached by any timestamp; [`resolve_index`] turns it into the axis length
/// so slicing yields an empty (or suffix) range instead of an off-by-one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSet {
    pub window_start_index: Option<usize>,
    pub window_end_index: Option<usize>,
    pub curr_last_n_index: Vec<Option<usize>>,
    pub bf_last_n_index: Vec<Option<usize>>,
}

/// First index whose timestamp is >= each cutoff, or `None` if no timestamp
/// qualifies. Targets are independent and latch on first hit.
pub fn align_cutoffs(
    axis: &[NaiveDateTime],
    cutoffs: &[NaiveDateTime],
) -> Vec<Option<usize>> {
    let mut found: Vec<Option<usize>> = vec![None; cutoffs.len()];
    let mut remaining = cutoffs.len();
    for (index, timestamp) in axis.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        for (slot, cutoff) in found.iter_mut().zip(cutoffs) {
            if slot.is_none() && *cutoff <= *timestamp {
                *slot = Some(index);
                remaining -= 1;
            }
        }
    }
    found
}

/// Resolve every boundary of one window in a single forward scan, exiting at
/// the first timestamp strictly past the window end.
pub fn align_window(axis: &[NaiveDateTime], spec: &WindowSpec) -> IndexSet {
    let mut curr_last_n_index: Vec<Option<usize>> = vec![None; spec.curr_cutoff_dates.len()];
    let mut bf_last_n_index: Vec<Option<usize>> = vec![None; spec.bf_cutoff_dates.len()];
    let mut window_start_index = None;
    let mut window_end_index = None;

    for (index, timestamp) in axis.iter().enumerate() {
        for (slot, cutoff) in curr_last_n_index.iter_mut().zip(&spec.curr_cutoff_dates) {
            if slot.is_none() && *cutoff <= *timestamp {
                *slot = Some(index);
            }
        }
        for (slot, cutoff) in bf_last_n_index.iter_mut().zip(&spec.bf_cutoff_dates) {
            if slot.is_none() && *cutoff <= *timestamp {
                *slot = Some(index);
            }
        }
        if window_start_index.is_none() && spec.window_start_date <= *timestamp {
            window_start_index = Some(index);
        }
        if *timestamp > spec.window_end_date {
            window_end_index = Some(index);
            break;
        }
    }

    IndexSet {
        window_start_index,
        window_end_index,
        curr_last_n_index,
        bf_last_n_index,
    }
}

/// Sentinel-aware index resolution: a missing index means "past the end".
pub fn resolve_index(index: Option<usize>, axis_len: usize) -> usize {
    index.unwrap_or(axis_len)
}

/// Python-style total slicing: out-of-range and inverted bounds clamp to an
/// empty or suffix slice instead of panicking.
pub fn slice_range<T>(values: &[T], start: usize, end: usize) -> &[T] {
    let end = end.min(values.len());
    let start = start.min(end);
    &values[start..end]
}
