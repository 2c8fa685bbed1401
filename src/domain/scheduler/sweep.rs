use chrono::{DateTime, Utc};

use crate::domain::store::task_store::TaskId;
use crate::domain::task::Task;

/// All interval boundaries sharing one instant, ends first.
///
/// Both sweep consumers rely on the same two rules: a batch is applied in
/// full before anything is sampled at its instant, and end boundaries are
/// applied before start boundaries so exactly-touching intervals never
/// conflict.
#[derive(Debug)]
pub struct BoundaryBatch<'a> {
    pub time: DateTime<Utc>,
    /// The next distinct boundary instant, if any. The timeline builder
    /// emits its period from `time` up to this instant.
    pub next_time: Option<DateTime<Utc>>,
    pub ends: Vec<&'a (TaskId, Task)>,
    pub starts: Vec<&'a (TaskId, Task)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BoundaryKind {
    // Ordering matters: ends sort before starts at the same instant.
    End,
    Start,
}

/// Walks the boundaries of the given tasks in time order, invoking `visit`
/// once per batch of same-instant boundaries. Boundary times are clamped
/// into [`window_start`, `window_end`] when a window is given, so tasks
/// reaching beyond the window contribute at its edges.
///
/// The visitor's first error aborts the sweep and is returned as is.
pub fn sweep_boundaries<'a, E, F>(
    tasks: &'a [(TaskId, Task)],
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    mut visit: F,
) -> Result<(), E>
where
    F: FnMut(BoundaryBatch<'a>) -> Result<(), E>,
{
    let clamp = |time: DateTime<Utc>| match window {
        Some((start, end)) => time.clamp(start, end),
        None => time,
    };

    let mut boundaries: Vec<(DateTime<Utc>, BoundaryKind, &(TaskId, Task))> = Vec::with_capacity(tasks.len() * 2);
    for entry in tasks {
        boundaries.push((clamp(entry.1.start_time), BoundaryKind::Start, entry));
        boundaries.push((clamp(entry.1.end_time), BoundaryKind::End, entry));
    }
    boundaries.sort_by_key(|(time, kind, _)| (*time, *kind));

    let mut index = 0;
    while index < boundaries.len() {
        let time = boundaries[index].0;

        let mut ends = Vec::new();
        let mut starts = Vec::new();
        while index < boundaries.len() && boundaries[index].0 == time {
            match boundaries[index].1 {
                BoundaryKind::End => ends.push(boundaries[index].2),
                BoundaryKind::Start => starts.push(boundaries[index].2),
            }
            index += 1;
        }

        let next_time = boundaries.get(index).map(|(next, _, _)| *next);
        visit(BoundaryBatch { time, next_time, ends, starts })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::ResourceAllocation;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn fresh_id() -> TaskId {
        let mut keys: slotmap::SlotMap<TaskId, ()> = slotmap::SlotMap::with_key();
        keys.insert(())
    }

    fn entry(name: &str, start: u32, end: u32) -> (TaskId, Task) {
        let task = Task::new(name, None, at(start), at(end), "u".into(), vec![ResourceAllocation::new("a", "cpu", 1)]);
        (fresh_id(), task)
    }

    fn collect_batches(tasks: &[(TaskId, Task)]) -> Vec<(DateTime<Utc>, usize, usize)> {
        let mut batches = Vec::new();
        sweep_boundaries::<(), _>(tasks, None, |batch| {
            batches.push((batch.time, batch.ends.len(), batch.starts.len()));
            Ok(())
        })
        .unwrap();
        batches
    }

    #[test]
    fn boundaries_are_batched_per_instant() {
        let tasks = vec![entry("t1", 10, 12), entry("t2", 10, 11)];
        let batches = collect_batches(&tasks);

        // 10:00 carries both starts, then one end each.
        assert_eq!(batches, vec![(at(10), 0, 2), (at(11), 1, 0), (at(12), 1, 0)]);
    }

    #[test]
    fn touching_intervals_share_a_batch_with_the_end_first() {
        let tasks = vec![entry("t1", 10, 12), entry("t2", 12, 13)];
        let mut seen = Vec::new();
        sweep_boundaries::<(), _>(&tasks, None, |batch| {
            if batch.time == at(12) {
                seen = vec![batch.ends.len(), batch.starts.len()];
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![1, 1]);
    }

    #[test]
    fn window_clamping_merges_out_of_window_boundaries() {
        let tasks = vec![entry("t1", 8, 11), entry("t2", 9, 14)];
        let batches_in_window: Vec<_> = {
            let mut batches = Vec::new();
            sweep_boundaries::<(), _>(&tasks, Some((at(10), at(13))), |batch| {
                batches.push((batch.time, batch.ends.len(), batch.starts.len()));
                Ok(())
            })
            .unwrap();
            batches
        };

        // Both starts collapse onto the window start; t2's end onto its end.
        assert_eq!(batches_in_window, vec![(at(10), 0, 2), (at(11), 1, 0), (at(13), 1, 0)]);
    }

    #[test]
    fn visitor_error_aborts_the_sweep() {
        let tasks = vec![entry("t1", 10, 12), entry("t2", 13, 14)];
        let mut visited = 0;
        let result = sweep_boundaries(&tasks, None, |batch| {
            visited += 1;
            if batch.time == at(12) { Err("boom") } else { Ok(()) }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(visited, 2);
    }
}
