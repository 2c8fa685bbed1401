/// Unit tests for the availability timeline builder.
#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::domain::directory::{Directory, Node, ResourceInfo, ResourceUnit};
    use crate::domain::id::{NodeId, ResourceId};
    use crate::domain::scheduler::timeline::TimelineBuilder;
    use crate::domain::store::task_store::{TaskId, TaskStore};
    use crate::domain::task::{ResourceAllocation, Task, TaskStatus};
    use crate::error::Error;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn directory() -> Directory {
        let directory = Directory::new();
        directory.add_resource(ResourceInfo { id: "cpu".into(), description: None, unit: ResourceUnit::None });
        directory.add_resource(ResourceInfo { id: "mem".into(), description: None, unit: ResourceUnit::BytesIec });
        directory
            .add_node(Node {
                id: "a".into(),
                description: None,
                provides: [("cpu".into(), 4), ("mem".into(), 64)].into_iter().collect(),
            })
            .unwrap();
        directory
    }

    fn builder() -> (TaskStore, TimelineBuilder) {
        let store = TaskStore::new();
        let timeline = TimelineBuilder::new(store.clone(), Arc::new(directory()));
        (store, timeline)
    }

    fn seed(store: &TaskStore, name: &str, start: u32, end: u32, cpu: i64) -> TaskId {
        store.insert_task(Task::new(name, None, at(start), at(end), "u".into(), vec![ResourceAllocation::new("a", "cpu", cpu)]))
    }

    fn residual(cpu_free: i64) -> BTreeMap<(NodeId, ResourceId), i64> {
        [(("a".into(), "cpu".into()), cpu_free)].into_iter().collect()
    }

    #[test]
    fn empty_store_yields_no_periods() {
        let (_, timeline) = builder();
        assert!(timeline.availability(at(0), at(23), None).unwrap().is_empty());
    }

    #[test]
    fn reversed_window_is_rejected() {
        let (_, timeline) = builder();
        assert!(matches!(timeline.availability(at(12), at(10), None), Err(Error::Validation(_))));
    }

    #[test]
    fn single_task_produces_one_residual_period() {
        let (store, timeline) = builder();
        seed(&store, "t", 10, 12, 3);

        let periods = timeline.availability(at(8), at(14), None).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start, at(10));
        assert_eq!(periods[0].end, at(12));
        assert_eq!(periods[0].residual, residual(1));
    }

    #[test]
    fn fully_free_gaps_are_omitted() {
        let (store, timeline) = builder();
        seed(&store, "t1", 10, 11, 2);
        seed(&store, "t2", 13, 14, 2);

        let periods = timeline.availability(at(8), at(16), None).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!((periods[0].start, periods[0].end), (at(10), at(11)));
        assert_eq!((periods[1].start, periods[1].end), (at(13), at(14)));
    }

    #[test]
    fn touching_tasks_with_equal_load_merge_into_one_period() {
        let (store, timeline) = builder();
        seed(&store, "t1", 10, 12, 2);
        seed(&store, "t2", 12, 14, 2);

        let periods = timeline.availability(at(8), at(16), None).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!((periods[0].start, periods[0].end), (at(10), at(14)));
        assert_eq!(periods[0].residual, residual(2));
    }

    #[test]
    fn touching_tasks_with_different_load_stay_separate() {
        let (store, timeline) = builder();
        seed(&store, "t1", 10, 12, 2);
        seed(&store, "t2", 12, 14, 3);

        let periods = timeline.availability(at(8), at(16), None).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].residual, residual(2));
        assert_eq!(periods[1].residual, residual(1));
    }

    #[test]
    fn overlap_sections_carry_the_summed_load() {
        let (store, timeline) = builder();
        seed(&store, "t1", 10, 13, 1);
        seed(&store, "t2", 11, 12, 2);

        let periods = timeline.availability(at(8), at(16), None).unwrap();
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].residual, residual(3));
        assert_eq!(periods[1].residual, residual(1));
        assert_eq!(periods[2].residual, residual(3));
        // ...but the flanks do not merge across the middle section.
        assert_eq!((periods[0].start, periods[2].end), (at(10), at(13)));
    }

    #[test]
    fn finished_tasks_do_not_consume_anything() {
        let (store, timeline) = builder();
        let id = seed(&store, "t", 10, 12, 3);
        store.get_task(id).unwrap().write().unwrap().status = TaskStatus::Finished;

        assert!(timeline.availability(at(8), at(14), None).unwrap().is_empty());
    }

    #[test]
    fn excluded_task_is_left_out_of_the_preview() {
        let (store, timeline) = builder();
        let keep = seed(&store, "keep", 10, 12, 1);
        let drop = seed(&store, "drop", 10, 12, 2);

        let periods = timeline.availability(at(8), at(14), Some(drop)).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].residual, residual(3));

        let periods = timeline.availability(at(8), at(14), Some(keep)).unwrap();
        assert_eq!(periods[0].residual, residual(2));
    }

    #[test]
    fn window_clips_tasks_reaching_beyond_it() {
        let (store, timeline) = builder();
        seed(&store, "t", 8, 20, 2);

        let periods = timeline.availability(at(10), at(12), None).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!((periods[0].start, periods[0].end), (at(10), at(12)));
        assert_eq!(periods[0].residual, residual(2));
    }

    #[test]
    fn multi_resource_residuals_are_reported_per_pair() {
        let (store, timeline) = builder();
        store.insert_task(Task::new(
            "t",
            None,
            at(10),
            at(12),
            "u".into(),
            vec![ResourceAllocation::new("a", "cpu", 1), ResourceAllocation::new("a", "mem", 16)],
        ));

        let periods = timeline.availability(at(8), at(14), None).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].residual.get(&("a".into(), "cpu".into())), Some(&3));
        assert_eq!(periods[0].residual.get(&("a".into(), "mem".into())), Some(&48));
    }

    #[test]
    fn repeated_queries_are_byte_identical() {
        let (store, timeline) = builder();
        seed(&store, "t1", 10, 13, 1);
        seed(&store, "t2", 11, 12, 2);

        let first = timeline.availability(at(8), at(16), None).unwrap();
        let second = timeline.availability(at(8), at(16), None).unwrap();
        assert_eq!(first, second);

        // Canonical form: no two adjacent periods share a residual map.
        for pair in first.windows(2) {
            assert!(!(pair[0].end == pair[1].start && pair[0].residual == pair[1].residual));
        }
    }
}
