//! First-fit slice search

use slicer_core::{InventorySnapshot, SliceRange, SliceResult};
use tracing::{debug, trace};

use crate::placement::{Placement, PlacementOutcome, PlacementRequest, PlacementStrategy};

/// Takes the first free `(node, device, offset)` in sorted order
///
/// Nodes are visited by name, devices by id, offsets ascending. A candidate is
/// rejected when it overlaps a prepared slice (still being torn down) or any
/// allocation on the same device.
pub struct FirstFitStrategy;

impl PlacementStrategy for FirstFitStrategy {
    fn place(
        &self,
        request: &PlacementRequest,
        snapshot: &InventorySnapshot,
    ) -> SliceResult<PlacementOutcome> {
        for record in snapshot.records() {
            let Some(entry) = record.placement_table.get(&request.profile) else {
                trace!(node = %record.node_name, profile = %request.profile, "Profile not offered");
                continue;
            };

            let mut devices: Vec<&String> = record.devices.iter().collect();
            devices.sort();
            let mut options: Vec<_> = entry.placements.iter().filter(|p| p.size > 0).collect();
            options.sort_by_key(|p| p.start);

            for device in devices {
                for option in &options {
                    let range = SliceRange::new(device.clone(), option.start, option.size);
                    if !record.is_range_free(&range) {
                        continue;
                    }

                    debug!(
                        node = %record.node_name,
                        slice = %range,
                        profile = %request.profile,
                        "First fit found"
                    );

                    return Ok(PlacementOutcome::Placed(Placement {
                        node_name: record.node_name.clone(),
                        device_id: range.device_id,
                        start: range.start,
                        size: range.size,
                        gi_profile_id: entry.gi_profile_id,
                        ci_profile_id: entry.ci_profile_id,
                        ci_eng_profile_id: entry.ci_eng_profile_id,
                        request: request.clone(),
                    }));
                }
            }
        }

        Ok(PlacementOutcome::NoCapacity)
    }

    fn name(&self) -> &'static str {
        "first-fit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicer_core::{
        AllocationStatus, PlacementOption, PreparedSlice, ProfilePlacement, SliceInventoryRecord,
    };

    fn create_test_record(node: &str, devices: &[&str]) -> SliceInventoryRecord {
        let mut record = SliceInventoryRecord::new(node);
        record.devices = devices.iter().map(|d| d.to_string()).collect();
        record.placement_table.insert(
            "1g.5gb".to_string(),
            ProfilePlacement {
                gi_profile_id: 19,
                ci_profile_id: 0,
                ci_eng_profile_id: 0,
                placements: (0..7).map(|start| PlacementOption { start, size: 1 }).collect(),
            },
        );
        record.placement_table.insert(
            "3g.20gb".to_string(),
            ProfilePlacement {
                gi_profile_id: 9,
                ci_profile_id: 2,
                ci_eng_profile_id: 0,
                placements: vec![
                    PlacementOption { start: 4, size: 4 },
                    PlacementOption { start: 0, size: 4 },
                ],
            },
        );
        record
    }

    fn request(uid: &str, profile: &str) -> PlacementRequest {
        PlacementRequest {
            profile: profile.to_string(),
            workload_id: uid.to_string(),
            namespace: "default".to_string(),
            workload_name: format!("w-{}", uid),
            resource_identifier: format!("res-{}", uid),
            cpu_milli: 0,
            memory: 0,
        }
    }

    fn placed(outcome: PlacementOutcome) -> Placement {
        match outcome {
            PlacementOutcome::Placed(p) => p,
            PlacementOutcome::NoCapacity => panic!("expected a placement"),
        }
    }

    #[test]
    fn test_first_fit_picks_lowest_node_device_offset() {
        let snapshot = InventorySnapshot::new(vec![
            create_test_record("node-b", &["GPU-B"]),
            create_test_record("node-a", &["GPU-A2", "GPU-A1"]),
        ]);

        let p = placed(FirstFitStrategy.place(&request("u1", "3g.20gb"), &snapshot).unwrap());
        assert_eq!(p.node_name, "node-a");
        assert_eq!(p.device_id, "GPU-A1");
        assert_eq!(p.start, 0);
        assert_eq!(p.size, 4);
        assert_eq!(p.gi_profile_id, 9);
        assert_eq!(p.ci_profile_id, 2);
    }

    #[test]
    fn test_skips_prepared_slice_being_torn_down() {
        let mut record = create_test_record("node-1", &["GPU-1"]);
        record.prepared.insert(
            "mig-old".to_string(),
            PreparedSlice {
                owner_workload_id: "gone".to_string(),
                parent_device_id: "GPU-1".to_string(),
                start: 0,
                size: 1,
                gi_id: 3,
                ci_id: 0,
            },
        );
        let snapshot = InventorySnapshot::new(vec![record]);

        let p = placed(FirstFitStrategy.place(&request("u1", "1g.5gb"), &snapshot).unwrap());
        assert_eq!(p.start, 1);
    }

    #[test]
    fn test_skips_overlapping_allocation() {
        let mut record = create_test_record("node-1", &["GPU-1"]);
        let first = placed(
            FirstFitStrategy
                .place(&request("u1", "3g.20gb"), &InventorySnapshot::new(vec![record.clone()]))
                .unwrap(),
        );
        record.put_allocation(first.into_allocation(AllocationStatus::Creating));

        let snapshot = InventorySnapshot::new(vec![record]);
        let second = placed(FirstFitStrategy.place(&request("u2", "1g.5gb"), &snapshot).unwrap());
        assert_eq!(second.start, 4);
    }

    #[test]
    fn test_no_capacity_when_profile_missing_or_full() {
        let record = create_test_record("node-1", &["GPU-1"]);
        let snapshot = InventorySnapshot::new(vec![record.clone()]);
        assert_eq!(
            FirstFitStrategy.place(&request("u1", "7g.40gb"), &snapshot).unwrap(),
            PlacementOutcome::NoCapacity
        );

        let mut full = record;
        for uid in ["a", "b"] {
            let snap = InventorySnapshot::new(vec![full.clone()]);
            let p = placed(FirstFitStrategy.place(&request(uid, "3g.20gb"), &snap).unwrap());
            full.put_allocation(p.into_allocation(AllocationStatus::Ungated));
        }
        let snapshot = InventorySnapshot::new(vec![full]);
        assert_eq!(
            FirstFitStrategy.place(&request("c", "3g.20gb"), &snapshot).unwrap(),
            PlacementOutcome::NoCapacity
        );
    }

    #[test]
    fn test_repeated_placement_keeps_ranges_disjoint() {
        let mut records = vec![
            create_test_record("node-1", &["GPU-1", "GPU-2"]),
            create_test_record("node-2", &["GPU-3"]),
        ];

        let profiles = ["1g.5gb", "3g.20gb", "1g.5gb", "3g.20gb", "1g.5gb", "1g.5gb"];
        let mut placed_count = 0;
        for (i, profile) in profiles.iter().cycle().take(40).enumerate() {
            let snapshot = InventorySnapshot::new(records.clone());
            let uid = format!("uid-{}", i);
            if let PlacementOutcome::Placed(p) =
                FirstFitStrategy.place(&request(&uid, profile), &snapshot).unwrap()
            {
                let record = records
                    .iter_mut()
                    .find(|r| r.node_name == p.node_name)
                    .unwrap();
                record.put_allocation(p.into_allocation(AllocationStatus::Creating));
                placed_count += 1;
            }
        }
        assert!(placed_count > 0);

        for record in &records {
            let ranges: Vec<_> = record.allocations.values().map(|a| a.range()).collect();
            for (i, a) in ranges.iter().enumerate() {
                for b in &ranges[i + 1..] {
                    assert!(!a.overlaps(b), "{} overlaps {}", a, b);
                }
            }
        }
    }
}
