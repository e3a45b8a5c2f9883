use crate::models::trip::{AssignmentStatus, TripAssignment};

/// Picks the assignment that represents a trip right now.
///
/// Preference order, first match in list order within each tier: someone
/// actively working the trip, then whoever completed it, then whatever record
/// comes first.
pub fn resolve_active_assignment(assignments: &[TripAssignment]) -> Option<&TripAssignment> {
    resolve_from(assignments.iter())
}

/// Same preference order, restricted to records that name a driver.
pub fn resolve_assigned_driver(assignments: &[TripAssignment]) -> Option<&TripAssignment> {
    resolve_from(assignments.iter().filter(|a| a.driver_id.is_some()))
}

fn resolve_from<'a, I>(candidates: I) -> Option<&'a TripAssignment>
where
    I: Iterator<Item = &'a TripAssignment> + Clone,
{
    candidates
        .clone()
        .find(|a| a.status.is_active())
        .or_else(|| {
            candidates
                .clone()
                .find(|a| a.status == AssignmentStatus::Completed)
        })
        .or_else(|| candidates.clone().next())
}
