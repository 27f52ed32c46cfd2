// Recipient matching
// Decides per user whether a disaster should be queued for them

use tracing::trace;

use crate::models::{Disaster, User, UserAlertPreferences};
use crate::utils::haversine_distance;

/// Default matching radius around a disaster
pub const DEFAULT_ALERT_RADIUS_KM: f64 = 100.0;

/// Whether `user` should be alerted about `disaster`.
///
/// Checked in order, stopping at the first decisive rule:
/// 1. no preferences row: never alerted
/// 2. severity below `min_severity`: not alerted
/// 3. both locations known and within `radius_km` (inclusive): alerted
/// 4. otherwise a configured region must match the disaster location
pub fn should_alert_user_for_disaster(
    prefs: Option<&UserAlertPreferences>,
    user: &User,
    disaster: &Disaster,
    radius_km: f64,
) -> bool {
    let Some(prefs) = prefs else {
        return false;
    };

    if disaster.severity < prefs.min_severity {
        return false;
    }

    if let Some(distance) = haversine_distance(
        user.latitude,
        user.longitude,
        disaster.latitude,
        disaster.longitude,
    ) {
        trace!(user_id = %user.id, disaster_id = %disaster.id, distance_km = distance, "distance check");
        if distance <= radius_km {
            return true;
        }
    }

    region_matches(&prefs.regions, &disaster.location_name)
}

/// Case-insensitive substring match in either direction.
/// Blank regions never match.
pub fn region_matches(regions: &[String], location_name: &str) -> bool {
    let location = location_name.trim().to_lowercase();
    if location.is_empty() {
        return false;
    }

    regions.iter().any(|region| {
        let region = region.trim().to_lowercase();
        !region.is_empty() && (location.contains(&region) || region.contains(&location))
    })
}

/// Matcher bound to a radius, applied across a user set
#[derive(Debug, Clone, Copy)]
pub struct RecipientMatcher {
    radius_km: f64,
}

impl Default for RecipientMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_RADIUS_KM)
    }
}

impl RecipientMatcher {
    pub fn new(radius_km: f64) -> Self {
        Self { radius_km }
    }

    pub fn matches(
        &self,
        prefs: Option<&UserAlertPreferences>,
        user: &User,
        disaster: &Disaster,
    ) -> bool {
        should_alert_user_for_disaster(prefs, user, disaster, self.radius_km)
    }

    /// Users from `candidates` that should receive an alert, in input order
    pub fn select_recipients<'a>(
        &self,
        disaster: &Disaster,
        candidates: &'a [(User, Option<UserAlertPreferences>)],
    ) -> Vec<&'a User> {
        candidates
            .iter()
            .filter(|(user, prefs)| self.matches(prefs.as_ref(), user, disaster))
            .map(|(user, _)| user)
            .collect()
    }
}
