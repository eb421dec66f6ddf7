//! Change detection
//!
//! A plot is rewritten only when its change key (the upstream's last irrigation
//! timestamp) moves. Other field changes under an unchanged key are not picked
//! up; that matches how the upstream publishes edits and is kept on purpose until
//! the product side decides otherwise. Sensor values ride along with the change key
//! for the same reason.

use crate::model::{Plot, SensorReading, StoredPlot};

/// What the reconciler has to do for one incoming plot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotAction {
    /// Never seen before: insert and append history
    Insert,
    /// Change key moved: overwrite fields, clear deletion flag, append history
    Update,
    /// Same change key but currently soft-deleted: clear the flag only
    Restore,
    /// Nothing to write
    Unchanged,
}

/// True when the stored plot is missing or its change key differs
pub fn should_update(stored: Option<&StoredPlot>, incoming: &Plot) -> bool {
    match stored {
        None => true,
        Some(stored) => stored.change_key() != incoming.change_key(),
    }
}

/// Decide the write for one plot
pub fn plot_action(stored: Option<&StoredPlot>, incoming: &Plot) -> PlotAction {
    match stored {
        None => PlotAction::Insert,
        Some(_) if should_update(stored, incoming) => PlotAction::Update,
        Some(stored) if stored.is_deleted => PlotAction::Restore,
        Some(_) => PlotAction::Unchanged,
    }
}

/// True when there is no stored aggregate or any of the four values differs
pub fn aggregate_changed(latest: Option<&SensorReading>, incoming: &SensorReading) -> bool {
    match latest {
        None => true,
        Some(latest) => {
            latest.humidity != incoming.humidity
                || latest.temperature != incoming.temperature
                || latest.rainfall != incoming.rainfall
                || latest.sunlight != incoming.sunlight
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming(key: &str) -> Plot {
        Plot {
            id: 1,
            name: "Norte".to_string(),
            location: None,
            manager: None,
            crop_type: None,
            last_irrigation: key.to_string(),
            latitude: 21.0,
            longitude: -86.0,
            sensor: SensorReading::new(50.0, 24.0, 0.0, 70.0),
        }
    }

    fn stored(key: &str, is_deleted: bool) -> StoredPlot {
        StoredPlot {
            id: 1,
            name: "Norte".to_string(),
            location: None,
            manager: None,
            crop_type: None,
            last_irrigation: key.to_string(),
            latitude: 21.0,
            longitude: -86.0,
            is_deleted,
            updated_at: "2025-03-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_absent_record_is_written() {
        assert!(should_update(None, &incoming("k1")));
        assert_eq!(plot_action(None, &incoming("k1")), PlotAction::Insert);
    }

    #[test]
    fn test_moved_change_key_is_written() {
        let current = stored("k1", false);
        assert!(should_update(Some(&current), &incoming("k2")));
        assert_eq!(plot_action(Some(&current), &incoming("k2")), PlotAction::Update);
    }

    #[test]
    fn test_other_fields_do_not_gate() {
        let current = stored("k1", false);
        let mut renamed = incoming("k1");
        renamed.name = "Otro nombre".to_string();
        renamed.latitude = 0.5;

        assert!(!should_update(Some(&current), &renamed));
        assert_eq!(plot_action(Some(&current), &renamed), PlotAction::Unchanged);
    }

    #[test]
    fn test_deleted_record_with_same_key_is_restored() {
        let current = stored("k1", true);
        assert_eq!(plot_action(Some(&current), &incoming("k1")), PlotAction::Restore);
        assert_eq!(plot_action(Some(&current), &incoming("k2")), PlotAction::Update);
    }

    #[test]
    fn test_aggregate_comparison() {
        let latest = SensorReading::new(40.0, 25.0, 0.0, 1.0);
        assert!(aggregate_changed(None, &latest));
        assert!(!aggregate_changed(Some(&latest), &SensorReading::new(40.0, 25.0, 0.0, 1.0)));
        assert!(aggregate_changed(Some(&latest), &SensorReading::new(41.0, 25.0, 0.0, 1.0)));
        assert!(aggregate_changed(Some(&latest), &SensorReading::new(40.0, 25.0, 0.0, 2.0)));
    }
}
