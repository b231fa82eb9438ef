//! Record builder: reading + derived rate -> storage row

use crate::protocol::{MachineStatus, ProductionRecord, Reading};

/// Assemble the storage record for one reading.
///
/// Pure and total. Counter 1 is passed through as the bag count, counters
/// 2-4 are reduced to 0/1 activity flags, and counter 2 decides whether the
/// machine is running.
pub fn build_record(reading: &Reading, rate: Option<f64>, device_id: &str) -> ProductionRecord {
    ProductionRecord {
        device_id: device_id.to_string(),
        bag_count: reading.counter1,
        bags_per_minute: rate,
        line_1_bags: reading.counter1,
        line_2_bags: active_flag(reading.counter2),
        line_3_bags: active_flag(reading.counter3),
        line_4_bags: active_flag(reading.counter4),
        machine_status: machine_status(reading.counter2),
        timestamp: reading.device_timestamp,
        raw_data: reading.raw_payload.clone(),
    }
}

fn active_flag(counter: u64) -> u8 {
    u8::from(counter != 0)
}

fn machine_status(counter2: u64) -> MachineStatus {
    if counter2 != 0 {
        MachineStatus::Running
    } else {
        MachineStatus::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(di1: u64, di2: u64, di3: u64, di4: u64) -> Reading {
        let payload = format!(
            r#"{{"t":"2024-01-01T00:00:00Z","di1":{di1},"di2":{di2},"di3":{di3},"di4":{di4}}}"#
        );
        Reading::parse(payload.as_bytes()).unwrap()
    }

    #[test]
    fn test_build_running_record() {
        let reading = reading(100, 1, 0, 0);
        let record = build_record(&reading, None, "counter-01");

        assert_eq!(record.device_id, "counter-01");
        assert_eq!(record.bag_count, 100);
        assert_eq!(record.bags_per_minute, None);
        assert_eq!(record.line_1_bags, 100);
        assert_eq!(record.line_2_bags, 1);
        assert_eq!(record.line_3_bags, 0);
        assert_eq!(record.line_4_bags, 0);
        assert_eq!(record.machine_status, MachineStatus::Running);
        assert_eq!(record.timestamp, reading.device_timestamp);
        assert_eq!(record.raw_data, reading.raw_payload);
    }

    #[test]
    fn test_build_stopped_record() {
        let record = build_record(&reading(42, 0, 0, 0), Some(0.0), "counter-01");

        assert_eq!(record.machine_status, MachineStatus::Stopped);
        assert_eq!(record.bags_per_minute, Some(0.0));
    }

    #[test]
    fn test_line_flags_are_boolean() {
        let record = build_record(&reading(7, 25, 3, 999), None, "counter-01");

        assert_eq!(record.line_1_bags, 7);
        assert_eq!(record.line_2_bags, 1);
        assert_eq!(record.line_3_bags, 1);
        assert_eq!(record.line_4_bags, 1);
    }
}
