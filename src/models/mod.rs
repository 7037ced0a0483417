use crate::metering_62056::transport::{Clock, SerialTransport};
use crate::metering_62056::{MeterIdentification, MeterReader, ReaderStatus, ReadoutCounters};
use crate::obis_utils::get_obis_description;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One monitored object as handed to consumers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ObjectValue {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
}

/// Snapshot of a reader after a cycle, detached from the driver
#[derive(Debug, Clone, Serialize)]
pub struct MeterReading {
    pub status: ReaderStatus,
    pub identification: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter: Option<MeterIdentification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    pub counters: ReadoutCounters,
    pub values: BTreeMap<String, ObjectValue>,
    pub read_at: DateTime<Utc>,
}

impl MeterReading {
    pub fn from_reader<T: SerialTransport, C: Clock>(reader: &MeterReader<T, C>) -> Self {
        let values = reader
            .values()
            .iter()
            .map(|(code, value)| {
                let object = ObjectValue {
                    value: value.clone(),
                    description: get_obis_description(code),
                };
                (code.clone(), object)
            })
            .collect();

        MeterReading {
            status: reader.status(),
            identification: reader.last_identification_text().to_string(),
            meter: reader.identification().cloned(),
            baud_rate: reader.negotiated_baud_rate(),
            counters: reader.counters(),
            values,
            read_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderConfig;
    use crate::metering_62056::serial_mock::{MockClock, MockTransport};

    #[test]
    fn test_snapshot_of_idle_reader() {
        let clock = MockClock::new();
        let mut reader = MeterReader::new(MockTransport::new(clock.clone()), clock, ReaderConfig::default());
        reader.start_monitoring("1.8.0");
        reader.start_monitoring("9.9.9");

        let reading = MeterReading::from_reader(&reader);
        assert_eq!(reading.status, ReaderStatus::Ready);
        assert_eq!(reading.values["1.8.0"].value, "");
        assert_eq!(reading.values["1.8.0"].description, Some("Active energy + (total)"));
        assert_eq!(reading.values["9.9.9"].description, None);
        assert_eq!(reading.counters.total(), 0);

        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["status"], "Ready");
        assert!(json.get("baud_rate").is_none());
        assert!(json["values"]["9.9.9"].get("description").is_none());
    }
}
