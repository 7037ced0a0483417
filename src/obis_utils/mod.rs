use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    // A-B:C.D.E*F, where "A-B:" and "*F" are optional. Optical readouts
    // usually send the short C.D.E form.
    static ref OBIS_CODE: Regex =
        Regex::new(r"^(?:(\d{1,3})-(\d{1,3}):)?(\d{1,3}|[A-Z])\.(\d{1,3}|[A-Z])\.(\d{1,3})(?:\*(\d{1,3}))?$").unwrap();

    static ref OBIS_DESCRIPTIONS: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();

        // Energy values
        map.insert("1.8.0", "Active energy + (total)");
        map.insert("1.8.1", "Active energy + (tariff 1)");
        map.insert("1.8.2", "Active energy + (tariff 2)");
        map.insert("2.8.0", "Active energy - (total)");
        map.insert("2.8.1", "Active energy - (tariff 1)");
        map.insert("2.8.2", "Active energy - (tariff 2)");
        map.insert("15.8.0", "Absolute active energy total");

        // Power values
        map.insert("1.7.0", "Active power + (total)");
        map.insert("2.7.0", "Active power - (total)");
        map.insert("15.7.0", "Absolute active instantaneous power");
        map.insert("16.7.0", "Sum active instantaneous power");
        map.insert("21.7.0", "Active power + (L1)");
        map.insert("41.7.0", "Active power + (L2)");
        map.insert("61.7.0", "Active power + (L3)");

        // Voltage and current
        map.insert("32.7.0", "Voltage (L1)");
        map.insert("52.7.0", "Voltage (L2)");
        map.insert("72.7.0", "Voltage (L3)");
        map.insert("31.7.0", "Current (L1)");
        map.insert("51.7.0", "Current (L2)");
        map.insert("71.7.0", "Current (L3)");

        // Reactive energy
        map.insert("3.8.0", "Reactive energy + (total)");
        map.insert("4.8.0", "Reactive energy - (total)");

        // Identification, time and status
        map.insert("0.0.0", "Device address");
        map.insert("0.9.1", "Time");
        map.insert("0.9.2", "Date");
        map.insert("0.2.0", "Firmware version");
        map.insert("C.1.0", "Meter serial number");
        map.insert("F.F.0", "Fatal error register");
        map.insert("F.F", "Fatal error register");

        map.insert("14.7.0", "Supply frequency");
        map.insert("13.7.0", "Power factor");

        map
    };
}

/// Accepts `1-0:1.8.0`, `1.8.0`, `1.8.0*255` and letter groups like `C.1.0`
pub fn validate_obis_code(code: &str) -> bool {
    match OBIS_CODE.captures(code) {
        Some(caps) => caps
            .iter()
            .skip(1)
            .flatten()
            .filter_map(|m| m.as_str().parse::<u16>().ok())
            .all(|v| v <= 255),
        None => code == "F.F",
    }
}

/// Strips the medium/channel prefix and storage suffix: `1-0:1.8.0*255` -> `1.8.0`
pub fn short_obis_code(code: &str) -> &str {
    let code = code.trim();
    let code = match code.find(':') {
        Some(pos) => &code[pos + 1..],
        None => code,
    };
    match code.find('*') {
        Some(pos) => &code[..pos],
        None => code,
    }
}

pub fn get_obis_description(obis_code: &str) -> Option<&'static str> {
    OBIS_DESCRIPTIONS.get(short_obis_code(obis_code)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_obis_code() {
        assert!(validate_obis_code("1-0:1.8.1"));
        assert!(validate_obis_code("0-0:1.0.0"));
        assert!(validate_obis_code("1-0:15.7.0"));
        assert!(validate_obis_code("1.8.0"));
        assert!(validate_obis_code("1.8.0*255"));
        assert!(validate_obis_code("C.1.0"));
        assert!(validate_obis_code("F.F"));
        assert!(!validate_obis_code("invalid"));
        assert!(!validate_obis_code("1:2.3.4"));
        assert!(!validate_obis_code("1-0:1.8"));
        assert!(!validate_obis_code("1.8.300"));
    }

    #[test]
    fn test_short_obis_code() {
        assert_eq!(short_obis_code("1-0:1.8.0*255"), "1.8.0");
        assert_eq!(short_obis_code(" 1.7.0 "), "1.7.0");
        assert_eq!(short_obis_code("C.1.0"), "C.1.0");
    }

    #[test]
    fn test_get_obis_description() {
        assert_eq!(get_obis_description("1-0:1.8.1"), Some("Active energy + (tariff 1)"));
        assert_eq!(get_obis_description("15.7.0"), Some("Absolute active instantaneous power"));
        assert_eq!(get_obis_description("nonexistent"), None);
    }
}
