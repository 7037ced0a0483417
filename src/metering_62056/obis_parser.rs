use log::{debug, warn};

pub const UNIT_SEPARATOR: char = '*';

/// Default allow-list for exported values: numbers, dates and times
pub const OBJECT_VALUE_ALLOWED_CHARS: &str = "0123456789.,:-";

/// Splits `<code>(<value>)` into code and value. The code is everything
/// before the first `(`, the value everything up to the last `)`.
pub fn split_data_line(line: &str) -> Option<(String, String)> {
    // Example formats:
    // 1.8.0(001234.5*kWh)
    // 1-0:1.8.1(000123.456*kWh)
    // 0.9.2(1210101)
    let paren_start = line.find('(')?;
    let paren_end = line.rfind(')')?;

    if paren_start >= paren_end {
        return None;
    }

    let code = &line[..paren_start];
    let value = &line[paren_start + 1..paren_end];
    debug!("Parsed OBIS line - Code: {}, Value: {}", code, value);

    Some((code.to_string(), value.to_string()))
}

/// Cuts everything from the last unit separator on: `230.5*V` becomes `230.5`
pub fn strip_unit(value: &mut String) {
    if let Some(pos) = value.rfind(UNIT_SEPARATOR) {
        value.truncate(pos);
    }
}

pub fn is_valid_object_value(value: &str, allowed: &str) -> bool {
    value.chars().all(|c| allowed.contains(c))
}

/// Runs a monitored value through unit stripping and the allow-list.
/// Returns `None` when the value has to be discarded. With `strip` off the
/// kept unit is not subject to the allow-list, only the number in front of it.
pub fn postprocess_value(mut value: String, strip: bool, allowed: &str) -> Option<String> {
    if strip {
        strip_unit(&mut value);
    }

    let number = match value.rfind(UNIT_SEPARATOR) {
        Some(pos) if !strip => &value[..pos],
        _ => value.as_str(),
    };

    if !is_valid_object_value(number, allowed) {
        warn!("Discarding value with unexpected characters: {:?}", value);
        return None;
    }

    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_data_line() {
        let (code, value) = split_data_line("1.7.0(00230.5*W)").unwrap();
        assert_eq!(code, "1.7.0");
        assert_eq!(value, "00230.5*W");

        let (code, value) = split_data_line("1-0:1.8.1(000123.456*kWh)").unwrap();
        assert_eq!(code, "1-0:1.8.1");
        assert_eq!(value, "000123.456*kWh");
    }

    #[test]
    fn test_split_uses_first_open_and_last_close() {
        let (code, value) = split_data_line("P.01(2104061500)(00)(15)").unwrap();
        assert_eq!(code, "P.01");
        assert_eq!(value, "2104061500)(00)(15");
    }

    #[test]
    fn test_split_rejects_malformed_lines() {
        assert!(split_data_line("1.7.0 00230.5").is_none());
        assert!(split_data_line("1.7.0(00230.5").is_none());
        assert!(split_data_line("1.7.0)00230.5(").is_none());
    }

    #[test]
    fn test_strip_unit() {
        let mut value = "00230.5*W".to_string();
        strip_unit(&mut value);
        assert_eq!(value, "00230.5");

        let mut value = "210101".to_string();
        strip_unit(&mut value);
        assert_eq!(value, "210101");
    }

    #[test]
    fn test_postprocess_value() {
        let allowed = OBJECT_VALUE_ALLOWED_CHARS;
        assert_eq!(postprocess_value("001234.5*kWh".into(), true, allowed), Some("001234.5".into()));
        assert_eq!(postprocess_value("21-01-01".into(), true, allowed), Some("21-01-01".into()));
        assert_eq!(postprocess_value("001234.5*kWh".into(), false, allowed), Some("001234.5*kWh".into()));
        assert_eq!(postprocess_value("0012#4.5".into(), true, allowed), None);
        assert_eq!(postprocess_value("00x234.5*kWh".into(), false, allowed), None);
        assert_eq!(postprocess_value("ABC".into(), true, "ABC"), Some("ABC".into()));
        // only the last unit is cut, a second separator is left to the allow-list
        assert_eq!(postprocess_value("12*34*kWh".into(), true, allowed), None);
        assert_eq!(postprocess_value("12*34".into(), true, allowed), Some("12".into()));
    }
}
