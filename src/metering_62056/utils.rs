use super::structs::{BaudSwitchParameters, MeterIdentification};
use super::Iec62056Error;
use log::debug;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const ACK: u8 = 0x06;

pub const BAUD_RATES: [u32; 7] = [
    /* 0 */ 300,
    /* 1, A */ 600,
    /* 2, B */ 1200,
    /* 3, C */ 2400,
    /* 4, D */ 4800,
    /* 5, E */ 9600,
    /* 6, F */ 19200,
];

/// Offset of the baud-mode character inside `/XXXZ...`
pub const MODE_CHAR_OFFSET: usize = 4;

pub fn baud_char_to_params(mode_char: u8) -> BaudSwitchParameters {
    match mode_char {
        // Mode C: acknowledge, '0' keeps the current rate
        b'0' => BaudSwitchParameters { send_acknowledgement: true, new_baud: None },
        b'1'..=b'6' => BaudSwitchParameters {
            send_acknowledgement: true,
            new_baud: Some(BAUD_RATES[(mode_char - b'0') as usize]),
        },
        // Mode B: the meter switches on its own
        b'A'..=b'F' => BaudSwitchParameters {
            send_acknowledgement: false,
            new_baud: Some(BAUD_RATES[(mode_char - b'A' + 1) as usize]),
        },
        // Possibly mode A, stay where we are
        _ => BaudSwitchParameters { send_acknowledgement: false, new_baud: None },
    }
}

pub fn is_valid_mode_char(mode_char: char) -> bool {
    matches!(mode_char, '0'..='6' | 'A'..='F')
}

pub fn is_standard_baud_rate(baud: u32) -> bool {
    BAUD_RATES.contains(&baud)
}

/// `/?<address>!\r\n`
pub fn build_request(device_address: Option<&str>) -> Vec<u8> {
    let mut request = Vec::with_capacity(8);
    request.extend_from_slice(b"/?");
    if let Some(address) = device_address {
        request.extend_from_slice(address.as_bytes());
    }
    request.extend_from_slice(b"!\r\n");
    request
}

/// `ACK 0 Z 0 CR LF`, Z being the mode character the meter offered
pub fn build_acknowledgement(mode_char: u8) -> [u8; 6] {
    [ACK, b'0', mode_char, b'0', b'\r', b'\n']
}

pub fn xor_fold(seed: u8, data: &[u8]) -> u8 {
    data.iter().fold(seed, |acc, b| acc ^ b)
}

/// Block check character over a frame starting at STX and ending at ETX.
/// The STX itself is not covered.
pub fn calculate_bcc(frame: &[u8]) -> u8 {
    let covered = match frame.first() {
        Some(&STX) => &frame[1..],
        _ => frame,
    };
    xor_fold(0, covered)
}


pub fn parse_identification_line(line: &str) -> Result<MeterIdentification, Iec62056Error> {
    // Example formats:
    // /ELS5\@V5.3
    // /ISK5MT382-1000
    // /EBZ5DD3BL10-112
    let line = line.trim_end_matches(&['\r', '\n'][..]);

    let content = line
        .strip_prefix('/')
        .ok_or_else(|| Iec62056Error::InvalidIdentification(line.to_string()))?;

    let mut chars = content.chars();
    let manufacturer: String = chars.by_ref().take(3).collect();
    let mode_char = chars.next();

    match mode_char {
        Some(mode_char) if manufacturer.len() == 3 => {
            let identification: String = chars.collect();
            debug!(
                "Parsed identification - Manufacturer: {}, Mode: {}, ID: {}",
                manufacturer, mode_char, identification
            );
            Ok(MeterIdentification { manufacturer, mode_char, identification })
        }
        _ => Err(Iec62056Error::InvalidIdentification(line.to_string())),
    }
}
