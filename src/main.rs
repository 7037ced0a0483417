use meter_readout::{
    AppConfig, MeterReader, MeterReading, ReaderStatus, RetryDecision, RetryPolicy, RetryReason,
    SerialPortTransport, SystemClock,
};
use log::{error, info, warn};
use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

type Reader = MeterReader<SerialPortTransport, SystemClock>;

fn build_reader(config: &AppConfig) -> Reader {
    let transport = SerialPortTransport::new(&config.port);
    let mut reader = MeterReader::new(transport, SystemClock, config.reader.clone());
    for obis in &config.objects {
        reader.start_monitoring(obis);
    }
    reader
}

fn publish(reading: &MeterReading, config: &AppConfig) -> Result<(), Box<dyn Error>> {
    for (code, object) in &reading.values {
        info!("Result: {} = {} ({})", code, object.value, object.description.unwrap_or("unknown"));
    }

    let line = serde_json::to_string(reading)?;
    match &config.output {
        Some(path) => {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", line)?;
        }
        None => println!("{}", line),
    }
    Ok(())
}

/// Drives one reader until the retry policy asks for a restart
fn run(reader: &mut Reader, config: &AppConfig, retry: &mut RetryPolicy) {
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let read_interval = Duration::from_secs(config.read_interval_secs);

    loop {
        reader.poll();

        let reason = match reader.status() {
            ReaderStatus::Ready => {
                reader.start_reading();
                continue;
            }
            ReaderStatus::Busy => {
                sleep(poll_interval);
                continue;
            }
            ReaderStatus::Ok => {
                let reading = MeterReading::from_reader(reader);
                reader.acknowledge();
                match publish(&reading, config) {
                    Ok(_) => {
                        retry.reset();
                        info!("Next readout in {} seconds", config.read_interval_secs);
                        sleep(read_interval);
                        continue;
                    }
                    Err(e) => {
                        error!("Publishing the reading failed: {}", e);
                        RetryReason::TransmitError
                    }
                }
            }
            status if status.is_error() => {
                warn!(
                    "Readout failed: {} [{}], identification {:?}, errors {} / checksum errors {} / successes {}",
                    status,
                    status.short_label(),
                    reader.last_identification_text(),
                    reader.errors(),
                    reader.checksum_errors(),
                    reader.successes()
                );
                reader.acknowledge();
                RetryReason::MeterError
            }
            _ => continue,
        };

        match retry.next(reason) {
            RetryDecision::Wait(delay) => sleep(delay),
            RetryDecision::Restart => return,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    let default_filter = std::env::var("METER_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from(Path::new(&path))?,
        None => AppConfig::load()?,
    };

    info!("Reading meter on {}, monitoring {:?}", config.port, config.objects);
    let mut retry = RetryPolicy::new(config.retry.clone());

    loop {
        let mut reader = build_reader(&config);
        run(&mut reader, &config, &mut retry);
        warn!("Reopening {} with a fresh reader", config.port);
    }
}
