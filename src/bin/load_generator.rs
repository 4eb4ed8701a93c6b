//! Synthetic telemetry load generator
//!
//! Emits delivery events (one JSON per line) whose records wrap base64
//! sensor readings. Most readings are drawn from normal operating
//! distributions; a small fraction are spikes that a trained model should
//! flag.
//!
//! # Usage
//! ```bash
//! ./load-generator --count 1000 --devices 3 --rate 10 | ./telemetry-scorer --stdin
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::io::{self, Write};
use std::time::Duration;
use tracing::info;

use telemetry_scorer::acquisition::encode_envelope;
use telemetry_scorer::pipeline::{EnvelopeBatch, LogRecord};
use telemetry_scorer::{RawReading, SensorFields};

// ============================================================================
// Reading Distributions
// ============================================================================

/// (mean, std dev) of each sensor under normal operation
const TEMP_C: (f64, f64) = (28.0, 3.0);
const HUMIDITY_PCT: (f64, f64) = (40.0, 7.0);
const VIBRATION_G: (f64, f64) = (0.03, 0.02);
const PRESSURE_KPA: (f64, f64) = (101.0, 2.0);
const VOLTAGE_V: (f64, f64) = (12.0, 0.2);
const CURRENT_A: (f64, f64) = (0.8, 0.1);

/// Spike ranges (uniform); humidity keeps its normal value
const SPIKE_TEMP_C: (f64, f64) = (70.0, 90.0);
const SPIKE_VIBRATION_G: (f64, f64) = (1.0, 2.0);
const SPIKE_PRESSURE_KPA: (f64, f64) = (200.0, 260.0);
const SPIKE_VOLTAGE_V: (f64, f64) = (4.0, 6.0);
const SPIKE_CURRENT_A: (f64, f64) = (1.5, 3.0);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "load-generator")]
#[command(about = "Synthetic sensor telemetry for telemetry-scorer")]
#[command(version)]
struct Args {
    /// Total readings to emit
    #[arg(short = 'n', long, default_value = "300")]
    count: u64,

    /// Number of simulated devices (dev-1 .. dev-N)
    #[arg(short, long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    devices: u32,

    /// Readings per second (0 = as fast as possible)
    #[arg(short, long, default_value = "10")]
    rate: f64,

    /// Readings per delivery event
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=10_000))]
    batch_size: u32,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Probability that a reading is a spike
    #[arg(long, default_value = "0.02")]
    spike_probability: f64,

    /// Use a synthetic clock starting at this epoch-ms timestamp instead of
    /// the wall clock
    #[arg(long)]
    start_ts: Option<i64>,
}

// ============================================================================
// Generator
// ============================================================================

struct Normals {
    temp_c: Normal<f64>,
    humidity_pct: Normal<f64>,
    vibration_g: Normal<f64>,
    pressure_kpa: Normal<f64>,
    voltage_v: Normal<f64>,
    current_a: Normal<f64>,
}

fn normal((mean, std_dev): (f64, f64)) -> Result<Normal<f64>> {
    Normal::new(mean, std_dev).map_err(|e| anyhow::anyhow!("invalid distribution N({mean}, {std_dev}): {e}"))
}

/// Produces readings for a fixed set of devices.
struct ReadingGenerator {
    rng: StdRng,
    devices: Vec<String>,
    spike_probability: f64,
    normals: Normals,
    spikes: u64,
}

impl ReadingGenerator {
    fn new(devices: u32, spike_probability: f64, seed: Option<u64>) -> Result<Self> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            devices: (1..=devices).map(|i| format!("dev-{i}")).collect(),
            spike_probability: spike_probability.clamp(0.0, 1.0),
            normals: Normals {
                temp_c: normal(TEMP_C)?,
                humidity_pct: normal(HUMIDITY_PCT)?,
                vibration_g: normal(VIBRATION_G)?,
                pressure_kpa: normal(PRESSURE_KPA)?,
                voltage_v: normal(VOLTAGE_V)?,
                current_a: normal(CURRENT_A)?,
            },
            spikes: 0,
        })
    }

    fn uniform(&mut self, (low, high): (f64, f64)) -> f64 {
        self.rng.gen_range(low..high)
    }

    /// One reading for a randomly chosen device at `ts`.
    fn sample(&mut self, ts: i64) -> RawReading {
        let device_id = self
            .devices
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| "dev-1".to_string());

        let n = &self.normals;
        let mut sensors = SensorFields {
            temp_c: Some(n.temp_c.sample(&mut self.rng)),
            humidity_pct: Some(n.humidity_pct.sample(&mut self.rng).clamp(0.0, 100.0)),
            vibration_g: Some(n.vibration_g.sample(&mut self.rng).abs()),
            pressure_kpa: Some(n.pressure_kpa.sample(&mut self.rng)),
            voltage_v: Some(n.voltage_v.sample(&mut self.rng)),
            current_a: Some(n.current_a.sample(&mut self.rng).abs()),
        };

        if self.rng.gen_bool(self.spike_probability) {
            self.spikes += 1;
            sensors.temp_c = Some(self.uniform(SPIKE_TEMP_C));
            sensors.vibration_g = Some(self.uniform(SPIKE_VIBRATION_G));
            sensors.pressure_kpa = Some(self.uniform(SPIKE_PRESSURE_KPA));
            sensors.voltage_v = Some(self.uniform(SPIKE_VOLTAGE_V));
            sensors.current_a = Some(self.uniform(SPIKE_CURRENT_A));
        }

        RawReading::new(device_id, ts, sensors)
    }
}

/// Millisecond clock that never repeats a timestamp.
struct Clock {
    synthetic: Option<i64>,
    step_ms: i64,
    last: i64,
}

impl Clock {
    fn new(start_ts: Option<i64>, rate: f64) -> Self {
        let step_ms = if rate > 0.0 { (1000.0 / rate).round().max(1.0) as i64 } else { 1 };
        Self {
            synthetic: start_ts,
            step_ms,
            last: i64::MIN,
        }
    }

    fn next(&mut self) -> i64 {
        let ts = match self.synthetic.as_mut() {
            Some(t) => {
                let ts = *t;
                *t += self.step_ms;
                ts
            }
            None => chrono::Utc::now().timestamp_millis(),
        };
        self.last = ts.max(self.last.saturating_add(1));
        self.last
    }
}

fn to_log_record(reading: &RawReading, sequence: u64) -> Result<LogRecord> {
    Ok(LogRecord {
        data: encode_envelope(reading).context("Failed to encode reading")?,
        partition_key: Some(reading.device_id.clone()),
        sequence_number: Some(format!("{sequence:020}")),
    })
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    // stdout carries data, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.spike_probability),
        "--spike-probability must be within 0..=1"
    );
    anyhow::ensure!(args.rate >= 0.0 && args.rate.is_finite(), "--rate must be >= 0");

    let mut generator = ReadingGenerator::new(args.devices, args.spike_probability, args.seed)?;
    let mut clock = Clock::new(args.start_ts, args.rate);
    let batch_size = u64::from(args.batch_size);
    let pause = (args.rate > 0.0).then(|| Duration::from_secs_f64(batch_size as f64 / args.rate));

    info!(
        count = args.count,
        devices = args.devices,
        rate = args.rate,
        batch_size,
        seed = ?args.seed,
        "Generating telemetry"
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut emitted = 0u64;

    while emitted < args.count {
        let take = batch_size.min(args.count - emitted);
        let records = (0..take)
            .map(|i| to_log_record(&generator.sample(clock.next()), emitted + i))
            .collect::<Result<Vec<_>>>()?;
        emitted += take;

        let event = EnvelopeBatch::new(records).into_event();
        writeln!(out, "{}", serde_json::to_string(&event)?)?;
        out.flush()?;

        if let Some(pause) = pause {
            if emitted < args.count {
                std::thread::sleep(pause);
            }
        }
    }

    info!(emitted, spikes = generator.spikes, "Done");
    Ok(())
}
