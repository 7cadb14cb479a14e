//! QSO Simulator
//!
//! Replays an ADIF log file to a running agent, one record per UDP
//! datagram, the way logging software broadcasts contacts. Useful for
//! testing without a radio.
//!
//! Each record is restamped with the current UTC time (minus `--offset`
//! hours) and tagged with a `STATION_CALLSIGN` drawn round-robin from a
//! pool of `--clients` callsigns picked out of the log itself. The agent
//! only uses that tag when it runs without `operator.callsign`, so leave
//! it unset to see several operators on the map. Gaps between datagrams
//! are exponentially distributed with mean `--delay`.
//!
//! Usage: cargo run --bin qso-sim -- --file log.adi [--clients 5] [--offset 2.5]

use chrono::{DateTime, Utc};
use clap::Parser;
use qsolive_agent::adif::{self, FieldMap};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::UdpSocket;
use tokio::time::{sleep, Duration};

#[derive(Parser)]
#[command(name = "qso-sim")]
#[command(about = "Replay an ADIF log to a QSOlive agent over UDP")]
struct Args {
    /// ADIF file to replay
    #[arg(short, long)]
    file: PathBuf,

    /// Agent listen address
    #[arg(short, long, default_value = "127.0.0.1:2237")]
    target: SocketAddr,

    /// Mean seconds between datagrams
    #[arg(short, long, default_value_t = 1.0)]
    delay: f64,

    /// Maximum number of records to send
    #[arg(short, long, default_value_t = 100)]
    limit: usize,

    /// Number of simulated operators
    #[arg(short, long, default_value_t = 1)]
    clients: usize,

    /// Hours to subtract from the current time (e.g. 2.5)
    #[arg(short, long, default_value_t = 0.0)]
    offset: f64,

    /// Send records with their logged date and time
    #[arg(long)]
    keep_times: bool,
}

/// A log record worth sending
struct Replay {
    record: String,
    fields: FieldMap,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let document = std::fs::read(&args.file)
        .map_err(|e| anyhow::anyhow!("Failed to read {:?}: {}", args.file, e))?;
    let records = adif::split_records(&String::from_utf8_lossy(&document));
    let replays = usable(&records);

    if replays.is_empty() {
        anyhow::bail!("No records with a CALL field in {:?}", args.file);
    }

    let mut rng = rand::thread_rng();
    let pool = operator_pool(&replays, args.clients, &mut rng);

    println!("📻 QSOlive QSO Simulator");
    println!("  Target: {}", args.target);
    println!(
        "  Records in {:?}: {} ({} usable)",
        args.file,
        records.len(),
        replays.len()
    );
    println!("  Operators: {}", pool.join(", "));
    println!("  Mean delay: {}s", args.delay);
    println!();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let mut sent = 0;

    for (i, replay) in replays.iter().take(args.limit).enumerate() {
        let station = station_for(&pool, i);
        let stamp = (!args.keep_times).then(|| stamp_time(Utc::now(), args.offset));
        let datagram = build_datagram(&replay.record, station, stamp);

        println!(
            "📡 [{}] {} → {} {} {}",
            sent + 1,
            station,
            replay.fields["CALL"],
            replay.fields.get("BAND").map(String::as_str).unwrap_or("-"),
            replay.fields.get("MODE").map(String::as_str).unwrap_or("-"),
        );
        socket.send_to(datagram.as_bytes(), args.target).await?;
        sent += 1;

        if args.delay > 0.0 {
            let pause = exp_delay(args.delay, rng.gen::<f64>());
            sleep(Duration::from_secs_f64(pause)).await;
        }
    }

    println!();
    println!("✨ Sent {} record(s)", sent);
    Ok(())
}

/// Records that carry a CALL; the rest are never sent
fn usable(records: &[String]) -> Vec<Replay> {
    records
        .iter()
        .filter_map(|record| {
            let fields = adif::parse(record.as_bytes());
            fields.contains_key("CALL").then(|| Replay {
                record: record.clone(),
                fields,
            })
        })
        .collect()
}

/// Up to `clients` distinct callsigns from the log, at least one
fn operator_pool<R: Rng>(replays: &[Replay], clients: usize, rng: &mut R) -> Vec<String> {
    let calls: Vec<String> = replays
        .iter()
        .map(|r| r.fields["CALL"].clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    calls
        .choose_multiple(rng, clients.max(1))
        .cloned()
        .collect()
}

/// Operator for the `i`-th sent record
fn station_for(pool: &[String], i: usize) -> &str {
    &pool[i % pool.len()]
}

fn stamp_time(now: DateTime<Utc>, offset_hours: f64) -> DateTime<Utc> {
    now - chrono::Duration::milliseconds((offset_hours * 3_600_000.0) as i64)
}

/// Append station and time tags; the agent keeps the last occurrence
fn build_datagram(record: &str, station: &str, stamp: Option<DateTime<Utc>>) -> String {
    let mut datagram = format!(
        "{}<STATION_CALLSIGN:{}>{}",
        record,
        station.len(),
        station
    );
    if let Some(at) = stamp {
        datagram.push_str(&format!(
            "<QSO_DATE:8>{}<TIME_ON:6>{}",
            at.format("%Y%m%d"),
            at.format("%H%M%S")
        ));
    }
    datagram.push_str("<eor>");
    datagram
}

/// Exponentially distributed pause with the given mean, from a uniform
/// sample in `[0, 1)`
fn exp_delay(mean: f64, uniform: f64) -> f64 {
    -mean * (1.0 - uniform).ln()
}
