mod dns_resolver;

use clap::Parser;
use echoprobe::messages::{DEFAULT_PAYLOAD_SIZE, DEFAULT_TIMEOUT_SECONDS, DEFAULT_TTL};
use echoprobe::pinger::CANCEL_POLL_INTERVAL;
use echoprobe::{CancelToken, Pinger, ProbeConfig, ProbeRequest, ProbeResult};
use log::warn;
use std::time::{Duration, Instant};
use std::{process, thread};

const PROBE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// IPv4 address to probe
    address: String,

    /// Seconds to wait for each reply
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    timeout: f64,

    /// Payload size in bytes
    #[arg(short, long, default_value_t = DEFAULT_PAYLOAD_SIZE)]
    size: usize,

    /// Time to live of the request (1-255)
    #[arg(long, default_value_t = DEFAULT_TTL, value_parser = clap::value_parser!(u8).range(1..))]
    ttl: u8,

    /// Set the don't-fragment bit
    #[arg(short, long)]
    dont_fragment: bool,

    /// Number of probes to send, one after another
    #[arg(short, long, default_value_t = 4)]
    count: u32,

    /// Resolve responding addresses to hostnames. Default: false.
    #[arg(short, long)]
    resolve: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = ProbeConfig {
        target_address: args.address.clone(),
        timeout_seconds: args.timeout,
        payload_size_bytes: args.size,
        ttl: args.ttl,
        dont_fragment: args.dont_fragment,
    };
    let request = match ProbeRequest::try_from(config) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("unable to install Ctrl-C handler: {}", e);
    }

    println!(
        "Probing {} with {} bytes of data (ttl={}, df={}):",
        request.target(),
        request.payload_size(),
        request.ttl(),
        request.dont_fragment()
    );

    let mut pinger = Pinger::new().with_cancel(cancel.clone());
    let mut sent = 0u32;
    let mut received = 0u32;
    for attempt in 0..args.count {
        if cancel.is_cancelled() {
            break;
        }
        let started = Instant::now();
        let result = pinger.start(&request);
        sent += 1;
        if result.success {
            received += 1;
        }
        print_result(&request, &result, args.resolve);

        if attempt + 1 < args.count {
            pause(PROBE_INTERVAL.saturating_sub(started.elapsed()), &cancel);
        }
    }

    let lost = sent - received;
    let loss = if sent > 0 { lost as f64 * 100.0 / sent as f64 } else { 0.0 };
    println!("{} sent, {} received, {} lost ({:.0}% loss)", sent, received, lost, loss);

    if received == 0 {
        process::exit(1);
    }
}

fn print_result(request: &ProbeRequest, result: &ProbeResult, resolve: bool) {
    let responder = if result.responding_address.is_empty() {
        request.target().to_string()
    } else {
        result.responding_address.clone()
    };
    let host = if resolve && result.received_any_reply {
        format!(" [{}]", dns_resolver::lookup_hostname(&responder))
    } else {
        String::new()
    };

    if result.success {
        println!(
            "Reply from {}{}: bytes={} time={:.2}ms TTL={}",
            responder, host, result.payload_size_observed, result.round_trip_time_ms, result.ttl_observed
        );
    } else {
        println!("{}{}: {}", responder, host, result.failure_description);
    }
}

fn pause(duration: Duration, cancel: &CancelToken) {
    let deadline = Instant::now() + duration;
    while !cancel.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(CANCEL_POLL_INTERVAL));
    }
}
